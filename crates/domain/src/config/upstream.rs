use super::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::str::FromStr;

/// Transport used to reach an upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Protocol {
    #[default]
    Udp,
    Tcp,
    TcpTls,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Udp => "udp",
            Protocol::Tcp => "tcp",
            Protocol::TcpTls => "tcp-tls",
        }
    }

    /// Well-known port for this transport.
    fn default_port(&self) -> u16 {
        match self {
            Protocol::TcpTls => 853,
            _ => 53,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "udp" => Ok(Protocol::Udp),
            "tcp" => Ok(Protocol::Tcp),
            "tcp-tls" => Ok(Protocol::TcpTls),
            other => Err(ConfigError::UnknownProtocol(other.to_string())),
        }
    }
}

/// One resolved upstream endpoint: a dialable `host:port` plus the transport
/// chosen for it. Identity is the address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamEndpoint {
    pub addr: String,
    pub protocol: Protocol,
}

/// Expands the `to` list into endpoints. Accepted forms per entry:
/// `host`, `host:port`, `udp://host[:port]`, `tcp://host[:port]`,
/// `tls://host[:port]` (port 853), `dns://host[:port]` (default network),
/// or a path to a resolv.conf-style file whose `nameserver` lines become
/// upstreams on the default network.
pub fn resolve_endpoints(
    to: &[String],
    default_protocol: Protocol,
) -> Result<Vec<UpstreamEndpoint>, ConfigError> {
    let mut endpoints = Vec::with_capacity(to.len());
    for entry in to {
        let entry = entry.trim();
        let (protocol, rest) = split_scheme(entry, default_protocol)?;
        if let Some(addr) = parse_host_port(rest, protocol.default_port()) {
            endpoints.push(UpstreamEndpoint {
                addr,
                protocol,
            });
            continue;
        }
        if Path::new(rest).is_file() {
            read_resolv_file(rest, default_protocol, &mut endpoints)?;
            continue;
        }
        return Err(ConfigError::InvalidEndpoint(entry.to_string()));
    }
    Ok(endpoints)
}

fn split_scheme(entry: &str, default_protocol: Protocol) -> Result<(Protocol, &str), ConfigError> {
    if let Some((scheme, rest)) = entry.split_once("://") {
        let protocol = match scheme {
            "udp" => Protocol::Udp,
            "tcp" => Protocol::Tcp,
            "tls" | "tcp-tls" => Protocol::TcpTls,
            "dns" => default_protocol,
            other => return Err(ConfigError::UnknownProtocol(other.to_string())),
        };
        Ok((protocol, rest))
    } else {
        Ok((default_protocol, entry))
    }
}

/// Parses `host`, `host:port`, `[v6]:port`, or a bare IPv6 address into a
/// dialable `host:port` string. Hosts must be IP addresses.
fn parse_host_port(s: &str, default_port: u16) -> Option<String> {
    if let Ok(addr) = SocketAddr::from_str(s) {
        return Some(addr.to_string());
    }
    if let Ok(ip) = IpAddr::from_str(s) {
        return Some(SocketAddr::new(ip, default_port).to_string());
    }
    // host:port with a non-socket-addr shape (e.g. leading zeros) is not
    // worth special-casing; everything else falls through to the file probe.
    None
}

fn read_resolv_file(
    path: &str,
    protocol: Protocol,
    endpoints: &mut Vec<UpstreamEndpoint>,
) -> Result<(), ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|err| ConfigError::Read {
        path: path.to_string(),
        reason: err.to_string(),
    })?;
    for line in contents.lines() {
        let mut fields = line.split_whitespace();
        if fields.next() != Some("nameserver") {
            continue;
        }
        let Some(host) = fields.next() else { continue };
        match parse_host_port(host, protocol.default_port()) {
            Some(addr) => endpoints.push(UpstreamEndpoint {
                addr,
                protocol,
            }),
            None => return Err(ConfigError::InvalidEndpoint(host.to_string())),
        }
    }
    Ok(())
}
