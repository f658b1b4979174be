//! Dialing upstreams: one connected DNS wire link per exchange.

pub mod conn;
pub mod tls;

pub use conn::DnsConn;

use crate::dns::DIAL_TIMEOUT;
use fanout_dns_domain::{FanoutError, Protocol};
use rustls::pki_types::ServerName;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{lookup_host, TcpStream, UdpSocket};
use tokio_rustls::TlsConnector;
use tracing::{debug_span, Instrument};

/// TLS parameters bound to a transport at setup.
#[derive(Clone)]
pub struct TlsParams {
    pub config: Arc<rustls::ClientConfig>,
    pub server_name: ServerName<'static>,
}

/// Opens a single connection to one upstream address over UDP, TCP, or
/// TLS-over-TCP. Once TLS parameters are set, every dial is coerced to
/// `tcp-tls`.
pub struct Transport {
    addr: Arc<str>,
    tls: Option<TlsParams>,
}

impl Transport {
    pub fn new(addr: &str) -> Self {
        Self {
            addr: Arc::from(addr),
            tls: None,
        }
    }

    /// Called at most once, before first use.
    pub fn set_tls(&mut self, params: TlsParams) {
        self.tls = Some(params);
    }

    /// Dials the upstream under the 2 s dial deadline.
    pub async fn dial(&self, protocol: Protocol) -> Result<DnsConn, FanoutError> {
        let protocol = if self.tls.is_some() {
            Protocol::TcpTls
        } else {
            protocol
        };
        let span = debug_span!("connect", peer = %self.addr, protocol = %protocol);
        async move {
            tokio::time::timeout(DIAL_TIMEOUT, self.connect(protocol))
                .await
                .map_err(|_| FanoutError::ConnectTimeout(self.addr.to_string()))?
        }
        .instrument(span)
        .await
    }

    async fn connect(&self, protocol: Protocol) -> Result<DnsConn, FanoutError> {
        let target = self.resolve().await?;
        match protocol {
            Protocol::Udp => {
                let bind_addr: SocketAddr = if target.is_ipv4() {
                    ([0, 0, 0, 0], 0).into()
                } else {
                    (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
                };
                let socket = UdpSocket::bind(bind_addr)
                    .await
                    .map_err(|err| self.connect_err(err))?;
                socket
                    .connect(target)
                    .await
                    .map_err(|err| self.connect_err(err))?;
                Ok(DnsConn::udp(socket))
            }
            Protocol::Tcp => {
                let stream = TcpStream::connect(target)
                    .await
                    .map_err(|err| self.connect_err(err))?;
                Ok(DnsConn::Tcp(stream))
            }
            Protocol::TcpTls => {
                let Some(tls) = &self.tls else {
                    return Err(FanoutError::Connect {
                        addr: self.addr.to_string(),
                        reason: "tls requested but not configured".to_string(),
                    });
                };
                let stream = TcpStream::connect(target)
                    .await
                    .map_err(|err| self.connect_err(err))?;
                let connector = TlsConnector::from(Arc::clone(&tls.config));
                let stream = connector
                    .connect(tls.server_name.clone(), stream)
                    .await
                    .map_err(|err| self.connect_err(err))?;
                Ok(DnsConn::Tls(Box::new(stream)))
            }
        }
    }

    async fn resolve(&self) -> Result<SocketAddr, FanoutError> {
        lookup_host(&*self.addr)
            .await
            .map_err(|err| self.connect_err(err))?
            .next()
            .ok_or_else(|| FanoutError::Connect {
                addr: self.addr.to_string(),
                reason: "address resolved to nothing".to_string(),
            })
    }

    fn connect_err(&self, err: std::io::Error) -> FanoutError {
        FanoutError::Connect {
            addr: self.addr.to_string(),
            reason: err.to_string(),
        }
    }
}
