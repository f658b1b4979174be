//! rustls client configuration from configured TLS materials.

use super::TlsParams;
use fanout_dns_domain::{ConfigError, TlsSettings};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::{ClientConfig, RootCertStore};
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

/// Builds the shared client config: roots from the configured CA bundle or
/// the webpki store, plus optional client authentication.
pub fn build_client_config(settings: &TlsSettings) -> Result<Arc<ClientConfig>, ConfigError> {
    let mut roots = RootCertStore::empty();
    match &settings.ca {
        Some(path) => {
            for cert in load_certs(path)? {
                roots
                    .add(cert)
                    .map_err(|err| ConfigError::Tls(err.to_string()))?;
            }
        }
        None => roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned()),
    }

    let builder = ClientConfig::builder().with_root_certificates(roots);
    let config = match (&settings.cert, &settings.key) {
        (Some(cert), Some(key)) => builder
            .with_client_auth_cert(load_certs(cert)?, load_key(key)?)
            .map_err(|err| ConfigError::Tls(err.to_string()))?,
        (None, None) => builder.with_no_client_auth(),
        _ => {
            return Err(ConfigError::Tls(
                "client cert and key must be configured together".to_string(),
            ))
        }
    };
    Ok(Arc::new(config))
}

/// SNI for an upstream: the configured override, or the endpoint host.
pub fn params_for_endpoint(
    config: &Arc<ClientConfig>,
    settings: &TlsSettings,
    addr: &str,
) -> Result<TlsParams, ConfigError> {
    let host = settings
        .server_name
        .clone()
        .unwrap_or_else(|| host_part(addr).to_string());
    let server_name =
        ServerName::try_from(host).map_err(|err| ConfigError::Tls(err.to_string()))?;
    Ok(TlsParams {
        config: Arc::clone(config),
        server_name,
    })
}

fn host_part(addr: &str) -> &str {
    if let Some(rest) = addr.strip_prefix('[') {
        if let Some((host, _)) = rest.split_once(']') {
            return host;
        }
    }
    addr.rsplit_once(':').map(|(host, _)| host).unwrap_or(addr)
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, ConfigError> {
    let file = std::fs::File::open(path).map_err(|err| ConfigError::Read {
        path: path.display().to_string(),
        reason: err.to_string(),
    })?;
    rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| ConfigError::Tls(err.to_string()))
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, ConfigError> {
    let file = std::fs::File::open(path).map_err(|err| ConfigError::Read {
        path: path.display().to_string(),
        reason: err.to_string(),
    })?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|err| ConfigError::Tls(err.to_string()))?
        .ok_or_else(|| ConfigError::Tls(format!("no private key in {}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_extraction() {
        assert_eq!(host_part("1.1.1.1:853"), "1.1.1.1");
        assert_eq!(host_part("[::1]:853"), "::1");
        assert_eq!(host_part("1.1.1.1"), "1.1.1.1");
    }
}
