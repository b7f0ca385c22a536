//! TLS acceptor construction from PEM files.

use std::{fs::File, io::BufReader, sync::Arc};

use tokio_rustls::{
    TlsAcceptor,
    rustls::{
        ServerConfig,
        pki_types::{CertificateDer, PrivateKeyDer},
    },
};

use super::ServerError;

/// Build an acceptor from a PEM certificate chain and private key.
pub(super) fn load_acceptor(cert_path: &str, key_path: &str) -> Result<TlsAcceptor, ServerError> {
    let certs = load_certs(cert_path)?;
    let key = load_key(key_path)?;
    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    log::info!("TLS enabled: cert={cert_path}");
    Ok(TlsAcceptor::from(Arc::new(config)))
}

fn open(path: &str) -> Result<BufReader<File>, ServerError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| ServerError::Tls {
            path: path.to_owned(),
            source,
        })
}

fn load_certs(path: &str) -> Result<Vec<CertificateDer<'static>>, ServerError> {
    let mut reader = open(path)?;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| ServerError::Tls {
            path: path.to_owned(),
            source,
        })?;
    if certs.is_empty() {
        return Err(ServerError::Tls {
            path: path.to_owned(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, "no certificates found"),
        });
    }
    Ok(certs)
}

fn load_key(path: &str) -> Result<PrivateKeyDer<'static>, ServerError> {
    let mut reader = open(path)?;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|source| ServerError::Tls {
            path: path.to_owned(),
            source,
        })?
        .ok_or_else(|| ServerError::MissingPrivateKey(path.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::load_acceptor;
    use crate::server::ServerError;

    #[test]
    fn missing_certificate_file_is_reported() {
        let err = load_acceptor("/nonexistent/cert.pem", "/nonexistent/key.pem")
            .err()
            .expect("missing files fail");
        assert!(matches!(err, ServerError::Tls { ref path, .. } if path == "/nonexistent/cert.pem"));
    }

    #[test]
    fn empty_certificate_file_is_reported() {
        let path = std::env::temp_dir().join(format!("wirepump-empty-{}.pem", std::process::id()));
        std::fs::write(&path, "").expect("write temp pem");
        let path_str = path.to_string_lossy().into_owned();
        let result = load_acceptor(&path_str, &path_str);
        std::fs::remove_file(&path).ok();
        assert!(matches!(result, Err(ServerError::Tls { .. })));
    }
}
