use std::fs::File;
use std::io::{self, BufReader, ErrorKind};
use std::sync::Arc;

use pgwire::tokio::TlsAcceptor;
use pgwire::tokio::tokio_rustls::rustls::ServerConfig;

/// Build an acceptor from `DEVPOOL_TLS_CERT` / `DEVPOOL_TLS_KEY` paths.
/// Plain TCP when neither is set.
pub fn load_tls_acceptor(
    cert_path: Option<&str>,
    key_path: Option<&str>,
) -> io::Result<Option<TlsAcceptor>> {
    let (cert_path, key_path) = match (cert_path, key_path) {
        (None, None) => return Ok(None),
        (Some(c), Some(k)) => (c, k),
        _ => {
            return Err(io::Error::new(
                ErrorKind::InvalidInput,
                "both DEVPOOL_TLS_CERT and DEVPOOL_TLS_KEY must be set, or neither",
            ));
        }
    };

    let certs: Vec<_> = rustls_pemfile::certs(&mut open_pem("DEVPOOL_TLS_CERT", cert_path)?)
        .collect::<Result<_, _>>()
        .map_err(|e| with_context("DEVPOOL_TLS_CERT", cert_path, e))?;
    if certs.is_empty() {
        return Err(io::Error::new(
            ErrorKind::InvalidInput,
            format!("DEVPOOL_TLS_CERT {cert_path}: no certificates found"),
        ));
    }

    let key = rustls_pemfile::private_key(&mut open_pem("DEVPOOL_TLS_KEY", key_path)?)
        .map_err(|e| with_context("DEVPOOL_TLS_KEY", key_path, e))?
        .ok_or_else(|| {
            io::Error::new(
                ErrorKind::InvalidInput,
                format!("DEVPOOL_TLS_KEY {key_path}: no private key found"),
            )
        })?;

    let mut config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| {
            io::Error::new(
                ErrorKind::InvalidInput,
                format!("DEVPOOL_TLS_CERT {cert_path} does not match DEVPOOL_TLS_KEY {key_path}: {e}"),
            )
        })?;

    config.alpn_protocols = vec![b"postgresql".to_vec()];

    Ok(Some(TlsAcceptor::from(Arc::new(config))))
}

fn open_pem(var: &str, path: &str) -> io::Result<BufReader<File>> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| with_context(var, path, e))
}

/// Keeps the error kind, prefixes the variable and path that produced it.
fn with_context(var: &str, path: &str, err: io::Error) -> io::Error {
    io::Error::new(err.kind(), format!("{var} {path}: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_tcp_without_paths() {
        assert!(load_tls_acceptor(None, None).unwrap().is_none());
    }

    #[test]
    fn half_configured_is_rejected() {
        let Err(err) = load_tls_acceptor(Some("cert.pem"), None) else {
            panic!("a cert without a key must be rejected");
        };
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(load_tls_acceptor(None, Some("key.pem")).is_err());
    }

    #[test]
    fn missing_files_are_io_errors() {
        let dir = std::env::temp_dir().join("devpool_test_tls");
        std::fs::create_dir_all(&dir).unwrap();
        let cert = dir.join("absent_cert.pem");
        let key = dir.join("absent_key.pem");
        let Err(err) = load_tls_acceptor(cert.to_str(), key.to_str()) else {
            panic!("absent PEM files must be rejected");
        };
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let msg = err.to_string();
        assert!(msg.starts_with("DEVPOOL_TLS_CERT "), "{msg}");
        assert!(msg.contains("absent_cert.pem"), "{msg}");
    }

    #[test]
    fn empty_cert_file_is_rejected() {
        let dir = std::env::temp_dir().join("devpool_test_tls");
        std::fs::create_dir_all(&dir).unwrap();
        let cert = dir.join("empty_cert.pem");
        let key = dir.join("empty_key.pem");
        std::fs::write(&cert, "").unwrap();
        std::fs::write(&key, "").unwrap();
        let Err(err) = load_tls_acceptor(cert.to_str(), key.to_str()) else {
            panic!("an empty certificate file must be rejected");
        };
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(err.to_string().contains("DEVPOOL_TLS_CERT"), "{err}");
    }

    #[test]
    fn missing_key_names_the_key_variable() {
        let dir = std::env::temp_dir().join("devpool_test_tls");
        std::fs::create_dir_all(&dir).unwrap();
        let cert = dir.join("one_cert.pem");
        let key = dir.join("key_without_key.pem");
        std::fs::write(
            &cert,
            "-----BEGIN CERTIFICATE-----\nMAA=\n-----END CERTIFICATE-----\n",
        )
        .unwrap();
        std::fs::write(&key, "").unwrap();
        let Err(err) = load_tls_acceptor(cert.to_str(), key.to_str()) else {
            panic!("a key file without a key must be rejected");
        };
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(err.to_string().starts_with("DEVPOOL_TLS_KEY "), "{err}");
    }
}
