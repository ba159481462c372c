//! TLS material loading for the HTTPS listener.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::ServerConfig;
use rustls_pemfile::{certs, private_key};

use crate::settings::TlsSettings;

#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no certificate found in {0}")]
    NoCertificate(PathBuf),

    #[error("no private key found in {0}")]
    NoPrivateKey(PathBuf),

    #[error("invalid TLS configuration: {0}")]
    Config(#[from] rustls::Error),
}

fn open(path: &Path) -> Result<BufReader<File>, TlsError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| TlsError::Read {
            path: path.to_path_buf(),
            source,
        })
}

/// Loads the certificate chain and private key into a rustls server config.
///
/// ALPN advertises `h2` and `http/1.1`.
pub fn load_tls_config(settings: &TlsSettings) -> Result<Arc<ServerConfig>, TlsError> {
    let read_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| TlsError::Read { path, source }
    };

    let cert_chain = certs(&mut open(&settings.cert_path)?)
        .collect::<Result<Vec<_>, _>>()
        .map_err(read_err(&settings.cert_path))?;
    if cert_chain.is_empty() {
        return Err(TlsError::NoCertificate(settings.cert_path.clone()));
    }

    let key = private_key(&mut open(&settings.key_path)?)
        .map_err(read_err(&settings.key_path))?
        .ok_or_else(|| TlsError::NoPrivateKey(settings.key_path.clone()))?;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(cert_chain, key)?;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    Ok(Arc::new(config))
}
