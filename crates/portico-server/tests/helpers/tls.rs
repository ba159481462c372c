//! Material TLS autofirmado para los tests de HTTPS.

use std::path::Path;

use portico_server::settings::TlsSettings;

/// Escribe un certificado autofirmado para `localhost` y `127.0.0.1` en `dir`.
///
/// Retorna los settings del listener y el PEM del certificado, para usarlo
/// como raiz de confianza en el cliente.
pub fn self_signed(dir: &Path) -> (TlsSettings, String) {
    let rcgen::CertifiedKey { cert, key_pair } = rcgen::generate_simple_self_signed(vec![
        "localhost".to_string(),
        "127.0.0.1".to_string(),
    ])
    .unwrap();

    let settings = TlsSettings {
        port: 0,
        cert_path: dir.join("server.crt"),
        key_path: dir.join("server.key"),
    };
    std::fs::write(&settings.cert_path, cert.pem()).unwrap();
    std::fs::write(&settings.key_path, key_pair.serialize_pem()).unwrap();

    (settings, cert.pem())
}
