//! TLS utilities for SBI client and server
//!
//! Provides certificate loading, key loading, and rustls configuration
//! builders for the SBI interface.

use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::{ClientConfig, RootCertStore, ServerConfig};

use crate::error::{SbiError, SbiResult};

/// ALPN identifiers offered by the SBI server
const SERVER_ALPN: [&[u8]; 2] = [b"h2", b"http/1.1"];

/// Get the ring crypto provider.
fn provider() -> Arc<rustls::crypto::CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

/// Load PEM-encoded certificates from a file path.
pub fn load_certs(path: &str) -> SbiResult<Vec<CertificateDer<'static>>> {
    let file = File::open(path)
        .map_err(|e| SbiError::TlsError(format!("Failed to open cert file {path}: {e}")))?;
    let mut reader = BufReader::new(file);

    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| SbiError::TlsError(format!("Failed to parse certs from {path}: {e}")))?;

    if certs.is_empty() {
        return Err(SbiError::TlsError(format!(
            "No certificates found in {path}"
        )));
    }

    Ok(certs)
}

/// Load a PEM-encoded private key from a file path.
pub fn load_private_key(path: &str) -> SbiResult<PrivateKeyDer<'static>> {
    let file = File::open(path)
        .map_err(|e| SbiError::TlsError(format!("Failed to open key file {path}: {e}")))?;
    let mut reader = BufReader::new(file);

    let key = rustls_pemfile::private_key(&mut reader)
        .map_err(|e| SbiError::TlsError(format!("Failed to parse key from {path}: {e}")))?
        .ok_or_else(|| SbiError::TlsError(format!("No private key found in {path}")))?;

    Ok(key)
}

/// Build a server-side TLS config (no client auth) offering h2 and http/1.1.
pub fn build_server_config(
    certs: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
) -> SbiResult<ServerConfig> {
    let mut config = ServerConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()
        .map_err(|e| SbiError::TlsError(format!("Failed to set protocol versions: {e}")))?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| SbiError::TlsError(format!("Failed to build server TLS config: {e}")))?;

    config.alpn_protocols = SERVER_ALPN.iter().map(|p| p.to_vec()).collect();

    Ok(config)
}

/// Load a PEM cert/key pair and build the server TLS config from it.
pub fn load_server_config(cert_path: &str, key_path: &str) -> SbiResult<ServerConfig> {
    let certs = load_certs(cert_path)?;
    let key = load_private_key(key_path)?;
    build_server_config(certs, key)
}

/// Build a client-side TLS config (server auth only, no client cert).
///
/// Without a CA path the webpki root set is trusted.
pub fn build_client_config(ca_path: Option<&str>) -> SbiResult<ClientConfig> {
    let mut root_store = RootCertStore::empty();

    if let Some(ca) = ca_path {
        for cert in load_certs(ca)? {
            root_store
                .add(cert)
                .map_err(|e| SbiError::TlsError(format!("Failed to add CA cert: {e}")))?;
        }
    } else {
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    }

    let mut config = ClientConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()
        .map_err(|e| SbiError::TlsError(format!("Failed to set protocol versions: {e}")))?
        .with_root_certificates(root_store)
        .with_no_client_auth();

    config.alpn_protocols = vec![b"h2".to_vec()];

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_certs_nonexistent_file() {
        let result = load_certs("/nonexistent/path.pem");
        assert!(matches!(result, Err(SbiError::TlsError(_))));
    }

    #[test]
    fn test_load_key_nonexistent_file() {
        let result = load_private_key("/nonexistent/path.pem");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_server_config_missing_files() {
        let result = load_server_config("/nonexistent/upf.pem", "/nonexistent/upf.key");
        assert!(matches!(result, Err(SbiError::TlsError(_))));
    }

    #[test]
    fn test_build_client_config_with_webpki_roots() {
        let cfg = build_client_config(None).unwrap();
        assert_eq!(cfg.alpn_protocols, vec![b"h2".to_vec()]);
    }
}
