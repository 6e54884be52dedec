//! TLS configuration with a pinned CA bundle.
//!
//! Builds a [`rustls::ClientConfig`] that trusts only the certificate
//! authorities in a PEM bundle, used when the payout provider's chain is
//! pinned via `PAYVINE_CA_BUNDLE`.

use std::path::Path;

use rustls::ClientConfig;

use crate::Result;

/// Builds a [`ClientConfig`] whose root store contains only the CAs found in
/// the PEM file at `path`.
///
/// # Errors
///
/// Returns [`PayvineError::Tls`](crate::PayvineError::Tls) if the file cannot
/// be read, cannot be parsed, or contains no usable certificate.
pub fn build_tls_config(path: &Path) -> Result<ClientConfig> {
    let pem = std::fs::read(path).map_err(|e| {
        crate::PayvineError::Tls(format!("failed to read CA bundle {}: {e}", path.display()))
    })?;
    build_tls_config_from_pem(&pem)
}

/// Same as [`build_tls_config`] for an in-memory PEM bundle.
pub fn build_tls_config_from_pem(pem: &[u8]) -> Result<ClientConfig> {
    let mut root_store = rustls::RootCertStore::empty();

    let certs: Vec<_> = rustls_pemfile::certs(&mut &pem[..])
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| crate::PayvineError::Tls(format!("failed to parse CA PEM: {e}")))?;

    let (added, _ignored) = root_store.add_parsable_certificates(certs);
    if added == 0 {
        return Err(crate::PayvineError::Tls(
            "CA bundle contains no usable certificate".to_string(),
        ));
    }

    let config = ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    Ok(config)
}
