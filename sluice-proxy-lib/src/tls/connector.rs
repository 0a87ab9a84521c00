use std::sync::Arc;

use tokio_rustls::rustls::crypto::aws_lc_rs;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;

use crate::error::{ProxyError, Result};
use crate::tls::verifier::AcceptAnyServerCert;

/// Builds the client-side TLS connector used toward an HTTPS upstream.
///
/// With `insecure` set, any certificate is accepted; otherwise the chain is
/// validated against the Mozilla root set shipped in `webpki-roots`.
pub fn build_tls_connector(insecure: bool) -> Result<TlsConnector> {
    let provider = Arc::new(aws_lc_rs::default_provider());

    let builder = ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()
        .map_err(|e| ProxyError::Tls(format!("Failed to select TLS protocol versions: {e}")))?;

    let mut config = if insecure {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert::new(provider)))
            .with_no_client_auth()
    } else {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        builder.with_root_certificates(roots).with_no_client_auth()
    };

    // The pooled client speaks HTTP/1.1 to the upstream
    config.alpn_protocols = vec![b"http/1.1".to_vec()];

    Ok(TlsConnector::from(Arc::new(config)))
}
