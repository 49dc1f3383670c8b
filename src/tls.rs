//! HTTP client construction.
//!
//! Both the identity provider and the CA are reached over HTTPS with
//! rustls. Extra trust anchors are validated as X.509 before they are
//! handed to the client, so a bad bundle fails at startup rather than on
//! the first request.

use x509_cert::Certificate;
use x509_cert::der::Encode;

use crate::config::EnrollConfig;
use crate::error::{EnrollError, Result};

/// Build a reqwest Client for the enrollment flow.
///
/// The client keeps a cookie store so direct token fetches carry the
/// browser-equivalent session, identifies itself with
/// [`USER_AGENT`](crate::USER_AGENT), and refuses anything below TLS 1.2.
pub fn build_http_client(config: &EnrollConfig) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .use_rustls_tls()
        .min_tls_version(reqwest::tls::Version::TLS_1_2)
        .cookie_store(true)
        .user_agent(crate::USER_AGENT);

    if let Some(timeout) = config.timeout {
        builder = builder.timeout(timeout);
    }

    for pem in &config.additional_roots {
        for cert in parse_pem_certificates(pem)? {
            builder = builder.add_root_certificate(cert);
        }
    }

    builder
        .build()
        .map_err(|e| EnrollError::tls(format!("Failed to build HTTP client: {}", e)))
}

/// Parse a PEM bundle into reqwest trust anchors.
///
/// # Errors
///
/// Fails if the bundle holds no certificates or any block is not a valid
/// X.509 certificate.
pub fn parse_pem_certificates(pem_data: &[u8]) -> Result<Vec<reqwest::Certificate>> {
    // load_pem_chain underflows on empty input
    if pem_data.trim_ascii().is_empty() {
        return Err(EnrollError::tls("No certificates found in PEM data"));
    }

    let certs = Certificate::load_pem_chain(pem_data)
        .map_err(|e| EnrollError::tls(format!("Failed to parse CA certificate: {}", e)))?;

    if certs.is_empty() {
        return Err(EnrollError::tls("No certificates found in PEM data"));
    }

    certs
        .iter()
        .map(|cert| {
            let der = cert
                .to_der()
                .map_err(|e| EnrollError::tls(format!("Failed to encode CA certificate: {}", e)))?;
            reqwest::Certificate::from_der(&der)
                .map_err(|e| EnrollError::tls(format!("Failed to load CA certificate: {}", e)))
        })
        .collect()
}
