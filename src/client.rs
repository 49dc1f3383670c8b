//! CA client implementation.
//!
//! This module provides [`CaClient`] for the three requests the enrollment
//! page makes against the certificate authority (or its pass-through
//! relay): signing a CSR, revoking a certificate, and checking health.
//! Relative endpoints are resolved against the page's current location.

use std::sync::Arc;

use reqwest::header::{ACCEPT, AUTHORIZATION};
use url::Url;

use crate::config::EnrollConfig;
use crate::error::{EnrollError, Result};
use crate::tls::build_http_client;
use crate::types::{
    EnrollmentResult, HealthResponse, IdentityToken, RevokeRequest, RevokeResponse, SignRequest,
    content_types,
};

/// Client for the CA sign, revoke and health endpoints.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use mtls_enroll::{CaClient, EnrollConfig, IdentityToken, KeyMaterial};
/// use url::Url;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Arc::new(EnrollConfig::builder().ca_profile("mtls").build());
/// let client = CaClient::new(config)?;
///
/// let page = Url::parse("https://enroll.example.com/")?;
/// let key = KeyMaterial::generate("CN=client")?;
/// let issued = client
///     .sign(&page, key.csr_pem(), &IdentityToken::new("eyJ..."))
///     .await?;
/// println!("{}", issued.certificate_pem);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct CaClient {
    config: Arc<EnrollConfig>,
    http: reqwest::Client,
}

impl CaClient {
    /// Create a new CA client with its own HTTP client.
    ///
    /// # Errors
    ///
    /// Returns an error if TLS configuration fails.
    pub fn new(config: Arc<EnrollConfig>) -> Result<Self> {
        let http = build_http_client(&config)?;
        Ok(Self { config, http })
    }

    /// Create a CA client sharing an existing HTTP client.
    pub fn with_http(config: Arc<EnrollConfig>, http: reqwest::Client) -> Self {
        Self { config, http }
    }

    /// Get the client configuration.
    pub fn config(&self) -> &EnrollConfig {
        &self.config
    }

    /// Submit a CSR for signing.
    ///
    /// The token is sent as the `ott` body field and, unless disabled, as
    /// an `Authorization: Bearer` header.
    ///
    /// # Errors
    ///
    /// - [`EnrollError::Enrollment`] with the raw body on a non-2xx status
    /// - [`EnrollError::MalformedResponse`] if the body is not JSON or has
    ///   no certificate
    pub async fn sign(
        &self,
        base: &Url,
        csr_pem: &str,
        token: &IdentityToken,
    ) -> Result<EnrollmentResult> {
        let url = self.config.sign_url(base)?;
        tracing::debug!("POST {}", url);

        let body = SignRequest {
            csr: csr_pem,
            ott: token.as_str(),
            not_after: self.config.not_after.as_deref(),
        };

        let mut request = self
            .http
            .post(url)
            .header(ACCEPT, content_types::JSON)
            .json(&body);

        if self.config.bearer_header {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token.as_str()));
        }

        let response = request.send().await?;
        let status = response.status();
        let raw = response.text().await?;

        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "CA rejected the signing request");
            return Err(EnrollError::enrollment(status.as_u16(), raw));
        }

        EnrollmentResult::from_json(&raw)
    }

    /// Ask the CA to revoke a certificate by serial number.
    pub async fn revoke(
        &self,
        base: &Url,
        serial_number: &str,
        reason: Option<&str>,
    ) -> Result<RevokeResponse> {
        let url = self.config.revocation_url(base)?;
        tracing::debug!("POST {}", url);

        let response = self
            .http
            .post(url)
            .header(ACCEPT, content_types::JSON)
            .json(&RevokeRequest {
                serial_number,
                reason,
            })
            .send()
            .await?;

        let response = handle_error_response(response, "Failed to revoke certificate").await?;
        let raw = response.text().await?;

        serde_json::from_str(&raw)
            .map_err(|_| EnrollError::malformed("Invalid JSON returned from the CA", raw))
    }

    /// Check whether the CA is reachable and healthy.
    pub async fn health(&self, base: &Url) -> Result<HealthResponse> {
        let url = self.config.health_url(base)?;
        tracing::debug!("GET {}", url);

        let response = self
            .http
            .get(url)
            .header(ACCEPT, content_types::JSON)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(EnrollError::api(
                Some(status.as_u16()),
                "Unable to reach CA health endpoint",
            ));
        }

        let raw = response.text().await?;
        serde_json::from_str(&raw)
            .map_err(|_| EnrollError::malformed("Invalid JSON returned from the CA", raw))
    }
}

/// Turn a non-2xx response into an error carrying the service's `message`
/// field, or `fallback` when there is none.
async fn handle_error_response(
    response: reqwest::Response,
    fallback: &str,
) -> Result<reqwest::Response> {
    let status = response.status();

    if status.is_success() {
        return Ok(response);
    }

    let message = response
        .json::<serde_json::Value>()
        .await
        .ok()
        .and_then(|body| body.get("message").and_then(|m| m.as_str()).map(String::from))
        .unwrap_or_else(|| fallback.to_string());

    Err(EnrollError::api(Some(status.as_u16()), message))
}
