// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 U.S. Federal Government (in countries where recognized)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Configuration types for the enrollment flow.
//!
//! [`EnrollConfig`] is read once at startup and is immutable afterwards.
//! It can be assembled with [`EnrollConfig::builder`], or derived from the
//! page-injected configuration object via [`RawConfig`] and
//! [`EnrollConfig::from_raw`].
//!
//! An incomplete configuration is not an error at construction time: the
//! flow reports the missing settings when the user tries to start.

mod expand;
mod loader;

pub use expand::{expand_variables, expand_with};
pub use loader::ConfigLoader;

use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::error::{EnrollError, Result};

/// Default OIDC scope.
pub const DEFAULT_SCOPE: &str = "openid email profile";

/// Default certificate subject.
pub const DEFAULT_SUBJECT: &str = "CN=client";

/// Default certificate download filename.
pub const DEFAULT_CERTIFICATE_FILENAME: &str = "client.crt";

/// Default private key download filename.
pub const DEFAULT_PRIVATE_KEY_FILENAME: &str = "client.key";

/// Default CA sign endpoint, relative to the page location.
pub const DEFAULT_ENROLLMENT_ENDPOINT: &str = "/api/sign";

/// Default revocation endpoint, relative to the page location.
pub const DEFAULT_REVOCATION_ENDPOINT: &str = "/api/certificates/revoke";

/// Default health endpoint, relative to the page location.
pub const DEFAULT_HEALTH_ENDPOINT: &str = "/api/health";

/// Names reported for missing required settings.
pub mod setting_names {
    /// Identity provider authorization endpoint.
    pub const AUTHORIZATION_ENDPOINT: &str = "OIDC authorization endpoint";
    /// Identity provider token endpoint.
    pub const TOKEN_ENDPOINT: &str = "OIDC token endpoint";
    /// OIDC client identifier.
    pub const CLIENT_ID: &str = "OIDC client ID";
}

/// How the identity token is obtained.
#[derive(Clone, PartialEq, Eq, Default)]
pub enum TokenStrategy {
    /// Redirect to the identity provider and exchange the returned code
    /// (Authorization Code with PKCE).
    #[default]
    AuthorizationCode,

    /// Fetch a token directly from the token endpoint using the browser's
    /// existing session, or use a configured static token.
    DirectFetch {
        /// Token used instead of contacting the token endpoint.
        static_token: Option<String>,
    },
}

impl std::fmt::Debug for TokenStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AuthorizationCode => write!(f, "AuthorizationCode"),
            Self::DirectFetch { static_token } => f
                .debug_struct("DirectFetch")
                .field("static_token", &static_token.is_some())
                .finish(),
        }
    }
}

/// OIDC client settings.
#[derive(Clone, Default)]
pub struct OidcConfig {
    /// Authorization endpoint URL.
    pub authorization_endpoint: String,
    /// Token endpoint URL.
    pub token_endpoint: String,
    /// Client identifier.
    pub client_id: String,
    /// Client secret, for providers that require confidential clients.
    pub client_secret: Option<String>,
    /// Space-separated scopes.
    pub scope: String,
}

impl std::fmt::Debug for OidcConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OidcConfig")
            .field("authorization_endpoint", &self.authorization_endpoint)
            .field("token_endpoint", &self.token_endpoint)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.is_some())
            .field("scope", &self.scope)
            .finish()
    }
}

/// Certificate request and download settings.
#[derive(Debug, Clone)]
pub struct CertificateConfig {
    /// Subject distinguished name (RFC 4514), or a bare common name.
    pub subject: String,
    /// Download filename for the certificate.
    pub certificate_filename: String,
    /// Download filename for the private key.
    pub private_key_filename: String,
}

impl Default for CertificateConfig {
    fn default() -> Self {
        Self {
            subject: DEFAULT_SUBJECT.to_string(),
            certificate_filename: DEFAULT_CERTIFICATE_FILENAME.to_string(),
            private_key_filename: DEFAULT_PRIVATE_KEY_FILENAME.to_string(),
        }
    }
}

/// Configuration for the enrollment flow.
#[derive(Debug, Clone)]
pub struct EnrollConfig {
    /// OIDC client settings.
    pub oidc: OidcConfig,

    /// Certificate settings.
    pub certificate: CertificateConfig,

    /// Token acquisition strategy.
    pub token_strategy: TokenStrategy,

    /// CA sign endpoint; absolute, or relative to the current location.
    pub enrollment_endpoint: String,

    /// CA provisioner profile, sent as the `profile` query parameter.
    pub ca_profile: Option<String>,

    /// Requested certificate lifetime (e.g. `2190h`), sent as `notAfter`.
    pub not_after: Option<String>,

    /// Send the token as an `Authorization: Bearer` header in addition to
    /// the `ott` body field.
    pub bearer_header: bool,

    /// Revocation endpoint; absolute, or relative to the current location.
    pub revocation_endpoint: String,

    /// Health endpoint; absolute, or relative to the current location.
    pub health_endpoint: String,

    /// Transport timeout. `None` leaves requests unbounded.
    pub timeout: Option<Duration>,

    /// Additional PEM trust anchors for the HTTP client.
    pub additional_roots: Vec<Vec<u8>>,
}

impl Default for EnrollConfig {
    fn default() -> Self {
        Self {
            oidc: OidcConfig {
                scope: DEFAULT_SCOPE.to_string(),
                ..Default::default()
            },
            certificate: CertificateConfig::default(),
            token_strategy: TokenStrategy::default(),
            enrollment_endpoint: DEFAULT_ENROLLMENT_ENDPOINT.to_string(),
            ca_profile: None,
            not_after: None,
            bearer_header: true,
            revocation_endpoint: DEFAULT_REVOCATION_ENDPOINT.to_string(),
            health_endpoint: DEFAULT_HEALTH_ENDPOINT.to_string(),
            timeout: None,
            additional_roots: Vec::new(),
        }
    }
}

impl EnrollConfig {
    /// Create a new configuration builder.
    pub fn builder() -> EnrollConfigBuilder {
        EnrollConfigBuilder::new()
    }

    /// Build a configuration from the page-injected raw form.
    ///
    /// Values are trimmed; empty values and unexpanded `${...}`
    /// placeholders are treated as unset and fall back to defaults.
    pub fn from_raw(raw: RawConfig) -> Self {
        let defaults = Self::default();
        let oidc = raw.oidc.unwrap_or_default();
        let certificate = raw.certificate.unwrap_or_default();

        let static_token = clean(raw.static_token);
        let token_strategy = match clean(raw.token_source).as_deref() {
            Some("direct") | Some("direct_fetch") | Some("directFetch") => {
                TokenStrategy::DirectFetch { static_token }
            }
            _ if static_token.is_some() => TokenStrategy::DirectFetch { static_token },
            _ => TokenStrategy::AuthorizationCode,
        };

        Self {
            oidc: OidcConfig {
                authorization_endpoint: clean(oidc.authorization_endpoint).unwrap_or_default(),
                token_endpoint: clean(oidc.token_endpoint).unwrap_or_default(),
                client_id: clean(oidc.client_id).unwrap_or_default(),
                client_secret: clean(oidc.client_secret),
                scope: clean(oidc.scope).unwrap_or(defaults.oidc.scope),
            },
            certificate: CertificateConfig {
                subject: clean(certificate.subject).unwrap_or(defaults.certificate.subject),
                certificate_filename: clean(certificate.certificate_filename)
                    .unwrap_or(defaults.certificate.certificate_filename),
                private_key_filename: clean(certificate.private_key_filename)
                    .unwrap_or(defaults.certificate.private_key_filename),
            },
            token_strategy,
            enrollment_endpoint: clean(raw.enrollment_endpoint)
                .unwrap_or(defaults.enrollment_endpoint),
            ca_profile: clean(raw.step_ca_profile),
            not_after: clean(raw.not_after),
            bearer_header: raw.bearer_header.unwrap_or(defaults.bearer_header),
            revocation_endpoint: clean(raw.revocation_endpoint)
                .unwrap_or(defaults.revocation_endpoint),
            health_endpoint: clean(raw.health_endpoint).unwrap_or(defaults.health_endpoint),
            timeout: raw.timeout_secs.filter(|s| *s > 0).map(Duration::from_secs),
            additional_roots: Vec::new(),
        }
    }

    /// Parse the page-injected configuration object from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawConfig = serde_json::from_str(json)?;
        Ok(Self::from_raw(raw))
    }

    /// Names of required settings that are missing, in display order.
    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();

        match &self.token_strategy {
            TokenStrategy::AuthorizationCode => {
                if self.oidc.authorization_endpoint.trim().is_empty() {
                    missing.push(setting_names::AUTHORIZATION_ENDPOINT);
                }
                if self.oidc.token_endpoint.trim().is_empty() {
                    missing.push(setting_names::TOKEN_ENDPOINT);
                }
                if self.oidc.client_id.trim().is_empty() {
                    missing.push(setting_names::CLIENT_ID);
                }
            }
            TokenStrategy::DirectFetch { static_token } => {
                if static_token.is_none() && self.oidc.token_endpoint.trim().is_empty() {
                    missing.push(setting_names::TOKEN_ENDPOINT);
                }
            }
        }

        missing
    }

    /// Check that every required setting is present.
    ///
    /// # Errors
    ///
    /// [`EnrollError::Configuration`] listing the missing settings.
    pub fn validate(&self) -> Result<()> {
        let missing = self.missing();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(EnrollError::configuration(missing))
        }
    }

    /// Resolve the CA sign URL against the current location, including the
    /// optional `profile` query parameter.
    pub fn sign_url(&self, base: &Url) -> Result<Url> {
        let mut url = base.join(&self.enrollment_endpoint)?;
        if let Some(ref profile) = self.ca_profile {
            url.query_pairs_mut().append_pair("profile", profile);
        }
        Ok(url)
    }

    /// Resolve the revocation URL against the current location.
    pub fn revocation_url(&self, base: &Url) -> Result<Url> {
        Ok(base.join(&self.revocation_endpoint)?)
    }

    /// Resolve the health URL against the current location.
    pub fn health_url(&self, base: &Url) -> Result<Url> {
        Ok(base.join(&self.health_endpoint)?)
    }
}

fn clean(value: Option<String>) -> Option<String> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() || is_placeholder(value) {
        None
    } else {
        Some(value.to_string())
    }
}

fn is_placeholder(value: &str) -> bool {
    value.starts_with("${") && value.ends_with('}') && !value[2..].contains("${")
}

/// Builder for [`EnrollConfig`].
#[derive(Debug, Default)]
pub struct EnrollConfigBuilder {
    config: EnrollConfig,
}

impl EnrollConfigBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the identity provider authorization endpoint.
    pub fn authorization_endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.oidc.authorization_endpoint = url.into();
        self
    }

    /// Set the identity provider token endpoint.
    pub fn token_endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.oidc.token_endpoint = url.into();
        self
    }

    /// Set the OIDC client identifier.
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.config.oidc.client_id = client_id.into();
        self
    }

    /// Set a client secret for confidential-client token exchange.
    pub fn client_secret(mut self, secret: impl Into<String>) -> Self {
        self.config.oidc.client_secret = Some(secret.into());
        self
    }

    /// Set the OIDC scope string.
    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.config.oidc.scope = scope.into();
        self
    }

    /// Set the certificate subject.
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.config.certificate.subject = subject.into();
        self
    }

    /// Set the certificate download filename.
    pub fn certificate_filename(mut self, name: impl Into<String>) -> Self {
        self.config.certificate.certificate_filename = name.into();
        self
    }

    /// Set the private key download filename.
    pub fn private_key_filename(mut self, name: impl Into<String>) -> Self {
        self.config.certificate.private_key_filename = name.into();
        self
    }

    /// Set the CA sign endpoint.
    pub fn enrollment_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.enrollment_endpoint = endpoint.into();
        self
    }

    /// Set the CA provisioner profile.
    pub fn ca_profile(mut self, profile: impl Into<String>) -> Self {
        self.config.ca_profile = Some(profile.into());
        self
    }

    /// Request a certificate lifetime from the CA.
    pub fn not_after(mut self, not_after: impl Into<String>) -> Self {
        self.config.not_after = Some(not_after.into());
        self
    }

    /// Enable or disable the `Authorization: Bearer` header on CA requests.
    pub fn bearer_header(mut self, enabled: bool) -> Self {
        self.config.bearer_header = enabled;
        self
    }

    /// Obtain tokens by fetching them directly from the token endpoint.
    pub fn direct_token_fetch(mut self) -> Self {
        self.config.token_strategy = TokenStrategy::DirectFetch { static_token: None };
        self
    }

    /// Use a fixed token instead of contacting the identity provider.
    pub fn static_token(mut self, token: impl Into<String>) -> Self {
        self.config.token_strategy = TokenStrategy::DirectFetch {
            static_token: Some(token.into()),
        };
        self
    }

    /// Set the revocation endpoint.
    pub fn revocation_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.revocation_endpoint = endpoint.into();
        self
    }

    /// Set the health endpoint.
    pub fn health_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.health_endpoint = endpoint.into();
        self
    }

    /// Set a transport timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    /// Trust an additional PEM-encoded root certificate.
    pub fn add_root_certificate(mut self, pem: impl Into<Vec<u8>>) -> Self {
        self.config.additional_roots.push(pem.into());
        self
    }

    /// Build the configuration.
    ///
    /// Missing required settings are reported by [`EnrollConfig::missing`],
    /// not here.
    pub fn build(self) -> EnrollConfig {
        self.config
    }
}

/// Page-injected configuration object, as deserialized from JSON or TOML.
///
/// Field names follow the injected `window.__CONFIG__` shape (camelCase).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawConfig {
    /// OIDC settings.
    pub oidc: Option<RawOidcConfig>,
    /// Certificate settings.
    pub certificate: Option<RawCertificateConfig>,
    /// CA sign endpoint.
    pub enrollment_endpoint: Option<String>,
    /// CA provisioner profile.
    #[serde(alias = "caProfile")]
    pub step_ca_profile: Option<String>,
    /// Requested certificate lifetime.
    pub not_after: Option<String>,
    /// Whether to send the bearer header.
    pub bearer_header: Option<bool>,
    /// `authorization_code` (default) or `direct`.
    pub token_source: Option<String>,
    /// Fixed token; implies direct fetch.
    pub static_token: Option<String>,
    /// Revocation endpoint.
    pub revocation_endpoint: Option<String>,
    /// Health endpoint.
    pub health_endpoint: Option<String>,
    /// Transport timeout in seconds.
    pub timeout_secs: Option<u64>,
}

/// Raw OIDC settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawOidcConfig {
    /// Authorization endpoint.
    pub authorization_endpoint: Option<String>,
    /// Token endpoint.
    pub token_endpoint: Option<String>,
    /// Client identifier.
    pub client_id: Option<String>,
    /// Client secret.
    pub client_secret: Option<String>,
    /// Scope.
    pub scope: Option<String>,
}

/// Raw certificate settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawCertificateConfig {
    /// Subject.
    pub subject: Option<String>,
    /// Certificate filename.
    pub certificate_filename: Option<String>,
    /// Private key filename.
    pub private_key_filename: Option<String>,
}

impl RawConfig {
    /// Expand `${VAR}` references in every string value.
    pub fn expand_variables(&mut self) {
        self.expand_variables_with(|name| std::env::var(name).ok());
    }

    /// Expand `${VAR}` references using a custom lookup.
    pub fn expand_variables_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let expand = |value: &mut Option<String>| {
            if let Some(v) = value.as_mut() {
                *v = expand_with(v, &lookup);
            }
        };

        if let Some(oidc) = self.oidc.as_mut() {
            expand(&mut oidc.authorization_endpoint);
            expand(&mut oidc.token_endpoint);
            expand(&mut oidc.client_id);
            expand(&mut oidc.client_secret);
            expand(&mut oidc.scope);
        }
        if let Some(certificate) = self.certificate.as_mut() {
            expand(&mut certificate.subject);
            expand(&mut certificate.certificate_filename);
            expand(&mut certificate.private_key_filename);
        }
        expand(&mut self.enrollment_endpoint);
        expand(&mut self.step_ca_profile);
        expand(&mut self.not_after);
        expand(&mut self.token_source);
        expand(&mut self.static_token);
        expand(&mut self.revocation_endpoint);
        expand(&mut self.health_endpoint);
    }
}
