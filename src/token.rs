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

//! Identity token acquisition.
//!
//! [`OidcClient`] covers both [`TokenStrategy`] variants: building the
//! authorization redirect and exchanging the returned code, or fetching a
//! token directly from the token endpoint.

use std::sync::Arc;

use reqwest::header::ACCEPT;
use url::Url;

use crate::config::{EnrollConfig, TokenStrategy};
use crate::error::{EnrollError, Result};
use crate::pkce::{CHALLENGE_METHOD, StartedSession};
use crate::tls::build_http_client;
use crate::types::{IdentityToken, content_types, extract_oauth_error, extract_token};

/// Message used when a successful token response carries no usable token.
pub const NO_TOKEN_MESSAGE: &str = "No token found in response";

/// Client for the identity provider.
#[derive(Debug, Clone)]
pub struct OidcClient {
    config: Arc<EnrollConfig>,
    http: reqwest::Client,
}

impl OidcClient {
    /// Create a new OIDC client with its own HTTP client.
    pub fn new(config: Arc<EnrollConfig>) -> Result<Self> {
        let http = build_http_client(&config)?;
        Ok(Self { config, http })
    }

    /// Create an OIDC client sharing an existing HTTP client.
    pub fn with_http(config: Arc<EnrollConfig>, http: reqwest::Client) -> Self {
        Self { config, http }
    }

    /// Build the authorization request URL for a started PKCE session.
    ///
    /// The verifier is never placed in the URL.
    pub fn authorization_url(&self, session: &StartedSession, redirect_uri: &Url) -> Result<Url> {
        let mut url = Url::parse(&self.config.oidc.authorization_endpoint)?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.oidc.client_id)
            .append_pair("scope", &self.config.oidc.scope)
            .append_pair("redirect_uri", redirect_uri.as_str())
            .append_pair("code_challenge", &session.challenge)
            .append_pair("code_challenge_method", CHALLENGE_METHOD)
            .append_pair("state", &session.state);
        Ok(url)
    }

    /// Exchange an authorization code for a token.
    ///
    /// # Errors
    ///
    /// [`EnrollError::TokenExchange`] with the provider's
    /// `error_description` or `error`, falling back to
    /// `Token request failed (<status>)`; or [`NO_TOKEN_MESSAGE`] when a
    /// successful response carries none of the token fields.
    /// [`EnrollError::MalformedResponse`] when a successful response is not
    /// JSON.
    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &Url,
        verifier: &str,
    ) -> Result<IdentityToken> {
        let oidc = &self.config.oidc;
        tracing::debug!("POST {}", oidc.token_endpoint);

        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri.as_str()),
            ("client_id", oidc.client_id.as_str()),
            ("code_verifier", verifier),
        ];
        if let Some(ref secret) = oidc.client_secret {
            form.push(("client_secret", secret.as_str()));
        }

        let response = self
            .http
            .post(&oidc.token_endpoint)
            .header(ACCEPT, content_types::JSON)
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        let raw = response.text().await?;

        if !status.is_success() {
            let message = extract_oauth_error(&raw)
                .unwrap_or_else(|| format!("Token request failed ({})", status.as_u16()));
            tracing::warn!(status = status.as_u16(), "Token exchange rejected");
            return Err(EnrollError::token_exchange(Some(status.as_u16()), message));
        }

        token_from_body(status.as_u16(), raw)
    }

    /// Obtain a token without a redirect.
    ///
    /// A configured static token is returned as-is. Otherwise the token
    /// endpoint is fetched with `GET`, relying on the session cookies the
    /// HTTP client carries.
    pub async fn fetch_direct(&self) -> Result<IdentityToken> {
        if let TokenStrategy::DirectFetch {
            static_token: Some(ref token),
        } = self.config.token_strategy
        {
            tracing::debug!("Using configured static token");
            return Ok(IdentityToken::new(token.clone()));
        }

        let endpoint = &self.config.oidc.token_endpoint;
        if endpoint.trim().is_empty() {
            return Err(EnrollError::configuration([
                crate::config::setting_names::TOKEN_ENDPOINT,
            ]));
        }
        tracing::debug!("GET {}", endpoint);

        let response = self
            .http
            .get(endpoint)
            .header(ACCEPT, content_types::JSON)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(EnrollError::token_exchange(
                Some(status.as_u16()),
                format!("Failed to obtain ID token ({})", status.as_u16()),
            ));
        }

        let raw = response.text().await?;
        token_from_body(status.as_u16(), raw)
    }
}

/// Pull the token out of a successful response body.
///
/// A body that is not JSON at all is a malformed response; valid JSON
/// without any token field is a failed token request.
fn token_from_body(status: u16, raw: String) -> Result<IdentityToken> {
    if serde_json::from_str::<serde_json::Value>(&raw).is_err() {
        tracing::warn!(status, "Token endpoint returned a non-JSON body");
        return Err(EnrollError::malformed(NO_TOKEN_MESSAGE, raw));
    }
    extract_token(&raw).ok_or_else(|| EnrollError::token_exchange(Some(status), NO_TOKEN_MESSAGE))
}
