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

//! Wire types for the identity provider and CA endpoints.
//!
//! Both endpoints are probed permissively: a response is accepted if any
//! one of several known field names carries a non-empty string.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{EnrollError, Result};

/// Field names probed, in order, for the issued certificate.
pub const CERTIFICATE_FIELDS: &[&str] = &["certificate", "crt", "cert"];

/// Field names probed, in order, for a single CA certificate.
pub const CA_FIELDS: &[&str] = &["ca", "ca_certificate"];

/// Field probed for a CA chain given as an array of PEM strings.
pub const CA_CHAIN_FIELD: &str = "ca_chain";

/// Field names probed, in order, for the bearer token.
pub const TOKEN_FIELDS: &[&str] = &["id_token", "access_token", "token"];

/// Content types used on the wire.
pub mod content_types {
    /// JSON request/response bodies.
    pub const JSON: &str = "application/json";

    /// Form-encoded token requests.
    pub const FORM: &str = "application/x-www-form-urlencoded";

    /// Downloadable certificate and key files.
    pub const PEM_FILE: &str = "application/x-pem-file";
}

/// An identity token obtained from the provider.
///
/// The token is forwarded to the CA as-is; no structural (JWT) validation
/// is performed. `Debug` does not print the value.
#[derive(Clone, PartialEq, Eq)]
pub struct IdentityToken(String);

impl IdentityToken {
    /// Wrap a raw token string.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for IdentityToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "IdentityToken(<{} bytes>)", self.0.len())
    }
}

/// Certificate issued by the CA.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollmentResult {
    /// PEM certificate exactly as returned by the CA.
    pub certificate_pem: String,
    /// CA certificate or chain, if the CA returned one.
    pub ca_pem: Option<String>,
}

impl EnrollmentResult {
    /// Parse a successful CA response body.
    ///
    /// # Errors
    ///
    /// [`EnrollError::MalformedResponse`] if the body is not a JSON object
    /// or carries none of [`CERTIFICATE_FIELDS`].
    pub fn from_json(body: &str) -> Result<Self> {
        let object = parse_object(body)
            .ok_or_else(|| EnrollError::malformed("Invalid JSON returned from the CA", body))?;

        let certificate_pem = probe_string(&object, CERTIFICATE_FIELDS)
            .ok_or_else(|| EnrollError::malformed("No certificate present in response", body))?;

        let ca_pem = probe_string(&object, CA_FIELDS).or_else(|| probe_chain(&object));

        Ok(Self {
            certificate_pem,
            ca_pem,
        })
    }
}

/// Extract the bearer token from a token endpoint response body.
///
/// Returns `None` if the body is not a JSON object or carries none of
/// [`TOKEN_FIELDS`].
pub fn extract_token(body: &str) -> Option<IdentityToken> {
    parse_object(body)
        .and_then(|object| probe_string(&object, TOKEN_FIELDS))
        .map(IdentityToken)
}

/// Extract the provider's error message from a failed token response.
///
/// Prefers `error_description`, then `error`.
pub fn extract_oauth_error(body: &str) -> Option<String> {
    parse_object(body).and_then(|object| probe_string(&object, &["error_description", "error"]))
}

fn parse_object(body: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str(body) {
        Ok(Value::Object(object)) => Some(object),
        _ => None,
    }
}

fn probe_string(object: &Map<String, Value>, fields: &[&str]) -> Option<String> {
    fields.iter().find_map(|field| match object.get(*field) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        _ => None,
    })
}

fn probe_chain(object: &Map<String, Value>) -> Option<String> {
    let chain = object.get(CA_CHAIN_FIELD)?.as_array()?;
    let pems: Vec<&str> = chain.iter().filter_map(Value::as_str).collect();
    if pems.is_empty() {
        None
    } else {
        Some(pems.join("\n"))
    }
}

/// JSON body submitted to the CA sign endpoint.
#[derive(Debug, Serialize)]
pub struct SignRequest<'a> {
    /// PEM-encoded PKCS#10 request.
    pub csr: &'a str,
    /// One-time token authorizing the request.
    pub ott: &'a str,
    /// Requested validity (e.g. `2190h`).
    #[serde(rename = "notAfter", skip_serializing_if = "Option::is_none")]
    pub not_after: Option<&'a str>,
}

/// JSON body submitted to the revocation endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeRequest<'a> {
    /// Serial number of the certificate to revoke.
    pub serial_number: &'a str,
    /// Optional free-form reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'a str>,
}

/// Response from the revocation endpoint.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RevokeResponse {
    /// Status message.
    pub message: String,
    /// Diagnostic output from the CA tooling, if any.
    #[serde(default)]
    pub output: Option<String>,
}

/// Response from the health endpoint.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct HealthResponse {
    /// Whether the CA is reachable and healthy.
    pub healthy: bool,
}
