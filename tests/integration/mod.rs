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

//! Integration test utilities and helpers
//!
//! This module provides the mock server standing in for both the identity
//! provider and the CA, plus helpers that wire an [`EnrollmentFlow`] to
//! in-memory host capabilities.

#![allow(dead_code)]

use mtls_enroll::artifacts::MemoryObjectUrls;
use mtls_enroll::navigation::MemoryNavigator;
use mtls_enroll::storage::MemoryStore;
use mtls_enroll::{EnrollConfig, EnrollConfigBuilder, EnrollmentFlow};
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Identity provider paths
pub const PATH_AUTHORIZE: &str = "/oidc/authorize";
pub const PATH_TOKEN: &str = "/oidc/token";

/// CA paths (defaults, relative to the page)
pub const PATH_SIGN: &str = "/api/sign";
pub const PATH_REVOKE: &str = "/api/certificates/revoke";
pub const PATH_HEALTH: &str = "/api/health";

/// Page path the flow runs on
pub const PATH_PAGE: &str = "/enroll";

pub const CLIENT_ID: &str = "enroll-web";

pub const TEST_CERT_PEM: &str = "-----BEGIN CERTIFICATE-----\nMIIBszCCAVmgAwIBAgIUTest\n-----END CERTIFICATE-----\n";
pub const TEST_CA_PEM: &str = "-----BEGIN CERTIFICATE-----\nMIIBRootCA\n-----END CERTIFICATE-----\n";

/// Mock server hosting the page origin, identity provider and CA
pub struct MockEnrollServer {
    server: MockServer,
}

impl MockEnrollServer {
    /// Create a new mock server
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        Self { server }
    }

    /// Get the base URL of the mock server
    pub fn url(&self) -> String {
        self.server.uri()
    }

    /// URL of the enrollment page
    pub fn page_url(&self) -> Url {
        Url::parse(&format!("{}{}", self.url(), PATH_PAGE)).unwrap()
    }

    /// Page URL as the identity provider redirects back to it
    pub fn callback_url(&self, query: &str) -> Url {
        Url::parse(&format!("{}{}?{}", self.url(), PATH_PAGE, query)).unwrap()
    }

    /// Get a reference to the inner MockServer for custom mocking
    pub fn inner(&self) -> &MockServer {
        &self.server
    }

    /// Configuration builder pointing at this server
    pub fn config_builder(&self) -> EnrollConfigBuilder {
        EnrollConfig::builder()
            .authorization_endpoint(format!("{}{}", self.url(), PATH_AUTHORIZE))
            .token_endpoint(format!("{}{}", self.url(), PATH_TOKEN))
            .client_id(CLIENT_ID)
    }

    /// Complete configuration pointing at this server
    pub fn config(&self) -> EnrollConfig {
        self.config_builder().build()
    }

    /// Mock a token endpoint response for the code exchange
    pub async fn mock_token_exchange(&self, status: u16, body: serde_json::Value) {
        Mock::given(method("POST"))
            .and(path(PATH_TOKEN))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Mock a token endpoint response for a direct fetch
    pub async fn mock_direct_token(&self, status: u16, body: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path(PATH_TOKEN))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Mock a successful CA response
    pub async fn mock_sign_success(&self, body: serde_json::Value) {
        Mock::given(method("POST"))
            .and(path(PATH_SIGN))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Mock a raw CA response
    pub async fn mock_sign_raw(&self, status: u16, body: &str) {
        Mock::given(method("POST"))
            .and(path(PATH_SIGN))
            .respond_with(
                ResponseTemplate::new(status)
                    .set_body_string(body)
                    .insert_header("Content-Type", "text/plain"),
            )
            .mount(&self.server)
            .await;
    }

    /// Requests received so far
    pub async fn requests(&self) -> Vec<wiremock::Request> {
        self.server.received_requests().await.unwrap_or_default()
    }

    /// Requests received so far on `request_path`
    pub async fn requests_to(&self, request_path: &str) -> Vec<wiremock::Request> {
        self.requests()
            .await
            .into_iter()
            .filter(|r| r.url.path() == request_path)
            .collect()
    }
}

/// In-memory host capabilities for one simulated browser tab
pub struct Host {
    pub store: MemoryStore,
    pub navigator: MemoryNavigator,
    pub urls: MemoryObjectUrls,
}

pub type TestFlow<'a> =
    EnrollmentFlow<&'a MemoryStore, &'a MemoryNavigator, &'a MemoryObjectUrls>;

impl Host {
    /// A fresh tab at `page`
    pub fn new(page: Url) -> Self {
        Self {
            store: MemoryStore::new(),
            navigator: MemoryNavigator::new(page),
            urls: MemoryObjectUrls::new(),
        }
    }

    /// Load the enrollment page with `config`
    pub fn flow(&self, config: EnrollConfig) -> TestFlow<'_> {
        EnrollmentFlow::new(config, &self.store, &self.navigator, &self.urls)
            .expect("flow construction failed")
    }
}

/// Query parameter value of a URL
pub fn query_param(url: &Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

/// Decode a form-encoded request body
pub fn form_fields(body: &[u8]) -> Vec<(String, String)> {
    url::form_urlencoded::parse(body).into_owned().collect()
}

/// Field of a form-encoded request body
pub fn form_field(body: &[u8], name: &str) -> Option<String> {
    form_fields(body)
        .into_iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v)
}
