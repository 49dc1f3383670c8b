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

//! Tests for starting an enrollment attempt

use crate::integration::{CLIENT_ID, Host, MockEnrollServer, PATH_AUTHORIZE, query_param};
use mtls_enroll::pkce::{SESSION_KEY, compute_code_challenge};
use mtls_enroll::storage::SessionStore;
use mtls_enroll::{EnrollConfig, EnrollmentState, ErrorKind};

#[tokio::test]
async fn test_start_persists_session_and_redirects() {
    let mock = MockEnrollServer::start().await;
    let host = Host::new(mock.page_url());
    let flow = host.flow(mock.config());

    let state = flow.start_enrollment().await;
    assert_eq!(state, EnrollmentState::AwaitingLogin);
    assert_eq!(flow.status(), "Redirecting to sign-in...");

    // Exactly one record, holding verifier, state and the enroll intent
    let raw = host.store.get(SESSION_KEY).unwrap().expect("session persisted");
    let record: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(record["enroll_requested"], true);
    let verifier = record["verifier"].as_str().unwrap();
    let stored_state = record["state"].as_str().unwrap();
    assert_eq!(host.store.len(), 1);

    let assigned = host.navigator.assigned();
    assert_eq!(assigned.len(), 1);
    let target = &assigned[0];
    assert_eq!(target.path(), PATH_AUTHORIZE);

    assert_eq!(query_param(target, "response_type").as_deref(), Some("code"));
    assert_eq!(query_param(target, "client_id").as_deref(), Some(CLIENT_ID));
    assert_eq!(
        query_param(target, "scope").as_deref(),
        Some("openid email profile")
    );
    assert_eq!(
        query_param(target, "redirect_uri").as_deref(),
        Some(mock.page_url().as_str())
    );
    assert_eq!(
        query_param(target, "code_challenge_method").as_deref(),
        Some("S256")
    );
    assert_eq!(
        query_param(target, "code_challenge"),
        Some(compute_code_challenge(verifier))
    );
    assert_eq!(query_param(target, "state").as_deref(), Some(stored_state));

    // The verifier never leaves the tab
    assert!(!target.as_str().contains(verifier));

    // Nothing was sent over the network
    assert!(mock.requests().await.is_empty());
}

#[tokio::test]
async fn test_start_generates_fresh_correlation_each_time() {
    let mock = MockEnrollServer::start().await;
    let host = Host::new(mock.page_url());
    let flow = host.flow(mock.config());

    flow.start_enrollment().await;
    let first = host.store.get(SESSION_KEY).unwrap().unwrap();
    flow.start_enrollment().await;
    let second = host.store.get(SESSION_KEY).unwrap().unwrap();

    assert_ne!(first, second);
    assert_eq!(host.store.len(), 1);
    assert_eq!(host.navigator.assigned().len(), 2);
}

#[tokio::test]
async fn test_redirect_uri_drops_query_and_fragment() {
    let mock = MockEnrollServer::start().await;
    let mut page = mock.page_url();
    page.set_query(Some("tab=certs"));
    page.set_fragment(Some("top"));
    let host = Host::new(page);
    let flow = host.flow(mock.config());

    flow.start_enrollment().await;

    let target = host.navigator.last_assigned().unwrap();
    assert_eq!(
        query_param(&target, "redirect_uri").as_deref(),
        Some(mock.page_url().as_str())
    );
}

#[tokio::test]
async fn test_start_with_missing_configuration() {
    let mock = MockEnrollServer::start().await;
    let host = Host::new(mock.page_url());
    let config = EnrollConfig::builder()
        .authorization_endpoint(format!("{}/authorize", mock.url()))
        .build();
    let flow = host.flow(config);

    assert!(!flow.can_start());

    let state = flow.start_enrollment().await;
    assert_eq!(state, EnrollmentState::Failed(ErrorKind::Configuration));
    assert_eq!(
        flow.status(),
        "Missing configuration: OIDC token endpoint, OIDC client ID"
    );
    assert!(host.store.is_empty());
    assert!(host.navigator.assigned().is_empty());
    assert!(mock.requests().await.is_empty());
}

#[tokio::test]
async fn test_placeholder_values_count_as_missing() {
    let json = r#"{
        "oidc": {
            "authorizationEndpoint": "${OIDC_AUTHORIZATION_ENDPOINT}",
            "tokenEndpoint": "https://idp.example.com/token",
            "clientId": "  "
        }
    }"#;
    let config = EnrollConfig::from_json(json).unwrap();
    let mock = MockEnrollServer::start().await;
    let host = Host::new(mock.page_url());
    let flow = host.flow(config);

    assert_eq!(
        flow.start_enrollment().await,
        EnrollmentState::Failed(ErrorKind::Configuration)
    );
    assert_eq!(
        flow.status(),
        "Missing configuration: OIDC authorization endpoint, OIDC client ID"
    );
}
