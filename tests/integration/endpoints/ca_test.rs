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

//! Integration tests for the revocation and health calls

use std::sync::Arc;

use crate::integration::{MockEnrollServer, PATH_HEALTH, PATH_REVOKE};
use mtls_enroll::{CaClient, EnrollError};
use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, ResponseTemplate};

fn client(mock: &MockEnrollServer) -> CaClient {
    CaClient::new(Arc::new(mock.config())).expect("client")
}

#[tokio::test]
async fn test_revoke_success() {
    let mock = MockEnrollServer::start().await;
    Mock::given(method("POST"))
        .and(path(PATH_REVOKE))
        .and(body_json(json!({ "serialNumber": "1234", "reason": "keyCompromise" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": "Certificate revoked",
            "output": "ok"
        })))
        .expect(1)
        .mount(mock.inner())
        .await;

    let response = client(&mock)
        .revoke(&mock.page_url(), "1234", Some("keyCompromise"))
        .await
        .expect("revoke failed");

    assert_eq!(response.message, "Certificate revoked");
    assert_eq!(response.output.as_deref(), Some("ok"));
}

#[tokio::test]
async fn test_revoke_reports_service_message() {
    let mock = MockEnrollServer::start().await;
    Mock::given(method("POST"))
        .and(path(PATH_REVOKE))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({ "message": "Unknown serial" })),
        )
        .mount(mock.inner())
        .await;

    let err = client(&mock)
        .revoke(&mock.page_url(), "9", None)
        .await
        .unwrap_err();

    assert!(matches!(err, EnrollError::Api { status: Some(404), .. }));
    assert_eq!(err.to_string(), "Unknown serial");
}

#[tokio::test]
async fn test_revoke_fallback_message() {
    let mock = MockEnrollServer::start().await;
    Mock::given(method("POST"))
        .and(path(PATH_REVOKE))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(mock.inner())
        .await;

    let err = client(&mock)
        .revoke(&mock.page_url(), "9", None)
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "Failed to revoke certificate");
}

#[tokio::test]
async fn test_health() {
    let mock = MockEnrollServer::start().await;
    Mock::given(method("GET"))
        .and(path(PATH_HEALTH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "healthy": true })))
        .mount(mock.inner())
        .await;

    let health = client(&mock).health(&mock.page_url()).await.unwrap();
    assert!(health.healthy);
}

#[tokio::test]
async fn test_health_unreachable() {
    let mock = MockEnrollServer::start().await;
    Mock::given(method("GET"))
        .and(path(PATH_HEALTH))
        .respond_with(ResponseTemplate::new(503))
        .mount(mock.inner())
        .await;

    let err = client(&mock).health(&mock.page_url()).await.unwrap_err();
    assert_eq!(err.to_string(), "Unable to reach CA health endpoint");
    assert_eq!(err.kind(), mtls_enroll::ErrorKind::Internal);
}
