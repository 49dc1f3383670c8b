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

//! Tests for rejecting overlapping operations

use std::time::Duration;

use crate::integration::{Host, MockEnrollServer, PATH_SIGN, TEST_CERT_PEM};
use mtls_enroll::{EnrollmentState, ErrorKind, IdentityToken};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

async fn mount_slow_ca(mock: &MockEnrollServer) {
    Mock::given(method("POST"))
        .and(path(PATH_SIGN))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "certificate": TEST_CERT_PEM }))
                .set_delay(Duration::from_millis(300)),
        )
        .mount(mock.inner())
        .await;
}

#[tokio::test]
async fn test_second_start_is_rejected_while_enrolling() {
    let mock = MockEnrollServer::start().await;
    mount_slow_ca(&mock).await;

    let host = Host::new(mock.page_url());
    let flow = host.flow(mock.config());
    let token = IdentityToken::new("T");

    let (first, second) = tokio::join!(flow.enroll_with_token(&token), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let busy = flow.is_busy();
        (busy, flow.start_enrollment().await)
    });

    let (was_busy, rejected) = second;
    assert!(was_busy);
    assert_eq!(rejected, EnrollmentState::Failed(ErrorKind::Busy));
    assert_eq!(first, EnrollmentState::Ready);

    // The rejected call did not disturb the running attempt
    assert_eq!(flow.state(), EnrollmentState::Ready);
    assert!(host.navigator.assigned().is_empty());
    assert!(host.store.is_empty());
    assert_eq!(mock.requests_to(PATH_SIGN).await.len(), 1);
    assert!(!flow.is_busy());
}

#[tokio::test]
async fn test_control_disabled_while_in_flight() {
    let mock = MockEnrollServer::start().await;
    mount_slow_ca(&mock).await;

    let host = Host::new(mock.page_url());
    let flow = host.flow(mock.config());
    let token = IdentityToken::new("T");

    let (_, enabled_during) = tokio::join!(flow.enroll_with_token(&token), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        flow.can_start()
    });

    assert!(!enabled_during);
    assert!(flow.can_start());
}

#[tokio::test]
async fn test_dropped_operation_releases_guard() {
    let mock = MockEnrollServer::start().await;
    mount_slow_ca(&mock).await;

    let host = Host::new(mock.page_url());
    let flow = host.flow(mock.config());
    let token = IdentityToken::new("T");

    let timed_out =
        tokio::time::timeout(Duration::from_millis(50), flow.enroll_with_token(&token)).await;
    assert!(timed_out.is_err());
    assert!(!flow.is_busy());
    assert!(flow.can_start());
}
