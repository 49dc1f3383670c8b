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

//! # mtls-enroll
//!
//! Client-side enrollment for short-lived mTLS client certificates.
//!
//! The private key is generated in-process and never transmitted. The
//! library runs an OIDC Authorization Code login with PKCE, correlates the
//! login callback with the enrollment that triggered it, submits a PKCS#10
//! CSR to a CA endpoint with the resulting identity token, and hands the
//! issued certificate and the key to the host as downloadable artifacts.
//!
//! ## Features
//!
//! - **Resumable flow**: PKCE and `state` survive the identity provider
//!   round trip in injected tab-scoped storage
//! - **RSA-2048 / SHA-256 CSRs**, self-verified before submission
//! - **Two token strategies**: Authorization Code with PKCE, or a direct
//!   fetch from the token endpoint
//! - **Deterministic artifact release**: one live object reference per
//!   download, revoked on replacement and teardown
//!
//! ## Quick Start
//!
//! ```no_run
//! use mtls_enroll::{EnrollConfig, EnrollmentFlow, EnrollmentState};
//! use mtls_enroll::artifacts::MemoryObjectUrls;
//! use mtls_enroll::navigation::MemoryNavigator;
//! use mtls_enroll::storage::MemoryStore;
//! use url::Url;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EnrollConfig::builder()
//!     .authorization_endpoint("https://idp.example.com/authorize")
//!     .token_endpoint("https://idp.example.com/token")
//!     .client_id("enroll-web")
//!     .build();
//!
//! let store = MemoryStore::new();
//! let navigator = MemoryNavigator::new(Url::parse("https://enroll.example.com/")?);
//! let flow = EnrollmentFlow::new(config, &store, &navigator, MemoryObjectUrls::new())?;
//!
//! // Page load: finish a login round trip if the URL carries a callback
//! flow.resume_from_callback().await;
//!
//! // User action
//! if flow.can_start() {
//!     flow.start_enrollment().await;
//! }
//!
//! if flow.state() == EnrollmentState::Ready {
//!     let artifacts = flow.artifacts();
//!     println!("{}", artifacts.certificate().map(|a| a.url()).unwrap_or_default());
//! }
//! println!("{}", flow.status());
//! # Ok(())
//! # }
//! ```
//!
//! ## Cargo Features
//!
//! - `cli` (default): builds the `mtls-enroll` host binary

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod artifacts;
pub mod client;
pub mod config;
pub mod csr;
pub mod error;
pub mod flow;
pub mod logging;
pub mod navigation;
pub mod pkce;
pub mod storage;
pub mod tls;
pub mod token;
pub mod types;

// Re-export main types at crate root for convenience
pub use artifacts::{ArtifactManager, ObjectUrls};
pub use client::CaClient;
pub use config::{EnrollConfig, EnrollConfigBuilder, RawConfig, TokenStrategy};
pub use csr::KeyMaterial;
pub use error::{EnrollError, ErrorKind, Result};
pub use flow::{EnrollmentFlow, EnrollmentState};
pub use navigation::Navigator;
pub use pkce::PkceCorrelator;
pub use storage::SessionStore;
pub use token::OidcClient;
pub use types::{EnrollmentResult, IdentityToken};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// User-Agent string for HTTP requests.
pub const USER_AGENT: &str = concat!("mtls-enroll/", env!("CARGO_PKG_VERSION"));
