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

//! Enrollment orchestration.
//!
//! [`EnrollmentFlow`] drives one enrollment attempt from the user's click
//! to downloadable artifacts:
//!
//! ```text
//! Idle ──start──▶ AwaitingLogin ═══ IdP round trip ═══▶ ResumingLogin
//!                                                         │
//!                                     ExchangingToken ◀───┘
//!                                         │
//!                         ┌───────────────┴──────────────┐
//!                   enroll requested               sign-in only
//!                         │                              │
//!                   GeneratingKey ──▶ Enrolling ──▶ Ready   SignedIn
//! ```
//!
//! Any step can end in `Failed(kind)`. Errors never escape the flow: every
//! operation returns the resulting [`EnrollmentState`], and the failure is
//! rendered into the status line. Correlation data is cleared whenever an
//! attempt ends.
//!
//! The flow is resumable from a cold start: constructing it over a store
//! that holds a pending session yields [`EnrollmentState::AwaitingLogin`],
//! and [`EnrollmentFlow::resume_from_callback`] picks up from the page URL.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::artifacts::{ArtifactManager, ObjectUrls};
use crate::client::CaClient;
use crate::config::{EnrollConfig, TokenStrategy};
use crate::csr::KeyMaterial;
use crate::error::{EnrollError, ErrorKind, Result};
use crate::navigation::{CallbackParams, Navigator, redirect_uri, strip_callback_params};
use crate::pkce::PkceCorrelator;
use crate::storage::SessionStore;
use crate::tls::build_http_client;
use crate::token::OidcClient;
use crate::types::IdentityToken;

/// Status lines shown to the user.
pub mod status {
    /// Redirect to the identity provider issued.
    pub const REDIRECTING: &str = "Redirecting to sign-in...";
    /// Login callback being processed.
    pub const COMPLETING_SIGN_IN: &str = "Completing sign-in...";
    /// Direct token fetch in progress.
    pub const REQUESTING_TOKEN: &str = "Requesting ID token...";
    /// Login finished without an enrollment intent.
    pub const SIGNED_IN: &str = "Sign-in complete. Click the button to request a certificate.";
    /// Key pair and CSR being generated.
    pub const GENERATING_KEY: &str = "Generating a new private key...";
    /// CSR submitted to the CA.
    pub const ENROLLING: &str = "Requesting certificate from the CA...";
    /// Artifacts available.
    pub const READY: &str = "Certificate ready.";
}

/// Where the flow is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnrollmentState {
    /// Nothing in progress.
    Idle,
    /// Redirect to the identity provider issued; the page unloads.
    AwaitingLogin,
    /// Validating the login callback.
    ResumingLogin,
    /// Obtaining the identity token.
    ExchangingToken,
    /// Generating the key pair and CSR.
    GeneratingKey,
    /// Waiting for the CA.
    Enrolling,
    /// Certificate and key are downloadable.
    Ready,
    /// Login completed without an enrollment intent.
    SignedIn,
    /// The attempt failed.
    Failed(ErrorKind),
}

impl EnrollmentState {
    /// Returns true for states an operation leaves the flow in.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Idle | Self::AwaitingLogin | Self::Ready | Self::SignedIn | Self::Failed(_)
        )
    }
}

#[derive(Debug)]
struct Progress {
    state: EnrollmentState,
    status: String,
}

/// Releases the in-flight flag when the operation completes or its future
/// is dropped.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// The enrollment orchestrator.
///
/// Generic over the three host capabilities so the same code runs in a
/// browser shell, the command-line host, and tests.
///
/// # Example
///
/// ```no_run
/// use mtls_enroll::{EnrollConfig, EnrollmentFlow, EnrollmentState};
/// use mtls_enroll::artifacts::MemoryObjectUrls;
/// use mtls_enroll::navigation::MemoryNavigator;
/// use mtls_enroll::storage::MemoryStore;
/// use url::Url;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = EnrollConfig::builder()
///     .authorization_endpoint("https://idp.example.com/authorize")
///     .token_endpoint("https://idp.example.com/token")
///     .client_id("enroll-web")
///     .build();
///
/// let flow = EnrollmentFlow::new(
///     config,
///     MemoryStore::new(),
///     MemoryNavigator::new(Url::parse("https://enroll.example.com/")?),
///     MemoryObjectUrls::new(),
/// )?;
///
/// assert_eq!(flow.start_enrollment().await, EnrollmentState::AwaitingLogin);
/// # Ok(())
/// # }
/// ```
pub struct EnrollmentFlow<S, N, U>
where
    S: SessionStore,
    N: Navigator,
    U: ObjectUrls,
{
    config: Arc<EnrollConfig>,
    correlator: PkceCorrelator<S>,
    navigator: N,
    artifacts: Mutex<ArtifactManager<U>>,
    oidc: OidcClient,
    ca: CaClient,
    progress: Mutex<Progress>,
    in_flight: AtomicBool,
}

impl<S, N, U> EnrollmentFlow<S, N, U>
where
    S: SessionStore,
    N: Navigator,
    U: ObjectUrls,
{
    /// Create the flow, reconstructing its state from `store`.
    ///
    /// # Errors
    ///
    /// Fails only if the HTTP client cannot be built or the store cannot be
    /// read. Missing configuration is reported through the status line.
    pub fn new(config: EnrollConfig, store: S, navigator: N, urls: U) -> Result<Self> {
        let http = build_http_client(&config)?;
        Self::with_http(config, store, navigator, urls, http)
    }

    /// Create the flow with an existing HTTP client.
    pub fn with_http(
        config: EnrollConfig,
        store: S,
        navigator: N,
        urls: U,
        http: reqwest::Client,
    ) -> Result<Self> {
        let config = Arc::new(config);
        let correlator = PkceCorrelator::new(store);

        let state = if correlator.is_pending()? {
            EnrollmentState::AwaitingLogin
        } else {
            EnrollmentState::Idle
        };
        let status = match config.validate() {
            Err(e) => e.to_string(),
            Ok(()) => String::new(),
        };

        Ok(Self {
            artifacts: Mutex::new(ArtifactManager::new(urls, &config.certificate)),
            oidc: OidcClient::with_http(Arc::clone(&config), http.clone()),
            ca: CaClient::with_http(Arc::clone(&config), http),
            correlator,
            navigator,
            progress: Mutex::new(Progress { state, status }),
            in_flight: AtomicBool::new(false),
            config,
        })
    }

    /// The flow configuration.
    pub fn config(&self) -> &EnrollConfig {
        &self.config
    }

    /// Current state.
    pub fn state(&self) -> EnrollmentState {
        self.lock_progress().state
    }

    /// Current status line.
    pub fn status(&self) -> String {
        self.lock_progress().status.clone()
    }

    /// Returns true while an operation is in flight.
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Whether a new attempt may be started (the enrollment control is
    /// enabled).
    pub fn can_start(&self) -> bool {
        !self.is_busy() && self.config.missing().is_empty()
    }

    /// The downloadable artifacts.
    ///
    /// Do not hold the guard across an operation.
    pub fn artifacts(&self) -> MutexGuard<'_, ArtifactManager<U>> {
        self.artifacts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The PKCE correlator.
    pub fn correlator(&self) -> &PkceCorrelator<S> {
        &self.correlator
    }

    /// The navigator.
    pub fn navigator(&self) -> &N {
        &self.navigator
    }

    /// Start a new attempt from a user action.
    ///
    /// With missing configuration this fails without touching storage or
    /// the network. Otherwise previous artifacts are released and the
    /// configured token strategy runs: a redirect to the identity provider,
    /// or a direct token fetch followed by enrollment.
    pub async fn start_enrollment(&self) -> EnrollmentState {
        let Some(_guard) = self.try_begin() else {
            return self.reject_busy();
        };

        if let Err(e) = self.config.validate() {
            tracing::warn!("Cannot start enrollment: {}", e);
            return self.set(EnrollmentState::Failed(e.kind()), e.to_string());
        }

        self.artifacts().reset();

        match self.config.token_strategy {
            TokenStrategy::AuthorizationCode => match self.redirect_to_login() {
                Ok(state) => state,
                Err(e) => self.fail(e),
            },
            TokenStrategy::DirectFetch { .. } => {
                self.set(EnrollmentState::ExchangingToken, status::REQUESTING_TOKEN);
                match self.oidc.fetch_direct().await {
                    Ok(token) => self.enroll(&token).await,
                    Err(e) => self.fail(e),
                }
            }
        }
    }

    fn redirect_to_login(&self) -> Result<EnrollmentState> {
        let redirect = redirect_uri(&self.navigator.current_url());
        let started = self.correlator.begin()?;
        let url = self.oidc.authorization_url(&started, &redirect)?;

        let state = self.set(EnrollmentState::AwaitingLogin, status::REDIRECTING);
        tracing::info!("Redirecting to identity provider");
        self.navigator.assign(&url);
        Ok(state)
    }

    /// Process the login callback in the current page URL, if any.
    ///
    /// Runs once per page load. Without `code` or `error` in the URL the
    /// state is returned unchanged.
    pub async fn resume_from_callback(&self) -> EnrollmentState {
        let current = self.navigator.current_url();
        let params = CallbackParams::from_url(&current);
        if !params.is_callback() {
            return self.state();
        }

        let Some(_guard) = self.try_begin() else {
            return self.reject_busy();
        };

        // The code is single-use; it must not survive a reload.
        self.navigator.replace(&strip_callback_params(&current));

        if let Some(error) = params.error {
            return self.fail(EnrollError::oidc_callback(error, params.error_description));
        }
        let Some(code) = params.code else {
            return self.state();
        };

        self.set(EnrollmentState::ResumingLogin, status::COMPLETING_SIGN_IN);
        let pending = match self
            .correlator
            .validate(params.state.as_deref().unwrap_or_default())
        {
            Ok(pending) => pending,
            Err(e) => return self.fail(e),
        };

        self.set(EnrollmentState::ExchangingToken, status::COMPLETING_SIGN_IN);
        let token = match self
            .oidc
            .exchange_code(&code, &redirect_uri(&current), &pending.verifier)
            .await
        {
            Ok(token) => token,
            Err(e) => return self.fail(e),
        };

        if pending.enroll_requested {
            self.enroll(&token).await
        } else {
            self.clear_session();
            tracing::info!("Sign-in completed without enrollment");
            self.set(EnrollmentState::SignedIn, status::SIGNED_IN)
        }
    }

    /// Enroll with an already obtained token.
    ///
    /// Artifacts from a previous attempt stay in place unless this attempt
    /// succeeds.
    pub async fn enroll_with_token(&self, token: &IdentityToken) -> EnrollmentState {
        let Some(_guard) = self.try_begin() else {
            return self.reject_busy();
        };
        self.enroll(token).await
    }

    async fn enroll(&self, token: &IdentityToken) -> EnrollmentState {
        let result = self.request_certificate(token).await;
        match result {
            Ok(()) => {
                self.clear_session();
                tracing::info!("Certificate issued");
                self.set(EnrollmentState::Ready, status::READY)
            }
            Err(e) => self.fail(e),
        }
    }

    async fn request_certificate(&self, token: &IdentityToken) -> Result<()> {
        self.set(EnrollmentState::GeneratingKey, status::GENERATING_KEY);
        let key = KeyMaterial::generate(&self.config.certificate.subject)?;

        self.set(EnrollmentState::Enrolling, status::ENROLLING);
        let page = self.navigator.current_url();
        let issued = self.ca.sign(&page, key.csr_pem(), token).await?;

        let private_key_pem = key.private_key_pem()?;
        self.artifacts().present(
            &issued.certificate_pem,
            &private_key_pem,
            issued.ca_pem.as_deref(),
        );
        Ok(())
    }

    fn try_begin(&self) -> Option<InFlight<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight(&self.in_flight))
    }

    fn reject_busy(&self) -> EnrollmentState {
        tracing::warn!("{}", EnrollError::Busy);
        EnrollmentState::Failed(ErrorKind::Busy)
    }

    fn fail(&self, error: EnrollError) -> EnrollmentState {
        if error.is_security_violation() {
            tracing::warn!(kind = ?error.kind(), "Login callback rejected: {}", error);
        } else {
            tracing::warn!(kind = ?error.kind(), "Enrollment failed: {}", error);
        }
        self.clear_session();
        self.set(EnrollmentState::Failed(error.kind()), error.to_string())
    }

    fn clear_session(&self) {
        if let Err(e) = self.correlator.clear() {
            tracing::warn!("Failed to clear PKCE session: {}", e);
        }
    }

    fn set(&self, state: EnrollmentState, status: impl Into<String>) -> EnrollmentState {
        let mut progress = self.lock_progress();
        progress.state = state;
        progress.status = status.into();
        tracing::debug!(?state, "{}", progress.status);
        state
    }

    fn lock_progress(&self) -> MutexGuard<'_, Progress> {
        self.progress
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<S, N, U> std::fmt::Debug for EnrollmentFlow<S, N, U>
where
    S: SessionStore,
    N: Navigator,
    U: ObjectUrls,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnrollmentFlow")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("busy", &self.is_busy())
            .finish()
    }
}
