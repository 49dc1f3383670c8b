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

//! PKCE (RFC 7636) and OIDC `state` correlation.
//!
//! [`PkceCorrelator`] owns the only security-critical invariant of the
//! enrollment flow: the verifier, the anti-forgery `state` and the
//! "enroll after login" flag are written together immediately before the
//! redirect to the identity provider, and removed together on any outcome.
//!
//! The three values are persisted as a single serialized record under one
//! storage key, so a reload can never observe a partial session.
//!
//! # Example
//!
//! ```
//! use mtls_enroll::pkce::PkceCorrelator;
//! use mtls_enroll::storage::MemoryStore;
//!
//! let correlator = PkceCorrelator::new(MemoryStore::new());
//! let started = correlator.begin().unwrap();
//!
//! // ... browser round trip to the identity provider ...
//!
//! let pending = correlator.validate(&started.state).unwrap();
//! assert_eq!(pending.verifier, started.verifier);
//! correlator.clear().unwrap();
//! ```

use base64::prelude::*;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{EnrollError, Result};
use crate::storage::SessionStore;

/// Storage key holding the serialized session record.
pub const SESSION_KEY: &str = "enroll:session";

/// Number of random bytes in a PKCE code verifier.
pub const VERIFIER_BYTES: usize = 32;

/// Number of random bytes in an OIDC `state` value.
pub const STATE_BYTES: usize = 16;

/// PKCE code challenge method.
pub const CHALLENGE_METHOD: &str = "S256";

/// Generate a PKCE code verifier: 32 random bytes, base64url, no padding.
pub fn generate_code_verifier() -> String {
    random_token(VERIFIER_BYTES)
}

/// Generate an OIDC `state` value: 16 random bytes, base64url, no padding.
pub fn generate_state() -> String {
    random_token(STATE_BYTES)
}

/// Compute the S256 code challenge for a verifier.
pub fn compute_code_challenge(verifier: &str) -> String {
    BASE64_URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

fn random_token(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    BASE64_URL_SAFE_NO_PAD.encode(bytes)
}

/// Material returned by [`PkceCorrelator::begin`].
///
/// The challenge and state go into the authorization URL. The verifier is
/// returned for callers that need it but must never be put in a URL.
#[derive(Clone, PartialEq, Eq)]
pub struct StartedSession {
    /// PKCE code verifier.
    pub verifier: String,
    /// S256 challenge derived from the verifier.
    pub challenge: String,
    /// Anti-forgery state value.
    pub state: String,
}

impl std::fmt::Debug for StartedSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StartedSession")
            .field("verifier", &"<redacted>")
            .field("challenge", &self.challenge)
            .field("state", &self.state)
            .finish()
    }
}

/// A persisted session that passed callback validation.
#[derive(Clone, PartialEq, Eq)]
pub struct PendingSession {
    /// PKCE code verifier to send with the token exchange.
    pub verifier: String,
    /// Whether the login was started in order to enroll.
    pub enroll_requested: bool,
}

impl std::fmt::Debug for PendingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingSession")
            .field("verifier", &"<redacted>")
            .field("enroll_requested", &self.enroll_requested)
            .finish()
    }
}

#[derive(Serialize, Deserialize)]
struct SessionRecord {
    verifier: String,
    state: String,
    enroll_requested: bool,
}

/// Manages the PKCE verifier / state / enroll-flag triple over a
/// [`SessionStore`].
#[derive(Debug)]
pub struct PkceCorrelator<S> {
    store: S,
}

impl<S: SessionStore> PkceCorrelator<S> {
    /// Create a correlator over the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Access the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Start a session that resumes into enrollment after login.
    ///
    /// Any previous session is overwritten.
    pub fn begin(&self) -> Result<StartedSession> {
        self.begin_with(true)
    }

    /// Start a plain sign-in session; the callback will not enroll.
    pub fn begin_sign_in(&self) -> Result<StartedSession> {
        self.begin_with(false)
    }

    fn begin_with(&self, enroll_requested: bool) -> Result<StartedSession> {
        let verifier = generate_code_verifier();
        let challenge = compute_code_challenge(&verifier);
        let state = generate_state();

        let record = SessionRecord {
            verifier: verifier.clone(),
            state: state.clone(),
            enroll_requested,
        };
        self.store
            .set(SESSION_KEY, &serde_json::to_string(&record)?)?;

        tracing::debug!(enroll_requested, "Persisted PKCE session");

        Ok(StartedSession {
            verifier,
            challenge,
            state,
        })
    }

    /// Validate the `state` returned on the login callback.
    ///
    /// # Errors
    ///
    /// - [`EnrollError::MissingVerifier`] if no session is persisted or the
    ///   persisted verifier is empty.
    /// - [`EnrollError::StateMismatch`] if `returned_state` is not exactly
    ///   the persisted state.
    ///
    /// The session is left in place; callers clear it once the attempt ends.
    pub fn validate(&self, returned_state: &str) -> Result<PendingSession> {
        let record = self.load()?.ok_or(EnrollError::MissingVerifier)?;

        if record.state.is_empty() || record.state != returned_state {
            return Err(EnrollError::StateMismatch);
        }

        if record.verifier.is_empty() {
            return Err(EnrollError::MissingVerifier);
        }

        Ok(PendingSession {
            verifier: record.verifier,
            enroll_requested: record.enroll_requested,
        })
    }

    /// Remove the session. Idempotent.
    pub fn clear(&self) -> Result<()> {
        self.store.remove(SESSION_KEY)
    }

    /// Returns true if a session is persisted, i.e. a login redirect is
    /// outstanding.
    pub fn is_pending(&self) -> Result<bool> {
        Ok(self.load()?.is_some())
    }

    fn load(&self) -> Result<Option<SessionRecord>> {
        let Some(raw) = self.store.get(SESSION_KEY)? else {
            return Ok(None);
        };

        match serde_json::from_str(&raw) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                tracing::warn!("Discarding unreadable PKCE session: {}", e);
                self.store.remove(SESSION_KEY)?;
                Ok(None)
            }
        }
    }
}
