//! Error types for the enrollment flow.
//!
//! This module defines every error that can end an enrollment attempt,
//! from missing configuration through OIDC callback validation, token
//! exchange, CSR generation and CA submission.

use thiserror::Error;

/// Result type alias using [`EnrollError`].
pub type Result<T> = std::result::Result<T, EnrollError>;

/// Errors that can occur during an enrollment attempt.
///
/// The `Display` output of each variant is the human-readable status line
/// shown to the user when the attempt fails.
#[derive(Debug, Error)]
pub enum EnrollError {
    /// One or more required settings are missing.
    #[error("Missing configuration: {}", .0.join(", "))]
    Configuration(Vec<String>),

    /// The identity provider redirected back with an `error` parameter.
    #[error("{message}")]
    OidcCallback {
        /// The `error` code returned by the provider.
        code: String,
        /// `error_description` if present, otherwise the bare code.
        message: String,
    },

    /// A configuration file could not be found, read or parsed.
    #[error("Configuration file error: {0}")]
    ConfigFile(String),

    /// The callback `state` does not match the persisted one.
    #[error("OIDC state mismatch. Please try again.")]
    StateMismatch,

    /// No PKCE verifier was persisted for this callback.
    #[error("Missing PKCE verifier. Please restart the request.")]
    MissingVerifier,

    /// The token endpoint rejected the request or returned no usable token.
    #[error("{message}")]
    TokenExchange {
        /// HTTP status code, if a response was received.
        status: Option<u16>,
        /// Error message for the status line.
        message: String,
    },

    /// Key generation, CSR encoding, or CSR self-verification failed.
    #[error("CSR generation failed: {0}")]
    CsrGeneration(String),

    /// The CA rejected the request.
    ///
    /// The display output is the raw response body so the CA's own
    /// diagnostic reaches the user unchanged.
    #[error("{}", enrollment_message(.status, .body))]
    Enrollment {
        /// HTTP status code.
        status: u16,
        /// Raw response body.
        body: String,
    },

    /// The CA or identity provider returned a body that could not be used.
    #[error("{message}")]
    MalformedResponse {
        /// Error message for the status line.
        message: String,
        /// Raw response body, kept for diagnostics.
        body: String,
    },

    /// A revocation or health request failed.
    #[error("{message}")]
    Api {
        /// HTTP status code, if a response was received.
        status: Option<u16>,
        /// Error message reported by the service, or a generic fallback.
        message: String,
    },

    /// Another operation is already in flight.
    #[error("An enrollment is already in progress.")]
    Busy,

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The HTTP client could not be configured.
    #[error("TLS configuration error: {0}")]
    Tls(String),

    /// URL parsing error.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// Session storage could not be read or written.
    #[error("Session storage error: {0}")]
    Storage(String),

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn enrollment_message(status: &u16, body: &str) -> String {
    if body.trim().is_empty() {
        format!("Enrollment failed ({})", status)
    } else {
        body.to_string()
    }
}

/// Discriminant of [`EnrollError`], used to report failures in flow state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`EnrollError::Configuration`].
    Configuration,
    /// See [`EnrollError::OidcCallback`].
    OidcCallback,
    /// See [`EnrollError::StateMismatch`].
    StateMismatch,
    /// See [`EnrollError::MissingVerifier`].
    MissingVerifier,
    /// See [`EnrollError::TokenExchange`].
    TokenExchange,
    /// See [`EnrollError::CsrGeneration`].
    CsrGeneration,
    /// See [`EnrollError::Enrollment`].
    Enrollment,
    /// See [`EnrollError::MalformedResponse`].
    MalformedResponse,
    /// See [`EnrollError::Busy`].
    Busy,
    /// Transport, URL, storage, JSON or I/O failure.
    Internal,
}

impl EnrollError {
    /// Create a configuration error listing the missing settings.
    pub fn configuration<I, S>(missing: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Configuration(missing.into_iter().map(Into::into).collect())
    }

    /// Create a configuration file error.
    pub fn config_file(msg: impl Into<String>) -> Self {
        Self::ConfigFile(msg.into())
    }

    /// Create an OIDC callback error from the `error` and optional
    /// `error_description` parameters.
    pub fn oidc_callback(code: impl Into<String>, description: Option<String>) -> Self {
        let code = code.into();
        let message = description
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| code.clone());
        Self::OidcCallback { code, message }
    }

    /// Create a token exchange error.
    pub fn token_exchange(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::TokenExchange {
            status,
            message: message.into(),
        }
    }

    /// Create a CSR generation error.
    pub fn csr(msg: impl Into<String>) -> Self {
        Self::CsrGeneration(msg.into())
    }

    /// Create an enrollment error from a rejected CA response.
    pub fn enrollment(status: u16, body: impl Into<String>) -> Self {
        Self::Enrollment {
            status,
            body: body.into(),
        }
    }

    /// Create a malformed response error.
    pub fn malformed(message: impl Into<String>, body: impl Into<String>) -> Self {
        Self::MalformedResponse {
            message: message.into(),
            body: body.into(),
        }
    }

    /// Create an error for a failed revocation or health request.
    pub fn api(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Create a TLS configuration error.
    pub fn tls(msg: impl Into<String>) -> Self {
        Self::Tls(msg.into())
    }

    /// Create a storage error.
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Returns the discriminant of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) | Self::ConfigFile(_) => ErrorKind::Configuration,
            Self::OidcCallback { .. } => ErrorKind::OidcCallback,
            Self::StateMismatch => ErrorKind::StateMismatch,
            Self::MissingVerifier => ErrorKind::MissingVerifier,
            Self::TokenExchange { .. } => ErrorKind::TokenExchange,
            Self::CsrGeneration(_) => ErrorKind::CsrGeneration,
            Self::Enrollment { .. } => ErrorKind::Enrollment,
            Self::MalformedResponse { .. } => ErrorKind::MalformedResponse,
            Self::Busy => ErrorKind::Busy,
            Self::Api { .. }
            | Self::Http(_)
            | Self::Tls(_)
            | Self::Url(_)
            | Self::Storage(_)
            | Self::Json(_)
            | Self::Io(_) => ErrorKind::Internal,
        }
    }

    /// Returns true if this error is a failed security check on the
    /// login callback.
    pub fn is_security_violation(&self) -> bool {
        matches!(self, Self::StateMismatch | Self::MissingVerifier)
    }
}
