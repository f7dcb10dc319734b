//! Error types for the issuance protocol, responders, stores and orders.

use std::time::Duration;

use thiserror::Error;

/// Classification of an issuance service failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolErrorKind {
    /// `urn:ietf:params:acme:error:rateLimited`
    RateLimited,
    /// `urn:ietf:params:acme:error:badNonce`
    BadNonce,
    /// The account is unknown to the service or its key was rejected
    AccountInvalid,
    /// Any other problem document (malformed CSR, rejected identifier, ...)
    Rejected,
    /// The service could not be reached or answered garbage
    Transport,
}

/// A failed issuance protocol operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{operation}: {message}")]
pub struct ProtocolError {
    pub kind: ProtocolErrorKind,
    pub operation: &'static str,
    pub message: String,
}

const PROBLEM_PREFIX: &str = "urn:ietf:params:acme:error:";

impl ProtocolError {
    pub fn new(kind: ProtocolErrorKind, operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind,
            operation,
            message: message.into(),
        }
    }

    /// Build an error from an ACME problem document type and detail.
    pub fn from_problem(operation: &'static str, problem_type: Option<&str>, detail: &str) -> Self {
        let kind = match problem_type.and_then(|t| t.strip_prefix(PROBLEM_PREFIX)) {
            Some("rateLimited") => ProtocolErrorKind::RateLimited,
            Some("badNonce") => ProtocolErrorKind::BadNonce,
            Some("accountDoesNotExist" | "unauthorized") => ProtocolErrorKind::AccountInvalid,
            _ => ProtocolErrorKind::Rejected,
        };
        let message = match problem_type {
            Some(t) => format!("{detail} ({t})"),
            None => detail.to_string(),
        };
        Self::new(kind, operation, message)
    }

    pub fn transport(operation: &'static str, message: impl Into<String>) -> Self {
        Self::new(ProtocolErrorKind::Transport, operation, message)
    }

    /// Rate limiting and stale nonces are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            ProtocolErrorKind::RateLimited | ProtocolErrorKind::BadNonce
        )
    }
}

/// A challenge responder failed to publish or validate a challenge.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChallengeError {
    #[error("failed to bind challenge listener {address}: {message}")]
    Bind { address: String, message: String },

    #[error("no {wanted} challenge offered for {domain}")]
    Unsupported { domain: String, wanted: String },

    #[error("DNS update for {domain} failed: {message}")]
    DnsUpdate { domain: String, message: String },

    #[error("DNS update for {domain} not acknowledged within {timeout:?}")]
    DnsTimeout { domain: String, timeout: Duration },

    #[error("authorization for {domain} became {status}{}", .detail.as_deref().map(|d| format!(": {d}")).unwrap_or_default())]
    AuthorizationFailed {
        domain: String,
        status: String,
        detail: Option<String>,
    },
}

/// A certificate store could not read or write an artifact.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt stored certificate {path}: {message}")]
    Corrupt { path: String, message: String },
}

/// Why a certificate request did not complete.
///
/// Cloneable so one outcome can be handed to every caller waiting on the
/// same in-flight attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("challenge error: {0}")]
    Challenge(#[from] ChallengeError),

    #[error("storage '{storage}' failed: {message}")]
    Storage { storage: String, message: String },

    #[error("timed out after {0:?} while {1}")]
    Timeout(Duration, &'static str),

    #[error("cancelled by shutdown")]
    Cancelled,
}

impl OrderError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, OrderError::Cancelled)
    }

    /// Errors caused by the request itself rather than by the service.
    pub fn is_client_error(&self) -> bool {
        matches!(self, OrderError::Configuration(_))
    }
}
