//! Issuance protocol seam
//!
//! The orchestrator talks to the issuance service through two traits:
//!
//! - [`AcmeService`] - account lifecycle and order creation
//! - [`AcmeOrder`] - one order: authorizations, challenge readiness,
//!   finalization and certificate download
//!
//! [`AcmeClient`] implements both on top of `instant-acme`. Tests plug in
//! an in-process fake.
//!
//! # Challenge Flow
//!
//! 1. [`AcmeService::new_order`] creates an order for the identifier set
//! 2. [`AcmeOrder::authorizations`] lists one [`Authorization`] per
//!    identifier, each offering several [`Challenge`]s
//! 3. A challenge responder publishes the key authorization
//! 4. [`AcmeOrder::set_challenge_ready`] asks the service to validate
//! 5. Authorizations are polled until they are no longer pending
//! 6. [`AcmeOrder::finalize`] submits the CSR, [`AcmeOrder::refresh`] is
//!    polled until the order is valid
//! 7. [`AcmeOrder::certificate`] downloads the chain

use std::time::Duration;

use async_trait::async_trait;

mod account;
mod client;
mod error;
mod http;

pub use account::{AccountStore, StoredAccount};
pub use client::AcmeClient;
pub use http::{HintingHttpClient, RetryHints};
pub use error::{
    ChallengeError, OrderError, ProtocolError, ProtocolErrorKind, StorageError,
};

use crate::types::DomainSet;

/// Order status as reported by the issuance service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Pending,
    Ready,
    Processing,
    Valid,
    Invalid,
}

/// Authorization status. Only `Pending` may change; every other state is
/// final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationStatus {
    Pending,
    Valid,
    Invalid,
    Expired,
}

impl AuthorizationStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, AuthorizationStatus::Pending)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AuthorizationStatus::Pending => "pending",
            AuthorizationStatus::Valid => "valid",
            AuthorizationStatus::Invalid => "invalid",
            AuthorizationStatus::Expired => "expired",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeStatus {
    Pending,
    Processing,
    Valid,
    Invalid,
}

/// Challenge mechanisms this service can answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChallengeKind {
    Http01,
    Dns01,
}

impl std::fmt::Display for ChallengeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ChallengeKind::Http01 => "http-01",
            ChallengeKind::Dns01 => "dns-01",
        })
    }
}

/// One challenge offered for an authorization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub kind: ChallengeKind,
    /// Challenge URL, used to signal readiness
    pub url: String,
    pub token: String,
    /// `token.thumbprint` for the account key
    pub key_authorization: String,
    pub status: ChallengeStatus,
}

/// Proof-of-control requirement for one identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorization {
    pub domain: String,
    pub status: AuthorizationStatus,
    /// Challenges of kinds this service cannot answer are not listed
    pub challenges: Vec<Challenge>,
    /// Problem detail reported for a failed challenge
    pub error: Option<String>,
    /// Polling interval suggested by the service (`Retry-After`)
    pub retry_after: Option<Duration>,
}

impl Authorization {
    pub fn challenge(&self, kind: ChallengeKind) -> Option<&Challenge> {
        self.challenges.iter().find(|c| c.kind == kind)
    }
}

/// Order state after a refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderSnapshot {
    pub status: OrderStatus,
    /// Polling interval suggested by the service
    pub retry_after: Option<Duration>,
    pub error: Option<String>,
}

/// Account-level operations of the issuance service.
#[async_trait]
pub trait AcmeService: Send + Sync {
    /// Make sure a registered account is available, loading persisted
    /// credentials or registering a new account.
    async fn ensure_account(&self) -> Result<(), ProtocolError>;

    /// Forget the cached account so the next [`ensure_account`] reloads or
    /// re-registers it.
    ///
    /// [`ensure_account`]: AcmeService::ensure_account
    async fn invalidate_account(&self);

    /// Create an order for `domains`.
    async fn new_order(&self, domains: &DomainSet) -> Result<Box<dyn AcmeOrder>, ProtocolError>;
}

/// Operations on one order.
#[async_trait]
pub trait AcmeOrder: Send {
    /// Protocol-assigned order URL
    fn url(&self) -> &str;

    /// Fetch the current state of every authorization of the order.
    async fn authorizations(&mut self) -> Result<Vec<Authorization>, ProtocolError>;

    /// Tell the service the challenge can be validated now.
    async fn set_challenge_ready(&mut self, challenge: &Challenge) -> Result<(), ProtocolError>;

    /// Fetch the current order state.
    async fn refresh(&mut self) -> Result<OrderSnapshot, ProtocolError>;

    /// Submit the DER-encoded CSR.
    async fn finalize(&mut self, csr_der: &[u8]) -> Result<(), ProtocolError>;

    /// Download the PEM chain; `None` while it is not available yet.
    async fn certificate(&mut self) -> Result<Option<String>, ProtocolError>;
}
