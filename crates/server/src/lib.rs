//! Macen: certificate lifecycle service
//!
//! Obtains certificates from an ACME issuance service, answers HTTP-01 and
//! DNS-01 challenges on behalf of the operator and persists the results.
//!
//! # Modules
//!
//! - [`acme`]: issuance protocol seam and the `instant-acme` client
//! - [`challenge`]: HTTP-01 and DNS-01 (RFC 2136) responders
//! - [`storage`]: certificate stores
//! - [`orchestrator`]: per-request state machine with single-flight
//! - [`scheduler`]: periodic renewal
//! - [`mgmt`]: management HTTP API
//! - [`app`]: startup wiring

pub mod acme;
pub mod app;
pub mod cert;
pub mod challenge;
pub mod mgmt;
pub mod net;
pub mod orchestrator;
pub mod scheduler;
pub mod storage;
pub mod types;

pub use app::Service;
pub use orchestrator::{Orchestrator, OrchestratorSettings, OrderState, Outcome, RequestStatus};
pub use types::{CertificateRequest, DomainSet, IssuedCertificate};
