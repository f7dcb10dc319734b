//! Challenge responders
//!
//! A responder publishes the proof for one challenge kind:
//!
//! - [`Http01Responder`] serves key authorizations below
//!   `/.well-known/acme-challenge/` on its own listeners
//! - [`DnsUpdateResponder`] publishes `_acme-challenge` TXT records through
//!   RFC 2136 dynamic updates
//!
//! Responders are built once from the `[verification "<name>"]` sections.
//! HTTP-01 listeners are bound while building, so a bind failure stops the
//! process before any certificate work starts.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use macen_config::{VerificationConfig, VerificationKind};

mod dns01;
mod http01;

pub use dns01::{txt_record_name, txt_record_value, DnsUpdateResponder};
pub use http01::{ChallengeTokens, Http01Responder, ACME_CHALLENGE_PREFIX};

use crate::acme::{Challenge, ChallengeError, ChallengeKind};

/// Publishes and withdraws challenge proofs.
#[async_trait]
pub trait ChallengeResponder: Send + Sync {
    /// Verification name from the configuration
    fn name(&self) -> &str;

    /// The challenge kind this responder answers
    fn kind(&self) -> ChallengeKind;

    /// Publish the proof for `challenge`. Returns once the issuance service
    /// may validate it.
    async fn prepare(&self, domain: &str, challenge: &Challenge) -> Result<(), ChallengeError>;

    /// Withdraw the proof. Failures are logged and never fail the order.
    async fn cleanup(&self, domain: &str, challenge: &Challenge);
}

/// Build the responder for one verification section.
pub fn build_responder(
    config: &VerificationConfig,
    shutdown: &CancellationToken,
) -> Result<Arc<dyn ChallengeResponder>, ChallengeError> {
    Ok(match &config.kind {
        VerificationKind::Http01(http) => Arc::new(Http01Responder::bind(
            &config.name,
            &http.listeners,
            shutdown.clone(),
        )?),
        VerificationKind::Dns01DnsUpdate(dns) => Arc::new(DnsUpdateResponder::new(&config.name, dns)),
    })
}

/// Build every configured responder, keyed by verification name.
pub fn build_responders(
    configs: &[VerificationConfig],
    shutdown: &CancellationToken,
) -> Result<HashMap<String, Arc<dyn ChallengeResponder>>, ChallengeError> {
    configs
        .iter()
        .map(|c| Ok((c.name.clone(), build_responder(c, shutdown)?)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use macen_config::{DnsUpdateConfig, Http01Config};

    #[tokio::test]
    async fn test_build_responders() {
        let shutdown = CancellationToken::new();
        let responders = build_responders(
            &[
                VerificationConfig {
                    name: "web".into(),
                    kind: VerificationKind::Http01(Http01Config {
                        listeners: vec!["127.0.0.1:0".into()],
                    }),
                },
                VerificationConfig {
                    name: "dns".into(),
                    kind: VerificationKind::Dns01DnsUpdate(DnsUpdateConfig::default()),
                },
            ],
            &shutdown,
        )
        .unwrap();

        assert_eq!(responders["web"].kind(), ChallengeKind::Http01);
        assert_eq!(responders["dns"].kind(), ChallengeKind::Dns01);
        assert_eq!(responders["dns"].name(), "dns");
        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_bind_failure_is_reported() {
        let shutdown = CancellationToken::new();
        let result = build_responder(
            &VerificationConfig {
                name: "web".into(),
                kind: VerificationKind::Http01(Http01Config {
                    listeners: vec!["[fe80::1%no-such-interface0]:80".into()],
                }),
            },
            &shutdown,
        );
        assert!(matches!(result, Err(ChallengeError::Bind { .. })));
    }
}
