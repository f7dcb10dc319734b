//! Background certificate renewal scheduler
//!
//! Periodically lists every certificate store and re-issues certificates
//! that expire within the configured window.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use macen_config::RenewalConfig;

use crate::orchestrator::Orchestrator;
use crate::storage::StoredSummary;
use crate::types::CertificateRequest;

/// Default check interval (12 hours)
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(12 * 3600);

/// Minimum check interval (1 hour)
const MIN_CHECK_INTERVAL: Duration = Duration::from_secs(3600);

/// Delay before the first check after startup
const INITIAL_DELAY: Duration = Duration::from_secs(10);

/// Background certificate renewal scheduler
pub struct RenewalScheduler {
    orchestrator: Arc<Orchestrator>,
    check_interval: Duration,
    initial_delay: Duration,
    renew_before_days: u32,
    shutdown: CancellationToken,
}

/// Results of one renewal pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RenewalReport {
    pub checked: usize,
    pub renewed: usize,
    pub failed: usize,
}

impl RenewalScheduler {
    pub fn new(orchestrator: Arc<Orchestrator>, shutdown: CancellationToken) -> Self {
        Self {
            orchestrator,
            check_interval: DEFAULT_CHECK_INTERVAL,
            initial_delay: INITIAL_DELAY,
            renew_before_days: RenewalConfig::default().renew_before_days,
            shutdown,
        }
    }

    /// Apply the `[renewal]` section.
    pub fn with_config(self, config: &RenewalConfig) -> Self {
        self.with_interval(Duration::from_secs(config.interval_secs))
            .with_renew_before_days(config.renew_before_days)
    }

    /// Set the check interval
    ///
    /// The interval is clamped to a minimum of 1 hour to avoid
    /// excessive polling.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval.max(MIN_CHECK_INTERVAL);
        self
    }

    pub fn with_renew_before_days(mut self, days: u32) -> Self {
        self.renew_before_days = days;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn check_interval(&self) -> Duration {
        self.check_interval
    }

    /// Run until shutdown.
    pub async fn run(self) {
        info!(
            check_interval_hours = self.check_interval.as_secs() / 3600,
            renew_before_days = self.renew_before_days,
            "Starting certificate renewal scheduler"
        );

        tokio::select! {
            _ = self.shutdown.cancelled() => return,
            _ = tokio::time::sleep(self.initial_delay) => {}
        }

        let mut interval = interval(self.check_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }

            debug!("Running scheduled certificate renewal check");
            let report = self.check_renewals().await;
            if report.failed > 0 {
                error!(
                    failed = report.failed,
                    renewed = report.renewed,
                    "Some certificate renewals failed"
                );
            }
        }

        info!("Certificate renewal scheduler stopped");
    }

    /// Check every store once and renew what is due.
    pub async fn check_renewals(&self) -> RenewalReport {
        let mut report = RenewalReport::default();
        let threshold = Utc::now() + chrono::Duration::days(i64::from(self.renew_before_days));

        let mut stores: Vec<_> = self.orchestrator.stores().iter().collect();
        stores.sort_by(|a, b| a.0.cmp(b.0));

        for (storage, store) in stores {
            let stored = match store.list().await {
                Ok(stored) => stored,
                Err(e) => {
                    warn!(storage = %storage, error = %e, "Failed to list stored certificates");
                    continue;
                }
            };

            for StoredSummary { domains, not_after } in stored {
                report.checked += 1;
                if not_after > threshold {
                    debug!(storage = %storage, domains = %domains, not_after = %not_after, "Certificate is still valid");
                    continue;
                }

                if self.shutdown.is_cancelled() {
                    return report;
                }

                info!(storage = %storage, domains = %domains, not_after = %not_after, "Certificate needs renewal");
                let request = CertificateRequest::new(domains.clone())
                    .with_storage(Some(storage.clone()))
                    .with_force_renewal(true);
                match self.orchestrator.issue(request).await {
                    (_, Ok(certificate)) => {
                        report.renewed += 1;
                        info!(
                            storage = %storage,
                            domains = %domains,
                            not_after = %certificate.not_after,
                            "Certificate renewed"
                        );
                    }
                    (_, Err(e)) if e.is_cancelled() => return report,
                    (id, Err(e)) => {
                        // Continue with the other certificates
                        report.failed += 1;
                        error!(
                            request_id = %id,
                            storage = %storage,
                            domains = %domains,
                            error = %e,
                            "Certificate renewal failed"
                        );
                    }
                }
            }
        }

        info!(
            checked = report.checked,
            renewed = report.renewed,
            failed = report.failed,
            "Certificate renewal check finished"
        );
        report
    }
}

impl std::fmt::Debug for RenewalScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenewalScheduler")
            .field("check_interval", &self.check_interval)
            .field("renew_before_days", &self.renew_before_days)
            .finish()
    }
}
