//! Process wiring
//!
//! Startup order: account, challenge responders (binding the HTTP-01
//! listeners), certificate stores, orchestrator, management listener,
//! renewal scheduler. Any failure before the management listener is bound
//! aborts startup.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use macen_config::Config;

use crate::acme::{AcmeClient, AcmeService};
use crate::challenge::build_responders;
use crate::mgmt::ManagementListener;
use crate::orchestrator::{Orchestrator, OrchestratorSettings};
use crate::scheduler::RenewalScheduler;
use crate::storage::build_stores;

/// How long shutdown waits for running requests to clean up
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// A running service.
#[derive(Debug)]
pub struct Service {
    orchestrator: Arc<Orchestrator>,
    mgmt: ManagementListener,
    scheduler: Option<JoinHandle<()>>,
    shutdown: CancellationToken,
}

impl Service {
    /// Start against the configured issuance service.
    pub async fn start(config: &Config, shutdown: CancellationToken) -> Result<Self> {
        let client = AcmeClient::new(config.account.clone()).with_context(|| {
            format!(
                "failed to open account directory {}",
                config.account.dir.display()
            )
        })?;
        Self::start_with(config, Arc::new(client), OrchestratorSettings::default(), shutdown).await
    }

    /// Start with an explicit issuance service and orchestrator settings.
    ///
    /// The reuse window always follows `[renewal] renew-before-days`.
    pub async fn start_with(
        config: &Config,
        acme: Arc<dyn AcmeService>,
        settings: OrchestratorSettings,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        acme.ensure_account()
            .await
            .context("failed to register or restore the account")?;

        let responders =
            build_responders(&config.validators, &shutdown).context("failed to start challenge responders")?;
        let stores = build_stores(&config.storages).context("failed to open certificate stores")?;

        let settings = OrchestratorSettings {
            renew_before: Duration::from_secs(u64::from(config.renewal.renew_before_days) * 86_400),
            ..settings
        };
        let orchestrator = Arc::new(
            Orchestrator::new(acme, shutdown.clone())
                .with_responders(responders, config.default_validator.clone())
                .with_stores(stores, config.default_storage.clone())
                .with_settings(settings),
        );

        let mgmt = ManagementListener::bind(&config.mgmt, Arc::clone(&orchestrator), shutdown.clone())
            .context("failed to bind management listener")?;

        let scheduler = config.renewal.enabled.then(|| {
            let scheduler = RenewalScheduler::new(Arc::clone(&orchestrator), shutdown.clone())
                .with_config(&config.renewal);
            tokio::spawn(scheduler.run())
        });

        info!(
            validators = config.validators.len(),
            default_validator = ?config.default_validator,
            storages = config.storages.len(),
            default_storage = ?config.default_storage,
            renewal = config.renewal.enabled,
            "Service started"
        );

        Ok(Self {
            orchestrator,
            mgmt,
            scheduler,
            shutdown,
        })
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    pub fn mgmt_addrs(&self) -> &[SocketAddr] {
        self.mgmt.local_addrs()
    }

    /// Wait for the shutdown token, then for the scheduler and the running
    /// requests to stop.
    pub async fn run_until_shutdown(self) {
        self.shutdown.cancelled().await;
        info!("Shutting down");
        if let Some(scheduler) = self.scheduler {
            let _ = scheduler.await;
        }
        if !self.orchestrator.drain(SHUTDOWN_GRACE).await {
            warn!(grace_secs = SHUTDOWN_GRACE.as_secs(), "Certificate requests still running at shutdown");
        }
    }
}
