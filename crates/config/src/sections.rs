//! `[account]`, `[mgmt]` and `[renewal]` sections.

use std::path::PathBuf;

use tracing::trace;

use crate::error::ConfigError;
use crate::options::SectionOptions;

/// Directory URL used when `acme-server` is not configured.
pub const DEFAULT_ACME_SERVER: &str = "https://acme-staging-v02.api.letsencrypt.org/directory";

/// Management listeners used when `[mgmt]` has no `listener` option.
pub const DEFAULT_MGMT_LISTENERS: [&str; 2] = ["127.0.0.1:1313", "[::1]:1313"];

/// Request body ceiling used when `max-size` is not configured.
pub const DEFAULT_MAX_SIZE: u64 = 4096;

/// Issuance service account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountConfig {
    /// Local directory holding the account key and registration state
    pub dir: PathBuf,
    /// Directory URL of the issuance service
    pub acme_server: String,
    /// Whether the operator agreed to the service's terms
    pub accept_terms_of_service: bool,
}

impl AccountConfig {
    pub(crate) fn parse(opts: &mut SectionOptions) -> Result<Self, ConfigError> {
        let dir = PathBuf::from(opts.required("dir")?);

        let acme_server = match opts.single("acme-server")? {
            Some(value) => {
                url::Url::parse(&value)
                    .map_err(|e| opts.invalid("acme-server", &value, e.to_string()))?;
                value
            }
            None => DEFAULT_ACME_SERVER.to_string(),
        };

        let accept_terms_of_service = opts.bool("accept-terms-of-service", false)?;

        trace!(
            dir = %dir.display(),
            acme_server = %acme_server,
            accept_terms_of_service,
            "Parsed account section"
        );

        Ok(Self {
            dir,
            acme_server,
            accept_terms_of_service,
        })
    }
}

/// Management listener settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MgmtConfig {
    /// Listener addresses, kept verbatim in declaration order
    pub listeners: Vec<String>,
    /// Maximum request body size in bytes
    pub max_size: u64,
}

impl Default for MgmtConfig {
    fn default() -> Self {
        Self {
            listeners: DEFAULT_MGMT_LISTENERS.iter().map(|s| s.to_string()).collect(),
            max_size: DEFAULT_MAX_SIZE,
        }
    }
}

/// Raw `default-*` selections from `[mgmt]`; resolved once every section is
/// known.
#[derive(Debug, Default)]
pub(crate) struct DefaultOptions {
    pub(crate) verification: Option<String>,
    pub(crate) storage: Option<String>,
}

impl MgmtConfig {
    pub(crate) fn parse(opts: &mut SectionOptions) -> Result<(Self, DefaultOptions), ConfigError> {
        let mut listeners = opts.multi("listener");
        if listeners.is_empty() {
            listeners = MgmtConfig::default().listeners;
        }

        let max_size = opts.size("max-size", DEFAULT_MAX_SIZE)?;

        let defaults = DefaultOptions {
            verification: opts.single("default-verification")?,
            storage: opts.single("default-storage")?,
        };

        trace!(
            listeners = ?listeners,
            max_size,
            "Parsed mgmt section"
        );

        Ok((
            Self {
                listeners,
                max_size,
            },
            defaults,
        ))
    }
}

/// Background renewal settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenewalConfig {
    pub enabled: bool,
    /// Seconds between two renewal checks
    pub interval_secs: u64,
    /// Renew certificates expiring within this many days
    pub renew_before_days: u32,
}

impl Default for RenewalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 12 * 3600,
            renew_before_days: 30,
        }
    }
}

impl RenewalConfig {
    pub(crate) fn parse(opts: &mut SectionOptions) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let enabled = opts.bool("enabled", defaults.enabled)?;
        let interval_secs = opts.u64("interval", defaults.interval_secs)?;
        let days = opts.u64("renew-before-days", u64::from(defaults.renew_before_days))?;
        let renew_before_days = u32::try_from(days)
            .map_err(|_| opts.invalid("renew-before-days", &days.to_string(), "too large"))?;

        Ok(Self {
            enabled,
            interval_secs,
            renew_before_days,
        })
    }
}
