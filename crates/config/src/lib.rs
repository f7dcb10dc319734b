//! Macen configuration
//!
//! Parses the section-based configuration document into an immutable
//! wiring description: the issuance account, the management listener,
//! the named challenge verifications and the named certificate storages,
//! each with at most one default.
//!
//! # Example
//!
//! ```text
//! [account]
//! dir = /var/lib/macen
//! acme-server = https://acme-v02.api.letsencrypt.org/directory
//! accept-terms-of-service = yes
//!
//! [mgmt]
//! listener = 127.0.0.1:1313
//! max-size = 4k
//! default-verification = http
//!
//! [verification "http"]
//! type = http01
//! listener = 0.0.0.0:80
//!
//! [storage "files"]
//! type = file
//! directory = /var/lib/macen/certs
//! ```
//!
//! Parsing never emits diagnostics itself: non-fatal findings are returned
//! as [`ConfigWarning`]s next to the [`Config`].

use std::path::Path;

use tracing::{debug, trace};

pub mod defaults;
mod document;
mod error;
mod options;
mod sections;
mod storage;
pub mod values;
mod verification;

pub use defaults::{resolve_default, DefaultChoice};
pub use error::{ConfigError, ConfigWarning};
pub use sections::{
    AccountConfig, MgmtConfig, RenewalConfig, DEFAULT_ACME_SERVER, DEFAULT_MAX_SIZE,
    DEFAULT_MGMT_LISTENERS,
};
pub use storage::{FileStorageConfig, StorageConfig, StorageKind, BUILTIN_NONE_NAME};
pub use verification::{
    DnsUpdateConfig, Http01Config, VerificationConfig, VerificationKind, BUILTIN_HTTP01_NAME,
    DEFAULT_HTTP01_LISTENERS,
};

use document::Document;
use options::SectionOptions;
use sections::DefaultOptions;

/// Fully resolved service wiring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub account: AccountConfig,
    pub mgmt: MgmtConfig,
    pub renewal: RenewalConfig,
    /// Verifications in declaration order
    pub validators: Vec<VerificationConfig>,
    /// Name of the default verification, if any
    pub default_validator: Option<String>,
    /// Storages in declaration order
    pub storages: Vec<StorageConfig>,
    /// Name of the default storage, if any
    pub default_storage: Option<String>,
}

/// A parsed configuration together with its warnings.
#[derive(Debug, Clone)]
pub struct ParsedConfig {
    pub config: Config,
    pub warnings: Vec<ConfigWarning>,
}

impl Config {
    /// Load and parse a configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<ParsedConfig, ConfigError> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Loading configuration file");
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::parse(&content)
    }

    /// Parse a configuration document.
    pub fn parse(input: &str) -> Result<ParsedConfig, ConfigError> {
        let document = Document::parse(input)?;
        let mut warnings = Vec::new();

        for option in document.general {
            warnings.push(ConfigWarning::UnusedOption {
                section: None,
                option: option.key,
                value: option.value,
                line: option.line,
            });
        }

        let mut account = None;
        let mut mgmt = None;
        let mut renewal = None;
        let mut defaults = DefaultOptions::default();
        let mut validators: Vec<VerificationConfig> = Vec::new();
        let mut storages: Vec<StorageConfig> = Vec::new();

        for section in document.sections {
            let header = section.header;
            let mut opts = SectionOptions::new(header.to_string(), section.options);

            match (header.kind.as_str(), header.argument.as_deref()) {
                ("account", None) => account = Some(AccountConfig::parse(&mut opts)?),
                ("mgmt", None) => {
                    let (parsed, selected) = MgmtConfig::parse(&mut opts)?;
                    mgmt = Some(parsed);
                    defaults = selected;
                }
                ("renewal", None) => renewal = Some(RenewalConfig::parse(&mut opts)?),
                ("verification", Some(name)) => {
                    validators.push(VerificationConfig::parse(name, &mut opts)?);
                }
                ("storage", Some(name)) => {
                    storages.push(StorageConfig::parse(name, &mut opts)?);
                }
                _ => {
                    trace!(section = %header, "Unknown section");
                    warnings.push(ConfigWarning::UnusedSection {
                        section: header.to_string(),
                    });
                    continue;
                }
            }

            opts.finish(&mut warnings);
        }

        let account = account.ok_or_else(|| ConfigError::MissingOption {
            section: "[account]".to_string(),
            option: "dir".to_string(),
        })?;

        let default_validator = {
            let names: Vec<&str> = validators.iter().map(|v| v.name.as_str()).collect();
            match resolve_default(
                "default-verification",
                "verification",
                defaults.verification.as_deref(),
                &names,
            )? {
                DefaultChoice::NoEntries => {
                    let builtin = VerificationConfig::builtin_http();
                    let name = builtin.name.clone();
                    validators.push(builtin);
                    Some(name)
                }
                choice => choice.name().map(str::to_string),
            }
        };

        let default_storage = {
            let names: Vec<&str> = storages.iter().map(|s| s.name.as_str()).collect();
            match resolve_default(
                "default-storage",
                "storage",
                defaults.storage.as_deref(),
                &names,
            )? {
                DefaultChoice::NoEntries => {
                    let builtin = StorageConfig::builtin_none();
                    let name = builtin.name.clone();
                    storages.push(builtin);
                    Some(name)
                }
                choice => choice.name().map(str::to_string),
            }
        };

        let config = Config {
            account,
            mgmt: mgmt.unwrap_or_default(),
            renewal: renewal.unwrap_or_default(),
            validators,
            default_validator,
            storages,
            default_storage,
        };

        debug!(
            validators = config.validators.len(),
            default_validator = ?config.default_validator,
            storages = config.storages.len(),
            default_storage = ?config.default_storage,
            warnings = warnings.len(),
            "Configuration parsed"
        );

        Ok(ParsedConfig { config, warnings })
    }

    /// Look up a verification by name.
    pub fn validator(&self, name: &str) -> Option<&VerificationConfig> {
        self.validators.iter().find(|v| v.name == name)
    }

    /// The default verification, if one is selected.
    pub fn default_validator(&self) -> Option<&VerificationConfig> {
        self.default_validator
            .as_deref()
            .and_then(|name| self.validator(name))
    }

    /// Look up a storage by name.
    pub fn storage(&self, name: &str) -> Option<&StorageConfig> {
        self.storages.iter().find(|s| s.name == name)
    }

    /// The default storage, if one is selected.
    pub fn default_storage(&self) -> Option<&StorageConfig> {
        self.default_storage
            .as_deref()
            .and_then(|name| self.storage(name))
    }
}
