//! Account state persisted in the configured account directory.
//!
//! # Directory Structure
//!
//! ```text
//! <dir>/
//! ├── credentials.json      # ACME account credentials (opaque, serialized)
//! └── account.json          # Account metadata (directory URL, creation time)
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use super::error::StorageError;
use crate::storage::write_atomic;

const CREDENTIALS_FILE: &str = "credentials.json";
const ACCOUNT_FILE: &str = "account.json";

/// Metadata stored next to the credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredAccount {
    /// Account URL assigned by the issuance service
    pub account_url: String,
    /// Directory URL the account was registered with
    pub directory: String,
    /// When the account was created
    pub created: DateTime<Utc>,
}

/// Filesystem storage for account credentials.
#[derive(Debug)]
pub struct AccountStore {
    base_path: PathBuf,
}

impl AccountStore {
    /// Open the account directory, creating it with mode 0700 when missing.
    pub fn new(base_path: &Path) -> Result<Self, StorageError> {
        fs::create_dir_all(base_path)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(base_path, fs::Permissions::from_mode(0o700))?;
        }

        debug!(path = %base_path.display(), "Opened account directory");

        Ok(Self {
            base_path: base_path.to_path_buf(),
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Load raw credentials JSON, `None` when the account was never
    /// registered or its key was lost.
    pub fn load_credentials_json(&self) -> Result<Option<String>, StorageError> {
        let path = self.base_path.join(CREDENTIALS_FILE);

        if !path.exists() {
            trace!("No stored account credentials found");
            return Ok(None);
        }

        let content = fs::read_to_string(&path)?;
        debug!("Loaded account credentials");
        Ok(Some(content))
    }

    /// Save raw credentials JSON with mode 0600.
    pub fn save_credentials_json(&self, json: &str) -> Result<(), StorageError> {
        write_atomic(&self.base_path.join(CREDENTIALS_FILE), json.as_bytes(), 0o600)?;
        info!("Saved account credentials");
        Ok(())
    }

    pub fn load_account(&self) -> Result<Option<StoredAccount>, StorageError> {
        let path = self.base_path.join(ACCOUNT_FILE);
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path)?;
        match serde_json::from_str(&content) {
            Ok(account) => Ok(Some(account)),
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable account metadata");
                Ok(None)
            }
        }
    }

    pub fn save_account(&self, account: &StoredAccount) -> Result<(), StorageError> {
        let content = serde_json::to_string_pretty(account)?;
        write_atomic(&self.base_path.join(ACCOUNT_FILE), content.as_bytes(), 0o600)?;
        info!(account_url = %account.account_url, "Saved account metadata");
        Ok(())
    }
}
