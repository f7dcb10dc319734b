//! Certificate stores
//!
//! A [`CertificateStore`] persists issued certificates and keys. Stores are
//! built once from the `[storage "<name>"]` sections and never change while
//! the process runs.

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use macen_config::{StorageConfig, StorageKind};

mod file;
mod none;

pub use file::FileStore;
pub use none::NoneStore;

use crate::acme::StorageError;
use crate::types::{DomainSet, IssuedCertificate};

/// Summary of one stored artifact, used by the renewal scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSummary {
    pub domains: DomainSet,
    pub not_after: DateTime<Utc>,
}

/// Persistence for issued certificates.
///
/// Saving the same certificate twice produces byte-identical artifacts.
#[async_trait]
pub trait CertificateStore: Send + Sync {
    /// Persist `certificate`, replacing any artifact for the same domain
    /// set.
    async fn save(&self, certificate: &IssuedCertificate) -> Result<(), StorageError>;

    /// Most recently saved artifact for exactly `domains`.
    async fn load(&self, domains: &DomainSet) -> Result<Option<IssuedCertificate>, StorageError>;

    /// Every stored artifact.
    async fn list(&self) -> Result<Vec<StoredSummary>, StorageError>;
}

/// Build a store for one storage section.
pub fn build_store(config: &StorageConfig) -> Result<Arc<dyn CertificateStore>, StorageError> {
    debug!(
        storage = %config.name,
        kind = config.kind.type_name(),
        "Building certificate store"
    );
    Ok(match &config.kind {
        StorageKind::None => Arc::new(NoneStore::new(&config.name)),
        StorageKind::File(file) => Arc::new(FileStore::new(&config.name, &file.directory)?),
    })
}

/// Build every configured store, keyed by name.
pub fn build_stores(
    configs: &[StorageConfig],
) -> Result<HashMap<String, Arc<dyn CertificateStore>>, StorageError> {
    configs
        .iter()
        .map(|c| Ok((c.name.clone(), build_store(c)?)))
        .collect()
}

/// Replace `path` with `contents` so readers see either the old or the new
/// file, never a partial one. The temporary file lives in the same
/// directory so the final rename stays on one filesystem.
pub(crate) fn write_atomic(path: &Path, contents: &[u8], mode: u32) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::Builder::new()
        .prefix(".macen-")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(tmp.path(), std::fs::Permissions::from_mode(mode))?;
    }
    #[cfg(not(unix))]
    let _ = mode;

    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use macen_config::FileStorageConfig;
    use tempfile::TempDir;

    #[test]
    fn test_write_atomic_replaces_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("artifact");
        write_atomic(&path, b"first", 0o600).unwrap();
        write_atomic(&path, b"second", 0o600).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"second");

        // No temporary files are left behind
        let entries: Vec<_> = std::fs::read_dir(temp.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_build_stores() {
        let temp = TempDir::new().unwrap();
        let stores = build_stores(&[
            StorageConfig::builtin_none(),
            StorageConfig {
                name: "files".into(),
                kind: StorageKind::File(FileStorageConfig {
                    directory: temp.path().join("certs"),
                }),
            },
        ])
        .unwrap();

        assert_eq!(stores.len(), 2);
        assert!(temp.path().join("certs").is_dir());
        assert!(stores["none"].list().await.unwrap().is_empty());
    }
}
