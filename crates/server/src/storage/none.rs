//! Store that discards everything.

use async_trait::async_trait;
use tracing::debug;

use super::{CertificateStore, StoredSummary};
use crate::acme::StorageError;
use crate::types::{DomainSet, IssuedCertificate};

/// `type = none`: accepts certificates and forgets them.
#[derive(Debug, Clone)]
pub struct NoneStore {
    name: String,
}

impl NoneStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl CertificateStore for NoneStore {
    async fn save(&self, certificate: &IssuedCertificate) -> Result<(), StorageError> {
        debug!(
            storage = %self.name,
            domains = %certificate.domains,
            "Discarding certificate"
        );
        Ok(())
    }

    async fn load(&self, _domains: &DomainSet) -> Result<Option<IssuedCertificate>, StorageError> {
        Ok(None)
    }

    async fn list(&self) -> Result<Vec<StoredSummary>, StorageError> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_save_then_load_finds_nothing() {
        let store = NoneStore::new("none");
        let domains = DomainSet::new(["example.com"]).unwrap();
        store
            .save(&IssuedCertificate {
                domains: domains.clone(),
                chain_pem: "chain".into(),
                key_pem: None,
                not_after: Utc::now(),
                csr_digest: None,
            })
            .await
            .unwrap();
        assert!(store.load(&domains).await.unwrap().is_none());
        assert!(store.list().await.unwrap().is_empty());
    }
}
