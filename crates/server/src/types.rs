//! Request and certificate types shared by the orchestrator, the stores and
//! the management API.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The identifier set was empty or contained a malformed name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidDomain {
    #[error("no domains given")]
    Empty,
    #[error("invalid domain name '{0}'")]
    Malformed(String),
}

/// Normalized, ordered set of DNS identifiers.
///
/// Names are lower-cased and stripped of a trailing dot, so two requests for
/// the same names in a different order or spelling compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct DomainSet(BTreeSet<String>);

impl DomainSet {
    pub fn new<I, S>(domains: I) -> Result<Self, InvalidDomain>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = BTreeSet::new();
        for domain in domains {
            set.insert(normalize(domain.as_ref())?);
        }
        if set.is_empty() {
            return Err(InvalidDomain::Empty);
        }
        Ok(Self(set))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, domain: &str) -> bool {
        self.0.contains(domain)
    }

    /// First non-wildcard name, used for file names and log lines.
    pub fn primary(&self) -> &str {
        self.iter()
            .find(|d| !d.starts_with("*."))
            .or_else(|| self.iter().next())
            .unwrap_or_default()
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.0.iter().cloned().collect()
    }
}

impl std::fmt::Display for DomainSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let joined: Vec<&str> = self.iter().collect();
        f.write_str(&joined.join(","))
    }
}

impl TryFrom<Vec<String>> for DomainSet {
    type Error = InvalidDomain;

    fn try_from(value: Vec<String>) -> Result<Self, Self::Error> {
        DomainSet::new(value)
    }
}

impl From<DomainSet> for Vec<String> {
    fn from(value: DomainSet) -> Self {
        value.0.into_iter().collect()
    }
}

fn normalize(domain: &str) -> Result<String, InvalidDomain> {
    let name = domain.trim().trim_end_matches('.').to_ascii_lowercase();
    let malformed = || InvalidDomain::Malformed(domain.to_string());

    let bare = name.strip_prefix("*.").unwrap_or(&name);
    if bare.is_empty() || bare.len() > 253 {
        return Err(malformed());
    }
    for label in bare.split('.') {
        let valid = !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        if !valid {
            return Err(malformed());
        }
    }

    Ok(name)
}

/// One issuance or renewal request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateRequest {
    pub domains: DomainSet,
    /// Verification name; `None` selects the configured default
    pub validator: Option<String>,
    /// Storage name; `None` selects the configured default
    pub storage: Option<String>,
    /// DER-encoded CSR supplied by the caller. Without one a key pair and
    /// CSR are generated for the identifier set.
    pub csr: Option<Vec<u8>>,
    /// Issue a new certificate even when the store holds a fresh one
    pub force_renewal: bool,
}

impl CertificateRequest {
    pub fn new(domains: DomainSet) -> Self {
        Self {
            domains,
            validator: None,
            storage: None,
            csr: None,
            force_renewal: false,
        }
    }

    pub fn with_validator(mut self, validator: Option<String>) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_storage(mut self, storage: Option<String>) -> Self {
        self.storage = storage;
        self
    }

    pub fn with_csr(mut self, csr_der: Vec<u8>) -> Self {
        self.csr = Some(csr_der);
        self
    }

    pub fn with_force_renewal(mut self, force: bool) -> Self {
        self.force_renewal = force;
        self
    }
}

/// A certificate obtained from the issuance service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCertificate {
    pub domains: DomainSet,
    /// PEM-encoded chain, leaf first
    pub chain_pem: String,
    /// PEM-encoded private key; absent when the caller supplied the CSR
    pub key_pem: Option<String>,
    pub not_after: DateTime<Utc>,
    /// Hex SHA-256 of the caller-supplied CSR the certificate was issued for
    pub csr_digest: Option<String>,
}
