//! Key, CSR and certificate helpers.

use chrono::{DateTime, Utc};
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
use sha2::{Digest, Sha256};
use thiserror::Error;
use x509_parser::certification_request::X509CertificationRequest;
use x509_parser::extensions::{GeneralName, ParsedExtension};
use x509_parser::pem::parse_x509_pem;
use x509_parser::prelude::FromDer;

use crate::types::{DomainSet, InvalidDomain};

const CSR_LABELS: [&str; 2] = ["CERTIFICATE REQUEST", "NEW CERTIFICATE REQUEST"];

#[derive(Debug, Error)]
pub enum CertError {
    #[error("failed to generate key or CSR: {0}")]
    Generate(#[from] rcgen::Error),

    #[error("invalid PEM: {0}")]
    Pem(String),

    #[error("invalid certificate: {0}")]
    Certificate(String),

    #[error("invalid CSR: {0}")]
    Csr(String),

    #[error("CSR names no usable domain: {0}")]
    Domains(#[from] InvalidDomain),
}

/// A generated private key with a matching CSR.
#[derive(Debug, Clone)]
pub struct KeyAndCsr {
    pub key_pem: String,
    pub csr_der: Vec<u8>,
}

/// Generate a fresh key pair and a CSR covering every name in `domains`.
pub fn generate_key_and_csr(domains: &DomainSet) -> Result<KeyAndCsr, CertError> {
    let key = KeyPair::generate()?;
    let mut params = CertificateParams::new(domains.to_vec())?;
    let mut name = DistinguishedName::new();
    name.push(DnType::CommonName, domains.primary());
    params.distinguished_name = name;

    let csr = params.serialize_request(&key)?;
    Ok(KeyAndCsr {
        key_pem: key.serialize_pem(),
        csr_der: csr.der().to_vec(),
    })
}

/// Hex SHA-256 of a DER-encoded CSR, used to recognize repeated requests.
pub fn csr_digest(csr_der: &[u8]) -> String {
    hex::encode(Sha256::digest(csr_der))
}

/// Expiry of the first (leaf) certificate in a PEM chain.
pub fn chain_not_after(chain_pem: &str) -> Result<DateTime<Utc>, CertError> {
    let (_, pem) = parse_x509_pem(chain_pem.as_bytes()).map_err(|e| CertError::Pem(e.to_string()))?;
    let cert = pem
        .parse_x509()
        .map_err(|e| CertError::Certificate(e.to_string()))?;

    let timestamp = cert.validity().not_after.timestamp();
    DateTime::from_timestamp(timestamp, 0)
        .ok_or_else(|| CertError::Certificate(format!("notAfter {timestamp} out of range")))
}

/// Identifier set and DER bytes of a PEM-encoded CSR.
///
/// Names come from the subject common name and the DNS entries of the
/// subjectAltName extension.
pub fn parse_csr_pem(csr_pem: &[u8]) -> Result<(DomainSet, Vec<u8>), CertError> {
    let (_, pem) = parse_x509_pem(csr_pem).map_err(|e| CertError::Pem(e.to_string()))?;
    if !CSR_LABELS.contains(&pem.label.as_str()) {
        return Err(CertError::Pem(format!("unexpected PEM label '{}'", pem.label)));
    }

    let (_, csr) = X509CertificationRequest::from_der(&pem.contents)
        .map_err(|e| CertError::Csr(e.to_string()))?;

    let info = &csr.certification_request_info;
    let mut names: Vec<String> = info
        .subject
        .iter_common_name()
        .filter_map(|cn| cn.as_str().ok())
        .map(str::to_string)
        .collect();

    if let Some(extensions) = csr.requested_extensions() {
        for extension in extensions {
            if let ParsedExtension::SubjectAlternativeName(san) = extension {
                names.extend(san.general_names.iter().filter_map(|n| match n {
                    GeneralName::DNSName(dns) => Some(dns.to_string()),
                    _ => None,
                }));
            }
        }
    }

    Ok((DomainSet::new(names)?, pem.contents.clone()))
}
