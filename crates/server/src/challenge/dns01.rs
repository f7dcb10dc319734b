//! DNS-01 challenge responder using RFC 2136 dynamic updates.
//!
//! The zone receiving the update is discovered by asking the configured
//! server for the SOA of the challenge record's parent name.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hickory_client::client::{AsyncClient, ClientHandle};
use hickory_client::op::ResponseCode;
use hickory_client::rr::rdata::TXT;
use hickory_client::rr::{DNSClass, Name, RData, Record, RecordType};
use hickory_client::udp::UdpClientStream;
use sha2::{Digest, Sha256};
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use macen_config::DnsUpdateConfig;

use super::ChallengeResponder;
use crate::acme::{Challenge, ChallengeError, ChallengeKind};

const CHALLENGE_LABEL: &str = "_acme-challenge";

/// Fully qualified name of the TXT record for `domain`.
///
/// Wildcard identifiers are validated at their base name.
pub fn txt_record_name(domain: &str) -> String {
    let base = domain.strip_prefix("*.").unwrap_or(domain);
    format!("{CHALLENGE_LABEL}.{}.", base.trim_end_matches('.'))
}

/// TXT record content: base64url(SHA-256(key authorization)), unpadded.
pub fn txt_record_value(key_authorization: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(key_authorization.as_bytes()))
}

/// `type = dns01-dnsUpdate`
#[derive(Debug, Clone)]
pub struct DnsUpdateResponder {
    name: String,
    server: SocketAddr,
    timeout: Duration,
    ttl: u32,
}

impl DnsUpdateResponder {
    pub fn new(name: &str, config: &DnsUpdateConfig) -> Self {
        Self {
            name: name.to_string(),
            server: config.dns_server,
            timeout: Duration::from_secs(config.timeout_secs),
            ttl: config.ttl,
        }
    }

    async fn connect(&self) -> Result<AsyncClient, String> {
        // The per-message timeout is longer than ours so the caller's
        // deadline decides
        let stream =
            UdpClientStream::<UdpSocket>::with_timeout(self.server, self.timeout + Duration::from_secs(1));
        let (client, background) = AsyncClient::connect(stream)
            .await
            .map_err(|e| e.to_string())?;
        tokio::spawn(background);
        Ok(client)
    }

    fn record(&self, domain: &str, challenge: &Challenge) -> Result<Record, String> {
        let name = Name::from_str(&txt_record_name(domain)).map_err(|e| e.to_string())?;
        let value = txt_record_value(&challenge.key_authorization);
        Ok(Record::from_rdata(name, self.ttl, RData::TXT(TXT::new(vec![value]))))
    }

    /// Zone that contains `record_name`, from the SOA in the answer or
    /// authority section.
    async fn find_zone(client: &mut AsyncClient, record_name: &Name) -> Result<Name, String> {
        let parent = record_name.base_name();
        let response = client
            .query(parent.clone(), DNSClass::IN, RecordType::SOA)
            .await
            .map_err(|e| e.to_string())?;

        response
            .answers()
            .iter()
            .chain(response.name_servers())
            .find(|r| r.record_type() == RecordType::SOA)
            .map(|r| r.name().clone())
            .ok_or_else(|| format!("no SOA found for {parent}"))
    }

    async fn publish(&self, domain: &str, challenge: &Challenge) -> Result<(), String> {
        let record = self.record(domain, challenge)?;
        let mut client = self.connect().await?;
        let zone = Self::find_zone(&mut client, record.name()).await?;

        debug!(
            verification = %self.name,
            record = %record.name(),
            zone = %zone,
            server = %self.server,
            "Sending DNS update"
        );

        let response = client
            .append(record, zone, false)
            .await
            .map_err(|e| e.to_string())?;
        match response.response_code() {
            ResponseCode::NoError => Ok(()),
            code => Err(format!("server answered {code}")),
        }
    }

    async fn withdraw(&self, domain: &str, challenge: &Challenge) -> Result<(), String> {
        let record = self.record(domain, challenge)?;
        let mut client = self.connect().await?;
        let zone = Self::find_zone(&mut client, record.name()).await?;

        let response = client
            .delete_by_rdata(record, zone)
            .await
            .map_err(|e| e.to_string())?;
        match response.response_code() {
            ResponseCode::NoError => Ok(()),
            code => Err(format!("server answered {code}")),
        }
    }
}

#[async_trait]
impl ChallengeResponder for DnsUpdateResponder {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ChallengeKind {
        ChallengeKind::Dns01
    }

    async fn prepare(&self, domain: &str, challenge: &Challenge) -> Result<(), ChallengeError> {
        match tokio::time::timeout(self.timeout, self.publish(domain, challenge)).await {
            Ok(Ok(())) => {
                info!(
                    verification = %self.name,
                    domain = %domain,
                    record = %txt_record_name(domain),
                    "Published DNS-01 record"
                );
                Ok(())
            }
            Ok(Err(message)) => Err(ChallengeError::DnsUpdate {
                domain: domain.to_string(),
                message,
            }),
            Err(_) => Err(ChallengeError::DnsTimeout {
                domain: domain.to_string(),
                timeout: self.timeout,
            }),
        }
    }

    async fn cleanup(&self, domain: &str, challenge: &Challenge) {
        match tokio::time::timeout(self.timeout, self.withdraw(domain, challenge)).await {
            Ok(Ok(())) => {
                debug!(verification = %self.name, domain = %domain, "Removed DNS-01 record");
            }
            Ok(Err(e)) => {
                warn!(verification = %self.name, domain = %domain, error = %e, "Failed to remove DNS-01 record");
            }
            Err(_) => {
                warn!(verification = %self.name, domain = %domain, timeout = ?self.timeout, "Removing DNS-01 record timed out");
            }
        }
    }
}
