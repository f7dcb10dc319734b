//! `[verification "<name>"]` sections.

use std::net::{IpAddr, SocketAddr};

use crate::error::ConfigError;
use crate::options::SectionOptions;

/// HTTP-01 listeners used when a verification section has none.
pub const DEFAULT_HTTP01_LISTENERS: [&str; 2] = ["0.0.0.0:1380", "[::]:1380"];

/// Name given to the built-in HTTP-01 verification.
pub const BUILTIN_HTTP01_NAME: &str = "http";

pub const DEFAULT_DNS_SERVER: IpAddr = IpAddr::V4(std::net::Ipv4Addr::LOCALHOST);
pub const DEFAULT_DNS_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_DNS_TTL: u32 = 60;

/// A named challenge responder configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationConfig {
    pub name: String,
    pub kind: VerificationKind,
}

/// Responder variants selected by the section's `type` option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationKind {
    /// `type = http01`
    Http01(Http01Config),
    /// `type = dns01-dnsUpdate`
    Dns01DnsUpdate(DnsUpdateConfig),
}

impl VerificationKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            VerificationKind::Http01(_) => "http01",
            VerificationKind::Dns01DnsUpdate(_) => "dns01-dnsUpdate",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Http01Config {
    /// Listener addresses, kept verbatim in declaration order
    pub listeners: Vec<String>,
}

impl Default for Http01Config {
    fn default() -> Self {
        Self {
            listeners: DEFAULT_HTTP01_LISTENERS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsUpdateConfig {
    /// Server receiving the dynamic updates
    pub dns_server: SocketAddr,
    /// Seconds to wait for an update to be acknowledged
    pub timeout_secs: u64,
    /// TTL of the published TXT record
    pub ttl: u32,
}

impl Default for DnsUpdateConfig {
    fn default() -> Self {
        Self {
            dns_server: SocketAddr::new(DEFAULT_DNS_SERVER, 53),
            timeout_secs: DEFAULT_DNS_TIMEOUT_SECS,
            ttl: DEFAULT_DNS_TTL,
        }
    }
}

impl VerificationConfig {
    /// The verification synthesized when no `[verification]` section exists.
    pub fn builtin_http() -> Self {
        Self {
            name: BUILTIN_HTTP01_NAME.to_string(),
            kind: VerificationKind::Http01(Http01Config::default()),
        }
    }

    pub(crate) fn parse(name: &str, opts: &mut SectionOptions) -> Result<Self, ConfigError> {
        let kind_name = opts.required("type")?;
        let kind = match kind_name.as_str() {
            "http01" => {
                let mut listeners = opts.multi("listener");
                if listeners.is_empty() {
                    listeners = Http01Config::default().listeners;
                }
                VerificationKind::Http01(Http01Config { listeners })
            }
            "dns01-dnsUpdate" => {
                let defaults = DnsUpdateConfig::default();
                let dns_server = match opts.single("dns-server")? {
                    Some(value) => parse_server_addr(&value)
                        .ok_or_else(|| opts.invalid("dns-server", &value, "expected an IP address"))?,
                    None => defaults.dns_server,
                };
                let timeout_secs = opts.u64("timeout", defaults.timeout_secs)?;
                let ttl = opts.u64("ttl", u64::from(defaults.ttl))?;
                let ttl = u32::try_from(ttl)
                    .map_err(|_| opts.invalid("ttl", &ttl.to_string(), "too large"))?;
                VerificationKind::Dns01DnsUpdate(DnsUpdateConfig {
                    dns_server,
                    timeout_secs,
                    ttl,
                })
            }
            other => {
                return Err(opts.invalid(
                    "type",
                    other,
                    "supported verification types: http01, dns01-dnsUpdate",
                ))
            }
        };

        Ok(Self {
            name: name.to_string(),
            kind,
        })
    }
}

/// Accepts `1.2.3.4`, `::1`, `1.2.3.4:5353` and `[::1]:5353`. A bare
/// address gets port 53.
fn parse_server_addr(value: &str) -> Option<SocketAddr> {
    if let Ok(addr) = value.parse::<SocketAddr>() {
        return Some(addr);
    }
    value
        .trim_start_matches('[')
        .trim_end_matches(']')
        .parse::<IpAddr>()
        .ok()
        .map(|ip| SocketAddr::new(ip, 53))
}
