//! Connection Record
//!
//! One observed network event, already parsed by the log source.
//! Every field is optional because upstream log lines are not uniform;
//! rules that need a field report its absence instead of guessing.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::RuleEvaluationError;

// ============================================================================
// PROTOCOL
// ============================================================================

/// Transport protocol.
///
/// Equality and hashing go through the IP protocol number, so
/// `Other(6)` and `Tcp` are the same protocol.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
    /// Raw IP protocol number
    Other(u8),
}

impl Protocol {
    pub fn from_number(n: u8) -> Self {
        match n {
            1 => Protocol::Icmp,
            6 => Protocol::Tcp,
            17 => Protocol::Udp,
            other => Protocol::Other(other),
        }
    }

    /// IP protocol number
    pub fn number(self) -> u8 {
        match self {
            Protocol::Icmp => 1,
            Protocol::Tcp => 6,
            Protocol::Udp => 17,
            Protocol::Other(n) => n,
        }
    }
}

impl PartialEq for Protocol {
    fn eq(&self, other: &Self) -> bool {
        self.number() == other.number()
    }
}

impl Eq for Protocol {}

impl Hash for Protocol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.number().hash(state);
    }
}

// ============================================================================
// DESTINATION ADDRESS
// ============================================================================

/// Destination as compared by address rules.
///
/// Values that parse as an IP compare as IPs (so IPv6 spellings agree);
/// anything else, such as a hostname, compares as trimmed lowercase text.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DestAddr {
    Ip(IpAddr),
    Name(String),
}

impl DestAddr {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.parse::<IpAddr>() {
            Ok(ip) => DestAddr::Ip(ip),
            Err(_) => DestAddr::Name(trimmed.to_lowercase()),
        }
    }

    pub fn is_ip(&self) -> bool {
        matches!(self, DestAddr::Ip(_))
    }
}

impl From<IpAddr> for DestAddr {
    fn from(ip: IpAddr) -> Self {
        DestAddr::Ip(ip)
    }
}

impl From<&str> for DestAddr {
    fn from(raw: &str) -> Self {
        DestAddr::parse(raw)
    }
}

impl fmt::Display for DestAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DestAddr::Ip(ip) => write!(f, "{}", ip),
            DestAddr::Name(name) => f.write_str(name),
        }
    }
}

// ============================================================================
// CONNECTION RECORD
// ============================================================================

/// Immutable connection event.
///
/// Two records are the same *distinct record* only when every field is
/// equal, timestamp included. `Hash` follows the same rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionRecord {
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub protocol: Option<Protocol>,
    #[serde(default)]
    pub src_ip: Option<String>,
    #[serde(default)]
    pub src_port: Option<u16>,
    #[serde(default)]
    pub dst_ip: Option<String>,
    #[serde(default)]
    pub dst_port: Option<u16>,
}

impl ConnectionRecord {
    pub fn new(dst_ip: impl Into<String>, dst_port: u16) -> Self {
        Self {
            dst_ip: Some(dst_ip.into()),
            dst_port: Some(dst_port),
            ..Default::default()
        }
    }

    pub fn with_src(mut self, src_ip: impl Into<String>, src_port: u16) -> Self {
        self.src_ip = Some(src_ip.into());
        self.src_port = Some(src_port);
        self
    }

    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = Some(protocol);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Destination port, or an error naming the record position
    pub fn require_dst_port(&self, index: usize) -> Result<u16, RuleEvaluationError> {
        self.dst_port.ok_or(RuleEvaluationError::MissingField {
            index,
            field: "dst_port",
        })
    }

    /// Destination address; only absence or a blank value is an error
    pub fn require_dst_addr(&self, index: usize) -> Result<DestAddr, RuleEvaluationError> {
        let raw = self.dst_ip.as_deref().ok_or(RuleEvaluationError::MissingField {
            index,
            field: "dst_ip",
        })?;

        if raw.trim().is_empty() {
            return Err(RuleEvaluationError::MalformedField {
                index,
                field: "dst_ip",
                value: raw.to_string(),
            });
        }
        Ok(DestAddr::parse(raw))
    }
}
