//! Public-key pinning decision.
//!
//! # Responsibilities
//! - Match a server host against configured pin entries
//! - Compare the first matching pin against every key in the presented chain
//!
//! # Design Decisions
//! - Pure function: (pins, chain, host) → bool, no I/O, no panics
//! - Unpinned hosts return `true`; default CA validation runs elsewhere
//! - First matching entry wins. Additional entries for the same host are
//!   ignored, so rotating keys means reordering, not appending
//! - Unparseable certificates never match (fail closed)

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rustls::pki_types::CertificateDer;
use x509_parser::prelude::{FromDer, X509Certificate};

/// Which hosts a pin applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostRule {
    /// Exactly this host.
    Exact(String),
    /// Any host ending in this suffix (stored with its leading dot).
    Suffix(String),
    /// Every host.
    Any,
}

impl HostRule {
    /// Parse `*`, `*.example.com` or `example.com`.
    pub fn parse(rule: &str) -> Result<Self, PinError> {
        let rule = rule.trim().trim_end_matches('.').to_ascii_lowercase();
        if rule.is_empty() {
            return Err(PinError::EmptyHost);
        }
        if rule == "*" {
            return Ok(HostRule::Any);
        }
        if let Some(domain) = rule.strip_prefix("*.") {
            if domain.is_empty() || domain.contains('*') {
                return Err(PinError::InvalidHost(rule));
            }
            return Ok(HostRule::Suffix(format!(".{}", domain)));
        }
        if rule.contains('*') {
            return Err(PinError::InvalidHost(rule));
        }
        Ok(HostRule::Exact(rule))
    }

    /// Whether `host` is covered by this rule.
    pub fn matches(&self, host: &str) -> bool {
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        match self {
            HostRule::Any => true,
            HostRule::Exact(expected) => host == *expected,
            HostRule::Suffix(suffix) => host.len() > suffix.len() && host.ends_with(suffix.as_str()),
        }
    }
}

impl fmt::Display for HostRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostRule::Any => write!(f, "*"),
            HostRule::Exact(host) => write!(f, "{}", host),
            HostRule::Suffix(suffix) => write!(f, "*{}", suffix),
        }
    }
}

/// Error parsing a pin entry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PinError {
    #[error("pin host must not be empty")]
    EmptyHost,
    #[error("invalid pin host rule: {0}")]
    InvalidHost(String),
    #[error("pin key is not valid base64: {0}")]
    InvalidKey(String),
    #[error("pin key must not be empty")]
    EmptyKey,
}

/// An expected server public key for a set of hosts.
#[derive(Clone, PartialEq, Eq)]
pub struct PinnedKey {
    host: HostRule,
    key: Vec<u8>,
}

impl PinnedKey {
    pub fn new(host: HostRule, key: Vec<u8>) -> Self {
        Self { host, key }
    }

    /// Build from a host rule and a base64 encoded subject public key.
    pub fn from_base64(host: &str, key: &str) -> Result<Self, PinError> {
        let host = HostRule::parse(host)?;
        let key = STANDARD
            .decode(key.trim())
            .map_err(|e| PinError::InvalidKey(e.to_string()))?;
        if key.is_empty() {
            return Err(PinError::EmptyKey);
        }
        Ok(Self { host, key })
    }

    pub fn host(&self) -> &HostRule {
        &self.host
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn matches_host(&self, host: &str) -> bool {
        self.host.matches(host)
    }
}

impl fmt::Debug for PinnedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PinnedKey")
            .field("host", &self.host)
            .field("key_len", &self.key.len())
            .finish()
    }
}

/// Decide whether the presented `chain` is acceptable for `host`.
pub fn verify(pins: &[PinnedKey], chain: &[CertificateDer<'_>], host: &str) -> bool {
    let Some(pin) = pins.iter().find(|p| p.matches_host(host)) else {
        tracing::trace!(host = %host, "Host not pinned, deferring to default trust");
        return true;
    };

    chain
        .iter()
        .filter_map(|cert| subject_public_key(cert.as_ref()))
        .any(|key| key == pin.key())
}

/// Raw subject public key bytes of a DER certificate.
pub fn subject_public_key(der: &[u8]) -> Option<Vec<u8>> {
    match X509Certificate::from_der(der) {
        Ok((_, cert)) => Some(cert.public_key().subject_public_key.data.to_vec()),
        Err(e) => {
            tracing::debug!(error = %e, "Failed to parse certificate");
            None
        }
    }
}
