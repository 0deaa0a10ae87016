//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the
//! pre-authentication transport. All types derive Serde traits for
//! deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::config::environment::{BackendEndpoints, EnvironmentType};
use crate::security::pinning::{PinError, PinnedKey};

/// Root configuration for the transport.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct TransportConfig {
    /// Which built-in backend environment to talk to.
    pub environment: EnvironmentType,

    /// Explicit endpoints, overriding the environment defaults.
    pub backend: Option<BackendEndpoints>,

    /// Public-key pins, in priority order.
    pub trust: Vec<TrustEntry>,

    /// Timeout configuration for the HTTP client.
    pub timeouts: TimeoutConfig,

    /// Request loop detection limits.
    pub loop_detection: LoopDetectionConfig,

    /// Session extraction settings.
    pub session: SessionConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl TransportConfig {
    /// Endpoints in effect: the explicit override or the environment defaults.
    pub fn endpoints(&self) -> BackendEndpoints {
        self.backend
            .clone()
            .unwrap_or_else(|| self.environment.default_endpoints())
    }

    /// Parse the trust section into pins, preserving order.
    pub fn pinned_keys(&self) -> Result<Vec<PinnedKey>, PinError> {
        self.trust.iter().map(TrustEntry::to_pinned_key).collect()
    }
}

/// A single pin entry.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct TrustEntry {
    /// Host rule: `example.com`, `*.example.com` or `*`.
    pub host: String,

    /// Base64 encoded subject public key.
    pub key: String,
}

impl TrustEntry {
    pub fn to_pinned_key(&self) -> Result<PinnedKey, PinError> {
        PinnedKey::from_base64(&self.host, &self.key)
    }
}

/// Timeout configuration for the HTTP client.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 10,
            request_secs: 60,
        }
    }
}

/// Loop detection limits.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoopDetectionConfig {
    /// Identical requests within the window that count as a loop.
    pub threshold: usize,

    /// Window length in seconds.
    pub window_secs: u64,

    /// Distinct identities tracked before the table is reset.
    pub max_identities: usize,
}

impl Default for LoopDetectionConfig {
    fn default() -> Self {
        Self {
            threshold: 20,
            window_secs: 5 * 60,
            max_identities: 2000,
        }
    }
}

/// Session extraction settings.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct SessionConfig {
    /// Base64 session key. Hosts normally inject the key from secure
    /// storage instead; this exists for the command line tool.
    pub key: Option<String>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}
