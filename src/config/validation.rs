//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check that every pin entry parses
//! - Validate value ranges (timeouts > 0, loop threshold ≥ 2)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: TransportConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;

use crate::config::schema::TransportConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check `config` for semantic errors.
pub fn validate_config(config: &TransportConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    for (i, entry) in config.trust.iter().enumerate() {
        if let Err(e) = entry.to_pinned_key() {
            errors.push(ValidationError::new(format!("trust[{}]", i), e.to_string()));
        }
    }

    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::new("timeouts.connect_secs", "must be greater than 0"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }

    let loops = &config.loop_detection;
    if loops.threshold < 2 {
        errors.push(ValidationError::new("loop_detection.threshold", "must be at least 2"));
    }
    if loops.window_secs == 0 {
        errors.push(ValidationError::new("loop_detection.window_secs", "must be greater than 0"));
    }
    if loops.max_identities == 0 {
        errors.push(ValidationError::new(
            "loop_detection.max_identities",
            "must be greater than 0",
        ));
    }

    if let Some(backend) = &config.backend {
        if !matches!(backend.backend_url.scheme(), "http" | "https") {
            errors.push(ValidationError::new(
                "backend.backend_url",
                format!("unsupported scheme '{}'", backend.backend_url.scheme()),
            ));
        }
        if backend.backend_url.cannot_be_a_base() {
            errors.push(ValidationError::new("backend.backend_url", "must be a base url"));
        }
    }

    if let Some(key) = &config.session.key {
        if let Err(e) = crate::session::SessionKey::from_base64(key) {
            errors.push(ValidationError::new("session.key", e.to_string()));
        }
    }

    let level = config.observability.log_level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("unknown level '{}'", config.observability.log_level),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
