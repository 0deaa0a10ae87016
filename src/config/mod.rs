//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → TransportConfig (validated, immutable)
//!     → environment.rs (resolve backend endpoints)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - The concurrency cap is a fixed constant, deliberately not configurable

pub mod environment;
pub mod loader;
pub mod schema;
pub mod validation;

pub use environment::{BackendEndpoints, EnvironmentType};
pub use loader::{load_config, ConfigError};
pub use schema::{
    LoopDetectionConfig, ObservabilityConfig, SessionConfig, TimeoutConfig, TransportConfig,
    TrustEntry,
};
