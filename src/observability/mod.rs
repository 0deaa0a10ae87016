//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! dispatcher, pin verifier, loop detector, session extractor
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters, gauges, histograms via the metrics facade)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON optional) for machine parsing
//! - Metrics are cheap (atomic increments) and exporter-agnostic
//! - Credentials and session material never reach either sink

pub mod logging;
pub mod metrics;
