//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! TLS handshake:
//!     → pinning.rs (host rule lookup, subject public key comparison)
//!
//! Outgoing request:
//!     → loop_detection.rs (sliding window per request identity)
//! ```
//!
//! # Design Decisions
//! - Fail closed: a certificate that cannot be parsed never matches a pin
//! - Unpinned hosts defer to default trust evaluation
//! - Loop detection observes, it never blocks a request

pub mod loop_detection;
pub mod pinning;

pub use loop_detection::LoopDetector;
pub use pinning::{HostRule, PinError, PinnedKey};
