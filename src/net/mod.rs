//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! OutboundRequest (from the dispatcher)
//!     → transport.rs (Transport trait, error taxonomy)
//!     → client.rs (reqwest client, timeouts)
//!     → tls.rs (rustls config, WebPKI + public-key pin verification)
//!     → TransportResponse
//! ```
//!
//! # Design Decisions
//! - The dispatcher only sees the `Transport` trait; tests swap in mocks
//! - Default CA trust always runs; pins only narrow it
//! - Pin failures surface as ordinary connection failures

pub mod client;
pub mod tls;
pub mod transport;

pub use client::{ClientBuildError, ReqwestTransport};
pub use tls::{pinned_client_config, PinningVerifier, VerifierError};
pub use transport::{OutboundRequest, Transport, TransportError};
