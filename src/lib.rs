//! Pre-authentication transport.
//!
//! Issues the unauthenticated requests a client makes before it has a
//! session (login, registration, activation), with at most three in flight,
//! public-key pinning on every TLS handshake, session extraction from login
//! responses and detection of runaway request loops.
//!
//! # Architecture Overview
//!
//! ```text
//!     caller ──enqueue──▶ dispatch ──▶ net (reqwest + rustls pinning) ──▶ backend
//!                           │                                   │
//!                           ├─ security::loop_detection         │
//!                           │                                   ▼
//!     caller queue ◀── completion ◀── session extractor ◀── response
//!
//!     Cross-cutting: config, observability
//! ```

// Core subsystems
pub mod dispatch;
pub mod http;
pub mod net;
pub mod session;

// Cross-cutting concerns
pub mod config;
pub mod observability;
pub mod security;

pub use config::TransportConfig;
pub use dispatch::{DeliveryQueue, DispatchOutcome, Dispatcher, MAX_CONCURRENT_REQUESTS};
pub use http::{CompletionResult, TransportRequest, TransportResponse};
pub use net::{ReqwestTransport, Transport, TransportError};
pub use security::{LoopDetector, PinnedKey};
pub use session::{SessionExtractor, SessionInfo, SessionKey, SessionToken};
