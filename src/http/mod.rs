//! HTTP message model.
//!
//! # Data Flow
//! ```text
//! Application
//!     → request.rs (TransportRequest: path, method, payload, completion)
//!     → [dispatcher admits and resolves URL]
//!     → [transport sends]
//!     → response.rs (TransportResponse: status, headers, body)
//!     → completion handler on its delivery queue
//! ```

pub mod request;
pub mod response;

pub use request::{CompletionResult, TransportRequest};
pub use response::TransportResponse;
