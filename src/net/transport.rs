//! Transport primitive abstraction.
//!
//! # Responsibilities
//! - Define the seam between the dispatcher and the network stack
//! - Define the transport error taxonomy handed to completion handlers
//!
//! # Design Decisions
//! - `send` returns a boxed `'static` future so the dispatcher can spawn it
//! - Timeouts belong to the implementation, not to the dispatcher
//! - TLS and pinning failures are reported as plain connection failures

use bytes::Bytes;
use futures_util::future::BoxFuture;
use http::{HeaderMap, Method};
use thiserror::Error;
use url::Url;

use crate::http::response::TransportResponse;

/// Terminal failure of a single request below the HTTP layer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The request did not complete in time.
    #[error("request timed out")]
    Timeout,
    /// Connection could not be established (DNS, refused, TLS handshake).
    #[error("connection failed: {0}")]
    Connect(String),
    /// The request path could not be turned into a URL.
    #[error("invalid request url: {0}")]
    InvalidUrl(String),
    /// The response body could not be read.
    #[error("failed to read response body: {0}")]
    Body(String),
    /// Anything else reported by the network stack.
    #[error("transport error: {0}")]
    Other(String),
}

/// A fully resolved request ready for the wire.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

/// Issues requests on behalf of the dispatcher.
pub trait Transport: Send + Sync + 'static {
    /// Send `request` and resolve with the complete response or a failure.
    fn send(
        &self,
        request: OutboundRequest,
    ) -> BoxFuture<'static, Result<TransportResponse, TransportError>>;
}
