//! Outgoing request model.
//!
//! # Responsibilities
//! - Carry path, method, headers and JSON payload of an application request
//! - Own the per-request completion handler and the queue it runs on
//! - Resolve the relative path against the backend base URL
//! - Keep credentials out of logs (`Debug` redacts passwords)
//!
//! # Design Decisions
//! - The payload is opaque JSON; the dispatcher never inspects it
//! - The completion handler is `FnOnce`, so delivery happens at most once

use std::fmt;

use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde_json::Value;
use url::Url;

use crate::dispatch::delivery::DeliveryQueue;
use crate::http::response::TransportResponse;
use crate::net::transport::TransportError;

/// Field names whose values never appear in logs.
const REDACTED_FIELDS: &[&str] = &["password"];

/// Replacement text for redacted values.
pub const REDACTED: &str = "<redacted>";

/// Result handed to a per-request completion handler.
pub type CompletionResult = Result<TransportResponse, TransportError>;

type CompletionFn = Box<dyn FnOnce(CompletionResult) + Send + 'static>;

/// Completion handler bound to the queue it must run on.
pub(crate) struct Completion {
    queue: DeliveryQueue,
    handler: CompletionFn,
}

impl Completion {
    /// Schedule the handler on its queue.
    pub(crate) fn deliver(self, result: CompletionResult) {
        let handler = self.handler;
        self.queue.dispatch(move || handler(result));
    }
}

/// A request issued through the unauthenticated transport.
pub struct TransportRequest {
    path: String,
    method: Method,
    headers: HeaderMap,
    payload: Option<Value>,
    completion: Option<Completion>,
}

impl TransportRequest {
    /// Create a request for `path` (relative to the backend base URL).
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method,
            headers: HeaderMap::new(),
            payload: None,
            completion: None,
        }
    }

    /// `GET path`.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// `POST path` with a JSON payload.
    pub fn post(path: impl Into<String>, payload: Value) -> Self {
        Self::new(Method::POST, path).with_payload(payload)
    }

    /// Attach a JSON payload.
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Add a header. Later values for the same name are appended.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Register the handler invoked with the terminal result of this request.
    ///
    /// The handler runs on `queue`, never on the transport task.
    pub fn on_complete<F>(mut self, queue: &DeliveryQueue, handler: F) -> Self
    where
        F: FnOnce(CompletionResult) + Send + 'static,
    {
        self.completion = Some(Completion {
            queue: queue.clone(),
            handler: Box::new(handler),
        });
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn payload(&self) -> Option<&Value> {
        self.payload.as_ref()
    }

    /// Resolve the request path against `base`.
    pub fn resolve(&self, base: &Url) -> Result<Url, TransportError> {
        base.join(&self.path)
            .map_err(|e| TransportError::InvalidUrl(format!("{}: {}", self.path, e)))
    }

    /// Split off the completion handler, leaving the wire-level request.
    pub(crate) fn take_completion(&mut self) -> Option<Completion> {
        self.completion.take()
    }
}

impl fmt::Debug for TransportRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportRequest")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("headers", &self.headers)
            .field("payload", &self.payload.as_ref().map(redact))
            .field("has_completion", &self.completion.is_some())
            .finish()
    }
}

/// Copy of `value` with every sensitive field replaced by [`REDACTED`].
pub fn redact(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| {
                    if REDACTED_FIELDS.iter().any(|f| k.eq_ignore_ascii_case(f)) {
                        (k.clone(), Value::String(REDACTED.to_string()))
                    } else {
                        (k.clone(), redact(v))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact).collect()),
        other => other.clone(),
    }
}
