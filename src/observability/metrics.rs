//! Metrics collection.
//!
//! # Responsibilities
//! - Define transport metrics (dispatch outcomes, latency, in-flight, security events)
//! - Record through the `metrics` facade; the host application installs the recorder
//!
//! # Metrics
//! - `preauth_dispatch_total` (counter): enqueue outcomes by `outcome`
//! - `preauth_requests_in_flight` (gauge): admitted, unfinished requests
//! - `preauth_request_duration_seconds` (histogram): latency by `status`
//! - `preauth_loop_detected_total` (counter): request loop alerts
//! - `preauth_pin_rejections_total` (counter): handshakes refused by a pin
//! - `preauth_sessions_extracted_total` (counter): sessions handed to the listener
//!
//! # Design Decisions
//! - No exporter is bundled; without a recorder every call is a no-op
//! - Labels are low-cardinality (outcome, status code)

use std::time::Instant;

use metrics::{counter, gauge, histogram};

use crate::dispatch::DispatchOutcome;

/// Record the outcome of one `enqueue` call.
pub fn record_dispatch(outcome: DispatchOutcome) {
    counter!("preauth_dispatch_total", "outcome" => outcome.as_str()).increment(1);
}

pub fn set_in_flight(count: usize) {
    gauge!("preauth_requests_in_flight").set(count as f64);
}

/// Record a finished request. `status` is the status code or `"error"`.
pub fn record_request(status: &str, start: Instant) {
    let duration = start.elapsed().as_secs_f64();
    histogram!("preauth_request_duration_seconds", "status" => status.to_string()).record(duration);
}

pub fn record_loop_detected() {
    counter!("preauth_loop_detected_total").increment(1);
}

pub fn record_pin_rejection() {
    counter!("preauth_pin_rejections_total").increment(1);
}

pub fn record_session_extracted() {
    counter!("preauth_sessions_extracted_total").increment(1);
}
