//! Bounded request dispatcher.
//!
//! # Responsibilities
//! - Admit requests against the fixed in-flight cap before any work happens
//! - Resolve, fingerprint and issue admitted requests without blocking the caller
//! - Route the terminal result to the session listener and the per-request
//!   completion, then free the slot
//!
//! # Data Flow
//! ```text
//! enqueue(generator)
//!     → InFlight::try_acquire ──(cap reached)──→ RejectedAtCapacity
//!     → generator() ──(None)──→ release → AdmittedNoRequest
//!     → resolve URL → LoopDetector::record → Transport::send
//!     → runtime.spawn ──────────────────────────→ AdmittedAndSent
//!           ↓ (later)
//!     SessionExtractor → session listener queue
//!     → completion queue → RequestSlot::release → capacity signal
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwapOption;
use bytes::Bytes;
use http::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};
use http::HeaderValue;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use url::Url;

use crate::dispatch::delivery::DeliveryQueue;
use crate::dispatch::slot::{InFlight, MAX_CONCURRENT_REQUESTS};
use crate::http::request::TransportRequest;
use crate::net::transport::{OutboundRequest, Transport, TransportError};
use crate::observability::metrics;
use crate::security::loop_detection::LoopDetector;
use crate::session::{SessionExtractor, SessionInfo};

const JSON: &str = "application/json";

/// Result of a single `enqueue` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchOutcome {
    /// A slot was taken and the request handed to the transport.
    AdmittedAndSent,
    /// A slot was free but the generator had nothing to send.
    AdmittedNoRequest,
    /// All slots are taken; the generator was not called.
    RejectedAtCapacity,
}

impl DispatchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchOutcome::AdmittedAndSent => "sent",
            DispatchOutcome::AdmittedNoRequest => "no_request",
            DispatchOutcome::RejectedAtCapacity => "rejected",
        }
    }
}

impl fmt::Display for DispatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct SessionListener {
    queue: DeliveryQueue,
    handler: Box<dyn Fn(SessionInfo) + Send + Sync + 'static>,
}

impl SessionListener {
    fn deliver(self: Arc<Self>, info: SessionInfo) {
        let queue = self.queue.clone();
        queue.dispatch(move || (self.handler)(info));
    }
}

/// Issues unauthenticated requests with at most three in flight.
///
/// `Send + Sync`; share it behind an `Arc` and call [`Dispatcher::enqueue`]
/// from any thread.
pub struct Dispatcher {
    base_url: Url,
    transport: Arc<dyn Transport>,
    runtime: Handle,
    in_flight: Arc<InFlight>,
    loop_detector: Arc<LoopDetector>,
    extractor: Option<Arc<SessionExtractor>>,
    session_listener: Arc<ArcSwapOption<SessionListener>>,
    user_agent: Option<HeaderValue>,
}

impl Dispatcher {
    /// Dispatcher for `base_url`, spawning transport calls on `runtime`.
    pub fn new(base_url: Url, transport: Arc<dyn Transport>, runtime: Handle) -> Self {
        Self {
            base_url,
            transport,
            runtime,
            in_flight: Arc::new(InFlight::new(MAX_CONCURRENT_REQUESTS)),
            loop_detector: Arc::new(LoopDetector::new(|_| {})),
            extractor: None,
            session_listener: Arc::new(ArcSwapOption::empty()),
            user_agent: None,
        }
    }

    /// Replace the default (log-only) loop detector.
    pub fn with_loop_detector(mut self, detector: Arc<LoopDetector>) -> Self {
        self.loop_detector = detector;
        self
    }

    /// Extract sessions from responses with `extractor`.
    pub fn with_session_extractor(mut self, extractor: SessionExtractor) -> Self {
        self.extractor = Some(Arc::new(extractor));
        self
    }

    /// Send `user_agent` on requests that do not set one.
    pub fn with_user_agent(mut self, user_agent: HeaderValue) -> Self {
        self.user_agent = Some(user_agent);
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Requests currently admitted and not yet finished.
    pub fn in_flight(&self) -> usize {
        self.in_flight.current()
    }

    /// Signals each transition from "at capacity" to "below capacity".
    pub fn subscribe_capacity(&self) -> broadcast::Receiver<()> {
        self.in_flight.capacity().subscribe()
    }

    /// Deliver every extracted session to `handler`, on `queue`.
    ///
    /// Replaces any previously registered listener.
    pub fn set_session_listener<F>(&self, queue: &DeliveryQueue, handler: F)
    where
        F: Fn(SessionInfo) + Send + Sync + 'static,
    {
        self.session_listener.store(Some(Arc::new(SessionListener {
            queue: queue.clone(),
            handler: Box::new(handler),
        })));
    }

    /// Try to issue the request produced by `generator`.
    ///
    /// The generator runs only after a slot has been reserved, so callers can
    /// pull from their own queue without losing work on rejection.
    pub fn enqueue<G>(&self, generator: G) -> DispatchOutcome
    where
        G: FnOnce() -> Option<TransportRequest>,
    {
        let Some(slot) = self.in_flight.try_acquire() else {
            tracing::trace!(
                max = self.in_flight.max(),
                "Dispatcher at capacity, request not admitted"
            );
            metrics::record_dispatch(DispatchOutcome::RejectedAtCapacity);
            return DispatchOutcome::RejectedAtCapacity;
        };

        let Some(mut request) = generator() else {
            slot.release();
            metrics::record_dispatch(DispatchOutcome::AdmittedNoRequest);
            return DispatchOutcome::AdmittedNoRequest;
        };

        let completion = request.take_completion();
        metrics::record_dispatch(DispatchOutcome::AdmittedAndSent);

        let outbound = match self.prepare(&request) {
            Ok(outbound) => outbound,
            Err(e) => {
                tracing::warn!(path = %request.path(), error = %e, "Request rejected before sending");
                if let Some(completion) = completion {
                    completion.deliver(Err(e));
                }
                slot.release();
                return DispatchOutcome::AdmittedAndSent;
            }
        };

        let identity = format!("{} {}", outbound.method, outbound.url);
        self.loop_detector.record(&identity, None);

        tracing::debug!(method = %outbound.method, url = %outbound.url, "Dispatching request");

        let call = self.transport.send(outbound);
        let extractor = self.extractor.clone();
        let listener = Arc::clone(&self.session_listener);
        let start = Instant::now();

        self.runtime.spawn(async move {
            let result = call.await;

            match &result {
                Ok(response) => {
                    tracing::debug!(request = %identity, status = %response.status, "Request completed");
                    metrics::record_request(response.status.as_str(), start);
                }
                Err(e) => {
                    tracing::warn!(request = %identity, error = %e, "Request failed");
                    metrics::record_request("error", start);
                }
            }

            if let (Ok(response), Some(extractor)) = (&result, &extractor) {
                if let Some(info) = extractor.extract_from(response) {
                    if let Some(listener) = listener.load_full() {
                        listener.deliver(info);
                    }
                }
            }

            if let Some(completion) = completion {
                completion.deliver(result);
            }
            slot.release();
        });

        DispatchOutcome::AdmittedAndSent
    }

    fn prepare(&self, request: &TransportRequest) -> Result<OutboundRequest, TransportError> {
        let url = request.resolve(&self.base_url)?;

        let mut headers = request.headers().clone();
        if !headers.contains_key(ACCEPT) {
            headers.insert(ACCEPT, HeaderValue::from_static(JSON));
        }
        if let Some(user_agent) = &self.user_agent {
            if !headers.contains_key(USER_AGENT) {
                headers.insert(USER_AGENT, user_agent.clone());
            }
        }

        let body = match request.payload() {
            Some(payload) => {
                let encoded = serde_json::to_vec(payload)
                    .map_err(|e| TransportError::Other(format!("failed to encode payload: {}", e)))?;
                headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON));
                Some(Bytes::from(encoded))
            }
            None => None,
        };

        Ok(OutboundRequest {
            method: request.method().clone(),
            url,
            headers,
            body,
        })
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("base_url", &self.base_url.as_str())
            .field("in_flight", &self.in_flight.current())
            .field("extracts_sessions", &self.extractor.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoopDetectionConfig;
    use crate::http::request::CompletionResult;
    use crate::http::response::TransportResponse;
    use crate::session::SessionKey;
    use futures_util::future::{BoxFuture, FutureExt};
    use http::header::SET_COOKIE;
    use http::{HeaderMap, StatusCode};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::{mpsc, oneshot};

    type Reply = oneshot::Sender<Result<TransportResponse, TransportError>>;

    /// Transport whose calls stay pending until the test answers them.
    #[derive(Default)]
    struct ControlledTransport {
        pending: Mutex<Vec<Reply>>,
        sent: Mutex<Vec<OutboundRequest>>,
    }

    impl ControlledTransport {
        fn answer(&self, result: Result<TransportResponse, TransportError>) {
            let reply = self.pending.lock().unwrap().remove(0);
            let _ = reply.send(result);
        }

        fn sent(&self) -> Vec<OutboundRequest> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl Transport for ControlledTransport {
        fn send(
            &self,
            request: OutboundRequest,
        ) -> BoxFuture<'static, Result<TransportResponse, TransportError>> {
            let (tx, rx) = oneshot::channel();
            self.pending.lock().unwrap().push(tx);
            self.sent.lock().unwrap().push(request);
            async move {
                rx.await
                    .unwrap_or_else(|_| Err(TransportError::Other("reply dropped".to_string())))
            }
            .boxed()
        }
    }

    fn ok_response() -> TransportResponse {
        TransportResponse::new(StatusCode::OK, HeaderMap::new(), Bytes::new())
    }

    fn dispatcher(transport: &Arc<ControlledTransport>) -> Dispatcher {
        let transport: Arc<dyn Transport> = transport.clone();
        Dispatcher::new(
            Url::parse("https://backend.example.com/").unwrap(),
            transport,
            Handle::current(),
        )
    }

    async fn wait_for_in_flight(dispatcher: &Dispatcher, expected: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while dispatcher.in_flight() != expected {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("in-flight count never settled");
    }

    #[tokio::test]
    async fn admits_at_most_three() {
        let transport = Arc::new(ControlledTransport::default());
        let dispatcher = dispatcher(&transport);

        for _ in 0..3 {
            let outcome = dispatcher.enqueue(|| Some(TransportRequest::get("/self")));
            assert_eq!(outcome, DispatchOutcome::AdmittedAndSent);
        }

        let called = AtomicBool::new(false);
        let outcome = dispatcher.enqueue(|| {
            called.store(true, Ordering::SeqCst);
            Some(TransportRequest::get("/self"))
        });

        assert_eq!(outcome, DispatchOutcome::RejectedAtCapacity);
        assert!(!called.load(Ordering::SeqCst));
        assert_eq!(dispatcher.in_flight(), 3);
        assert_eq!(transport.sent().len(), 3);

        transport.answer(Ok(ok_response()));
        wait_for_in_flight(&dispatcher, 2).await;
        assert_eq!(
            dispatcher.enqueue(|| Some(TransportRequest::get("/self"))),
            DispatchOutcome::AdmittedAndSent
        );
    }

    #[tokio::test]
    async fn empty_generator_does_not_drift() {
        let transport = Arc::new(ControlledTransport::default());
        let dispatcher = dispatcher(&transport);

        for _ in 0..1000 {
            assert_eq!(dispatcher.enqueue(|| None), DispatchOutcome::AdmittedNoRequest);
        }
        assert_eq!(dispatcher.in_flight(), 0);

        for _ in 0..3 {
            assert_eq!(
                dispatcher.enqueue(|| Some(TransportRequest::get("/self"))),
                DispatchOutcome::AdmittedAndSent
            );
        }
        assert_eq!(dispatcher.enqueue(|| None), DispatchOutcome::RejectedAtCapacity);
    }

    #[tokio::test]
    async fn empty_generator_at_cap_signals_capacity() {
        let transport = Arc::new(ControlledTransport::default());
        let dispatcher = dispatcher(&transport);

        for path in ["/a", "/b"] {
            dispatcher.enqueue(|| Some(TransportRequest::get(path)));
        }
        let mut capacity = dispatcher.subscribe_capacity();

        let mut nested = None;
        let outcome = dispatcher.enqueue(|| {
            nested = Some(dispatcher.enqueue(|| Some(TransportRequest::get("/c"))));
            None
        });

        assert_eq!(outcome, DispatchOutcome::AdmittedNoRequest);
        assert_eq!(nested, Some(DispatchOutcome::RejectedAtCapacity));
        assert!(capacity.try_recv().is_ok());
        assert_eq!(dispatcher.in_flight(), 2);

        transport.answer(Ok(ok_response()));
        transport.answer(Ok(ok_response()));
        wait_for_in_flight(&dispatcher, 0).await;
        assert!(capacity.try_recv().is_err());
        assert_eq!(transport.sent().len(), 2);
    }

    #[tokio::test]
    async fn notifies_once_per_capacity_transition() {
        let transport = Arc::new(ControlledTransport::default());
        let dispatcher = dispatcher(&transport);
        let mut capacity = dispatcher.subscribe_capacity();

        for _ in 0..3 {
            dispatcher.enqueue(|| Some(TransportRequest::get("/self")));
        }

        transport.answer(Ok(ok_response()));
        tokio::time::timeout(Duration::from_secs(5), capacity.recv())
            .await
            .expect("no capacity signal")
            .unwrap();

        transport.answer(Ok(ok_response()));
        wait_for_in_flight(&dispatcher, 1).await;
        assert!(capacity.try_recv().is_err());
    }

    #[tokio::test]
    async fn transport_error_reaches_completion_and_frees_slot() {
        let transport = Arc::new(ControlledTransport::default());
        let dispatcher = dispatcher(&transport);
        let queue = DeliveryQueue::new("completions");
        let (tx, mut rx) = mpsc::unbounded_channel::<CompletionResult>();

        dispatcher.enqueue(|| {
            Some(TransportRequest::get("/self").on_complete(&queue, move |result| {
                let _ = tx.send(result);
            }))
        });
        transport.answer(Err(TransportError::Timeout));

        assert_eq!(rx.recv().await.unwrap().unwrap_err(), TransportError::Timeout);
        wait_for_in_flight(&dispatcher, 0).await;
    }

    #[tokio::test]
    async fn invalid_path_is_reported_through_completion() {
        let transport = Arc::new(ControlledTransport::default());
        let dispatcher = dispatcher(&transport);
        let queue = DeliveryQueue::new("completions");
        let (tx, mut rx) = mpsc::unbounded_channel::<CompletionResult>();

        let outcome = dispatcher.enqueue(|| {
            Some(TransportRequest::get("http://[::1").on_complete(&queue, move |result| {
                let _ = tx.send(result);
            }))
        });

        assert_eq!(outcome, DispatchOutcome::AdmittedAndSent);
        assert!(matches!(
            rx.recv().await.unwrap(),
            Err(TransportError::InvalidUrl(_))
        ));
        assert_eq!(dispatcher.in_flight(), 0);
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn encodes_json_payload_and_default_headers() {
        let transport = Arc::new(ControlledTransport::default());
        let dispatcher = dispatcher(&transport)
            .with_user_agent(HeaderValue::from_static("preauth-test/1.0"));

        dispatcher.enqueue(|| {
            Some(TransportRequest::post(
                "/login?persist=true",
                serde_json::json!({ "email": "test@test.xyz" }),
            ))
        });

        let sent = transport.sent();
        let request = &sent[0];
        assert_eq!(request.method, http::Method::POST);
        assert_eq!(request.url.as_str(), "https://backend.example.com/login?persist=true");
        assert_eq!(request.headers[CONTENT_TYPE], JSON);
        assert_eq!(request.headers[ACCEPT], JSON);
        assert_eq!(request.headers[USER_AGENT], "preauth-test/1.0");
        let body: serde_json::Value =
            serde_json::from_slice(request.body.as_ref().unwrap()).unwrap();
        assert_eq!(body["email"], "test@test.xyz");
    }

    #[tokio::test]
    async fn records_request_identity_for_loop_detection() {
        let transport = Arc::new(ControlledTransport::default());
        let alerts = Arc::new(Mutex::new(Vec::new()));
        let detector = {
            let alerts = Arc::clone(&alerts);
            let config = LoopDetectionConfig {
                threshold: 2,
                ..LoopDetectionConfig::default()
            };
            LoopDetector::with_config(&config, move |identity| {
                alerts.lock().unwrap().push(identity.to_string())
            })
        };
        let dispatcher = dispatcher(&transport).with_loop_detector(Arc::new(detector));

        dispatcher.enqueue(|| Some(TransportRequest::get("/self")));
        dispatcher.enqueue(|| Some(TransportRequest::get("/self")));

        assert_eq!(
            *alerts.lock().unwrap(),
            vec!["GET https://backend.example.com/self".to_string()]
        );
    }

    #[tokio::test]
    async fn session_listener_runs_before_completion() {
        let transport = Arc::new(ControlledTransport::default());
        let dispatcher =
            dispatcher(&transport).with_session_extractor(SessionExtractor::new(SessionKey::new([7; 32])));
        let queue = DeliveryQueue::new("main");
        let events = Arc::new(Mutex::new(Vec::new()));
        let (done_tx, done_rx) = oneshot::channel();

        {
            let events = Arc::clone(&events);
            dispatcher.set_session_listener(&queue, move |info| {
                events.lock().unwrap().push(format!("session {}", info.identifier));
            });
        }
        {
            let events = Arc::clone(&events);
            dispatcher.enqueue(move || {
                Some(TransportRequest::get("/access").on_complete(&queue, move |result| {
                    events.lock().unwrap().push(format!("complete {}", result.unwrap().status));
                    let _ = done_tx.send(());
                }))
            });
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            SET_COOKIE,
            HeaderValue::from_static("zuid=abc; Path=/access; HttpOnly; Secure"),
        );
        transport.answer(Ok(TransportResponse::new(
            StatusCode::OK,
            headers,
            r#"{"user":"4b4b2c1e-8a61-4c49-9c3f-0d2a1b7e5f10"}"#,
        )));
        done_rx.await.unwrap();

        assert_eq!(
            *events.lock().unwrap(),
            vec![
                "session 4b4b2c1e-8a61-4c49-9c3f-0d2a1b7e5f10".to_string(),
                "complete 200 OK".to_string(),
            ]
        );
    }

    /// Transport that tracks how many calls run at once.
    #[derive(Default)]
    struct CountingTransport {
        current: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    impl Transport for CountingTransport {
        fn send(
            &self,
            _request: OutboundRequest,
        ) -> BoxFuture<'static, Result<TransportResponse, TransportError>> {
            let current = Arc::clone(&self.current);
            let peak = Arc::clone(&self.peak);
            async move {
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(1)).await;
                current.fetch_sub(1, Ordering::SeqCst);
                Ok(ok_response())
            }
            .boxed()
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_enqueue_never_exceeds_cap() {
        let transport = Arc::new(CountingTransport::default());
        let peak = Arc::clone(&transport.peak);
        let dispatcher = Arc::new(Dispatcher::new(
            Url::parse("https://backend.example.com/").unwrap(),
            transport,
            Handle::current(),
        ));
        let observed = Arc::new(AtomicUsize::new(0));

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let dispatcher = Arc::clone(&dispatcher);
                let observed = Arc::clone(&observed);
                tokio::task::spawn_blocking(move || {
                    let mut sent = 0;
                    for _ in 0..500 {
                        if dispatcher.enqueue(|| Some(TransportRequest::get("/self")))
                            == DispatchOutcome::AdmittedAndSent
                        {
                            sent += 1;
                        }
                        observed.fetch_max(dispatcher.in_flight(), Ordering::SeqCst);
                    }
                    sent
                })
            })
            .collect();

        let mut total = 0;
        for worker in workers {
            total += worker.await.unwrap();
        }
        wait_for_in_flight(&dispatcher, 0).await;

        assert!(total > 0);
        assert!(observed.load(Ordering::SeqCst) <= MAX_CONCURRENT_REQUESTS);
        assert!(peak.load(Ordering::SeqCst) <= MAX_CONCURRENT_REQUESTS);
    }
}
