//! Request loop detection.
//!
//! Keeps a short, time-ordered window of recent timestamps per request
//! identity and raises an alert when `threshold` identical requests land
//! within `window`. After an alert the identity's window is emptied, so a
//! sustained loop produces one alert per full burst.
//!
//! The identity table is a memory bound, not a cache: once it holds more than
//! `max_identities` entries it is dropped entirely.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use crate::config::LoopDetectionConfig;
use crate::observability::metrics;

/// Callback invoked with the identity of a detected loop.
pub type LoopHandler = Box<dyn Fn(&str) + Send + Sync + 'static>;

/// Recent timestamps for one identity, oldest first.
#[derive(Debug, Default)]
struct LoopWindow {
    timestamps: VecDeque<SystemTime>,
}

impl LoopWindow {
    /// Insert keeping ascending order, then trim to `capacity`.
    fn insert(&mut self, at: SystemTime, capacity: usize) {
        let index = self.timestamps.partition_point(|t| *t <= at);
        self.timestamps.insert(index, at);
        while self.timestamps.len() > capacity {
            self.timestamps.pop_front();
        }
    }

    fn span(&self) -> Option<Duration> {
        let oldest = self.timestamps.front()?;
        let newest = self.timestamps.back()?;
        newest.duration_since(*oldest).ok()
    }

    fn len(&self) -> usize {
        self.timestamps.len()
    }

    fn clear(&mut self) {
        self.timestamps.clear();
    }
}

/// Sliding-window detector for repeated identical requests.
pub struct LoopDetector {
    windows: Mutex<HashMap<String, LoopWindow>>,
    threshold: usize,
    window: Duration,
    max_identities: usize,
    on_loop: LoopHandler,
}

impl LoopDetector {
    /// Number of identical requests that constitutes a loop.
    pub const DEFAULT_THRESHOLD: usize = 20;
    /// Time span the repetitions must fall within.
    pub const DEFAULT_WINDOW: Duration = Duration::from_secs(5 * 60);
    /// Distinct identities tracked before the table is reset.
    pub const DEFAULT_MAX_IDENTITIES: usize = 2000;

    /// Detector with default limits.
    pub fn new<F>(on_loop: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        Self::with_config(&LoopDetectionConfig::default(), on_loop)
    }

    /// Detector with limits from configuration.
    pub fn with_config<F>(config: &LoopDetectionConfig, on_loop: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        Self {
            windows: Mutex::new(HashMap::new()),
            threshold: config.threshold.max(2),
            window: Duration::from_secs(config.window_secs),
            max_identities: config.max_identities.max(1),
            on_loop: Box::new(on_loop),
        }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Record one request for `identity` at `at` (wall clock when `None`).
    pub fn record(&self, identity: &str, at: Option<SystemTime>) {
        let at = at.unwrap_or_else(SystemTime::now);

        let detected = {
            let mut windows = self.windows.lock().expect("loop detector mutex poisoned");

            if !windows.contains_key(identity) && windows.len() >= self.max_identities {
                tracing::debug!(
                    tracked = windows.len(),
                    "Loop detection table full, resetting"
                );
                windows.clear();
            }

            let window = windows.entry(identity.to_string()).or_default();
            window.insert(at, self.threshold);

            let within = window.span().is_some_and(|span| span <= self.window);
            if window.len() == self.threshold && within {
                window.clear();
                true
            } else {
                false
            }
        };

        if detected {
            tracing::warn!(
                identity = %identity,
                threshold = self.threshold,
                window_secs = self.window.as_secs(),
                "Request loop detected"
            );
            metrics::record_loop_detected();
            (self.on_loop)(identity);
        }
    }

    /// Number of identities currently tracked.
    pub fn tracked_identities(&self) -> usize {
        self.windows.lock().expect("loop detector mutex poisoned").len()
    }
}

impl fmt::Debug for LoopDetector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopDetector")
            .field("threshold", &self.threshold)
            .field("window", &self.window)
            .field("max_identities", &self.max_identities)
            .finish()
    }
}
