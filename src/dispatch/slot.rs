//! In-flight request accounting.
//!
//! # Responsibilities
//! - Admit at most `MAX_CONCURRENT_REQUESTS` requests at a time
//! - Hand out a `RequestSlot` guard per admitted request
//! - Signal capacity when a release leaves the "at capacity" state
//!
//! # Design Decisions
//! - Admission is a compare-and-swap loop: the counter never exceeds the cap,
//!   not even transiently
//! - A slot is released exactly once, explicitly or on drop

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::dispatch::capacity::CapacityNotifier;
use crate::observability::metrics;

/// Hard cap on concurrently running pre-auth requests.
pub const MAX_CONCURRENT_REQUESTS: usize = 3;

/// Shared in-flight counter.
#[derive(Debug)]
pub struct InFlight {
    count: AtomicUsize,
    max: usize,
    capacity: CapacityNotifier,
}

impl InFlight {
    pub fn new(max: usize) -> Self {
        Self {
            count: AtomicUsize::new(0),
            max,
            capacity: CapacityNotifier::new(),
        }
    }

    /// Reserve a slot, or `None` when already at the cap.
    pub fn try_acquire(self: &Arc<Self>) -> Option<RequestSlot> {
        let mut prev = self.count.load(Ordering::SeqCst);
        loop {
            if prev >= self.max {
                return None;
            }
            match self
                .count
                .compare_exchange_weak(prev, prev + 1, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => break,
                Err(actual) => prev = actual,
            }
        }
        metrics::set_in_flight(prev + 1);
        Some(RequestSlot {
            owner: Arc::clone(self),
            released: false,
        })
    }

    pub fn current(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    pub fn max(&self) -> usize {
        self.max
    }

    pub fn capacity(&self) -> &CapacityNotifier {
        &self.capacity
    }

    /// Decrement and return the value observed before the decrement.
    fn decrement(&self) -> usize {
        let mut prev = self.count.load(Ordering::SeqCst);
        loop {
            if prev == 0 {
                debug_assert!(false, "in-flight counter released below zero");
                tracing::error!("In-flight counter released below zero");
                return 0;
            }
            match self
                .count
                .compare_exchange_weak(prev, prev - 1, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => break,
                Err(actual) => prev = actual,
            }
        }
        metrics::set_in_flight(prev - 1);
        prev
    }
}

/// Guard for one admitted request.
#[derive(Debug)]
pub struct RequestSlot {
    owner: Arc<InFlight>,
    released: bool,
}

impl RequestSlot {
    /// Release the slot, notifying if capacity reopened.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        let prev = self.owner.decrement();
        if prev == self.owner.max {
            tracing::trace!("Dispatcher below capacity");
            self.owner.capacity.notify();
        }
    }
}

impl Drop for RequestSlot {
    fn drop(&mut self) {
        self.release_inner();
    }
}
