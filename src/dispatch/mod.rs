//! Bounded dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! caller → Dispatcher::enqueue
//!     → slot.rs (admission, at most three in flight)
//!     → Transport (spawned on the runtime)
//!     → delivery.rs (callbacks on the caller's queue)
//!     → slot release → capacity.rs (broadcast when below the cap again)
//! ```
//!
//! # Design Decisions
//! - Admission happens before the generator runs; rejected callers keep their work
//! - Callbacks never run on the transport task
//! - No global state: each `Dispatcher` owns its counter and notifier

pub mod capacity;
pub mod delivery;
pub mod dispatcher;
pub mod slot;

pub use capacity::CapacityNotifier;
pub use delivery::DeliveryQueue;
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use slot::{RequestSlot, MAX_CONCURRENT_REQUESTS};
