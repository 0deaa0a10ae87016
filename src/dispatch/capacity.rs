//! Capacity-available notifications.

use tokio::sync::broadcast;

/// Broadcasts a signal whenever the dispatcher drops below its cap.
///
/// Fire-and-forget: with no subscribers the signal is discarded, and a slow
/// subscriber sees `RecvError::Lagged` rather than blocking the sender.
#[derive(Debug, Clone)]
pub struct CapacityNotifier {
    tx: broadcast::Sender<()>,
}

impl CapacityNotifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(16);
        Self { tx }
    }

    /// Subscribe to capacity-available signals.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Signal that a slot became available.
    pub fn notify(&self) {
        let _ = self.tx.send(());
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for CapacityNotifier {
    fn default() -> Self {
        Self::new()
    }
}
