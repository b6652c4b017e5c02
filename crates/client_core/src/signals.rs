use std::sync::Weak;

use async_trait::async_trait;
use shared::protocol::WorkflowSignal;
use tokio::sync::broadcast;
use tracing::debug;

/// Receives upward signals from the item units. The coordinator is the only
/// sink in the workspace.
#[async_trait]
pub trait SignalSink: Send + Sync {
    async fn deliver(&self, signal: WorkflowSignal);
}

/// Upward signal path from the item units to their coordinator.
///
/// [`SignalBus::emit`] hands the signal to the parent sink and waits for it
/// to be applied before returning, so the parent's state is current once the
/// emitting call completes. Outside observers get a copy over a broadcast
/// channel afterwards. Emissions are independent and never deduplicated.
#[derive(Clone)]
pub struct SignalBus {
    tx: broadcast::Sender<WorkflowSignal>,
    parent: Option<Weak<dyn SignalSink>>,
}

impl SignalBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, parent: None }
    }

    pub fn with_parent(mut self, parent: Weak<dyn SignalSink>) -> Self {
        self.parent = Some(parent);
        self
    }

    pub async fn emit(&self, signal: WorkflowSignal) {
        debug!(?signal, "workflow signal emitted");
        if let Some(parent) = self.parent.as_ref().and_then(Weak::upgrade) {
            parent.deliver(signal.clone()).await;
        }
        let _ = self.tx.send(signal);
    }

    /// Observer feed; receivers see signals after the parent has applied them.
    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowSignal> {
        self.tx.subscribe()
    }
}

impl Default for SignalBus {
    fn default() -> Self {
        Self::new(64)
    }
}
