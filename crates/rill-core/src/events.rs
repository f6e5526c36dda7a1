//! Typed notebook events and the fan-out bus.
//!
//! The bus is a `tokio::sync::broadcast` channel: every subscriber gets a
//! bounded queue, publishing fans out to all of them, and a slow subscriber
//! lags by dropping its oldest pending events. The SSE layer reports the
//! drop best-effort before resuming delivery.

use serde_json::json;
use tokio::sync::broadcast;

use crate::model::{CellId, CellStatus, Notebook};

/// Per-subscriber queue capacity. A laggard loses its oldest events.
pub const EVENT_QUEUE_CAPACITY: usize = 64;

/// One notebook event, named as it appears on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum NotebookEvent {
    /// Whole-notebook snapshot after a non-run mutation (or on subscribe).
    NotebookState(Notebook),
    RunStarted { cell_id: CellId },
    CellStatus { cell_id: CellId, status: CellStatus },
    CellOutput { cell_id: CellId, outputs: Vec<String> },
    CellError { cell_id: CellId, error: String },
    RunFinished { cell_id: CellId },
}

impl NotebookEvent {
    /// Wire name, used as the SSE event-name field.
    pub fn name(&self) -> &'static str {
        match self {
            NotebookEvent::NotebookState(_) => "notebook_state",
            NotebookEvent::RunStarted { .. } => "run_started",
            NotebookEvent::CellStatus { .. } => "cell_status",
            NotebookEvent::CellOutput { .. } => "cell_output",
            NotebookEvent::CellError { .. } => "cell_error",
            NotebookEvent::RunFinished { .. } => "run_finished",
        }
    }

    /// JSON payload, used as the SSE data field.
    pub fn payload(&self) -> serde_json::Value {
        match self {
            NotebookEvent::NotebookState(notebook) => json!(notebook),
            NotebookEvent::RunStarted { cell_id } => json!({ "cellId": cell_id }),
            NotebookEvent::CellStatus { cell_id, status } => {
                json!({ "cellId": cell_id, "status": status })
            }
            NotebookEvent::CellOutput { cell_id, outputs } => {
                json!({ "cellId": cell_id, "outputs": outputs })
            }
            NotebookEvent::CellError { cell_id, error } => {
                json!({ "cellId": cell_id, "error": error })
            }
            NotebookEvent::RunFinished { cell_id } => json!({ "cellId": cell_id }),
        }
    }
}

/// An event plus the run it belongs to, if any.
#[derive(Debug, Clone)]
pub struct BusEvent {
    /// Current run id when emitted during a run.
    pub run_id: Option<u64>,
    pub event: NotebookEvent,
}

/// Fan-out bus over a broadcast channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BusEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_QUEUE_CAPACITY);
        Self { tx }
    }

    /// Register a subscriber. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.tx.subscribe()
    }

    /// Publish to all subscribers. Publishing with no subscribers is a no-op.
    pub fn publish(&self, run_id: Option<u64>, event: NotebookEvent) {
        tracing::trace!(event = event.name(), ?run_id, "publish");
        let _ = self.tx.send(BusEvent { run_id, event });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NotebookSettings;

    #[tokio::test]
    async fn test_fan_out_to_all_subscribers() {
        let bus = EventBus::new();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        bus.publish(Some(1), NotebookEvent::RunStarted { cell_id: CellId::new() });

        assert_eq!(rx1.recv().await.unwrap().event.name(), "run_started");
        assert_eq!(rx2.recv().await.unwrap().run_id, Some(1));
    }

    #[tokio::test]
    async fn test_laggard_drops_oldest() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        for _ in 0..(EVENT_QUEUE_CAPACITY + 10) {
            bus.publish(None, NotebookEvent::RunFinished { cell_id: CellId::new() });
        }
        match rx.recv().await {
            Err(broadcast::error::RecvError::Lagged(n)) => assert_eq!(n, 10),
            other => panic!("expected lag, got {other:?}"),
        }
        // delivery resumes with the oldest retained event
        assert!(rx.recv().await.is_ok());
    }

    #[test]
    fn test_publish_without_subscribers_is_noop() {
        let bus = EventBus::new();
        bus.publish(None, NotebookEvent::RunFinished { cell_id: CellId::new() });
    }

    #[test]
    fn test_payload_shapes() {
        let id = CellId::new();
        let event = NotebookEvent::CellStatus {
            cell_id: id,
            status: CellStatus::Running,
        };
        assert_eq!(event.name(), "cell_status");
        let payload = event.payload();
        assert_eq!(payload["cellId"], json!(id));
        assert_eq!(payload["status"], "running");

        let snapshot = NotebookEvent::NotebookState(Notebook {
            settings: NotebookSettings::default(),
            cells: Vec::new(),
        });
        assert_eq!(snapshot.payload()["cells"], json!([]));
    }
}
