//! Queue publisher: route a CloudEvent onto its aggregate's queue.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::cloudevents::CloudEvent;
use crate::queue::MessageQueue;
use crate::schema::{SchemaKind, SchemaUrn};

/// Error returned when a CloudEvent could not be durably enqueued.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("publish failed: {0}")]
pub struct PublishError(pub String);

/// Publishes CloudEvents onto per-aggregate queues.
///
/// The queue name is the aggregate segment of the command's
/// `dataschema` URN. Queues are created idempotently on first use and
/// remembered, so steady-state publishing is a single enqueue call.
/// `publish` returns only after the engine has durably accepted the
/// message.
pub struct QueuePublisher {
    queue: Arc<dyn MessageQueue>,
    ensured: Mutex<HashSet<String>>,
}

impl QueuePublisher {
    /// Create a publisher over a queue engine.
    pub fn new(queue: Arc<dyn MessageQueue>) -> Self {
        Self {
            queue,
            ensured: Mutex::new(HashSet::new()),
        }
    }

    /// Serialize `ce` and enqueue it on its aggregate's queue.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError`] when the envelope has no command
    /// `dataschema`, the queue cannot be created, or the engine rejects
    /// the message.
    pub async fn publish(&self, ce: &CloudEvent) -> Result<(), PublishError> {
        let schema = ce
            .dataschema
            .as_deref()
            .ok_or_else(|| PublishError("cloudevent has no dataschema".to_string()))?;
        let urn = SchemaUrn::parse_expecting(schema, SchemaKind::Command)
            .map_err(|e| PublishError(e.to_string()))?;
        let queue_name = urn.aggregate().to_string();

        {
            let mut ensured = self.ensured.lock().await;
            if !ensured.contains(&queue_name) {
                self.queue
                    .ensure_queue(&queue_name)
                    .await
                    .map_err(|e| PublishError(e.to_string()))?;
                ensured.insert(queue_name.clone());
            }
        }

        let body = serde_json::to_string(ce).map_err(|e| PublishError(e.to_string()))?;
        let msg_id = self
            .queue
            .send(&queue_name, &body)
            .await
            .map_err(|e| PublishError(e.to_string()))?;

        tracing::debug!(queue = %queue_name, msg_id, id = %ce.id, "cloudevent enqueued");
        Ok(())
    }
}

impl std::fmt::Debug for QueuePublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuePublisher").finish_non_exhaustive()
    }
}
