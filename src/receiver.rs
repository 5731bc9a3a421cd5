//! Queue receiver: poll, dispatch, ack-or-leave.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::cloudevents::CloudEvent;
use crate::ingress::{CloudEventIngress, ProcessOutcome};
use crate::queue::{MessageQueue, QueueMessage};

/// Timing knobs of the receive loop.
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    /// Visibility timeout applied to each read. A message that is not
    /// acked becomes visible again after this window; it is the only
    /// retry clock.
    pub visibility: Duration,
    /// Pause after an empty poll.
    pub poll_idle: Duration,
    /// Pause after a queue engine error.
    pub poll_error: Duration,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            visibility: Duration::from_secs(30),
            poll_idle: Duration::from_secs(1),
            poll_error: Duration::from_secs(5),
        }
    }
}

/// Consumes one queue, one message at a time, dispatching each
/// CloudEvent through the same procedure as the synchronous ingress.
///
/// Outcomes: success acks (deletes) the message; every failure --
/// malformed body, rejection, handler error -- leaves it for
/// visibility-timeout redelivery. The loop stops when the watch signal
/// flips to `true`; an in-flight message is processed to completion
/// first, so an acked message is never one whose handler was abandoned.
pub struct QueueReceiver {
    queue: Arc<dyn MessageQueue>,
    queue_name: String,
    handler: Arc<dyn CloudEventIngress>,
    config: ReceiverConfig,
}

impl QueueReceiver {
    /// Create a receiver with default timings.
    pub fn new(
        queue: Arc<dyn MessageQueue>,
        queue_name: impl Into<String>,
        handler: Arc<dyn CloudEventIngress>,
    ) -> Self {
        Self {
            queue,
            queue_name: queue_name.into(),
            handler,
            config: ReceiverConfig::default(),
        }
    }

    /// Override the loop timings.
    pub fn with_config(mut self, config: ReceiverConfig) -> Self {
        self.config = config;
        self
    }

    /// The queue this receiver consumes.
    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    /// Run the receive loop until `shutdown` flips to `true` (or its
    /// sender is dropped).
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(queue = %self.queue_name, "receiver started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                read = self.queue.read(&self.queue_name, self.config.visibility) => match read {
                    Ok(Some(msg)) => {
                        // Processing is not raced against shutdown: the
                        // handler either completes and acks, or leaves
                        // the message visible for the next consumer.
                        self.process(msg).await;
                    }
                    Ok(None) => {
                        if !pause(self.config.poll_idle, &mut shutdown).await {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(queue = %self.queue_name, error = %e, "queue read failed");
                        if !pause(self.config.poll_error, &mut shutdown).await {
                            break;
                        }
                    }
                }
            }
        }
        tracing::info!(queue = %self.queue_name, "receiver stopped");
    }

    async fn process(&self, msg: QueueMessage) {
        let ce: CloudEvent = match serde_json::from_str(&msg.body) {
            Ok(ce) => ce,
            Err(e) => {
                // Not ackable as handled; leave it so the failure stays
                // observable through the climbing read count.
                tracing::warn!(
                    queue = %self.queue_name,
                    msg_id = msg.id,
                    read_count = msg.read_count,
                    error = %e,
                    "malformed message body; leaving for retry"
                );
                return;
            }
        };

        match self.handler.process(&ce).await {
            ProcessOutcome::Accepted => match self.queue.delete(&self.queue_name, msg.id).await {
                Ok(()) => {
                    tracing::debug!(queue = %self.queue_name, msg_id = msg.id, id = %ce.id, "message acked");
                }
                Err(e) => {
                    // The command was applied but the ack was lost; the
                    // redelivered message retries against the advanced
                    // stream and resolves there.
                    tracing::warn!(queue = %self.queue_name, msg_id = msg.id, error = %e, "ack failed; message will redeliver");
                }
            },
            outcome => {
                tracing::warn!(
                    queue = %self.queue_name,
                    msg_id = msg.id,
                    read_count = msg.read_count,
                    id = %ce.id,
                    ?outcome,
                    "processing failed; leaving message for retry"
                );
            }
        }
    }
}

/// Sleep for `duration`, waking early on shutdown. Returns `false` when
/// the loop should stop.
async fn pause(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        changed = shutdown.changed() => changed.is_ok() && !*shutdown.borrow(),
    }
}
