//! Worker host: run queue receivers in parallel with graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::ingress::CloudEventIngress;
use crate::queue::MessageQueue;
use crate::receiver::{QueueReceiver, ReceiverConfig};

/// A set of receivers sharing one message handler, started together and
/// stopped together.
///
/// Each receiver consumes its own per-aggregate queue; within one host
/// they run in parallel, each processing one message at a time.
#[derive(Default)]
pub struct WorkerHost {
    receivers: Vec<QueueReceiver>,
}

impl WorkerHost {
    /// Create an empty host.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one receiver.
    pub fn receiver(mut self, receiver: QueueReceiver) -> Self {
        self.receivers.push(receiver);
        self
    }

    /// Build a host with one receiver per queue name, all dispatching
    /// through the shared `handler` with the same `config`.
    pub fn for_queues<I, S>(
        queue: Arc<dyn MessageQueue>,
        handler: Arc<dyn CloudEventIngress>,
        names: I,
        config: ReceiverConfig,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let receivers = names
            .into_iter()
            .map(|name| {
                QueueReceiver::new(Arc::clone(&queue), name, Arc::clone(&handler))
                    .with_config(config.clone())
            })
            .collect();
        Self { receivers }
    }

    /// Start every receiver on the current runtime.
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let tasks: Vec<JoinHandle<()>> = self
            .receivers
            .into_iter()
            .map(|receiver| {
                let rx = shutdown_rx.clone();
                tokio::spawn(receiver.run(rx))
            })
            .collect();
        tracing::info!(receivers = tasks.len(), "worker host started");
        WorkerHandle { shutdown_tx, tasks }
    }
}

/// Handle for controlling a running worker host.
///
/// [`shutdown`](WorkerHandle::shutdown) signals every receiver to stop
/// and waits for all of them to return. Dropping the handle without
/// calling it also stops the receivers (the shutdown sender closes),
/// but does not wait for them.
pub struct WorkerHandle {
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Signal all receivers to stop and wait until every loop returns.
    ///
    /// In-flight message processing completes before a receiver exits.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "receiver task panicked");
            }
        }
        tracing::info!("worker host stopped");
    }

    /// Wait for shutdown with a deadline; returns `false` if any
    /// receiver was still running when the deadline expired.
    pub async fn shutdown_with_timeout(self, deadline: Duration) -> bool {
        tokio::time::timeout(deadline, self.shutdown()).await.is_ok()
    }

    /// Whether every receiver has already returned.
    pub fn is_finished(&self) -> bool {
        self.tasks.iter().all(JoinHandle::is_finished)
    }
}
