//! CloudEvents command ingress: validate, extract, dispatch or enqueue.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::cloudevents::CloudEvent;
use crate::publisher::QueuePublisher;
use crate::registry::CommandRegistry;
use crate::schema::{SchemaKind, SchemaUrn};

/// Disposition reported back to the client for one CloudEvent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngressStatus {
    /// The command was handled (direct mode) or durably enqueued
    /// (queued mode).
    Accepted,
    /// The envelope, schema, or payload was not acceptable; the client
    /// must change the request.
    Rejected,
    /// Processing failed after a well-formed request; retryable.
    Failed,
}

/// Response body of the ingress: `{id, status, message?}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressResponse {
    /// Echo of the CloudEvent id.
    pub id: String,
    /// Disposition.
    pub status: IngressStatus,
    /// Failure detail, absent on success.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub message: Option<String>,
}

/// Internal outcome of processing one CloudEvent.
///
/// Distinguishes envelope-level rejection (`Invalid`, HTTP 400) from
/// schema/payload rejection (`Rejected`, HTTP 422); both collapse to
/// [`IngressStatus::Rejected`] in the response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Handled or durably enqueued.
    Accepted,
    /// The CloudEvents envelope itself is invalid.
    Invalid(String),
    /// Missing/unknown schema, missing data, or an undecodable payload.
    Rejected(String),
    /// The handler or the queue engine failed.
    Failed(String),
}

impl ProcessOutcome {
    /// The client-facing status for this outcome.
    pub fn status(&self) -> IngressStatus {
        match self {
            ProcessOutcome::Accepted => IngressStatus::Accepted,
            ProcessOutcome::Invalid(_) | ProcessOutcome::Rejected(_) => IngressStatus::Rejected,
            ProcessOutcome::Failed(_) => IngressStatus::Failed,
        }
    }

    /// Build the response body, echoing the CloudEvent id.
    pub fn into_response(self, id: &str) -> IngressResponse {
        let status = self.status();
        let message = match self {
            ProcessOutcome::Accepted => None,
            ProcessOutcome::Invalid(msg)
            | ProcessOutcome::Rejected(msg)
            | ProcessOutcome::Failed(msg) => Some(msg),
        };
        IngressResponse {
            id: id.to_string(),
            status,
            message,
        }
    }
}

/// A CloudEvent processor: the direct (synchronous) and queued
/// (asynchronous) ingress modes, and the procedure the queue receiver
/// replays for each message.
#[async_trait]
pub trait CloudEventIngress: Send + Sync {
    /// Process one CloudEvent to an outcome. Never panics; every
    /// failure mode is a returned outcome.
    async fn process(&self, ce: &CloudEvent) -> ProcessOutcome;
}

/// Envelope screening shared by both modes: validate the envelope,
/// require a command `dataschema`, require `data`.
fn screen<'a>(ce: &'a CloudEvent) -> Result<(SchemaUrn, &'a serde_json::Value), ProcessOutcome> {
    if let Err(e) = ce.validate() {
        return Err(ProcessOutcome::Invalid(e.to_string()));
    }
    let schema = ce
        .dataschema
        .as_deref()
        .ok_or_else(|| ProcessOutcome::Rejected("missing dataschema".to_string()))?;
    let urn = SchemaUrn::parse_expecting(schema, SchemaKind::Command)
        .map_err(|e| ProcessOutcome::Rejected(e.to_string()))?;
    let data = ce
        .data
        .as_ref()
        .ok_or_else(|| ProcessOutcome::Rejected("missing data".to_string()))?;
    Ok((urn, data))
}

/// Synchronous ingress: decode the command and run its handler inline.
#[derive(Clone, Debug)]
pub struct DirectIngress {
    registry: Arc<CommandRegistry>,
}

impl DirectIngress {
    /// Create a direct-mode ingress over a wired registry.
    pub fn new(registry: Arc<CommandRegistry>) -> Self {
        Self { registry }
    }

    /// The registry this ingress dispatches through.
    pub fn registry(&self) -> &Arc<CommandRegistry> {
        &self.registry
    }
}

#[async_trait]
impl CloudEventIngress for DirectIngress {
    async fn process(&self, ce: &CloudEvent) -> ProcessOutcome {
        let (urn, data) = match screen(ce) {
            Ok(parts) => parts,
            Err(outcome) => return outcome,
        };

        let cmd = match self.registry.deserialize_command(&urn, data) {
            Ok(cmd) => cmd,
            Err(e) => {
                tracing::debug!(id = %ce.id, schema = %urn, error = %e, "cloudevent rejected");
                return ProcessOutcome::Rejected(e.to_string());
            }
        };

        let Some(handler) = self.registry.handler(cmd.type_id()) else {
            return ProcessOutcome::Rejected(format!(
                "no handler registered for command type {}",
                cmd.type_name()
            ));
        };

        match handler.handle(cmd).await {
            Ok(()) => {
                tracing::debug!(id = %ce.id, schema = %urn, "cloudevent accepted");
                ProcessOutcome::Accepted
            }
            Err(e) => {
                tracing::warn!(id = %ce.id, schema = %urn, error = %e, "cloudevent handler failed");
                ProcessOutcome::Failed(e.to_string())
            }
        }
    }
}

/// Asynchronous ingress: screen the envelope and enqueue the CloudEvent
/// for a worker; the payload is not decoded here.
pub struct QueuedIngress {
    publisher: QueuePublisher,
}

impl QueuedIngress {
    /// Create a queued-mode ingress over a publisher.
    pub fn new(publisher: QueuePublisher) -> Self {
        Self { publisher }
    }
}

#[async_trait]
impl CloudEventIngress for QueuedIngress {
    async fn process(&self, ce: &CloudEvent) -> ProcessOutcome {
        if let Err(outcome) = screen(ce) {
            return outcome;
        }
        match self.publisher.publish(ce).await {
            Ok(()) => ProcessOutcome::Accepted,
            Err(e) => {
                tracing::warn!(id = %ce.id, error = %e, "cloudevent enqueue failed");
                ProcessOutcome::Failed(e.to_string())
            }
        }
    }
}
