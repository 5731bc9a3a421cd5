//! Event-sourcing command-processing core.
//!
//! `jade-es` turns imperative commands into append-only sequences of
//! immutable events persisted against per-aggregate streams in a
//! relational event store, with optional asynchronous delivery through a
//! database-backed message queue. Commands arrive as CloudEvents tagged
//! with schema URNs; a registry maps each URN to its command type and
//! handler, and the generic pipeline rehydrates the aggregate, asks it
//! to decide, and appends the resulting events under optimistic
//! concurrency.
//!
//! # Key Types
//!
//! | Type | Role |
//! |------|------|
//! | [`Aggregate`] | Domain model: `create`/`decide` commands, `init`/`evolve` state |
//! | [`CommandRegistry`] | Schema URN -> command type -> handler maps |
//! | [`CommandBus`] | Dispatch by runtime command type |
//! | [`Repository`] | Stream load/append contract ([`PgRepository`], [`MemoryRepository`]) |
//! | [`DirectIngress`] / [`QueuedIngress`] | CloudEvents processing, inline or via queue |
//! | [`QueuePublisher`] / [`QueueReceiver`] | Per-aggregate queues with visibility-timeout retry |
//! | [`WorkerHost`] | Runs receivers in parallel with graceful shutdown |
//!
//! # Quick Start
//!
//! Wire a registry with one [`AggregateHandler`] per aggregate, then
//! process CloudEvents directly or serve them over HTTP:
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use jade_es::{CloudEvent, CloudEventIngress, CommandRegistry, DirectIngress, ProcessOutcome};
//!
//! # async fn run(registry: Arc<CommandRegistry>) {
//! let ingress = DirectIngress::new(registry);
//!
//! let ce: CloudEvent = serde_json::from_str(
//!     r#"{
//!         "id": "ce-1",
//!         "source": "/clients/web",
//!         "specversion": "1.0",
//!         "type": "com.jade.command",
//!         "dataschema": "urn:schema:jade:command:customer:create:1",
//!         "data": {
//!             "customerId": "c1",
//!             "name": "Alice",
//!             "email": "a@x",
//!             "metadata": {"id": "m1", "correlationId": "k1"}
//!         }
//!     }"#,
//! )
//! .unwrap();
//!
//! match ingress.process(&ce).await {
//!     ProcessOutcome::Accepted => println!("events appended"),
//!     outcome => eprintln!("not accepted: {outcome:?}"),
//! }
//! # }
//! ```
//!
//! See `demos/customer.rs` for a self-contained runnable walkthrough of
//! the synchronous path and `demos/worker.rs` for the queued path
//! against Postgres.

mod aggregate;
pub use aggregate::Aggregate;
mod bus;
pub use bus::{BusError, CommandBus};
mod cloudevents;
pub use cloudevents::{CloudEvent, EnvelopeError, JadeExtension, SPEC_VERSION};
mod command;
pub use command::{AnyCommand, CommandSet};
mod error;
pub use error::{DecodeError, ExecuteError, HandlerError};
mod event;
pub use event::{EventSet, RecordedEvent, catch_up, encode_event, rehydrate};
mod handler;
pub use handler::{AggregateHandler, CommandHandler};
mod http;
pub use http::{AppState, SchemasResponse, router};
mod ingress;
pub use ingress::{
    CloudEventIngress, DirectIngress, IngressResponse, IngressStatus, ProcessOutcome, QueuedIngress,
};
mod metadata;
pub use metadata::{AggregateId, Metadata, Version, stream_id};
mod pipeline;
pub use pipeline::execute;
mod publisher;
pub use publisher::{PublishError, QueuePublisher};
mod queue;
pub use queue::{MemoryQueue, MessageQueue, PgQueue, QueueError, QueueMessage};
mod receiver;
pub use receiver::{QueueReceiver, ReceiverConfig};
mod registry;
pub use registry::CommandRegistry;
mod repository;
pub use repository::{MemoryRepository, RepoError, Repository};
mod schema;
pub use schema::{SchemaError, SchemaKind, SchemaUrn, is_name_token};
mod snapshot;
pub use snapshot::{Snapshot, SnapshotPolicy};
mod store;
pub use store::{PgRepository, migrate};
mod worker;
pub use worker::{WorkerHandle, WorkerHost};
