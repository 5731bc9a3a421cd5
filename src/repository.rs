//! Repository contract and the in-memory implementation.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::aggregate::Aggregate;
use crate::event::{RecordedEvent, encode_event, rehydrate};
use crate::metadata::{AggregateId, Metadata, Version, stream_id};

/// Error surface of the repository contract.
///
/// `get_by_id` produces `NotFound`, `CorruptStream`, or `Store`;
/// `save` produces `Conflict` or `Store`. Only `NotFound` triggers the
/// pipeline's create path.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepoError {
    /// No stream exists for the aggregate id.
    #[error("stream not found")]
    NotFound,

    /// Optimistic append conflict: the stream's last version differs
    /// from the caller's expected version.
    #[error("optimistic concurrency conflict")]
    Conflict,

    /// A persisted event could not be folded back into state.
    #[error("corrupt stream: {0}")]
    CorruptStream(String),

    /// Transport or driver failure.
    #[error("store failure: {0}")]
    Store(String),
}

/// Load and append access to one aggregate type's streams.
///
/// Implementations fetch the stream for `{PREFIX}-{id}` in insertion
/// order, fold it with the aggregate's `init`/`evolve`, and append new
/// events under an optimistic version check. Each call uses its own
/// short-lived session; implementations are safe for concurrent use.
#[async_trait]
pub trait Repository<A: Aggregate>: Send + Sync {
    /// Rehydrate the aggregate's current state and version.
    ///
    /// # Errors
    ///
    /// * [`RepoError::NotFound`] - no stream exists for `id`.
    /// * [`RepoError::CorruptStream`] - a persisted event failed to decode.
    /// * [`RepoError::Store`] - transport/driver failure.
    async fn get_by_id(&self, id: &AggregateId) -> Result<(A, Version), RepoError>;

    /// Append `events` at `expected` version; `expected == 0` starts a
    /// new stream. Each persisted event receives a metadata envelope
    /// derived from the command's `meta`.
    ///
    /// Returns the stream's new last version.
    ///
    /// # Errors
    ///
    /// * [`RepoError::Conflict`] - the stream advanced past `expected`
    ///   (or already exists when `expected == 0`).
    /// * [`RepoError::Store`] - transport/driver failure.
    async fn save(
        &self,
        id: &AggregateId,
        events: &[A::Event],
        expected: Version,
        meta: &Metadata,
    ) -> Result<Version, RepoError>;
}

/// In-memory repository for tests and demos.
///
/// Stores fully encoded [`RecordedEvent`] rows, so the wire codec and
/// rehydration fold are exercised exactly as they are against the
/// relational store.
pub struct MemoryRepository<A: Aggregate> {
    streams: Arc<Mutex<HashMap<String, Vec<RecordedEvent>>>>,
    _aggregate: PhantomData<fn() -> A>,
}

impl<A: Aggregate> Default for MemoryRepository<A> {
    fn default() -> Self {
        Self::new()
    }
}

// Manual `Clone` because `A` itself need not be `Clone` for the handle --
// clones share the underlying stream map.
impl<A: Aggregate> Clone for MemoryRepository<A> {
    fn clone(&self) -> Self {
        Self {
            streams: Arc::clone(&self.streams),
            _aggregate: PhantomData,
        }
    }
}

impl<A: Aggregate> MemoryRepository<A> {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self {
            streams: Arc::new(Mutex::new(HashMap::new())),
            _aggregate: PhantomData,
        }
    }

    /// Snapshot the recorded rows of one stream, in order.
    pub async fn records(&self, id: &AggregateId) -> Vec<RecordedEvent> {
        let streams = self.streams.lock().await;
        streams
            .get(&stream_id(A::PREFIX, id))
            .cloned()
            .unwrap_or_default()
    }

    /// Append a raw record, bypassing the codec. Lets tests fabricate
    /// corrupt or foreign rows.
    pub async fn append_raw(&self, id: &AggregateId, record: RecordedEvent) {
        let mut streams = self.streams.lock().await;
        streams.entry(stream_id(A::PREFIX, id)).or_default().push(record);
    }
}

#[async_trait]
impl<A: Aggregate> Repository<A> for MemoryRepository<A> {
    async fn get_by_id(&self, id: &AggregateId) -> Result<(A, Version), RepoError> {
        let streams = self.streams.lock().await;
        let records = streams
            .get(&stream_id(A::PREFIX, id))
            .filter(|r| !r.is_empty())
            .ok_or(RepoError::NotFound)?;
        rehydrate::<A>(records).map_err(|e| RepoError::CorruptStream(e.to_string()))
    }

    async fn save(
        &self,
        id: &AggregateId,
        events: &[A::Event],
        expected: Version,
        meta: &Metadata,
    ) -> Result<Version, RepoError> {
        let key = stream_id(A::PREFIX, id);
        let mut streams = self.streams.lock().await;
        let stream = streams.entry(key.clone()).or_default();

        let current = stream.last().map(|r| r.version).unwrap_or(0);
        if current != expected {
            return Err(RepoError::Conflict);
        }

        let now = Utc::now();
        let mut version = current;
        for event in events {
            let (event_type, payload) =
                encode_event(event).map_err(|e| RepoError::Store(e.to_string()))?;
            let mut derived = meta.derive();
            if derived.timestamp.is_none() {
                derived.timestamp = Some(now);
            }
            version += 1;
            stream.push(RecordedEvent {
                stream_id: key.clone(),
                version,
                event_type,
                payload,
                metadata: Some(derived),
                recorded_at: now,
            });
        }
        Ok(version)
    }
}
