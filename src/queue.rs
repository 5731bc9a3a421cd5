//! Message queue contract and its Postgres and in-memory engines.
//!
//! One queue per aggregate type; messages are serialized CloudEvents.
//! Delivery is at-least-once: a read hides the message for the
//! visibility timeout, and only an explicit delete removes it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::schema::is_name_token;

/// Error surface of the queue engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    /// The queue name is not a valid aggregate-type token.
    #[error("invalid queue name `{0}`")]
    InvalidName(String),

    /// Transport or engine failure.
    #[error("queue engine failure: {0}")]
    Engine(String),
}

/// A message as read from a queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    /// Engine-assigned message id, unique per queue.
    pub id: i64,
    /// How many times the message has been read (this read included).
    pub read_count: i32,
    /// UTF-8 JSON body (a serialized CloudEvent).
    pub body: String,
}

/// Minimal queue engine contract: create, send, read with a visibility
/// timeout, delete.
///
/// `send` returns only once the engine has durably accepted the
/// message. `read` hides the returned message from other consumers for
/// `visibility`; an unacked message becomes visible again after the
/// timeout elapses.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Idempotently create the queue.
    ///
    /// # Errors
    ///
    /// [`QueueError::InvalidName`] for a malformed name,
    /// [`QueueError::Engine`] for transport failures. "Already exists"
    /// is not an error.
    async fn ensure_queue(&self, name: &str) -> Result<(), QueueError>;

    /// Enqueue one message; returns its id once durably accepted.
    ///
    /// # Errors
    ///
    /// [`QueueError::Engine`] when the engine rejects the message.
    async fn send(&self, queue: &str, body: &str) -> Result<i64, QueueError>;

    /// Read up to one visible message, hiding it for `visibility`.
    ///
    /// # Errors
    ///
    /// [`QueueError::Engine`] on transport failure or a missing queue.
    async fn read(&self, queue: &str, visibility: Duration) -> Result<Option<QueueMessage>, QueueError>;

    /// Acknowledge (remove) a message by id.
    ///
    /// # Errors
    ///
    /// [`QueueError::Engine`] on transport failure.
    async fn delete(&self, queue: &str, id: i64) -> Result<(), QueueError>;
}

// ---------------------------------------------------------------------------
// Postgres engine
// ---------------------------------------------------------------------------

/// Map a queue name onto its backing table.
///
/// Names are restricted to the aggregate-type token grammar, so the
/// formatted identifier is always safe; dashes become underscores.
fn queue_table(name: &str) -> Result<String, QueueError> {
    if !is_name_token(name) {
        return Err(QueueError::InvalidName(name.to_string()));
    }
    Ok(format!("queue_{}", name.replace('-', "_")))
}

/// Postgres-backed message queue: one table per queue, visibility via a
/// `visible_at` timestamp, and `FOR UPDATE SKIP LOCKED` reads so
/// concurrent consumers never double-deliver inside the timeout.
#[derive(Clone, Debug)]
pub struct PgQueue {
    pool: PgPool,
}

impl PgQueue {
    /// Wrap a connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn engine_error(err: sqlx::Error) -> QueueError {
    QueueError::Engine(err.to_string())
}

#[async_trait]
impl MessageQueue for PgQueue {
    async fn ensure_queue(&self, name: &str) -> Result<(), QueueError> {
        let table = queue_table(name)?;
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                msg_id      bigint GENERATED ALWAYS AS IDENTITY PRIMARY KEY,
                read_count  integer NOT NULL DEFAULT 0,
                enqueued_at timestamptz NOT NULL DEFAULT now(),
                visible_at  timestamptz NOT NULL DEFAULT now(),
                body        jsonb NOT NULL
            )"
        );
        match sqlx::query(&ddl).execute(&self.pool).await {
            Ok(_) => Ok(()),
            // Two creators can race past IF NOT EXISTS; both outcomes
            // leave the queue in place.
            Err(e) if e.to_string().contains("already exists") => Ok(()),
            Err(e) => Err(engine_error(e)),
        }
    }

    async fn send(&self, queue: &str, body: &str) -> Result<i64, QueueError> {
        let table = queue_table(queue)?;
        let sql = format!("INSERT INTO {table} (body) VALUES ($1::jsonb) RETURNING msg_id");
        let row = sqlx::query(&sql)
            .bind(body)
            .fetch_one(&self.pool)
            .await
            .map_err(engine_error)?;
        row.try_get("msg_id").map_err(engine_error)
    }

    async fn read(&self, queue: &str, visibility: Duration) -> Result<Option<QueueMessage>, QueueError> {
        let table = queue_table(queue)?;
        let sql = format!(
            "UPDATE {table}
             SET visible_at = now() + make_interval(secs => $1),
                 read_count = read_count + 1
             WHERE msg_id = (
                 SELECT msg_id FROM {table}
                 WHERE visible_at <= now()
                 ORDER BY msg_id
                 LIMIT 1
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING msg_id, read_count, body::text AS body"
        );
        let row = sqlx::query(&sql)
            .bind(visibility.as_secs_f64())
            .fetch_optional(&self.pool)
            .await
            .map_err(engine_error)?;

        row.map(|row| {
            Ok(QueueMessage {
                id: row.try_get("msg_id").map_err(engine_error)?,
                read_count: row.try_get("read_count").map_err(engine_error)?,
                body: row.try_get("body").map_err(engine_error)?,
            })
        })
        .transpose()
    }

    async fn delete(&self, queue: &str, id: i64) -> Result<(), QueueError> {
        let table = queue_table(queue)?;
        let sql = format!("DELETE FROM {table} WHERE msg_id = $1");
        sqlx::query(&sql)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(engine_error)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-memory engine
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct MemoryQueueState {
    next_id: i64,
    messages: Vec<StoredMessage>,
}

#[derive(Debug)]
struct StoredMessage {
    id: i64,
    read_count: i32,
    visible_at: Instant,
    body: String,
}

/// In-memory queue engine for tests and demos.
///
/// Implements the same visibility-timeout semantics as [`PgQueue`];
/// clones share the underlying queues.
#[derive(Clone, Debug, Default)]
pub struct MemoryQueue {
    queues: Arc<Mutex<HashMap<String, MemoryQueueState>>>,
}

impl MemoryQueue {
    /// Create an engine with no queues.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages in the queue, visible or not. Missing queues
    /// count as empty.
    pub async fn depth(&self, queue: &str) -> usize {
        let queues = self.queues.lock().await;
        queues.get(queue).map(|q| q.messages.len()).unwrap_or(0)
    }

    /// Expire every in-flight visibility timeout, re-exposing unacked
    /// messages immediately. Lets redelivery tests avoid real waits.
    pub async fn expire_visibility(&self, queue: &str) {
        let mut queues = self.queues.lock().await;
        if let Some(state) = queues.get_mut(queue) {
            let now = Instant::now();
            for msg in &mut state.messages {
                msg.visible_at = now;
            }
        }
    }
}

#[async_trait]
impl MessageQueue for MemoryQueue {
    async fn ensure_queue(&self, name: &str) -> Result<(), QueueError> {
        if !is_name_token(name) {
            return Err(QueueError::InvalidName(name.to_string()));
        }
        let mut queues = self.queues.lock().await;
        queues.entry(name.to_string()).or_default();
        Ok(())
    }

    async fn send(&self, queue: &str, body: &str) -> Result<i64, QueueError> {
        let mut queues = self.queues.lock().await;
        let state = queues
            .get_mut(queue)
            .ok_or_else(|| QueueError::Engine(format!("no such queue `{queue}`")))?;
        state.next_id += 1;
        let id = state.next_id;
        state.messages.push(StoredMessage {
            id,
            read_count: 0,
            visible_at: Instant::now(),
            body: body.to_string(),
        });
        Ok(id)
    }

    async fn read(&self, queue: &str, visibility: Duration) -> Result<Option<QueueMessage>, QueueError> {
        let mut queues = self.queues.lock().await;
        let state = queues
            .get_mut(queue)
            .ok_or_else(|| QueueError::Engine(format!("no such queue `{queue}`")))?;

        let now = Instant::now();
        let Some(msg) = state
            .messages
            .iter_mut()
            .filter(|m| m.visible_at <= now)
            .min_by_key(|m| m.id)
        else {
            return Ok(None);
        };
        msg.visible_at = now + visibility;
        msg.read_count += 1;
        Ok(Some(QueueMessage {
            id: msg.id,
            read_count: msg.read_count,
            body: msg.body.clone(),
        }))
    }

    async fn delete(&self, queue: &str, id: i64) -> Result<(), QueueError> {
        let mut queues = self.queues.lock().await;
        let state = queues
            .get_mut(queue)
            .ok_or_else(|| QueueError::Engine(format!("no such queue `{queue}`")))?;
        state.messages.retain(|m| m.id != id);
        Ok(())
    }
}
