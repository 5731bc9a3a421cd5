//! Postgres event store adapter.
//!
//! One `events` table holds every stream: rows keyed by
//! `(stream_id, version)` with the event's schema URN as its type tag
//! and payload/metadata as jsonb in the shared camelCase policy. The
//! primary key doubles as the optimistic concurrency check -- a racing
//! append loses on the unique violation and surfaces as a conflict.

use std::marker::PhantomData;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use crate::aggregate::Aggregate;
use crate::event::{EventSet, RecordedEvent, catch_up, rehydrate};
use crate::metadata::{AggregateId, Metadata, Version, stream_id};
use crate::repository::{RepoError, Repository};
use crate::snapshot::SnapshotPolicy;

/// Events table: append-only, versions contiguous from 1 per stream.
const EVENTS_DDL: &str = "CREATE TABLE IF NOT EXISTS events (
    stream_id   text        NOT NULL,
    version     bigint      NOT NULL,
    event_type  text        NOT NULL,
    payload     jsonb       NOT NULL,
    metadata    jsonb,
    recorded_at timestamptz NOT NULL DEFAULT now(),
    PRIMARY KEY (stream_id, version)
)";

/// Snapshots table: at most one row per stream.
const SNAPSHOTS_DDL: &str = "CREATE TABLE IF NOT EXISTS snapshots (
    stream_id text        PRIMARY KEY,
    version   bigint      NOT NULL,
    state     jsonb       NOT NULL,
    taken_at  timestamptz NOT NULL DEFAULT now()
)";

/// Create the event store tables if they do not exist.
///
/// # Errors
///
/// Returns the driver error when DDL execution fails.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(EVENTS_DDL).execute(pool).await?;
    sqlx::query(SNAPSHOTS_DDL).execute(pool).await?;
    Ok(())
}

/// Postgres-backed repository for one aggregate type.
///
/// Each call runs on its own short-lived connection from the pool;
/// the adapter is safe for concurrent use. An optional
/// [`SnapshotPolicy`] makes `get_by_id` persist a snapshot after a
/// qualifying fold, so later loads replay only the suffix.
pub struct PgRepository<A: Aggregate> {
    pool: PgPool,
    snapshots: Option<SnapshotPolicy>,
    _aggregate: PhantomData<fn() -> A>,
}

impl<A: Aggregate> Clone for PgRepository<A> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            snapshots: self.snapshots.clone(),
            _aggregate: PhantomData,
        }
    }
}

impl<A: Aggregate> PgRepository<A> {
    /// Create a repository over a connection pool, without snapshotting.
    pub fn new(pool: PgPool) -> Self {
        debug_assert!(
            crate::schema::is_name_token(A::PREFIX) && A::PREFIX.len() <= 32,
            "aggregate prefix must match [a-z][a-z0-9-]* and be at most 32 chars"
        );
        Self {
            pool,
            snapshots: None,
            _aggregate: PhantomData,
        }
    }

    /// Enable snapshot maintenance under `policy`.
    pub fn with_snapshots(mut self, policy: SnapshotPolicy) -> Self {
        self.snapshots = Some(policy);
        self
    }

    /// Load the snapshot row for a stream, tolerating decode failures
    /// as cache misses.
    async fn load_snapshot(&self, key: &str) -> Result<Option<(A, Version, DateTime<Utc>)>, RepoError> {
        let row = sqlx::query("SELECT version, state, taken_at FROM snapshots WHERE stream_id = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepoError::Store(e.to_string()))?;

        let Some(row) = row else { return Ok(None) };
        let version: i64 = row.try_get("version").map_err(|e| RepoError::Store(e.to_string()))?;
        let taken_at: DateTime<Utc> =
            row.try_get("taken_at").map_err(|e| RepoError::Store(e.to_string()))?;
        let state: serde_json::Value =
            row.try_get("state").map_err(|e| RepoError::Store(e.to_string()))?;

        match serde_json::from_value::<A>(state) {
            Ok(state) => Ok(Some((state, version as Version, taken_at))),
            Err(e) => {
                tracing::warn!(stream = %key, error = %e, "undecodable snapshot; treating as cache miss");
                Ok(None)
            }
        }
    }

    /// Fetch stream rows after `from_version`, in order.
    async fn fetch_events(&self, key: &str, from_version: Version) -> Result<Vec<RecordedEvent>, RepoError> {
        let rows = sqlx::query(
            "SELECT version, event_type, payload, metadata, recorded_at
             FROM events
             WHERE stream_id = $1 AND version > $2
             ORDER BY version",
        )
        .bind(key)
        .bind(from_version as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::Store(e.to_string()))?;

        rows.into_iter()
            .map(|row| {
                let version: i64 = row.try_get("version").map_err(|e| RepoError::Store(e.to_string()))?;
                let metadata: Option<serde_json::Value> =
                    row.try_get("metadata").map_err(|e| RepoError::Store(e.to_string()))?;
                Ok(RecordedEvent {
                    stream_id: key.to_string(),
                    version: version as Version,
                    event_type: row.try_get("event_type").map_err(|e| RepoError::Store(e.to_string()))?,
                    payload: row.try_get("payload").map_err(|e| RepoError::Store(e.to_string()))?,
                    metadata: metadata.and_then(|m| serde_json::from_value(m).ok()),
                    recorded_at: row
                        .try_get("recorded_at")
                        .map_err(|e| RepoError::Store(e.to_string()))?,
                })
            })
            .collect()
    }

    /// Persist a snapshot; failures are logged, never surfaced, since
    /// snapshots are advisory.
    async fn save_snapshot(&self, key: &str, state: &A, version: Version) {
        let state = match serde_json::to_value(state) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(stream = %key, error = %e, "snapshot state failed to serialize");
                return;
            }
        };
        let result = sqlx::query(
            "INSERT INTO snapshots (stream_id, version, state, taken_at)
             VALUES ($1, $2, $3, now())
             ON CONFLICT (stream_id)
             DO UPDATE SET version = excluded.version, state = excluded.state, taken_at = excluded.taken_at",
        )
        .bind(key)
        .bind(version as i64)
        .bind(state)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => tracing::debug!(stream = %key, version, "snapshot saved"),
            Err(e) => tracing::warn!(stream = %key, error = %e, "snapshot save failed"),
        }
    }
}

/// Whether a driver error message denotes an optimistic append race.
fn is_conflict(code: Option<&str>, message: &str) -> bool {
    // 23505 = unique_violation: a concurrent writer claimed the version.
    code == Some("23505")
        || message.contains("version mismatch")
        || message.contains("stream already exists")
}

fn translate_save_error(err: sqlx::Error) -> RepoError {
    if let sqlx::Error::Database(db) = &err {
        let code = db.code();
        if is_conflict(code.as_deref(), db.message()) {
            return RepoError::Conflict;
        }
    }
    RepoError::Store(err.to_string())
}

#[async_trait]
impl<A: Aggregate> Repository<A> for PgRepository<A> {
    async fn get_by_id(&self, id: &AggregateId) -> Result<(A, Version), RepoError> {
        let key = stream_id(A::PREFIX, id);

        let snapshot = match &self.snapshots {
            Some(_) => self.load_snapshot(&key).await?,
            None => None,
        };

        let (state, version, snap_meta) = match snapshot {
            Some((state, snap_version, taken_at)) => {
                let records = self.fetch_events(&key, snap_version).await?;
                let (state, version) = catch_up::<A>(state, snap_version, &records)
                    .map_err(|e| RepoError::CorruptStream(e.to_string()))?;
                (state, version, Some((snap_version, taken_at)))
            }
            None => {
                let records = self.fetch_events(&key, 0).await?;
                if records.is_empty() {
                    return Err(RepoError::NotFound);
                }
                let (state, version) =
                    rehydrate::<A>(&records).map_err(|e| RepoError::CorruptStream(e.to_string()))?;
                (state, version, None)
            }
        };

        if let Some(policy) = &self.snapshots
            && policy.should_snapshot(version, snap_meta, Utc::now())
        {
            self.save_snapshot(&key, &state, version).await;
        }

        Ok((state, version))
    }

    async fn save(
        &self,
        id: &AggregateId,
        events: &[A::Event],
        expected: Version,
        meta: &Metadata,
    ) -> Result<Version, RepoError> {
        let key = stream_id(A::PREFIX, id);
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepoError::Store(e.to_string()))?;

        let current: i64 =
            sqlx::query("SELECT coalesce(max(version), 0) AS version FROM events WHERE stream_id = $1")
                .bind(&key)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| RepoError::Store(e.to_string()))?
                .try_get("version")
                .map_err(|e| RepoError::Store(e.to_string()))?;

        if current as Version != expected {
            return Err(RepoError::Conflict);
        }

        let now = Utc::now();
        let mut version = expected;
        for event in events {
            let payload = event.payload().map_err(|e| RepoError::Store(e.to_string()))?;
            let mut derived = meta.derive();
            if derived.timestamp.is_none() {
                derived.timestamp = Some(now);
            }
            let metadata =
                serde_json::to_value(&derived).map_err(|e| RepoError::Store(e.to_string()))?;

            version += 1;
            sqlx::query(
                "INSERT INTO events (stream_id, version, event_type, payload, metadata, recorded_at)
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(&key)
            .bind(version as i64)
            .bind(event.schema())
            .bind(payload)
            .bind(metadata)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(translate_save_error)?;
        }

        tx.commit().await.map_err(translate_save_error)?;
        tracing::debug!(stream = %key, count = events.len(), version, "events appended");
        Ok(version)
    }
}
