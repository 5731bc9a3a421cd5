//! Generic command pipeline: load, rehydrate, decide, append.

use tracing::instrument;

use crate::aggregate::Aggregate;
use crate::error::ExecuteError;
use crate::metadata::{AggregateId, Metadata, Version};
use crate::repository::{RepoError, Repository};

/// Run one command through the aggregate pipeline.
///
/// 1. Extract the target aggregate id with `get_id`; an empty id fails
///    as a bad command.
/// 2. Load the stream. "Not found" routes the command to
///    [`Aggregate::create`] and appends at version 0 (new stream);
///    a loaded `(state, version)` routes it to
///    [`Aggregate::decide`] and appends at the loaded version.
/// 3. An empty event list from `decide` is an idempotent no-op; an
///    empty list from `create` is rejected, since a new stream must
///    start with at least one event.
///
/// Returns the stream's version after the command (unchanged for a
/// no-op).
///
/// # Errors
///
/// * [`ExecuteError::BadCommand`] - `get_id` produced an empty id.
/// * [`ExecuteError::Domain`] - `create`/`decide` rejected the command.
/// * [`ExecuteError::EmptyCreate`] - `create` produced no events.
/// * [`ExecuteError::Conflict`] - optimistic append conflict; retryable.
/// * [`ExecuteError::CorruptStream`] - the stored stream failed to decode.
/// * [`ExecuteError::Store`] - transport/driver failure; retryable.
#[instrument(skip_all, fields(aggregate_type = A::PREFIX))]
pub async fn execute<A, R, F>(
    repo: &R,
    cmd: &A::Command,
    get_id: F,
    meta: &Metadata,
) -> Result<Version, ExecuteError<A::Error>>
where
    A: Aggregate,
    R: Repository<A> + ?Sized,
    F: FnOnce(&A::Command) -> String,
{
    let id = AggregateId::new(get_id(cmd))
        .ok_or_else(|| ExecuteError::BadCommand("missing aggregate id".to_string()))?;

    match repo.get_by_id(&id).await {
        Err(RepoError::NotFound) => {
            let events = A::create(cmd).map_err(ExecuteError::Domain)?;
            if events.is_empty() {
                return Err(ExecuteError::EmptyCreate);
            }
            let version = repo
                .save(&id, &events, 0, meta)
                .await
                .map_err(save_error::<A>)?;
            tracing::info!(stream = %id, count = events.len(), "stream created");
            Ok(version)
        }
        Ok((state, version)) => {
            let events = state.decide(cmd).map_err(ExecuteError::Domain)?;
            if events.is_empty() {
                tracing::debug!(stream = %id, "command was a no-op");
                return Ok(version);
            }
            let new_version = repo
                .save(&id, &events, version, meta)
                .await
                .map_err(save_error::<A>)?;
            tracing::info!(stream = %id, count = events.len(), version = new_version, "events appended");
            Ok(new_version)
        }
        Err(RepoError::CorruptStream(msg)) => Err(ExecuteError::CorruptStream(msg)),
        Err(RepoError::Conflict) => {
            // `get_by_id` never reports conflicts; treat a misbehaving
            // adapter as a store failure rather than a retryable append.
            Err(ExecuteError::Store("unexpected conflict on load".to_string()))
        }
        Err(RepoError::Store(msg)) => Err(ExecuteError::Store(msg)),
    }
}

fn save_error<A: Aggregate>(err: RepoError) -> ExecuteError<A::Error> {
    match err {
        RepoError::Conflict => ExecuteError::Conflict,
        RepoError::Store(msg) => ExecuteError::Store(msg),
        RepoError::NotFound => ExecuteError::Store("stream vanished during save".to_string()),
        RepoError::CorruptStream(msg) => ExecuteError::CorruptStream(msg),
    }
}
