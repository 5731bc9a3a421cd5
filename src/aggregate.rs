//! Aggregate contract: the decision/evolution tuple each domain provides.

use serde::{Serialize, de::DeserializeOwned};

use crate::event::EventSet;

/// A domain aggregate whose state is derived from its event history.
///
/// The implementing type itself serves as the aggregate's state.
/// State is created from the stream's first event by
/// [`init`](Aggregate::init) and advanced by
/// [`evolve`](Aggregate::evolve); commands are decided by
/// [`create`](Aggregate::create) when no stream exists yet and by
/// [`decide`](Aggregate::decide) against current state otherwise.
///
/// # Associated Types
///
/// - `Command`: the set of commands this aggregate can handle.
/// - `Event`: the set of events this aggregate can produce and fold.
/// - `Error`: command rejection / validation error.
///
/// # Contract
///
/// - [`create`](Aggregate::create) and [`decide`](Aggregate::decide) are
///   pure decision functions: no I/O, no side effects. `decide` may
///   return `Ok(vec![])` to mean "no-op, idempotent"; `create` must
///   yield at least one event (the pipeline rejects an empty result).
/// - [`init`](Aggregate::init) and [`evolve`](Aggregate::evolve) are
///   pure and total. `init` must accept any event that could legally
///   start a stream; `evolve` should leave state unchanged for event
///   variants it does not recognise, for forward compatibility.
pub trait Aggregate:
    Clone + Serialize + DeserializeOwned + Send + Sync + Sized + 'static
{
    /// Stream-prefix token for this aggregate type (e.g. `"customer"`).
    ///
    /// Must match `[a-z][a-z0-9-]*` and be at most 32 characters; the
    /// stream id is `{PREFIX}-{aggregateId}`.
    const PREFIX: &'static str;

    /// The set of commands this aggregate can handle.
    type Command: Send + Sync + 'static;

    /// The set of events this aggregate can produce and fold.
    type Event: EventSet;

    /// Command rejection / validation error type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Decide a command when no stream exists for the target id.
    ///
    /// Must not require state.
    ///
    /// # Errors
    ///
    /// Returns `Err` to reject the command.
    fn create(cmd: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;

    /// Decide a command against the current state.
    ///
    /// Returns `Ok(vec![])` if the command is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `Err` to reject the command.
    fn decide(&self, cmd: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;

    /// Build the initial state from the stream's first event.
    fn init(first: &Self::Event) -> Self;

    /// Apply a single event to produce the next state.
    fn evolve(self, event: &Self::Event) -> Self;
}
