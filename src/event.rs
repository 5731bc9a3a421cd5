//! Event schema association, the persisted event record, and rehydration.
//!
//! This module fixes the single JSON policy shared by the store adapter
//! and the queue publisher: camelCase field names on every wire struct,
//! optional metadata fields absent when `None`, and event payload
//! `Option`s serialized as explicit `null`s. The event type tag on the
//! wire is always the variant's schema URN.

use chrono::{DateTime, Utc};

use crate::aggregate::Aggregate;
use crate::error::DecodeError;
use crate::metadata::{Metadata, Version};

/// The closed set of events one aggregate produces and folds.
///
/// Implemented on a per-aggregate event enum. Each variant is statically
/// associated with a schema URN of the form
/// `urn:schema:jade:event:{aggregate}:{action}:{version}`; the store
/// adapter persists that URN as the event type tag and routes decoding
/// through [`decode`](EventSet::decode) on the way back.
///
/// # Contract
///
/// - [`payload`](EventSet::payload) and [`decode`](EventSet::decode)
///   round-trip: `decode(e.schema(), e.payload()?) == e`.
/// - [`decode`](EventSet::decode) returns
///   [`DecodeError::UnknownSchema`] for URNs outside
///   [`schemas`](EventSet::schemas); rehydration folds such records as
///   no-ops (state unchanged, version still advanced), keeping old
///   readers forward compatible with events written by newer revisions.
/// - [`DecodeError::MalformedPayload`] -- a known schema whose payload
///   no longer parses -- is surfaced by adapters as a corrupt stream.
pub trait EventSet: Clone + Send + Sync + Sized + 'static {
    /// All schema URNs this event set produces.
    fn schemas() -> &'static [&'static str];

    /// The schema URN of the variant this value holds.
    fn schema(&self) -> &'static str;

    /// Serialize the variant's payload (without the type tag).
    ///
    /// # Errors
    ///
    /// Returns `serde_json::Error` if the payload cannot be serialized.
    fn payload(&self) -> serde_json::Result<serde_json::Value>;

    /// Decode a persisted payload identified by `schema`.
    ///
    /// # Errors
    ///
    /// [`DecodeError::UnknownSchema`] when the URN names no variant of
    /// this set; [`DecodeError::MalformedPayload`] when the payload does
    /// not match the variant's shape.
    fn decode(schema: &str, payload: &serde_json::Value) -> Result<Self, DecodeError>;
}

/// An event as persisted in (or fetched from) the event store.
///
/// `version` counts from 1 and is contiguous per stream. `event_type`
/// is the variant's schema URN. `metadata` is the derived envelope
/// (fresh event id, correlation copied from the command, causation set
/// to the command id); it is optional as persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedEvent {
    /// Stream this event belongs to (`{prefix}-{aggregateId}`).
    pub stream_id: String,
    /// Position within the stream, starting at 1.
    pub version: Version,
    /// The event variant's schema URN.
    pub event_type: String,
    /// JSON payload in the shared camelCase policy.
    pub payload: serde_json::Value,
    /// Derived metadata envelope, when recorded.
    pub metadata: Option<Metadata>,
    /// Server-assigned persistence timestamp.
    pub recorded_at: DateTime<Utc>,
}

/// Encode a domain event into the wire pair `(event_type, payload)`.
///
/// # Errors
///
/// Returns `serde_json::Error` if the payload cannot be serialized.
pub fn encode_event<E: EventSet>(event: &E) -> serde_json::Result<(String, serde_json::Value)> {
    Ok((event.schema().to_string(), event.payload()?))
}

/// Shared fold over stream records: decode, skip unknown schemas,
/// init-or-evolve. The seed is `None` for a fresh rehydration and
/// `Some(state)` when catching up from a snapshot.
fn fold<A: Aggregate>(
    seed: Option<A>,
    start: Version,
    records: &[RecordedEvent],
) -> Result<(Option<A>, Version), DecodeError> {
    let mut state = seed;
    let mut version = start;
    for record in records {
        version = record.version;
        match A::Event::decode(&record.event_type, &record.payload) {
            Ok(event) => {
                state = Some(match state.take() {
                    None => A::init(&event),
                    Some(state) => state.evolve(&event),
                });
            }
            // A schema this revision does not know: written by a newer
            // one. Fold it as a no-op so the stream stays readable.
            Err(DecodeError::UnknownSchema(_)) => {}
            Err(err) => return Err(err),
        }
    }
    Ok((state, version))
}

/// Fold a fetched stream back into aggregate state.
///
/// Decodes each record via [`EventSet::decode`], seeds state with
/// [`Aggregate::init`] on the first decodable event, and folds the
/// rest through [`Aggregate::evolve`]. Records carrying an
/// unrecognized schema URN are skipped -- state is left unchanged
/// while the version still advances past them -- so streams written by
/// newer revisions remain readable. Returns the state together with
/// the last record's version.
///
/// Deterministic: the same records always produce the same state.
///
/// # Errors
///
/// Returns [`DecodeError::MalformedPayload`] when a known schema's
/// payload fails to parse, when `records` is empty, or when no record
/// decodes at all; adapters translate this into their corrupt-stream
/// error.
pub fn rehydrate<A: Aggregate>(records: &[RecordedEvent]) -> Result<(A, Version), DecodeError> {
    let (state, version) = fold::<A>(None, 0, records)?;
    match state {
        Some(state) => Ok((state, version)),
        None if records.is_empty() => Err(DecodeError::MalformedPayload(
            "cannot rehydrate from an empty stream".to_string(),
        )),
        None => Err(DecodeError::MalformedPayload(
            "stream contains no decodable events".to_string(),
        )),
    }
}

/// Continue a fold from snapshotted state: apply `records` (fetched
/// after `version`) on top of `state`, with the same
/// unknown-schema-skip semantics as [`rehydrate`].
///
/// # Errors
///
/// Returns [`DecodeError::MalformedPayload`] when a known schema's
/// payload fails to parse.
pub fn catch_up<A: Aggregate>(
    state: A,
    version: Version,
    records: &[RecordedEvent],
) -> Result<(A, Version), DecodeError> {
    let (state, version) = fold::<A>(Some(state), version, records)?;
    Ok((
        state.expect("a seeded fold always yields a state"),
        version,
    ))
}
