//! Identifiers and the command/event metadata envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stream version: a monotonically increasing counter per aggregate
/// stream. `0` denotes "no stream yet"; the first event is version 1.
pub type Version = u64;

/// An opaque, non-empty aggregate instance identifier.
///
/// Stable per aggregate instance; combined with the aggregate's stream
/// prefix to form the stream id `{prefix}-{id}`.
///
/// # Examples
///
/// ```
/// use jade_es::AggregateId;
///
/// let id = AggregateId::new("c1").unwrap();
/// assert_eq!(id.as_str(), "c1");
/// assert!(AggregateId::new("").is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregateId(String);

impl AggregateId {
    /// Create an aggregate id, rejecting empty input.
    pub fn new(id: impl Into<String>) -> Option<Self> {
        let id = id.into();
        if id.is_empty() { None } else { Some(Self(id)) }
    }

    /// The raw identifier string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AggregateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compute the stream id for an aggregate instance: `{prefix}-{id}`.
pub fn stream_id(prefix: &str, id: &AggregateId) -> String {
    format!("{prefix}-{id}")
}

/// Cross-cutting metadata carried by every command and stamped, derived,
/// onto every persisted event.
///
/// `id` is unique per command or event; `correlation_id` groups a causally
/// related interaction; `causation_id` points at the id that caused this
/// one. The remaining fields are optional and omitted from JSON when
/// absent.
///
/// # Examples
///
/// ```
/// use jade_es::Metadata;
///
/// let meta = Metadata::new("m1", "k1")
///     .with_causation_id("m0")
///     .with_user_id("user-42");
///
/// assert_eq!(meta.id, "m1");
/// assert_eq!(meta.causation_id.as_deref(), Some("m0"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    /// Unique id of this command or event.
    pub id: String,
    /// Groups a causally related interaction.
    pub correlation_id: String,
    /// The id of the command or event that caused this one.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub causation_id: Option<String>,
    /// Identity of the user issuing the command, if known.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub user_id: Option<String>,
    /// Client-supplied timestamp; the server fills it at persistence
    /// time when absent.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Metadata {
    /// Create a metadata envelope with the two required fields.
    pub fn new(id: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            correlation_id: correlation_id.into(),
            causation_id: None,
            user_id: None,
            timestamp: None,
        }
    }

    /// Create a metadata envelope with a fresh random id and correlation id.
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4().to_string(), Uuid::new_v4().to_string())
    }

    /// Set the causation id.
    pub fn with_causation_id(mut self, id: impl Into<String>) -> Self {
        self.causation_id = Some(id.into());
        self
    }

    /// Set the user identity.
    pub fn with_user_id(mut self, user: impl Into<String>) -> Self {
        self.user_id = Some(user.into());
        self
    }

    /// Set an explicit timestamp.
    pub fn with_timestamp(mut self, ts: DateTime<Utc>) -> Self {
        self.timestamp = Some(ts);
        self
    }

    /// Derive the envelope for an event produced by the command carrying
    /// `self`: fresh event id, same correlation, caused by the command.
    /// A client-supplied timestamp is preserved; adapters stamp the
    /// persistence time when it is absent.
    pub fn derive(&self) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            correlation_id: self.correlation_id.clone(),
            causation_id: Some(self.id.clone()),
            user_id: self.user_id.clone(),
            timestamp: self.timestamp,
        }
    }
}
