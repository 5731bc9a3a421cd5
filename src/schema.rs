//! Schema URN parsing and validation.
//!
//! Every command and event variant is identified on the wire by a URN of
//! the exact form `urn:schema:jade:(command|event):{aggregate}:{action}:{version}`.
//! The URN is the contract: the aggregate segment routes a command to its
//! queue and handler, and the full URN tags each persisted event.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Fixed leading segments of every jade schema URN.
const URN_HEAD: [&str; 3] = ["urn", "schema", "jade"];

/// Whether a URN names a command or an event variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaKind {
    /// A command schema (`urn:schema:jade:command:...`).
    Command,
    /// An event schema (`urn:schema:jade:event:...`).
    Event,
}

impl SchemaKind {
    fn as_str(self) -> &'static str {
        match self {
            SchemaKind::Command => "command",
            SchemaKind::Event => "event",
        }
    }
}

/// Error returned when a string is not a well-formed jade schema URN.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid schema urn `{urn}`: {reason}")]
pub struct SchemaError {
    /// The offending input.
    pub urn: String,
    /// What made it invalid.
    pub reason: String,
}

impl SchemaError {
    fn new(urn: &str, reason: impl Into<String>) -> Self {
        Self {
            urn: urn.to_string(),
            reason: reason.into(),
        }
    }
}

/// A parsed, validated schema URN.
///
/// Grammar (bit-exact, case-sensitive):
///
/// ```text
/// urn:schema:jade:(command|event):{aggregate}:{action}:{version}
/// ```
///
/// where `{aggregate}` and `{action}` match `[a-z][a-z0-9-]*` and
/// `{version}` matches `[1-9][0-9]*`.
///
/// # Examples
///
/// ```
/// use jade_es::{SchemaKind, SchemaUrn};
///
/// let urn: SchemaUrn = "urn:schema:jade:command:customer:create:1".parse().unwrap();
/// assert_eq!(urn.kind(), SchemaKind::Command);
/// assert_eq!(urn.aggregate(), "customer");
/// assert_eq!(urn.action(), "create");
/// assert_eq!(urn.version(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SchemaUrn {
    kind: SchemaKind,
    aggregate: String,
    action: String,
    version: u64,
}

impl SchemaUrn {
    /// Parse and validate a schema URN string.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] if the input does not match the grammar:
    /// wrong segment count, wrong fixed head, unknown kind, malformed
    /// aggregate/action tokens, or a non-canonical version number.
    pub fn parse(input: &str) -> Result<Self, SchemaError> {
        let segments: Vec<&str> = input.split(':').collect();
        if segments.len() != 7 {
            return Err(SchemaError::new(
                input,
                format!("expected 7 colon-separated segments, found {}", segments.len()),
            ));
        }
        for (i, expected) in URN_HEAD.iter().enumerate() {
            if segments[i] != *expected {
                return Err(SchemaError::new(
                    input,
                    format!("segment {} must be `{expected}`, found `{}`", i + 1, segments[i]),
                ));
            }
        }
        let kind = match segments[3] {
            "command" => SchemaKind::Command,
            "event" => SchemaKind::Event,
            other => {
                return Err(SchemaError::new(
                    input,
                    format!("kind must be `command` or `event`, found `{other}`"),
                ));
            }
        };
        if !is_name_token(segments[4]) {
            return Err(SchemaError::new(
                input,
                format!("aggregate segment `{}` must match [a-z][a-z0-9-]*", segments[4]),
            ));
        }
        if !is_name_token(segments[5]) {
            return Err(SchemaError::new(
                input,
                format!("action segment `{}` must match [a-z][a-z0-9-]*", segments[5]),
            ));
        }
        let version = parse_version(segments[6])
            .ok_or_else(|| SchemaError::new(input, format!("version segment `{}` must match [1-9][0-9]*", segments[6])))?;

        Ok(Self {
            kind,
            aggregate: segments[4].to_string(),
            action: segments[5].to_string(),
            version,
        })
    }

    /// Parse a URN and require it to be of the given kind.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] if parsing fails or the kind differs.
    pub fn parse_expecting(input: &str, kind: SchemaKind) -> Result<Self, SchemaError> {
        let urn = Self::parse(input)?;
        if urn.kind != kind {
            return Err(SchemaError::new(
                input,
                format!("expected a {} schema, found a {} schema", kind.as_str(), urn.kind.as_str()),
            ));
        }
        Ok(urn)
    }

    /// Whether this URN names a command or an event.
    pub fn kind(&self) -> SchemaKind {
        self.kind
    }

    /// The aggregate-type segment (e.g. `customer`). Also the queue name
    /// for command URNs.
    pub fn aggregate(&self) -> &str {
        &self.aggregate
    }

    /// The action segment (e.g. `create`).
    pub fn action(&self) -> &str {
        &self.action
    }

    /// The schema version segment.
    pub fn version(&self) -> u64 {
        self.version
    }
}

impl fmt::Display for SchemaUrn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "urn:schema:jade:{}:{}:{}:{}",
            self.kind.as_str(),
            self.aggregate,
            self.action,
            self.version
        )
    }
}

impl FromStr for SchemaUrn {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Check a name token against `[a-z][a-z0-9-]*`.
///
/// Used for URN aggregate/action segments, stream prefixes, and queue
/// names. The queue adapter relies on this to keep names safe for use
/// inside SQL identifiers.
pub fn is_name_token(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Parse `[1-9][0-9]*` into a number. Leading zeros and empty strings
/// are non-canonical and rejected.
fn parse_version(s: &str) -> Option<u64> {
    if s.is_empty() || s.starts_with('0') || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}
