//! Command schema association and the type-erased dispatch envelope.

use std::any::{Any, TypeId};

use crate::error::DecodeError;
use crate::metadata::Metadata;
use crate::schema::SchemaUrn;

/// The closed set of commands one aggregate (or custom handler) accepts.
///
/// Implemented on a per-aggregate command enum. Each variant is
/// statically associated with a schema URN of the form
/// `urn:schema:jade:command:{aggregate}:{action}:{version}`; the
/// association is declared here, in code, rather than discovered by
/// reflection, and the registry walks [`schemas`](CommandSet::schemas)
/// at wiring time to build its lookup maps.
///
/// # Contract
///
/// - [`schemas`](CommandSet::schemas) lists every URN the set accepts;
///   [`decode`](CommandSet::decode) must succeed for exactly those URNs
///   (given a well-shaped payload) and return
///   [`DecodeError::UnknownSchema`] for any other.
/// - [`schema`](CommandSet::schema) returns the URN of the variant a
///   value holds; it must be one of [`schemas`](CommandSet::schemas).
/// - Every command carries a [`Metadata`] envelope inside its payload.
pub trait CommandSet: Send + Sized + 'static {
    /// All schema URNs this command set accepts.
    fn schemas() -> &'static [&'static str];

    /// Decode the JSON payload of a command identified by `schema`.
    ///
    /// # Errors
    ///
    /// [`DecodeError::UnknownSchema`] when the URN names no variant of
    /// this set; [`DecodeError::MalformedPayload`] when the payload does
    /// not match the variant's shape.
    fn decode(schema: &SchemaUrn, payload: &serde_json::Value) -> Result<Self, DecodeError>;

    /// The schema URN of the variant this value holds.
    fn schema(&self) -> &'static str;

    /// The metadata envelope carried by this command.
    fn metadata(&self) -> &Metadata;

    /// The aggregate instance this command addresses. Empty when the
    /// client omitted it; the pipeline rejects that as a bad command.
    fn target(&self) -> &str;
}

/// A type-erased command for dispatch across the bus boundary.
///
/// The registry produces `AnyCommand` values when decoding CloudEvent
/// payloads, and handlers downcast back to their concrete
/// [`CommandSet`]. The runtime type tag ([`TypeId`]) is captured at
/// construction so the bus can resolve a handler without inspecting the
/// payload.
#[derive(Debug)]
pub struct AnyCommand {
    type_id: TypeId,
    type_name: &'static str,
    schema: &'static str,
    inner: Box<dyn Any + Send>,
}

impl AnyCommand {
    /// Wrap a typed command.
    pub fn new<C: CommandSet>(cmd: C) -> Self {
        Self {
            type_id: TypeId::of::<C>(),
            type_name: std::any::type_name::<C>(),
            schema: cmd.schema(),
            inner: Box::new(cmd),
        }
    }

    /// The runtime type token of the wrapped command.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// The Rust type name of the wrapped command, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// The schema URN of the wrapped command variant.
    pub fn schema(&self) -> &'static str {
        self.schema
    }

    /// Recover the typed command.
    ///
    /// # Errors
    ///
    /// Returns the envelope unchanged when `C` is not the wrapped type,
    /// so callers can report the actual type name.
    pub fn downcast<C: CommandSet>(self) -> Result<C, AnyCommand> {
        let Self {
            type_id,
            type_name,
            schema,
            inner,
        } = self;
        match inner.downcast::<C>() {
            Ok(cmd) => Ok(*cmd),
            Err(inner) => Err(Self {
                type_id,
                type_name,
                schema,
                inner,
            }),
        }
    }
}
