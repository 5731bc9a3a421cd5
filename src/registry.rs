//! Command registry: schema URN -> command type -> handler.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use crate::command::{AnyCommand, CommandSet};
use crate::error::DecodeError;
use crate::handler::CommandHandler;
use crate::schema::{SchemaKind, SchemaUrn};

/// Monomorphized decode entry stored per command type.
type Decoder = fn(&SchemaUrn, &serde_json::Value) -> Result<AnyCommand, DecodeError>;

fn decode_any<C: CommandSet>(
    schema: &SchemaUrn,
    payload: &serde_json::Value,
) -> Result<AnyCommand, DecodeError> {
    C::decode(schema, payload).map(AnyCommand::new)
}

/// Maps schema URNs to command types and command types to handlers.
///
/// Populated once at wiring time via [`register`](CommandRegistry::register)
/// and read-only afterwards; share it behind an `Arc`. All schema
/// association is declared by the command types themselves
/// ([`CommandSet::schemas`]) -- there is no reflection and no stringly
/// typed lookup past the single URN map.
#[derive(Default)]
pub struct CommandRegistry {
    types: HashMap<String, TypeId>,
    decoders: HashMap<TypeId, Decoder>,
    handlers: HashMap<TypeId, Arc<dyn CommandHandler>>,
}

impl CommandRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a command set and its handler.
    ///
    /// Every URN in `C::schemas()` is mapped to `C`'s type token, and
    /// the token to `handler`. A URN already claimed by a different
    /// command type is overwritten (last registration wins) and the
    /// overwrite is logged.
    pub fn register<C: CommandSet>(&mut self, handler: Arc<dyn CommandHandler>) {
        let token = TypeId::of::<C>();
        for &schema in C::schemas() {
            if SchemaUrn::parse_expecting(schema, SchemaKind::Command).is_err() {
                tracing::warn!(schema, command_type = std::any::type_name::<C>(),
                    "declared schema is not a valid command urn");
            }
            if let Some(previous) = self.types.insert(schema.to_string(), token)
                && previous != token
            {
                tracing::warn!(schema, command_type = std::any::type_name::<C>(),
                    "schema remapped to a different command type");
            }
        }
        self.decoders.insert(token, decode_any::<C>);
        self.handlers.insert(token, handler);
        tracing::debug!(command_type = std::any::type_name::<C>(),
            schemas = C::schemas().len(), "command set registered");
    }

    /// Look up the command type token registered for a schema URN.
    pub fn type_for(&self, schema: &str) -> Option<TypeId> {
        self.types.get(schema).copied()
    }

    /// Look up the handler registered for a command type token.
    pub fn handler(&self, token: TypeId) -> Option<Arc<dyn CommandHandler>> {
        self.handlers.get(&token).cloned()
    }

    /// Decode a command payload by schema URN.
    ///
    /// # Errors
    ///
    /// * [`DecodeError::UnknownSchema`] - no command type claims the URN.
    /// * [`DecodeError::MalformedPayload`] - the payload does not match
    ///   the variant's shape.
    pub fn deserialize_command(
        &self,
        schema: &SchemaUrn,
        payload: &serde_json::Value,
    ) -> Result<AnyCommand, DecodeError> {
        let canonical = schema.to_string();
        let token = self
            .type_for(&canonical)
            .ok_or(DecodeError::UnknownSchema(canonical))?;
        let decode = self
            .decoders
            .get(&token)
            .expect("decoder is inserted alongside every type mapping");
        decode(schema, payload)
    }

    /// All registered command schema URNs, sorted.
    pub fn schemas(&self) -> Vec<String> {
        let mut schemas: Vec<String> = self.types.keys().cloned().collect();
        schemas.sort();
        schemas
    }
}

impl std::fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("schemas", &self.types.len())
            .field("handlers", &self.handlers.len())
            .finish()
    }
}
