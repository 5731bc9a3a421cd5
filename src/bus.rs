//! Command bus: dispatch by runtime command type.

use std::sync::Arc;

use crate::command::AnyCommand;
use crate::error::HandlerError;
use crate::registry::CommandRegistry;

/// Error surface of [`CommandBus::send`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    /// The command's runtime type has no registered handler.
    #[error("no handler registered for command type {0}")]
    NoHandler(&'static str),

    /// The handler failed; carries the command type name for
    /// diagnostics, nothing else is translated.
    #[error("handler for {command_type} failed: {source}")]
    Handler {
        /// Rust type name of the dispatched command.
        command_type: &'static str,
        /// The handler's own error, unchanged.
        source: HandlerError,
    },
}

/// Stateless dispatcher resolving handlers by the command's runtime
/// type token.
///
/// All schema work happens in the [`CommandRegistry`] at wiring time;
/// `send` is a map lookup and an await. Cloning shares the registry.
#[derive(Clone, Debug)]
pub struct CommandBus {
    registry: Arc<CommandRegistry>,
}

impl CommandBus {
    /// Create a bus over a fully wired registry.
    pub fn new(registry: Arc<CommandRegistry>) -> Self {
        Self { registry }
    }

    /// Dispatch a command to its registered handler.
    ///
    /// # Errors
    ///
    /// * [`BusError::NoHandler`] - nothing is registered for the
    ///   command's type.
    /// * [`BusError::Handler`] - the handler returned an error.
    pub async fn send(&self, cmd: AnyCommand) -> Result<(), BusError> {
        let command_type = cmd.type_name();
        let Some(handler) = self.registry.handler(cmd.type_id()) else {
            tracing::warn!(command_type, "no handler registered");
            return Err(BusError::NoHandler(command_type));
        };

        tracing::debug!(command_type, schema = cmd.schema(), "dispatching command");
        match handler.handle(cmd).await {
            Ok(()) => {
                tracing::debug!(command_type, "command handled");
                Ok(())
            }
            Err(source) => {
                tracing::warn!(command_type, error = %source, "command handler failed");
                Err(BusError::Handler {
                    command_type,
                    source,
                })
            }
        }
    }
}
