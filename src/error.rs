//! Crate-level error types for command decoding and execution.

/// Error returned when decoding a command or event payload by schema URN.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// No command or event variant is registered under the schema URN.
    #[error("unknown schema: {0}")]
    UnknownSchema(String),

    /// The schema is known but the JSON payload does not match its shape.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

/// Error returned when running a command through the aggregate pipeline.
///
/// Generic over `E`, the aggregate's own rejection type, so callers that
/// drive the pipeline directly keep the typed domain error. The
/// type-erased handler surface flattens this into [`HandlerError`].
///
/// # Type Parameters
///
/// * `E` - Domain error type, must implement `Error + Send + Sync + 'static`
#[derive(Debug, thiserror::Error)]
pub enum ExecuteError<E: std::error::Error + Send + Sync + 'static> {
    /// The command carried a missing or empty aggregate id.
    #[error("bad command: {0}")]
    BadCommand(String),

    /// Command rejected by aggregate logic.
    ///
    /// Wraps the domain-specific error returned from the aggregate's
    /// `create` or `decide`, forwarding its `Display` and `Error` impls.
    #[error(transparent)]
    Domain(E),

    /// `create` accepted the command but produced no events.
    ///
    /// A new stream must start with at least one event.
    #[error("create must yield at least one event")]
    EmptyCreate,

    /// Optimistic concurrency conflict: another writer advanced the
    /// stream between load and append. The caller may retry.
    #[error("optimistic concurrency conflict")]
    Conflict,

    /// The stored stream could not be folded back into state.
    #[error("corrupt stream: {0}")]
    CorruptStream(String),

    /// Transport or driver failure in the event store.
    #[error("store failure: {0}")]
    Store(String),
}

/// Type-erased failure surface shared by all command handlers.
///
/// Aggregate handlers map [`ExecuteError`] into this; custom handlers
/// construct it directly.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandlerError {
    /// Missing/invalid aggregate id or an unexpected command shape.
    #[error("bad command: {0}")]
    BadCommand(String),

    /// The domain rejected the command (or a custom handler's
    /// pre-condition failed).
    #[error("rejected: {0}")]
    Rejected(String),

    /// Optimistic concurrency conflict; retryable.
    #[error("optimistic concurrency conflict")]
    Conflict,

    /// The stored stream could not be folded back into state.
    #[error("corrupt stream: {0}")]
    CorruptStream(String),

    /// Transport or driver failure in the event store; retryable.
    #[error("store failure: {0}")]
    Store(String),

    /// A custom handler's external dependency failed. No event was
    /// appended.
    #[error("external dependency failed: {0}")]
    External(String),
}

impl HandlerError {
    /// Flatten a typed pipeline error into the erased handler surface.
    pub fn from_execute<E: std::error::Error + Send + Sync + 'static>(err: ExecuteError<E>) -> Self {
        match err {
            ExecuteError::BadCommand(msg) => HandlerError::BadCommand(msg),
            ExecuteError::Domain(e) => HandlerError::Rejected(e.to_string()),
            ExecuteError::EmptyCreate => {
                HandlerError::Rejected("create must yield at least one event".to_string())
            }
            ExecuteError::Conflict => HandlerError::Conflict,
            ExecuteError::CorruptStream(msg) => HandlerError::CorruptStream(msg),
            ExecuteError::Store(msg) => HandlerError::Store(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A minimal domain error for testing `ExecuteError<E>`.
    #[derive(Debug, thiserror::Error)]
    #[error("order already cancelled")]
    struct TestDomainError;

    #[test]
    fn execute_error_domain_displays_inner() {
        let err: ExecuteError<TestDomainError> = ExecuteError::Domain(TestDomainError);
        assert_eq!(err.to_string(), "order already cancelled");
    }

    #[test]
    fn empty_create_flattens_to_rejection_with_fixed_message() {
        let err: ExecuteError<TestDomainError> = ExecuteError::EmptyCreate;
        let flat = HandlerError::from_execute(err);
        assert_eq!(flat, HandlerError::Rejected("create must yield at least one event".into()));
    }

    #[test]
    fn domain_error_flattens_to_rejection_carrying_message() {
        let flat = HandlerError::from_execute(ExecuteError::Domain(TestDomainError));
        assert_eq!(flat, HandlerError::Rejected("order already cancelled".into()));
    }

    #[test]
    fn conflict_and_store_flatten_structurally() {
        assert_eq!(
            HandlerError::from_execute::<TestDomainError>(ExecuteError::Conflict),
            HandlerError::Conflict
        );
        assert_eq!(
            HandlerError::from_execute::<TestDomainError>(ExecuteError::Store("db down".into())),
            HandlerError::Store("db down".into())
        );
        assert_eq!(
            HandlerError::from_execute::<TestDomainError>(ExecuteError::CorruptStream("bad row".into())),
            HandlerError::CorruptStream("bad row".into())
        );
        assert_eq!(
            HandlerError::from_execute::<TestDomainError>(ExecuteError::BadCommand("empty id".into())),
            HandlerError::BadCommand("empty id".into())
        );
    }

    #[test]
    fn decode_error_display() {
        let err = DecodeError::UnknownSchema("urn:schema:jade:command:customer:delete:1".into());
        assert!(err.to_string().contains("unknown schema"));
        let err = DecodeError::MalformedPayload("missing field `name`".into());
        assert!(err.to_string().contains("malformed payload"));
    }

    // Verify `Send + Sync` bounds are satisfied so errors can cross thread
    // boundaries, which is required for use with `tokio` channels.
    const _: () = {
        #[allow(dead_code)]
        fn assert_send_sync<T: Send + Sync>() {}

        #[allow(dead_code)]
        fn check() {
            assert_send_sync::<ExecuteError<TestDomainError>>();
            assert_send_sync::<HandlerError>();
            assert_send_sync::<DecodeError>();
        }
    };
}
