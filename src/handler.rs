//! Command handler surface and the aggregate handler factory.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;

use crate::aggregate::Aggregate;
use crate::command::{AnyCommand, CommandSet};
use crate::error::HandlerError;
use crate::pipeline::execute;
use crate::repository::Repository;

/// A command handler: the single interface the bus and the queue
/// receiver dispatch through.
///
/// Aggregate handlers are produced by [`AggregateHandler::new`]; custom
/// (non-aggregate) handlers implement this trait directly. A custom
/// handler typically reads state through a repository, performs an
/// external side effect, and appends a result event at the loaded
/// version on success -- and must not append anything when the external
/// call fails ([`HandlerError::External`]).
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Handle one type-erased command.
    ///
    /// # Errors
    ///
    /// Any [`HandlerError`]; the bus and ingress forward it unchanged.
    async fn handle(&self, cmd: AnyCommand) -> Result<(), HandlerError>;
}

/// Handler factory wrapping the generic aggregate pipeline.
///
/// One instance per aggregate type; the target id is extracted from the
/// command's own [`CommandSet::target`].
pub struct AggregateHandler<A: Aggregate, R> {
    repo: Arc<R>,
    _aggregate: PhantomData<fn() -> A>,
}

impl<A: Aggregate, R: Repository<A>> AggregateHandler<A, R> {
    /// Wrap a repository in the standard rehydrate/decide/append pipeline.
    pub fn new(repo: Arc<R>) -> Self {
        Self {
            repo,
            _aggregate: PhantomData,
        }
    }
}

#[async_trait]
impl<A, R> CommandHandler for AggregateHandler<A, R>
where
    A: Aggregate,
    A::Command: CommandSet,
    R: Repository<A> + 'static,
{
    async fn handle(&self, cmd: AnyCommand) -> Result<(), HandlerError> {
        let cmd: A::Command = cmd.downcast().map_err(|other| {
            HandlerError::BadCommand(format!(
                "handler for {} received a {}",
                std::any::type_name::<A::Command>(),
                other.type_name()
            ))
        })?;
        let meta = cmd.metadata().clone();
        execute(self.repo.as_ref(), &cmd, |c| c.target().to_string(), &meta)
            .await
            .map(|_| ())
            .map_err(HandlerError::from_execute)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::test_fixtures::{Customer, create_customer, update_customer};
    use crate::metadata::AggregateId;
    use crate::repository::MemoryRepository;

    fn handler_over(
        repo: &MemoryRepository<Customer>,
    ) -> AggregateHandler<Customer, MemoryRepository<Customer>> {
        AggregateHandler::new(Arc::new(repo.clone()))
    }

    #[tokio::test]
    async fn aggregate_handler_runs_the_pipeline() {
        let repo = MemoryRepository::<Customer>::new();
        let handler = handler_over(&repo);

        handler
            .handle(AnyCommand::new(create_customer("c1", "Alice", "a@x")))
            .await
            .expect("create should succeed");

        let id = AggregateId::new("c1").unwrap();
        let (state, version) = repo.get_by_id(&id).await.unwrap();
        assert_eq!(version, 1);
        assert_eq!(state.name, "Alice");
    }

    #[tokio::test]
    async fn domain_rejection_maps_to_rejected() {
        let repo = MemoryRepository::<Customer>::new();
        let handler = handler_over(&repo);
        handler
            .handle(AnyCommand::new(create_customer("c1", "Alice", "a@x")))
            .await
            .unwrap();

        let err = handler
            .handle(AnyCommand::new(create_customer("c1", "Alice", "a@x")))
            .await
            .unwrap_err();
        assert_eq!(err, HandlerError::Rejected("customer already exists".into()));
    }

    #[tokio::test]
    async fn missing_target_maps_to_bad_command() {
        let repo = MemoryRepository::<Customer>::new();
        let handler = handler_over(&repo);
        let err = handler
            .handle(AnyCommand::new(create_customer("", "Alice", "a@x")))
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::BadCommand(_)), "got: {err:?}");
    }

    #[tokio::test]
    async fn noop_update_succeeds_without_appending() {
        let repo = MemoryRepository::<Customer>::new();
        let handler = handler_over(&repo);
        handler
            .handle(AnyCommand::new(create_customer("c1", "Alice", "a@x")))
            .await
            .unwrap();
        handler
            .handle(AnyCommand::new(update_customer("c1", "Alice", "a@x")))
            .await
            .expect("identical update should be an idempotent no-op");

        let id = AggregateId::new("c1").unwrap();
        assert_eq!(repo.records(&id).await.len(), 1);
    }

    #[tokio::test]
    async fn handlers_are_usable_as_trait_objects() {
        let repo = MemoryRepository::<Customer>::new();
        let handler: Arc<dyn CommandHandler> = Arc::new(handler_over(&repo));
        handler
            .handle(AnyCommand::new(create_customer("c1", "Alice", "a@x")))
            .await
            .expect("dispatch through dyn CommandHandler should succeed");
    }
}
