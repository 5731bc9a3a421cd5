//! Self-contained walkthrough of the synchronous command path:
//! CloudEvent in, registry decode, aggregate pipeline, events out.
//!
//! Run with: `cargo run --example customer`
//!
//! Uses the in-memory repository, so no database is required.

#[path = "domain.rs"]
mod domain;

use std::sync::Arc;

use serde_json::json;

use jade_es::{
    AggregateHandler, AggregateId, CloudEvent, CloudEventIngress, CommandRegistry, DirectIngress,
    MemoryRepository, ProcessOutcome, Repository,
};

use domain::{CUSTOMER_CREATE_1, CUSTOMER_UPDATE_1, Customer, CustomerCommand};

fn cloud_event(schema: &str, customer_id: &str, name: &str, email: &str) -> CloudEvent {
    serde_json::from_value(json!({
        "id": format!("ce-{customer_id}-{name}"),
        "source": "/demos/customer",
        "specversion": "1.0",
        "type": "com.jade.command",
        "dataschema": schema,
        "data": {
            "customerId": customer_id,
            "name": name,
            "email": email,
            "metadata": {"id": format!("m-{name}"), "correlationId": "demo-run"},
        },
    }))
    .expect("demo event is well-formed")
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Wire the registry: one aggregate handler over an in-memory store.
    let repo = Arc::new(MemoryRepository::<Customer>::new());
    let mut registry = CommandRegistry::new();
    registry.register::<CustomerCommand>(Arc::new(AggregateHandler::new(Arc::clone(&repo))));
    let ingress = DirectIngress::new(Arc::new(registry));

    // Create, then update, then replay an identical update.
    let outcomes = [
        ingress.process(&cloud_event(CUSTOMER_CREATE_1, "c1", "Alice", "a@x")).await,
        ingress.process(&cloud_event(CUSTOMER_UPDATE_1, "c1", "Alice2", "a2@x")).await,
        ingress.process(&cloud_event(CUSTOMER_UPDATE_1, "c1", "Alice2", "a2@x")).await,
    ];
    for (i, outcome) in outcomes.iter().enumerate() {
        println!("command {i}: {outcome:?}");
        assert_eq!(outcome, &ProcessOutcome::Accepted);
    }

    // A duplicate create is rejected by the aggregate.
    let duplicate = ingress.process(&cloud_event(CUSTOMER_CREATE_1, "c1", "Eve", "e@x")).await;
    println!("duplicate create: {duplicate:?}");
    assert!(matches!(duplicate, ProcessOutcome::Failed(_)));

    // Inspect the stream and the rehydrated state.
    let id = AggregateId::new("c1").expect("non-empty id");
    let records = repo.records(&id).await;
    println!("stream customer-c1:");
    for record in &records {
        println!("  v{} {} {}", record.version, record.event_type, record.payload);
    }

    let (state, version) = repo.get_by_id(&id).await.expect("stream exists");
    println!("state @ v{version}: {state:?}");

    assert_eq!(records.len(), 2, "create + update; the no-op appended nothing");
    assert_eq!(version, 2);
    assert_eq!(state.name, "Alice2");
    assert_eq!(state.email, "a2@x");

    println!("all assertions passed");
}
