//! Shared fixtures for the integration tests: a Customer aggregate, an
//! Order aggregate with a custom confirmation handler, and repository
//! wrappers for failure injection.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;

use jade_es::{
    Aggregate, AggregateId, AnyCommand, AppState, CommandHandler, CommandRegistry, CommandSet,
    DecodeError, EventSet, HandlerError, Metadata, RepoError, Repository, SchemaUrn, Version,
};

// ---------------------------------------------------------------------------
// Customer aggregate
// ---------------------------------------------------------------------------

pub const CUSTOMER_CREATE_1: &str = "urn:schema:jade:command:customer:create:1";
pub const CUSTOMER_UPDATE_1: &str = "urn:schema:jade:command:customer:update:1";
pub const CUSTOMER_CREATED_2: &str = "urn:schema:jade:event:customer:created:2";
pub const CUSTOMER_UPDATED_1: &str = "urn:schema:jade:event:customer:updated:1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerFields {
    pub customer_id: String,
    pub name: String,
    pub email: String,
    pub metadata: Metadata,
}

#[derive(Debug, Clone)]
pub enum CustomerCommand {
    Create(CustomerFields),
    Update(CustomerFields),
}

#[derive(Debug, Clone, PartialEq)]
pub enum CustomerEvent {
    Created {
        customer_id: String,
        name: String,
        email: String,
        phone: Option<String>,
    },
    Updated {
        name: String,
        email: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum CustomerError {
    #[error("customer already exists")]
    AlreadyExists,
    #[error("customer does not exist")]
    DoesNotExist,
    #[error("customer name must not be empty")]
    EmptyName,
}

impl CommandSet for CustomerCommand {
    fn schemas() -> &'static [&'static str] {
        &[CUSTOMER_CREATE_1, CUSTOMER_UPDATE_1]
    }

    fn decode(schema: &SchemaUrn, payload: &serde_json::Value) -> Result<Self, DecodeError> {
        let fields = || -> Result<CustomerFields, DecodeError> {
            serde_json::from_value(payload.clone())
                .map_err(|e| DecodeError::MalformedPayload(e.to_string()))
        };
        match schema.to_string().as_str() {
            CUSTOMER_CREATE_1 => Ok(CustomerCommand::Create(fields()?)),
            CUSTOMER_UPDATE_1 => Ok(CustomerCommand::Update(fields()?)),
            other => Err(DecodeError::UnknownSchema(other.to_string())),
        }
    }

    fn schema(&self) -> &'static str {
        match self {
            CustomerCommand::Create(_) => CUSTOMER_CREATE_1,
            CustomerCommand::Update(_) => CUSTOMER_UPDATE_1,
        }
    }

    fn metadata(&self) -> &Metadata {
        match self {
            CustomerCommand::Create(c) | CustomerCommand::Update(c) => &c.metadata,
        }
    }

    fn target(&self) -> &str {
        match self {
            CustomerCommand::Create(c) | CustomerCommand::Update(c) => &c.customer_id,
        }
    }
}

impl EventSet for CustomerEvent {
    fn schemas() -> &'static [&'static str] {
        &[CUSTOMER_CREATED_2, CUSTOMER_UPDATED_1]
    }

    fn schema(&self) -> &'static str {
        match self {
            CustomerEvent::Created { .. } => CUSTOMER_CREATED_2,
            CustomerEvent::Updated { .. } => CUSTOMER_UPDATED_1,
        }
    }

    fn payload(&self) -> serde_json::Result<serde_json::Value> {
        Ok(match self {
            CustomerEvent::Created {
                customer_id,
                name,
                email,
                phone,
            } => json!({
                "customerId": customer_id,
                "name": name,
                "email": email,
                "phone": phone,
            }),
            CustomerEvent::Updated { name, email } => json!({"name": name, "email": email}),
        })
    }

    fn decode(schema: &str, payload: &serde_json::Value) -> Result<Self, DecodeError> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct CreatedPayload {
            customer_id: String,
            name: String,
            email: String,
            phone: Option<String>,
        }
        #[derive(Deserialize)]
        struct UpdatedPayload {
            name: String,
            email: String,
        }
        match schema {
            CUSTOMER_CREATED_2 => {
                let p: CreatedPayload = serde_json::from_value(payload.clone())
                    .map_err(|e| DecodeError::MalformedPayload(e.to_string()))?;
                Ok(CustomerEvent::Created {
                    customer_id: p.customer_id,
                    name: p.name,
                    email: p.email,
                    phone: p.phone,
                })
            }
            CUSTOMER_UPDATED_1 => {
                let p: UpdatedPayload = serde_json::from_value(payload.clone())
                    .map_err(|e| DecodeError::MalformedPayload(e.to_string()))?;
                Ok(CustomerEvent::Updated {
                    name: p.name,
                    email: p.email,
                })
            }
            other => Err(DecodeError::UnknownSchema(other.to_string())),
        }
    }
}

impl Aggregate for Customer {
    const PREFIX: &'static str = "customer";

    type Command = CustomerCommand;
    type Event = CustomerEvent;
    type Error = CustomerError;

    fn create(cmd: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match cmd {
            CustomerCommand::Create(c) => {
                if c.name.is_empty() {
                    return Err(CustomerError::EmptyName);
                }
                Ok(vec![CustomerEvent::Created {
                    customer_id: c.customer_id.clone(),
                    name: c.name.clone(),
                    email: c.email.clone(),
                    phone: None,
                }])
            }
            CustomerCommand::Update(_) => Err(CustomerError::DoesNotExist),
        }
    }

    fn decide(&self, cmd: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match cmd {
            CustomerCommand::Create(_) => Err(CustomerError::AlreadyExists),
            CustomerCommand::Update(c) => {
                if c.name == self.name && c.email == self.email {
                    return Ok(vec![]);
                }
                Ok(vec![CustomerEvent::Updated {
                    name: c.name.clone(),
                    email: c.email.clone(),
                }])
            }
        }
    }

    fn init(first: &Self::Event) -> Self {
        match first {
            CustomerEvent::Created {
                customer_id,
                name,
                email,
                phone,
            } => Customer {
                id: customer_id.clone(),
                name: name.clone(),
                email: email.clone(),
                phone: phone.clone(),
            },
            CustomerEvent::Updated { name, email } => Customer {
                id: String::new(),
                name: name.clone(),
                email: email.clone(),
                phone: None,
            },
        }
    }

    fn evolve(mut self, event: &Self::Event) -> Self {
        match event {
            CustomerEvent::Created { .. } => self,
            CustomerEvent::Updated { name, email } => {
                self.name = name.clone();
                self.email = email.clone();
                self
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Order aggregate + custom confirmation handler
// ---------------------------------------------------------------------------

pub const ORDER_PLACE_1: &str = "urn:schema:jade:command:order:place:1";
pub const ORDER_CANCEL_1: &str = "urn:schema:jade:command:order:cancel:1";
pub const ORDER_SEND_CONFIRMATION_1: &str = "urn:schema:jade:command:order:send-confirmation:1";
pub const ORDER_PLACED_1: &str = "urn:schema:jade:event:order:placed:1";
pub const ORDER_CANCELLED_1: &str = "urn:schema:jade:event:order:cancelled:1";
pub const ORDER_CONFIRMATION_SENT_1: &str = "urn:schema:jade:event:order:confirmation-sent:1";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OrderStatus {
    Placed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub customer_id: String,
    pub status: OrderStatus,
    pub confirmation_sent: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderFields {
    pub order_id: String,
    pub customer_id: String,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelOrderFields {
    pub order_id: String,
    pub metadata: Metadata,
}

#[derive(Debug, Clone)]
pub enum OrderCommand {
    Place(PlaceOrderFields),
    Cancel(CancelOrderFields),
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrderEvent {
    Placed { order_id: String, customer_id: String },
    Cancelled,
    ConfirmationSent,
}

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("order already exists")]
    AlreadyExists,
    #[error("order does not exist")]
    DoesNotExist,
    #[error("order is cancelled")]
    Cancelled,
}

impl CommandSet for OrderCommand {
    fn schemas() -> &'static [&'static str] {
        &[ORDER_PLACE_1, ORDER_CANCEL_1]
    }

    fn decode(schema: &SchemaUrn, payload: &serde_json::Value) -> Result<Self, DecodeError> {
        match schema.to_string().as_str() {
            ORDER_PLACE_1 => serde_json::from_value(payload.clone())
                .map(OrderCommand::Place)
                .map_err(|e| DecodeError::MalformedPayload(e.to_string())),
            ORDER_CANCEL_1 => serde_json::from_value(payload.clone())
                .map(OrderCommand::Cancel)
                .map_err(|e| DecodeError::MalformedPayload(e.to_string())),
            other => Err(DecodeError::UnknownSchema(other.to_string())),
        }
    }

    fn schema(&self) -> &'static str {
        match self {
            OrderCommand::Place(_) => ORDER_PLACE_1,
            OrderCommand::Cancel(_) => ORDER_CANCEL_1,
        }
    }

    fn metadata(&self) -> &Metadata {
        match self {
            OrderCommand::Place(c) => &c.metadata,
            OrderCommand::Cancel(c) => &c.metadata,
        }
    }

    fn target(&self) -> &str {
        match self {
            OrderCommand::Place(c) => &c.order_id,
            OrderCommand::Cancel(c) => &c.order_id,
        }
    }
}

impl EventSet for OrderEvent {
    fn schemas() -> &'static [&'static str] {
        &[ORDER_PLACED_1, ORDER_CANCELLED_1, ORDER_CONFIRMATION_SENT_1]
    }

    fn schema(&self) -> &'static str {
        match self {
            OrderEvent::Placed { .. } => ORDER_PLACED_1,
            OrderEvent::Cancelled => ORDER_CANCELLED_1,
            OrderEvent::ConfirmationSent => ORDER_CONFIRMATION_SENT_1,
        }
    }

    fn payload(&self) -> serde_json::Result<serde_json::Value> {
        Ok(match self {
            OrderEvent::Placed {
                order_id,
                customer_id,
            } => json!({"orderId": order_id, "customerId": customer_id}),
            OrderEvent::Cancelled | OrderEvent::ConfirmationSent => json!({}),
        })
    }

    fn decode(schema: &str, payload: &serde_json::Value) -> Result<Self, DecodeError> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct PlacedPayload {
            order_id: String,
            customer_id: String,
        }
        match schema {
            ORDER_PLACED_1 => {
                let p: PlacedPayload = serde_json::from_value(payload.clone())
                    .map_err(|e| DecodeError::MalformedPayload(e.to_string()))?;
                Ok(OrderEvent::Placed {
                    order_id: p.order_id,
                    customer_id: p.customer_id,
                })
            }
            ORDER_CANCELLED_1 => Ok(OrderEvent::Cancelled),
            ORDER_CONFIRMATION_SENT_1 => Ok(OrderEvent::ConfirmationSent),
            other => Err(DecodeError::UnknownSchema(other.to_string())),
        }
    }
}

impl Aggregate for Order {
    const PREFIX: &'static str = "order";

    type Command = OrderCommand;
    type Event = OrderEvent;
    type Error = OrderError;

    fn create(cmd: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match cmd {
            OrderCommand::Place(c) => Ok(vec![OrderEvent::Placed {
                order_id: c.order_id.clone(),
                customer_id: c.customer_id.clone(),
            }]),
            OrderCommand::Cancel(_) => Err(OrderError::DoesNotExist),
        }
    }

    fn decide(&self, cmd: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match cmd {
            OrderCommand::Place(_) => Err(OrderError::AlreadyExists),
            OrderCommand::Cancel(_) => match self.status {
                OrderStatus::Cancelled => Ok(vec![]),
                OrderStatus::Placed => Ok(vec![OrderEvent::Cancelled]),
            },
        }
    }

    fn init(first: &Self::Event) -> Self {
        match first {
            OrderEvent::Placed {
                order_id,
                customer_id,
            } => Order {
                id: order_id.clone(),
                customer_id: customer_id.clone(),
                status: OrderStatus::Placed,
                confirmation_sent: false,
            },
            _ => Order {
                id: String::new(),
                customer_id: String::new(),
                status: OrderStatus::Placed,
                confirmation_sent: false,
            },
        }
    }

    fn evolve(mut self, event: &Self::Event) -> Self {
        match event {
            OrderEvent::Placed { .. } => self,
            OrderEvent::Cancelled => {
                self.status = OrderStatus::Cancelled;
                self
            }
            OrderEvent::ConfirmationSent => {
                self.confirmation_sent = true;
                self
            }
        }
    }
}

/// The side-effect command handled outside the aggregate pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendOrderConfirmation {
    pub order_id: String,
    pub metadata: Metadata,
}

impl CommandSet for SendOrderConfirmation {
    fn schemas() -> &'static [&'static str] {
        &[ORDER_SEND_CONFIRMATION_1]
    }

    fn decode(schema: &SchemaUrn, payload: &serde_json::Value) -> Result<Self, DecodeError> {
        match schema.to_string().as_str() {
            ORDER_SEND_CONFIRMATION_1 => serde_json::from_value(payload.clone())
                .map_err(|e| DecodeError::MalformedPayload(e.to_string())),
            other => Err(DecodeError::UnknownSchema(other.to_string())),
        }
    }

    fn schema(&self) -> &'static str {
        ORDER_SEND_CONFIRMATION_1
    }

    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn target(&self) -> &str {
        &self.order_id
    }
}

/// External dependency of the confirmation handler.
#[async_trait]
pub trait ConfirmationSender: Send + Sync {
    async fn send(&self, order_id: &str, customer_id: &str) -> Result<(), String>;
}

/// Test double recording sent confirmations, optionally failing.
#[derive(Default)]
pub struct RecordingSender {
    pub sent: Mutex<Vec<String>>,
    pub failures: AtomicU32,
}

impl RecordingSender {
    pub fn failing(times: u32) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failures: AtomicU32::new(times),
        }
    }
}

#[async_trait]
impl ConfirmationSender for RecordingSender {
    async fn send(&self, order_id: &str, _customer_id: &str) -> Result<(), String> {
        if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err("smtp unreachable".to_string());
        }
        self.sent.lock().await.push(order_id.to_string());
        Ok(())
    }
}

/// Custom handler: read state, call the confirmation service, append
/// the result event. Not an aggregate pipeline.
pub struct ConfirmationHandler<R> {
    repo: Arc<R>,
    sender: Arc<dyn ConfirmationSender>,
}

impl<R> ConfirmationHandler<R> {
    pub fn new(repo: Arc<R>, sender: Arc<dyn ConfirmationSender>) -> Self {
        Self { repo, sender }
    }
}

#[async_trait]
impl<R: Repository<Order> + 'static> CommandHandler for ConfirmationHandler<R> {
    async fn handle(&self, cmd: AnyCommand) -> Result<(), HandlerError> {
        let cmd: SendOrderConfirmation = cmd
            .downcast()
            .map_err(|other| HandlerError::BadCommand(format!("unexpected {}", other.type_name())))?;
        let id = AggregateId::new(cmd.order_id.clone())
            .ok_or_else(|| HandlerError::BadCommand("missing order id".to_string()))?;

        let (order, version) = match self.repo.get_by_id(&id).await {
            Ok(loaded) => loaded,
            Err(RepoError::NotFound) => {
                return Err(HandlerError::Rejected("order does not exist".to_string()));
            }
            Err(RepoError::CorruptStream(msg)) => return Err(HandlerError::CorruptStream(msg)),
            Err(e) => return Err(HandlerError::Store(e.to_string())),
        };

        if order.status == OrderStatus::Cancelled {
            return Err(HandlerError::Rejected("order is cancelled".to_string()));
        }
        if order.confirmation_sent {
            // Already done; retries must not send twice.
            return Ok(());
        }

        self.sender
            .send(&order.id, &order.customer_id)
            .await
            .map_err(HandlerError::External)?;

        match self
            .repo
            .save(&id, &[OrderEvent::ConfirmationSent], version, &cmd.metadata)
            .await
        {
            Ok(_) => Ok(()),
            Err(RepoError::Conflict) => Err(HandlerError::Conflict),
            Err(e) => Err(HandlerError::Store(e.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Failure-injecting repository
// ---------------------------------------------------------------------------

/// Wrapper that fails the first `failures` save calls with a store
/// error, then delegates. Loads always pass through.
pub struct FlakyRepository<R> {
    inner: R,
    failures: AtomicU32,
}

impl<R> FlakyRepository<R> {
    pub fn failing_saves(inner: R, failures: u32) -> Self {
        Self {
            inner,
            failures: AtomicU32::new(failures),
        }
    }
}

#[async_trait]
impl<A: Aggregate, R: Repository<A>> Repository<A> for FlakyRepository<R> {
    async fn get_by_id(&self, id: &AggregateId) -> Result<(A, Version), RepoError> {
        self.inner.get_by_id(id).await
    }

    async fn save(
        &self,
        id: &AggregateId,
        events: &[A::Event],
        expected: Version,
        meta: &Metadata,
    ) -> Result<Version, RepoError> {
        if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(RepoError::Store("injected transient failure".to_string()));
        }
        self.inner.save(id, events, expected, meta).await
    }
}

// ---------------------------------------------------------------------------
// Wiring helpers
// ---------------------------------------------------------------------------

/// Registry with the Customer aggregate wired over the given repository.
pub fn customer_registry<R>(repo: Arc<R>) -> Arc<CommandRegistry>
where
    R: Repository<Customer> + 'static,
{
    let mut registry = CommandRegistry::new();
    registry.register::<CustomerCommand>(Arc::new(jade_es::AggregateHandler::new(repo)));
    Arc::new(registry)
}

/// Direct-mode router state over a customer registry.
pub fn direct_state(registry: Arc<CommandRegistry>) -> AppState {
    AppState {
        ingress: Arc::new(jade_es::DirectIngress::new(Arc::clone(&registry))),
        registry: Some(registry),
    }
}

/// The CloudEvent JSON body for scenario-style customer commands.
pub fn customer_cloud_event(schema: &str, customer_id: &str, name: &str, email: &str) -> serde_json::Value {
    json!({
        "id": format!("ce-{customer_id}-{name}"),
        "source": "/clients/test",
        "specversion": "1.0",
        "type": "com.jade.command",
        "dataschema": schema,
        "data": {
            "customerId": customer_id,
            "name": name,
            "email": email,
            "metadata": {"id": format!("m-{customer_id}-{name}"), "correlationId": "k1"},
        },
    })
}
