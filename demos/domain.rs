//! Customer domain shared by the demo programs.

use serde::{Deserialize, Serialize};
use serde_json::json;

use jade_es::{Aggregate, CommandSet, DecodeError, EventSet, Metadata, SchemaUrn};

pub const CUSTOMER_CREATE_1: &str = "urn:schema:jade:command:customer:create:1";
pub const CUSTOMER_UPDATE_1: &str = "urn:schema:jade:command:customer:update:1";
pub const CUSTOMER_CREATED_2: &str = "urn:schema:jade:event:customer:created:2";
pub const CUSTOMER_UPDATED_1: &str = "urn:schema:jade:event:customer:updated:1";

/// Customer state reconstructed from its event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}

/// Payload shared by the create and update commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerFields {
    pub customer_id: String,
    pub name: String,
    pub email: String,
    pub metadata: Metadata,
}

/// Commands accepted by the [`Customer`] aggregate.
#[derive(Debug, Clone)]
pub enum CustomerCommand {
    Create(CustomerFields),
    Update(CustomerFields),
}

/// Events produced by the [`Customer`] aggregate.
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

/// Rejections produced by [`Customer`] decisions.
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
