//! CloudEvents v1.0 envelope subset used at the ingress boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The only CloudEvents spec version this ingress accepts.
pub const SPEC_VERSION: &str = "1.0";

/// Error returned when a CloudEvents envelope fails validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid cloudevent envelope: {0}")]
pub struct EnvelopeError(pub String);

/// The `jade` CloudEvents extension: correlation and identity context
/// forwarded alongside the command payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JadeExtension {
    /// Groups a causally related interaction.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub correlation_id: Option<String>,
    /// The id that caused this command.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub causation_id: Option<String>,
    /// Identity of the issuing user.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub user_id: Option<String>,
    /// Tenant the command belongs to.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tenant_id: Option<String>,
}

/// A CloudEvents v1.0 envelope (structured JSON mode).
///
/// Only the attributes this system reads are modelled; `dataschema`
/// carries the command's schema URN and `data` the command payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudEvent {
    /// Event identifier, echoed back in every ingress response.
    pub id: String,
    /// Producer identity.
    pub source: String,
    /// CloudEvents spec version; must be `"1.0"`.
    pub specversion: String,
    /// Event type attribute.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Media type of `data`.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub datacontenttype: Option<String>,
    /// Schema URN identifying the command variant carried in `data`.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub dataschema: Option<String>,
    /// Subject within the producer's context.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub subject: Option<String>,
    /// Producer timestamp.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub time: Option<DateTime<Utc>>,
    /// Structured command payload.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data: Option<serde_json::Value>,
    /// Correlation/identity extension.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub jade: Option<JadeExtension>,
}

impl CloudEvent {
    /// Build a minimal envelope; fill optionals with the `with_*` methods.
    pub fn new(
        id: impl Into<String>,
        source: impl Into<String>,
        event_type: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            specversion: SPEC_VERSION.to_string(),
            event_type: event_type.into(),
            datacontenttype: None,
            dataschema: None,
            subject: None,
            time: None,
            data: None,
            jade: None,
        }
    }

    /// Set the `dataschema` attribute.
    pub fn with_dataschema(mut self, schema: impl Into<String>) -> Self {
        self.dataschema = Some(schema.into());
        self
    }

    /// Set the structured `data` payload.
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Set the `jade` extension.
    pub fn with_jade(mut self, jade: JadeExtension) -> Self {
        self.jade = Some(jade);
        self
    }

    /// Validate the required envelope attributes.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError`] when `id`, `source`, `type`, or
    /// `specversion` is empty, or when `specversion` is not `"1.0"`.
    pub fn validate(&self) -> Result<(), EnvelopeError> {
        if self.id.is_empty() {
            return Err(EnvelopeError("id must not be empty".to_string()));
        }
        if self.source.is_empty() {
            return Err(EnvelopeError("source must not be empty".to_string()));
        }
        if self.event_type.is_empty() {
            return Err(EnvelopeError("type must not be empty".to_string()));
        }
        if self.specversion.is_empty() {
            return Err(EnvelopeError("specversion must not be empty".to_string()));
        }
        if self.specversion != SPEC_VERSION {
            return Err(EnvelopeError(format!(
                "unsupported specversion `{}`, expected `{SPEC_VERSION}`",
                self.specversion
            )));
        }
        Ok(())
    }
}
