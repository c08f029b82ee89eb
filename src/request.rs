//! Inbound webhook request decoding and validation.

use crate::error::{BridgeError, BridgeResult};
use crate::form::parse_query;
use crate::remote::Credentials;
use crate::types::{EntityKind, EntityRef, scalar_to_string, value_to_i64};
use serde_json::Value;

/// Fields every request must carry, in the order they are reported.
pub const REQUIRED_FIELDS: [&str; 6] = [
    "access_token",
    "domain",
    "task_id",
    "entity_type",
    "entity_id",
    "field_code",
];

/// A validated automation call.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookRequest {
    pub credentials: Credentials,
    pub task_id: i64,
    /// Entity kind as sent. Parsed when the write needs it, so an unknown kind
    /// still lets the task be read and reported.
    pub entity_type: String,
    pub entity_id: i64,
    pub field_code: String,
    pub smart_process_id: Option<i64>,
    pub event_token: Option<String>,
}

/// Decode a request body: JSON when it parses as JSON, else a bracketed form.
pub fn decode_body(body: &str) -> Value {
    match serde_json::from_str::<Value>(body) {
        Ok(value) if !value.is_null() => value,
        _ => parse_query(body),
    }
}

impl WebhookRequest {
    /// Decode and validate a raw body.
    pub fn parse(body: &str) -> BridgeResult<Self> {
        Self::from_value(&decode_body(body))
    }

    /// Validate a decoded body. Any missing or unusable required field fails
    /// with the full list of required fields.
    pub fn from_value(data: &Value) -> BridgeResult<Self> {
        let auth = data.get("auth");
        let props = data.get("properties");
        let text = |container: Option<&Value>, key: &str| {
            container
                .and_then(|c| c.get(key))
                .and_then(scalar_to_string)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };
        // Field codes are written back exactly as sent.
        let raw_text = |container: Option<&Value>, key: &str| {
            container
                .and_then(|c| c.get(key))
                .and_then(scalar_to_string)
                .filter(|s| !s.trim().is_empty())
        };
        let number = |key: &str| props.and_then(|p| p.get(key)).and_then(value_to_i64);

        let (
            Some(access_token),
            Some(domain),
            Some(task_id),
            Some(entity_type),
            Some(entity_id),
            Some(field_code),
        ) = (
            text(auth, "access_token"),
            text(auth, "domain"),
            number("task_id"),
            text(props, "entity_type"),
            number("entity_id"),
            raw_text(props, "field_code"),
        )
        else {
            return Err(BridgeError::missing_fields(&REQUIRED_FIELDS));
        };

        Ok(Self {
            credentials: Credentials {
                access_token,
                domain,
            },
            task_id,
            entity_type,
            entity_id,
            field_code,
            smart_process_id: number("smart_process_id"),
            event_token: text(Some(data), "event_token"),
        })
    }

    /// Target entity. Fails for kinds the bridge cannot write to.
    pub fn entity(&self) -> BridgeResult<EntityRef> {
        let kind: EntityKind = self.entity_type.parse()?;
        Ok(EntityRef::new(kind, self.entity_id, self.smart_process_id))
    }
}
