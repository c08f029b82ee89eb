//! Field schema lookup: stored name and cardinality of a target field.

use super::{FieldIdentifier, find_in_map};
use crate::error::{BridgeError, BridgeResult};
use crate::logging::{LogLevel, Logger};
use crate::remote::CrmClient;
use crate::types::{Cardinality, EntityRef, FieldDescriptor};
use serde_json::{Value, json};

/// True for `true`, `"Y"`, or a value loosely equal to 1.
fn flag_is_set(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) if s == "Y" => true,
        Value::String(s) => s.trim().parse::<f64>().is_ok_and(|n| n == 1.0),
        Value::Number(n) => n.as_f64() == Some(1.0),
        _ => false,
    }
}

/// Loose truthiness: non-empty, non-zero, non-false.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty() && s != "0",
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Whether a field descriptor accepts several values.
///
/// Schemas report multiplicity inconsistently, so any of these counts:
/// `isMultiple` set, `multiple` set, or a `file` field whose `isMultiple` is
/// truthy at all.
pub fn accepts_multiple(descriptor: &Value) -> bool {
    let is_multiple = descriptor.get("isMultiple");
    if is_multiple.is_some_and(flag_is_set) {
        return true;
    }
    if descriptor.get("multiple").is_some_and(flag_is_set) {
        return true;
    }
    descriptor.get("type").and_then(|t| t.as_str()) == Some("file")
        && is_multiple.is_some_and(is_truthy)
}

/// Look a field up in a `crm.item.fields` result.
///
/// Candidates are tried in order (caller spelling first); the first key
/// present in the schema wins.
pub fn resolve_in_schema(schema: &Value, field: &FieldIdentifier) -> BridgeResult<FieldDescriptor> {
    let Some(fields) = schema.get("fields") else {
        let keys: Vec<String> = schema
            .as_object()
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        return Err(BridgeError::schema_unavailable("Schema response has no fields container")
            .with_details(format!("result keys: {}", keys.join(", "))));
    };
    let Some(fields) = fields.as_object() else {
        return Err(BridgeError::schema_unavailable("Schema fields container is not a map"));
    };
    let Some((stored_name, descriptor)) = find_in_map(fields, field) else {
        let available: Vec<String> = fields.keys().cloned().collect();
        return Err(BridgeError::field_not_found(field.raw(), &available));
    };
    let cardinality = if accepts_multiple(descriptor) {
        Cardinality::Multiple
    } else {
        Cardinality::Single
    };
    Ok(FieldDescriptor {
        stored_name,
        cardinality,
        kind: descriptor
            .get("type")
            .and_then(|t| t.as_str())
            .map(String::from),
    })
}

/// Resolves target fields against the live schema. Nothing is cached.
pub struct FieldResolver<'a> {
    client: &'a CrmClient,
    logger: Logger,
}

impl<'a> FieldResolver<'a> {
    pub fn new(client: &'a CrmClient) -> Self {
        Self {
            client,
            logger: client.logger().child("fields"),
        }
    }

    pub async fn resolve(
        &self,
        entity: &EntityRef,
        field: &FieldIdentifier,
    ) -> BridgeResult<FieldDescriptor> {
        let outcome = self.lookup(entity, field).await;
        match &outcome {
            Ok(descriptor) => self.logger.log_with_data(
                LogLevel::Info,
                "Field resolved",
                json!({
                    "entity": entity.to_string(),
                    "field_code": field.raw(),
                    "stored_name": descriptor.stored_name,
                    "field_type": descriptor.kind,
                    "is_multiple": descriptor.accepts_multiple(),
                }),
            ),
            Err(e) => self.logger.log_with_data(
                LogLevel::Error,
                &format!("Field resolution failed: {}", e),
                json!({ "entity": entity.to_string(), "error": e }),
            ),
        }
        outcome
    }

    async fn lookup(
        &self,
        entity: &EntityRef,
        field: &FieldIdentifier,
    ) -> BridgeResult<FieldDescriptor> {
        let schema_key = entity.schema_key()?;
        let schema = self
            .client
            .entity_fields(schema_key)
            .await
            .map_err(|e| BridgeError::schema_unavailable(e.to_string()))?;
        resolve_in_schema(&schema, field)
    }
}
