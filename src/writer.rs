//! Writing resolved files into a CRM entity field.
//!
//! Multi-valued fields keep what they already hold: new files are appended
//! after the existing ones. Single-valued fields take the first new file.

use crate::error::{BridgeError, BridgeResult};
use crate::fields::{FieldIdentifier, FieldResolver, find_in_map};
use crate::logging::{LogLevel, Logger};
use crate::remote::{CrmClient, EntityApi};
use crate::types::{EntityKind, EntityRef, FieldDescriptor, ResolvedFile};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;
use serde_json::{Map, Value, json};

/// What a successful write did.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WriteOutcome {
    /// Key used in the update payload.
    pub field_key: String,
    /// Name the schema stores the field under.
    pub stored_name: String,
    pub multiple: bool,
    /// Values already in the field and kept.
    pub existing_kept: usize,
    /// New files written.
    pub files_written: usize,
    /// New files dropped because the field holds one value.
    pub discarded: usize,
}

/// Payload for one file in the shape the entity's API expects.
pub fn file_payload(kind: EntityKind, file: &ResolvedFile) -> Value {
    let pair = json!([file.name, STANDARD.encode(&file.content)]);
    match kind {
        EntityKind::SmartProcess => pair,
        EntityKind::Fixed(_) => json!({ "fileData": pair }),
    }
}

/// Existing field value as a list of entries to keep.
///
/// Stored files come back as objects carrying an `id`; they are re-sent as
/// `{"id": ..}` so the API keeps them. Anything else is passed through.
pub fn existing_entries(current: Option<&Value>) -> Vec<Value> {
    let Some(Value::Array(items)) = current else {
        return Vec::new();
    };
    items
        .iter()
        .filter(|item| !item.is_null())
        .map(|item| match item.get("id") {
            Some(id) if item.is_object() => json!({ "id": id }),
            _ => item.clone(),
        })
        .collect()
}

/// Update key: generic entities use the schema's name, fixed kinds the caller's.
pub fn field_key(kind: EntityKind, field: &FieldIdentifier, descriptor: &FieldDescriptor) -> String {
    match kind {
        EntityKind::SmartProcess => descriptor.stored_name.clone(),
        EntityKind::Fixed(_) => field.raw().to_string(),
    }
}

pub struct EntityFileWriter<'a> {
    client: &'a CrmClient,
    logger: Logger,
}

impl<'a> EntityFileWriter<'a> {
    pub fn new(client: &'a CrmClient) -> Self {
        Self {
            client,
            logger: client.logger().child("writer"),
        }
    }

    /// Write `files` into `field_code` of `entity`.
    pub async fn write(
        &self,
        entity: &EntityRef,
        field_code: &str,
        files: &[ResolvedFile],
    ) -> BridgeResult<WriteOutcome> {
        let field = FieldIdentifier::parse(field_code);
        let descriptor = FieldResolver::new(self.client).resolve(entity, &field).await?;

        let payloads: Vec<Value> = files.iter().map(|f| file_payload(entity.kind, f)).collect();
        if payloads.is_empty() {
            self.logger.warning("No files to write after preparation");
            return Err(BridgeError::no_files());
        }

        let api = EntityApi::for_entity(entity)?;
        let new_count = payloads.len();
        let (value, existing_kept, files_written) = if descriptor.accepts_multiple() {
            let mut merged = self.current_entries(&api, entity, &field).await?;
            let existing_kept = merged.len();
            merged.extend(payloads);
            (Value::Array(merged), existing_kept, new_count)
        } else {
            if new_count > 1 {
                self.logger.log_with_data(
                    LogLevel::Warning,
                    "Several files for a single-value field, keeping the first",
                    json!({ "files_count": new_count }),
                );
            }
            let first = payloads.into_iter().next().unwrap_or(Value::Null);
            (first, 0, 1)
        };

        let key = field_key(entity.kind, &field, &descriptor);
        let mut fields = Map::new();
        fields.insert(key.clone(), value);

        self.logger.log_with_data(
            LogLevel::Info,
            "Updating entity",
            json!({
                "entity": entity.to_string(),
                "method": api.update_method(),
                "field_key": key,
                "existing": existing_kept,
                "new": files_written,
            }),
        );

        self.client
            .update_entity(&api, entity.id, fields)
            .await
            .map_err(|e| BridgeError::update_rejected(e.to_string()))?;

        let multiple = descriptor.accepts_multiple();
        Ok(WriteOutcome {
            field_key: key,
            stored_name: descriptor.stored_name,
            multiple,
            existing_kept,
            files_written,
            discarded: new_count - files_written,
        })
    }

    /// Current entries of a multi-valued field. A failed read aborts the
    /// write, since writing without them would drop the stored files.
    async fn current_entries(
        &self,
        api: &EntityApi,
        entity: &EntityRef,
        field: &FieldIdentifier,
    ) -> BridgeResult<Vec<Value>> {
        let values = self
            .client
            .get_entity(api, entity.id)
            .await
            .map_err(|e| {
                BridgeError::remote(e).with_details("current field value could not be read")
            })?;
        let current = find_in_map(&values, field).map(|(_, v)| v);
        let entries = existing_entries(current);
        self.logger.debug(&format!("Field holds {} existing value(s)", entries.len()));
        Ok(entries)
    }
}
