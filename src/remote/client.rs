//! Named remote operations over a [`RestTransport`].

use super::{RemoteError, RestTransport};
use crate::error::BridgeResult;
use crate::logging::{LogLevel, Logger};
use crate::types::{
    EntityKind, EntityRef, FileReference, FixedKind, TaskResult, scalar_to_string,
};
use serde_json::{Map, Value, json};
use std::sync::Arc;

/// How an entity is addressed by the API: per-kind methods or the generic item API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityApi {
    Fixed(FixedKind),
    Item { entity_type_id: i64 },
}

impl EntityApi {
    /// Pick the API for an entity. Generic entities need their sub-type id.
    pub fn for_entity(entity: &EntityRef) -> BridgeResult<Self> {
        match entity.kind {
            EntityKind::Fixed(kind) => Ok(EntityApi::Fixed(kind)),
            EntityKind::SmartProcess => Ok(EntityApi::Item {
                entity_type_id: entity.generic_type_id()?,
            }),
        }
    }

    pub fn get_method(&self) -> String {
        match self {
            EntityApi::Fixed(kind) => format!("{}.get", kind.method_prefix()),
            EntityApi::Item { .. } => "crm.item.get".to_string(),
        }
    }

    pub fn update_method(&self) -> String {
        match self {
            EntityApi::Fixed(kind) => format!("{}.update", kind.method_prefix()),
            EntityApi::Item { .. } => "crm.item.update".to_string(),
        }
    }

    fn params(&self, id: i64) -> Map<String, Value> {
        let mut params = Map::new();
        params.insert("id".to_string(), json!(id));
        if let EntityApi::Item { entity_type_id } = self {
            params.insert("entityTypeId".to_string(), json!(entity_type_id));
        }
        params
    }
}

/// One object attached to a task comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentAttachment {
    /// Attached-object id, as referenced from task results.
    pub attachment_id: Option<String>,
    pub file: FileReference,
}

/// Display name and retrieval URL of a stored file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub name: String,
    pub download_url: String,
}

/// Client exposing the named operations the bridge uses.
///
/// Each call is logged with its outcome. Envelope problems become
/// [`RemoteError`]s; callers decide whether a failure is fatal.
#[derive(Clone)]
pub struct CrmClient {
    transport: Arc<dyn RestTransport>,
    logger: Logger,
}

impl CrmClient {
    pub fn new(transport: Arc<dyn RestTransport>, logger: Logger) -> Self {
        Self { transport, logger }
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    /// Call a method and return its `result` container.
    async fn call_result(&self, method: &str, params: Value) -> Result<Value, RemoteError> {
        let outcome = self
            .transport
            .call(method, params)
            .await
            .and_then(|mut body| match body.get_mut("result").map(Value::take) {
                Some(result) if !result.is_null() => Ok(result),
                _ => Err(RemoteError::missing(method, "result")),
            });
        match &outcome {
            Ok(_) => self.logger.debug(&format!("{} succeeded", method)),
            Err(e) => self.logger.log_with_data(
                LogLevel::Error,
                &format!("{} failed", method),
                json!({ "method": method, "error": e.to_string() }),
            ),
        }
        outcome
    }

    /// Fetch a task. Returns the `task` object.
    pub async fn get_task(&self, task_id: i64) -> Result<Value, RemoteError> {
        let method = "tasks.task.get";
        let mut result = self.call_result(method, json!({ "taskId": task_id })).await?;
        match result.get_mut("task").map(Value::take) {
            Some(task) if task.is_object() => Ok(task),
            _ => Err(RemoteError::missing(method, "task")),
        }
    }

    /// List all results submitted for a task, in API order.
    pub async fn list_task_results(&self, task_id: i64) -> Result<Vec<TaskResult>, RemoteError> {
        let method = "tasks.task.result.list";
        let result = self.call_result(method, json!({ "taskId": task_id })).await?;
        let items = match result {
            Value::Array(items) => items,
            Value::Object(map) => map.into_iter().map(|(_, v)| v).collect(),
            _ => return Err(RemoteError::missing(method, "result list")),
        };
        let mut results = Vec::with_capacity(items.len());
        for item in items {
            match serde_json::from_value::<TaskResult>(item) {
                Ok(r) => results.push(r),
                Err(e) => self
                    .logger
                    .warning(&format!("Skipping malformed task result: {}", e)),
            }
        }
        Ok(results)
    }

    /// Objects attached to a task comment, in API order.
    pub async fn comment_attachments(
        &self,
        task_id: i64,
        comment_id: &str,
    ) -> Result<Vec<CommentAttachment>, RemoteError> {
        let method = "task.commentitem.get";
        let result = self
            .call_result(method, json!({ "TASKID": task_id, "ITEMID": comment_id }))
            .await?;
        let entries: Vec<(Option<String>, Value)> = match result.get("ATTACHED_OBJECTS") {
            Some(Value::Object(map)) => map
                .iter()
                .map(|(k, v)| (Some(k.clone()), v.clone()))
                .collect(),
            Some(Value::Array(items)) => items.iter().map(|v| (None, v.clone())).collect(),
            _ => return Err(RemoteError::missing(method, "ATTACHED_OBJECTS")),
        };
        Ok(entries
            .into_iter()
            .filter_map(|(key, object)| {
                let file = object.get("FILE_ID").and_then(scalar_to_string)?;
                let attachment_id = object
                    .get("ATTACHMENT_ID")
                    .or_else(|| object.get("ID"))
                    .and_then(scalar_to_string)
                    .or(key);
                Some(CommentAttachment {
                    attachment_id,
                    file: FileReference::new(file),
                })
            })
            .collect())
    }

    /// Resolve an attached-object id to the file behind it.
    pub async fn attached_object_file(
        &self,
        attachment_id: &str,
    ) -> Result<FileReference, RemoteError> {
        let method = "disk.attachedObject.get";
        let result = self.call_result(method, json!({ "id": attachment_id })).await?;
        result
            .get("OBJECT_ID")
            .and_then(scalar_to_string)
            .map(FileReference::new)
            .ok_or_else(|| RemoteError::missing(method, "OBJECT_ID"))
    }

    /// Name and download URL of a stored file.
    pub async fn file_info(&self, file: &FileReference) -> Result<FileInfo, RemoteError> {
        let method = "disk.file.get";
        let result = self.call_result(method, json!({ "id": file.as_str() })).await?;
        let download_url = result
            .get("DOWNLOAD_URL")
            .and_then(|u| u.as_str())
            .filter(|u| !u.is_empty())
            .ok_or_else(|| RemoteError::missing(method, "DOWNLOAD_URL"))?;
        let name = result
            .get("NAME")
            .and_then(scalar_to_string)
            .unwrap_or_else(|| format!("file_{}", file));
        Ok(FileInfo {
            name,
            download_url: download_url.to_string(),
        })
    }

    /// Download file bytes.
    pub async fn download(&self, url: &str) -> Result<Vec<u8>, RemoteError> {
        let outcome = self.transport.download(url).await;
        if let Err(ref e) = outcome {
            self.logger.log_with_data(
                LogLevel::Error,
                "Download failed",
                json!({ "error": e.to_string() }),
            );
        }
        outcome
    }

    /// Field schema response for a schema key. The caller checks its shape.
    pub async fn entity_fields(&self, schema_key: i64) -> Result<Value, RemoteError> {
        self.call_result("crm.item.fields", json!({ "entityTypeId": schema_key }))
            .await
    }

    /// Current field values of one entity.
    pub async fn get_entity(&self, api: &EntityApi, id: i64) -> Result<Map<String, Value>, RemoteError> {
        let method = api.get_method();
        let result = self
            .call_result(&method, Value::Object(api.params(id)))
            .await?;
        let values = match api {
            EntityApi::Fixed(_) => Some(result),
            EntityApi::Item { .. } => result.get("item").cloned(),
        };
        match values {
            Some(Value::Object(map)) => Ok(map),
            _ => Err(RemoteError::missing(&method, "entity values")),
        }
    }

    /// Write fields to an entity. Success means the response carried a result.
    pub async fn update_entity(
        &self,
        api: &EntityApi,
        id: i64,
        fields: Map<String, Value>,
    ) -> Result<Value, RemoteError> {
        let mut params = api.params(id);
        params.insert("fields".to_string(), Value::Object(fields));
        self.call_result(&api.update_method(), Value::Object(params))
            .await
    }

    /// Report return values to the automation that triggered the request.
    pub async fn send_bizproc_event(
        &self,
        event_token: &str,
        return_values: Value,
    ) -> Result<Value, RemoteError> {
        self.call_result(
            "bizproc.event.send",
            json!({ "event_token": event_token, "return_values": return_values }),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MockTransport;

    fn client(mock: MockTransport) -> (CrmClient, Arc<MockTransport>) {
        let mock = Arc::new(mock);
        (CrmClient::new(mock.clone(), Logger::silent()), mock)
    }

    #[test]
    fn test_entity_api_dispatch() {
        let deal = EntityRef::new(EntityKind::Fixed(FixedKind::Deal), 1, None);
        let api = EntityApi::for_entity(&deal).unwrap();
        assert_eq!(api.get_method(), "crm.deal.get");
        assert_eq!(api.update_method(), "crm.deal.update");

        let item = EntityRef::new(EntityKind::SmartProcess, 1, Some(180));
        let api = EntityApi::for_entity(&item).unwrap();
        assert_eq!(api, EntityApi::Item { entity_type_id: 180 });
        assert_eq!(api.update_method(), "crm.item.update");

        let missing = EntityRef::new(EntityKind::SmartProcess, 1, None);
        assert!(EntityApi::for_entity(&missing).is_err());
    }

    #[tokio::test]
    async fn test_missing_result_is_an_error() {
        let (client, _) = client(MockTransport::new().respond("tasks.task.get", json!({"time": {}})));
        let err = client.get_task(5).await.unwrap_err();
        assert!(matches!(err, RemoteError::MissingContainer { .. }));
    }

    #[tokio::test]
    async fn test_comment_attachments_from_keyed_map() {
        let (client, mock) = client(MockTransport::new().respond(
            "task.commentitem.get",
            json!({"result": {"ATTACHED_OBJECTS": {
                "71": {"ATTACHMENT_ID": "71", "FILE_ID": "901"},
                "72": {"FILE_ID": 902},
                "73": {"NAME": "no file id"}
            }}}),
        ));
        let attachments = client.comment_attachments(3, "44").await.unwrap();
        assert_eq!(
            attachments,
            vec![
                CommentAttachment {
                    attachment_id: Some("71".into()),
                    file: FileReference::new("901")
                },
                CommentAttachment {
                    attachment_id: Some("72".into()),
                    file: FileReference::new("902")
                },
            ]
        );
        assert_eq!(
            mock.calls_to("task.commentitem.get")[0],
            json!({"TASKID": 3, "ITEMID": "44"})
        );
    }

    #[tokio::test]
    async fn test_get_entity_reads_item_container_for_generic_kind() {
        let (client, mock) = client(MockTransport::new().respond(
            "crm.item.get",
            json!({"result": {"item": {"id": 9, "ufCrm_5_1": [{"id": 1}]}}}),
        ));
        let api = EntityApi::Item { entity_type_id: 1040 };
        let values = client.get_entity(&api, 9).await.unwrap();
        assert_eq!(values["ufCrm_5_1"], json!([{"id": 1}]));
        assert_eq!(
            mock.calls_to("crm.item.get")[0],
            json!({"id": 9, "entityTypeId": 1040})
        );
    }

    #[tokio::test]
    async fn test_update_success_requires_result() {
        let (client, _) = client(
            MockTransport::new()
                .respond("crm.deal.update", json!({"result": true}))
                .respond("crm.lead.update", json!({"result": null})),
        );
        assert!(
            client
                .update_entity(&EntityApi::Fixed(FixedKind::Deal), 1, Map::new())
                .await
                .is_ok()
        );
        assert!(
            client
                .update_entity(&EntityApi::Fixed(FixedKind::Lead), 1, Map::new())
                .await
                .is_err()
        );
    }
}
