//! Request pipeline: read the task's latest result, write its files into the
//! target entity field and report back to the automation.
//!
//! Only a missing task or an unexpected fault ends a request early. Every
//! other failure is logged and turns into `success: false` in the response.

use crate::attachments::AttachmentResolver;
use crate::error::BridgeError;
use crate::logging::{LogLevel, Logger};
use crate::remote::CrmClient;
use crate::request::WebhookRequest;
use crate::results::latest_result;
use crate::types::{FileReference, TaskResult};
use crate::writer::EntityFileWriter;
use serde::Serialize;
use serde_json::{Value, json};
use std::any::Any;

pub const MESSAGE_WRITTEN: &str = "Files successfully written to entity";
pub const MESSAGE_WRITE_FAILED: &str = "Failed to write files to entity";
pub const MESSAGE_NO_FILES: &str = "No files to write";

/// Values handed back to the automation through its callback.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReturnValues {
    pub success: bool,
    pub files_count: usize,
    /// Comma-joined file ids.
    pub files_ids: String,
    pub text_result: String,
    pub message: String,
}

impl ReturnValues {
    /// Return values for a request that failed before producing anything.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            files_count: 0,
            files_ids: String::new(),
            text_result: String::new(),
            message: message.into(),
        }
    }
}

/// Body of a completed request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BridgeResponse {
    pub success: bool,
    pub message: String,
    pub files_count: usize,
    pub files_ids: Vec<String>,
    pub files_written: usize,
    pub text_result: String,
    pub entity_updated: bool,
}

/// How a request ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    /// The pipeline ran to the end, whether or not the write succeeded.
    Completed(BridgeResponse),
    /// The task could not be fetched.
    TaskNotFound(BridgeError),
    /// The pipeline panicked.
    Internal(String),
}

impl PipelineOutcome {
    pub fn status(&self) -> u16 {
        match self {
            PipelineOutcome::Completed(_) => 200,
            PipelineOutcome::TaskNotFound(_) => 404,
            PipelineOutcome::Internal(_) => 500,
        }
    }

    /// Response body for the outcome.
    pub fn body(&self) -> Value {
        match self {
            PipelineOutcome::Completed(response) => json!(response),
            PipelineOutcome::TaskNotFound(err) => json!({ "error": err.message }),
            PipelineOutcome::Internal(message) => json!({ "error": message }),
        }
    }
}

/// What the task's latest result contributed.
#[derive(Debug, Default)]
struct Extracted {
    files: Vec<FileReference>,
    text: String,
}

pub struct Bridge {
    client: CrmClient,
    logger: Logger,
}

impl Bridge {
    pub fn new(client: CrmClient) -> Self {
        let logger = client.logger().child("pipeline");
        Self { client, logger }
    }

    /// Run the pipeline on its own task so a panic becomes a structured
    /// failure. The failure is still reported to the automation.
    pub async fn handle(client: CrmClient, request: WebhookRequest) -> PipelineOutcome {
        let bridge = Bridge::new(client.clone());
        let event_token = request.event_token.clone();
        let joined = tokio::spawn(async move { bridge.run(&request).await }).await;

        match joined {
            Ok(outcome) => outcome,
            Err(e) => {
                let detail = if e.is_panic() {
                    panic_message(e.into_panic())
                } else {
                    e.to_string()
                };
                let message = format!("Internal server error: {}", detail);
                let bridge = Bridge::new(client);
                bridge.logger.log_with_data(
                    LogLevel::Error,
                    "Pipeline aborted",
                    json!({ "error": message }),
                );
                bridge
                    .report(event_token.as_deref(), &ReturnValues::failure(&message))
                    .await;
                PipelineOutcome::Internal(message)
            }
        }
    }

    /// Run every step for one request.
    pub async fn run(&self, request: &WebhookRequest) -> PipelineOutcome {
        let task_id = request.task_id;
        let token = request.event_token.as_deref();

        let task = match self.client.get_task(task_id).await {
            Ok(task) => task,
            Err(e) => {
                let err = BridgeError::task_not_found(task_id).with_details(e.to_string());
                self.logger.error(&err.message);
                self.report(token, &ReturnValues::failure(&err.message)).await;
                return PipelineOutcome::TaskNotFound(err);
            }
        };
        self.logger.log_with_data(
            LogLevel::Info,
            "Task fetched",
            json!({ "task_id": task_id, "title": task.get("title") }),
        );

        let results = match self.client.list_task_results(task_id).await {
            Ok(results) => results,
            Err(e) => {
                self.logger.log_with_data(
                    LogLevel::Warning,
                    "Task results unavailable, continuing without them",
                    json!({ "task_id": task_id, "error": e.to_string() }),
                );
                Vec::new()
            }
        };
        self.logger
            .debug(&format!("Task #{} has {} result(s)", task_id, results.len()));

        let extracted = match latest_result(&results) {
            Some(result) => self.extract(task_id, result).await,
            None => {
                self.logger.info(&format!("Task #{} has no results", task_id));
                Extracted::default()
            }
        };

        let (entity_updated, files_written) = if extracted.files.is_empty() {
            self.logger.info(MESSAGE_NO_FILES);
            (true, 0)
        } else {
            match self.write_files(request, &extracted.files).await {
                Some(written) => (true, written),
                None => (false, 0),
            }
        };

        let message = if !entity_updated {
            MESSAGE_WRITE_FAILED
        } else if extracted.files.is_empty() {
            MESSAGE_NO_FILES
        } else {
            MESSAGE_WRITTEN
        };
        let file_ids: Vec<String> = extracted.files.iter().map(|f| f.as_str().to_string()).collect();

        let values = ReturnValues {
            success: entity_updated,
            files_count: file_ids.len(),
            files_ids: file_ids.join(","),
            text_result: extracted.text.clone(),
            message: message.to_string(),
        };
        self.report(token, &values).await;

        let response = BridgeResponse {
            success: entity_updated,
            message: message.to_string(),
            files_count: file_ids.len(),
            files_ids: file_ids,
            files_written,
            text_result: extracted.text,
            entity_updated,
        };
        self.logger
            .log_with_data(LogLevel::Info, "Request completed", json!(response));
        PipelineOutcome::Completed(response)
    }

    async fn extract(&self, task_id: i64, result: &TaskResult) -> Extracted {
        self.logger.log_with_data(
            LogLevel::Info,
            "Processing latest task result",
            json!({
                "result_id": result.id,
                "created_at": result.created_at,
                "references": result.files,
                "comment_id": result.comment_id(),
            }),
        );
        let files = AttachmentResolver::new(&self.client)
            .resolve(task_id, &result.files, result.comment_id())
            .await;
        Extracted {
            files,
            text: result.text().unwrap_or_default().to_string(),
        }
    }

    /// Download the files and write them. Returns how many were written.
    async fn write_files(&self, request: &WebhookRequest, files: &[FileReference]) -> Option<usize> {
        let outcome = match request.entity() {
            Ok(entity) => {
                self.logger.info(&format!(
                    "Writing {} file(s) to {}",
                    files.len(),
                    entity
                ));
                let contents = AttachmentResolver::new(&self.client)
                    .fetch_contents(files)
                    .await;
                EntityFileWriter::new(&self.client)
                    .write(&entity, &request.field_code, &contents)
                    .await
            }
            Err(e) => Err(e),
        };

        match outcome {
            Ok(outcome) => {
                self.logger
                    .log_with_data(LogLevel::Info, "Entity updated", json!(outcome));
                Some(outcome.files_written)
            }
            Err(e) => {
                self.logger
                    .log_with_data(LogLevel::Error, MESSAGE_WRITE_FAILED, json!(e));
                None
            }
        }
    }

    /// Send return values to the automation callback. Needs an event token;
    /// the outcome only affects the log.
    pub async fn report(&self, event_token: Option<&str>, values: &ReturnValues) -> bool {
        let Some(token) = event_token else {
            self.logger
                .warning("No event_token, result not sent to the automation");
            return false;
        };
        match self.client.send_bizproc_event(token, json!(values)).await {
            Ok(_) => {
                self.logger.info("Result sent to the automation");
                true
            }
            Err(_) => false,
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
