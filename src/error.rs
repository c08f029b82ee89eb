//! Structured error types for the bridge pipeline.

use serde::Serialize;
use std::fmt;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (4xx-like)
    MissingRequiredField,

    // Not found errors
    TaskNotFound,
    FieldNotFound,

    // Business-logic errors
    UnsupportedEntityType,
    MissingSubTypeId,
    SchemaUnavailable,
    NoFilesResolved,
    UpdateRejected,

    // Remote errors
    RemoteError,
}

/// Structured error for pipeline steps and responses.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BridgeError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl BridgeError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            field: None,
            details: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    // Convenience constructors

    pub fn missing_fields(fields: &[&str]) -> Self {
        Self::new(
            ErrorCode::MissingRequiredField,
            format!("Required fields: {}", fields.join(", ")),
        )
    }

    pub fn task_not_found(task_id: i64) -> Self {
        Self::new(ErrorCode::TaskNotFound, format!("Task #{} not found", task_id))
    }

    pub fn field_not_found(field_code: &str, available: &[String]) -> Self {
        Self::new(
            ErrorCode::FieldNotFound,
            format!("Field not found: {}", field_code),
        )
        .with_field(field_code)
        .with_details(format!("available: {}", available.join(", ")))
    }

    pub fn unsupported_entity(entity_type: &str) -> Self {
        Self::new(
            ErrorCode::UnsupportedEntityType,
            format!("Unsupported entity type: {}", entity_type),
        )
        .with_field("entity_type")
    }

    pub fn missing_sub_type() -> Self {
        Self::new(
            ErrorCode::MissingSubTypeId,
            "smart_process_id is required for smart_process entities",
        )
        .with_field("smart_process_id")
    }

    pub fn schema_unavailable(reason: impl Into<String>) -> Self {
        Self::new(ErrorCode::SchemaUnavailable, reason)
    }

    pub fn no_files() -> Self {
        Self::new(ErrorCode::NoFilesResolved, "No files left to write after preparation")
    }

    pub fn update_rejected(details: impl Into<String>) -> Self {
        Self::new(ErrorCode::UpdateRejected, "Entity update was not accepted")
            .with_details(details)
    }

    pub fn remote(err: impl fmt::Display) -> Self {
        Self::new(ErrorCode::RemoteError, err.to_string())
    }
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for BridgeError {}

impl From<crate::remote::RemoteError> for BridgeError {
    fn from(err: crate::remote::RemoteError) -> Self {
        BridgeError::remote(err)
    }
}

/// Result type for pipeline steps.
pub type BridgeResult<T> = std::result::Result<T, BridgeError>;
