//! Access to the CRM / task-tracker REST API.
//!
//! [`RestTransport`] is the raw seam (one named method call, one download);
//! [`CrmClient`] layers the named operations the pipeline needs on top of it
//! and checks response envelopes.

pub mod client;
pub mod http;
pub mod mock;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub use client::{CommentAttachment, CrmClient, EntityApi, FileInfo};
pub use http::{Credentials, HttpTransport, build_client};
pub use mock::MockTransport;

/// Failure of a single remote call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// Connection, timeout or TLS failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Non-success HTTP status without an API error body.
    #[error("HTTP status {status} from {target}")]
    Status { status: u16, target: String },

    /// The API answered with an error envelope.
    #[error("API error {code}: {description}")]
    Api { code: String, description: String },

    /// Body could not be decoded.
    #[error("invalid response: {0}")]
    Decode(String),

    /// Envelope decoded but the expected container is absent.
    #[error("{method}: response has no {container}")]
    MissingContainer {
        method: String,
        container: &'static str,
    },
}

impl RemoteError {
    pub fn missing(method: &str, container: &'static str) -> Self {
        RemoteError::MissingContainer {
            method: method.to_string(),
            container,
        }
    }
}

/// Raw REST transport. One call per named remote method.
#[async_trait]
pub trait RestTransport: Send + Sync {
    /// Invoke `method` with nested `params` and return the decoded body.
    async fn call(&self, method: &str, params: Value) -> Result<Value, RemoteError>;

    /// Fetch the bytes behind an absolute URL.
    async fn download(&self, url: &str) -> Result<Vec<u8>, RemoteError>;
}

/// Turn an API error envelope into a [`RemoteError`], if it is one.
pub fn api_error(body: &Value) -> Option<RemoteError> {
    let code = body.get("error")?;
    if code.is_null() {
        return None;
    }
    let code = code
        .as_str()
        .map(String::from)
        .unwrap_or_else(|| code.to_string());
    let description = body
        .get("error_description")
        .and_then(|d| d.as_str())
        .unwrap_or_default()
        .to_string();
    Some(RemoteError::Api { code, description })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_api_error_detection() {
        let err = api_error(&json!({"error": "NOT_FOUND", "error_description": "Not found"}));
        assert_eq!(
            err,
            Some(RemoteError::Api {
                code: "NOT_FOUND".into(),
                description: "Not found".into()
            })
        );
        assert_eq!(api_error(&json!({"result": true})), None);
        assert_eq!(api_error(&json!({"error": null, "result": 1})), None);
    }
}
