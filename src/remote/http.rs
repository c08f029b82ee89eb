//! reqwest-backed REST transport.

use super::{RemoteError, RestTransport, api_error};
use crate::config::RemoteConfig;
use crate::form::build_query;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Pre-issued credentials carried by the inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_token: String,
    pub domain: String,
}

/// Transport failure without the request URL, which carries the access token.
fn transport_error(err: reqwest::Error) -> RemoteError {
    RemoteError::Transport(err.without_url().to_string())
}

/// Build the shared HTTP client from configuration.
///
/// Every call gets the configured timeout; there are no retries.
pub fn build_client(config: &RemoteConfig) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .danger_accept_invalid_certs(config.accept_invalid_certs)
        .build()
}

/// Transport that posts form-encoded calls to `<scheme>://<domain>/rest/<method>`.
#[derive(Clone)]
pub struct HttpTransport {
    inner: reqwest::Client,
    scheme: String,
    credentials: Credentials,
}

impl HttpTransport {
    pub fn new(inner: reqwest::Client, scheme: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            inner,
            scheme: scheme.into(),
            credentials,
        }
    }

    /// Endpoint URL for a method, with the access token as `auth`.
    pub fn endpoint(&self, method: &str) -> String {
        format!(
            "{}://{}/rest/{}?auth={}",
            self.scheme,
            self.credentials.domain.trim_end_matches('/'),
            method,
            urlencoding::encode(&self.credentials.access_token)
        )
    }
}

#[async_trait]
impl RestTransport for HttpTransport {
    async fn call(&self, method: &str, params: Value) -> Result<Value, RemoteError> {
        let url = self.endpoint(method);
        debug!(method = %method, "REST call");

        let response = self
            .inner
            .post(&url)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(build_query(&params))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(transport_error)?;

        match serde_json::from_str::<Value>(&text) {
            Ok(body) => {
                if let Some(err) = api_error(&body) {
                    return Err(err);
                }
                if !status.is_success() {
                    return Err(RemoteError::Status {
                        status: status.as_u16(),
                        target: method.to_string(),
                    });
                }
                Ok(body)
            }
            Err(_) if !status.is_success() => Err(RemoteError::Status {
                status: status.as_u16(),
                target: method.to_string(),
            }),
            Err(e) => Err(RemoteError::Decode(e.to_string())),
        }
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, RemoteError> {
        let host = reqwest::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(String::from))
            .unwrap_or_default();
        debug!(host = %host, "Downloading file");

        let response = self
            .inner
            .get(url)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(RemoteError::Status {
                status: response.status().as_u16(),
                target: "download".to_string(),
            });
        }

        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(transport_error)
    }
}
