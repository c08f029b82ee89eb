//! Scripted in-memory transport.
//!
//! Routes are registered per method name; each handler sees the call params
//! and returns the body (or error) to hand back. Every call is recorded so
//! tests can assert on what was sent.

use super::{RemoteError, RestTransport};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

type Handler = Box<dyn Fn(&Value) -> Result<Value, RemoteError> + Send + Sync>;

#[derive(Default)]
pub struct MockTransport {
    routes: HashMap<String, Handler>,
    downloads: HashMap<String, Result<Vec<u8>, RemoteError>>,
    calls: Mutex<Vec<(String, Value)>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route `method` to a handler computing the response from the params.
    pub fn on<F>(mut self, method: &str, handler: F) -> Self
    where
        F: Fn(&Value) -> Result<Value, RemoteError> + Send + Sync + 'static,
    {
        self.routes.insert(method.to_string(), Box::new(handler));
        self
    }

    /// Route `method` to a fixed response body.
    pub fn respond(self, method: &str, body: Value) -> Self {
        self.on(method, move |_| Ok(body.clone()))
    }

    /// Route `method` to a transport failure.
    pub fn fail(self, method: &str) -> Self {
        let message = format!("{} unavailable", method);
        self.on(method, move |_| Err(RemoteError::Transport(message.clone())))
    }

    /// Serve `content` for `url`.
    pub fn serve(mut self, url: &str, content: impl Into<Vec<u8>>) -> Self {
        self.downloads.insert(url.to_string(), Ok(content.into()));
        self
    }

    /// Fail downloads of `url`.
    pub fn fail_download(mut self, url: &str) -> Self {
        self.downloads.insert(
            url.to_string(),
            Err(RemoteError::Transport(format!("{} unreachable", url))),
        );
        self
    }

    /// Every recorded `(method, params)` pair, in call order.
    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Method names in call order.
    pub fn methods(&self) -> Vec<String> {
        self.calls().into_iter().map(|(m, _)| m).collect()
    }

    /// Params of every call to `method`.
    pub fn calls_to(&self, method: &str) -> Vec<Value> {
        self.calls()
            .into_iter()
            .filter(|(m, _)| m == method)
            .map(|(_, p)| p)
            .collect()
    }

    fn record(&self, method: &str, params: &Value) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((method.to_string(), params.clone()));
        }
    }
}

#[async_trait]
impl RestTransport for MockTransport {
    async fn call(&self, method: &str, params: Value) -> Result<Value, RemoteError> {
        self.record(method, &params);
        match self.routes.get(method) {
            Some(handler) => handler(&params),
            None => Err(RemoteError::Transport(format!("no route for {}", method))),
        }
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, RemoteError> {
        self.record("download", &Value::String(url.to_string()));
        self.downloads
            .get(url)
            .cloned()
            .unwrap_or_else(|| Err(RemoteError::Status {
                status: 404,
                target: url.to_string(),
            }))
    }
}
