//! HTTP surface for the automation webhook.
//!
//! Every request gets its own transport built from the credentials it
//! carries; nothing is shared between requests except the HTTP client pool.

mod routes;

pub use routes::{build_router, process_webhook};

use crate::config::{RemoteConfig, ServerConfig};
use crate::logging::Logger;
use crate::remote::{Credentials, HttpTransport, RestTransport, build_client};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

/// Builds the transport for one request's credentials.
pub trait TransportFactory: Send + Sync {
    fn connect(&self, credentials: &Credentials) -> Arc<dyn RestTransport>;
}

/// Production factory: one pooled reqwest client, one transport per request.
pub struct HttpTransportFactory {
    client: reqwest::Client,
    scheme: String,
}

impl HttpTransportFactory {
    pub fn new(config: &RemoteConfig) -> reqwest::Result<Self> {
        Ok(Self {
            client: build_client(config)?,
            scheme: config.scheme.clone(),
        })
    }
}

impl TransportFactory for HttpTransportFactory {
    fn connect(&self, credentials: &Credentials) -> Arc<dyn RestTransport> {
        Arc::new(HttpTransport::new(
            self.client.clone(),
            self.scheme.clone(),
            credentials.clone(),
        ))
    }
}

/// State shared across handlers.
#[derive(Clone)]
pub struct BridgeServer {
    transports: Arc<dyn TransportFactory>,
    logger: Logger,
}

impl BridgeServer {
    pub fn new(transports: Arc<dyn TransportFactory>, logger: Logger) -> Self {
        Self { transports, logger }
    }

    pub fn transports(&self) -> &dyn TransportFactory {
        self.transports.as_ref()
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }
}

/// Bind the listener and serve until Ctrl-C.
pub async fn start_server(state: BridgeServer, config: &ServerConfig) -> anyhow::Result<()> {
    let app = build_router(state, &config.webhook_path);

    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
    let bound_addr: SocketAddr = listener.local_addr()?;

    info!("Webhook listening on http://{}", bound_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Webhook server shutting down");
        })
        .await?;
    Ok(())
}
