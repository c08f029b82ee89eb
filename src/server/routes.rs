//! Route handlers.

use super::BridgeServer;
use crate::bridge::Bridge;
use crate::logging::LogLevel;
use crate::remote::CrmClient;
use crate::request::WebhookRequest;
use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
};
use serde_json::{Value, json};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Health check response.
#[derive(serde::Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn webhook(State(state): State<BridgeServer>, body: Bytes) -> impl IntoResponse {
    let body = String::from_utf8_lossy(&body);
    let (status, body) = process_webhook(&state, &body).await;
    (status, Json(body))
}

/// Handle one raw webhook body and produce the status and JSON body to send.
pub async fn process_webhook(state: &BridgeServer, body: &str) -> (StatusCode, Value) {
    let logger = state.logger();
    logger.log_with_data(
        LogLevel::Debug,
        "Incoming request",
        json!({ "bytes": body.len() }),
    );

    let request = match WebhookRequest::parse(body) {
        Ok(request) => request,
        Err(err) => {
            logger.log_with_data(LogLevel::Error, "Rejected request", json!(err));
            return (StatusCode::BAD_REQUEST, json!({ "error": err.message }));
        }
    };
    logger.log_with_data(
        LogLevel::Info,
        "Request accepted",
        json!({
            "domain": request.credentials.domain,
            "task_id": request.task_id,
            "entity_type": request.entity_type,
            "entity_id": request.entity_id,
            "field_code": request.field_code,
            "smart_process_id": request.smart_process_id,
        }),
    );

    let transport = state.transports().connect(&request.credentials);
    let client = CrmClient::new(transport, logger.clone());
    let outcome = Bridge::handle(client, request).await;

    let status =
        StatusCode::from_u16(outcome.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, outcome.body())
}

/// Build the router. The webhook answers on `/` and on `webhook_path`.
pub fn build_router(state: BridgeServer, webhook_path: &str) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let webhook_path = format!("/{}", webhook_path.trim_start_matches('/'));
    let mut router = Router::new()
        .route("/", post(webhook))
        .route("/api/health", get(health));
    if webhook_path != "/" && webhook_path != "/api/health" {
        router = router.route(&webhook_path, post(webhook));
    }

    router
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
