//! Integration tests for the webhook surface: body decoding, status codes
//! and per-request transports.

use axum::http::StatusCode;
use serde_json::json;
use std::sync::Arc;
use task_result_bridge::logging::{Logger, MemorySink};
use task_result_bridge::remote::{Credentials, MockTransport, RestTransport};
use task_result_bridge::server::{BridgeServer, TransportFactory, process_webhook};

struct Shared(Arc<MockTransport>);

impl TransportFactory for Shared {
    fn connect(&self, _credentials: &Credentials) -> Arc<dyn RestTransport> {
        self.0.clone()
    }
}

fn server(mock: MockTransport) -> (BridgeServer, Arc<MockTransport>, Arc<MemorySink>) {
    let mock = Arc::new(mock);
    let sink = Arc::new(MemorySink::new());
    let state = BridgeServer::new(
        Arc::new(Shared(mock.clone())),
        Logger::silent().with_sink(sink.clone()),
    );
    (state, mock, sink)
}

fn portal() -> MockTransport {
    MockTransport::new()
        .respond(
            "tasks.task.get",
            json!({"result": {"task": {"id": "42", "title": "Collect signatures"}}}),
        )
        .respond(
            "tasks.task.result.list",
            json!({"result": [{"id": "5", "createdAt": "2024-06-01T09:30:00+03:00", "text": "ok", "files": ["n301"]}]}),
        )
        .respond(
            "disk.file.get",
            json!({"result": {"NAME": "scan.png", "DOWNLOAD_URL": "https://files.example/301"}}),
        )
        .serve("https://files.example/301", b"PNG".to_vec())
        .respond(
            "crm.item.fields",
            json!({"result": {"fields": {"UF_CRM_77": {"type": "file", "isMultiple": false}}}}),
        )
        .respond("crm.deal.update", json!({"result": true}))
        .respond("bizproc.event.send", json!({"result": true}))
}

#[tokio::test]
async fn form_encoded_automation_call_runs_the_pipeline() {
    let (state, mock, _) = server(portal());
    let body = "event_token=evt%7C9\
                &auth%5Baccess_token%5D=tok&auth%5Bdomain%5D=portal.example.com\
                &properties%5Btask_id%5D=42&properties%5Bentity_type%5D=deal\
                &properties%5Bentity_id%5D=7&properties%5Bfield_code%5D=UF_CRM_77";

    let (status, response) = process_webhook(&state, body).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        response,
        json!({
            "success": true,
            "message": "Files successfully written to entity",
            "files_count": 1,
            "files_ids": ["301"],
            "files_written": 1,
            "text_result": "ok",
            "entity_updated": true
        })
    );
    assert!(mock.calls_to("disk.attachedObject.get").is_empty());
    assert_eq!(
        mock.calls_to("bizproc.event.send")[0]["return_values"]["files_ids"],
        json!("301")
    );
}

#[tokio::test]
async fn json_call_without_entity_id_is_a_bad_request() {
    let (state, mock, _) = server(portal());
    let body = json!({
        "auth": {"access_token": "tok", "domain": "portal.example.com"},
        "properties": {"task_id": 42, "entity_type": "deal", "field_code": "UF_CRM_77"}
    });

    let (status, response) = process_webhook(&state, &body.to_string()).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        response["error"],
        json!("Required fields: access_token, domain, task_id, entity_type, entity_id, field_code")
    );
    assert!(mock.calls().is_empty());
}

#[tokio::test]
async fn unknown_task_is_a_not_found() {
    let (state, _, sink) = server(MockTransport::new().respond(
        "tasks.task.get",
        json!({"error": "ERROR_CORE", "error_description": "Task not found"}),
    ));
    let body = json!({
        "auth": {"access_token": "tok", "domain": "portal.example.com"},
        "properties": {"task_id": 404, "entity_type": "deal", "entity_id": 1, "field_code": "UF_CRM_77"}
    });

    let (status, response) = process_webhook(&state, &body.to_string()).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(response, json!({"error": "Task #404 not found"}));
    assert!(sink.contains("Task #404 not found"));
}
