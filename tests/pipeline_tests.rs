//! Integration tests for the request pipeline.
//!
//! Each test scripts the remote portal with a `MockTransport`, runs the
//! pipeline end to end and checks the response, the calls sent and the
//! diagnostics emitted.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value, json};
use std::sync::Arc;
use task_result_bridge::bridge::{
    Bridge, BridgeResponse, MESSAGE_NO_FILES, MESSAGE_WRITE_FAILED, MESSAGE_WRITTEN,
    PipelineOutcome,
};
use task_result_bridge::logging::{LogLevel, Logger, MemorySink};
use task_result_bridge::remote::{CrmClient, MockTransport, RemoteError};
use task_result_bridge::request::WebhookRequest;

const FILE_FIELD: &str = "UF_CRM_1700000001";

/// Portal with task #42 and attached objects 1..=5 backed by files 101..=105.
/// Objects 2 and 4 cannot be resolved.
fn portal(results: Value) -> MockTransport {
    MockTransport::new()
        .respond(
            "tasks.task.get",
            json!({"result": {"task": {"id": "42", "title": "Prepare contract"}}}),
        )
        .respond("tasks.task.result.list", json!({ "result": results }))
        .on("disk.attachedObject.get", |params| {
            let id = params["id"].as_str().unwrap_or_default().to_string();
            if id == "2" || id == "4" {
                return Err(RemoteError::Api {
                    code: "ERROR_NOT_FOUND".into(),
                    description: "Attached object not found".into(),
                });
            }
            Ok(json!({"result": {"ID": id, "OBJECT_ID": format!("10{}", id)}}))
        })
        .on("disk.file.get", |params| {
            let id = params["id"].as_str().unwrap_or_default();
            Ok(json!({"result": {
                "ID": id,
                "NAME": format!("doc{}.pdf", id),
                "DOWNLOAD_URL": format!("https://files.example/{}", id)
            }}))
        })
        .serve("https://files.example/101", b"one".to_vec())
        .serve("https://files.example/102", b"two".to_vec())
        .serve("https://files.example/103", b"three".to_vec())
        .serve("https://files.example/104", b"four".to_vec())
        .serve("https://files.example/105", b"five".to_vec())
        .respond("bizproc.event.send", json!({"result": true}))
}

fn latest_with_files(files: &[&str]) -> Value {
    json!([
        {"id": "1", "createdAt": "2024-01-01T00:00:00+00:00", "text": "draft", "files": []},
        {"id": "2", "createdAt": "2024-06-01T00:00:00+00:00", "text": "Signed copy", "files": files}
    ])
}

fn request(entity_type: &str, field_code: &str, smart_process_id: Option<i64>) -> WebhookRequest {
    let mut properties = json!({
        "task_id": "42",
        "entity_type": entity_type,
        "entity_id": "7",
        "field_code": field_code,
    });
    if let Some(id) = smart_process_id {
        properties["smart_process_id"] = json!(id);
    }
    WebhookRequest::from_value(&json!({
        "auth": {"access_token": "token", "domain": "portal.example.com"},
        "properties": properties,
        "event_token": "evt|42",
    }))
    .expect("valid request")
}

async fn run(
    mock: MockTransport,
    request: WebhookRequest,
) -> (PipelineOutcome, Arc<MockTransport>, Arc<MemorySink>) {
    let mock = Arc::new(mock);
    let sink = Arc::new(MemorySink::new());
    let logger = Logger::silent().with_sink(sink.clone());
    let client = CrmClient::new(mock.clone(), logger);
    let outcome = Bridge::handle(client, request).await;
    (outcome, mock, sink)
}

fn completed(outcome: PipelineOutcome) -> BridgeResponse {
    match outcome {
        PipelineOutcome::Completed(response) => response,
        other => panic!("expected a completed request, got {:?}", other),
    }
}

fn file_data(name: &str, content: &[u8]) -> Value {
    json!({"fileData": [name, STANDARD.encode(content)]})
}

#[tokio::test]
async fn multi_value_field_keeps_existing_files_first() {
    let mock = portal(latest_with_files(&["1", "3"]))
        .respond(
            "crm.item.fields",
            json!({"result": {"fields": {FILE_FIELD: {"type": "file", "isMultiple": true}}}}),
        )
        .respond(
            "crm.deal.get",
            json!({"result": {"ID": "7", FILE_FIELD: [
                {"id": 501, "showUrl": "/show/501"},
                {"id": 502, "showUrl": "/show/502"},
                {"id": 503, "showUrl": "/show/503"}
            ]}}),
        )
        .respond("crm.deal.update", json!({"result": true}));

    let (outcome, mock, _) = run(mock, request("deal", FILE_FIELD, None)).await;
    let response = completed(outcome);

    assert!(response.success);
    assert!(response.entity_updated);
    assert_eq!(response.message, MESSAGE_WRITTEN);
    assert_eq!(response.files_count, 2);
    assert_eq!(response.files_ids, vec!["101", "103"]);
    assert_eq!(response.files_written, 2);
    assert_eq!(response.text_result, "Signed copy");

    let update = &mock.calls_to("crm.deal.update")[0];
    assert_eq!(update["id"], json!(7));
    assert_eq!(
        update["fields"][FILE_FIELD],
        json!([
            {"id": 501},
            {"id": 502},
            {"id": 503},
            file_data("doc101.pdf", b"one"),
            file_data("doc103.pdf", b"three"),
        ])
    );
    assert_eq!(mock.calls_to("crm.item.fields")[0], json!({"entityTypeId": 2}));
}

#[tokio::test]
async fn single_value_field_takes_the_first_file() {
    let mock = portal(latest_with_files(&["1", "3", "5"]))
        .respond(
            "crm.item.fields",
            json!({"result": {"fields": {"UF_CRM_1700000002": {"type": "file", "isMultiple": false}}}}),
        )
        .respond("crm.lead.update", json!({"result": true}));

    let (outcome, mock, sink) = run(mock, request("lead", "UF_CRM_1700000002", None)).await;
    let response = completed(outcome);

    assert!(response.success);
    assert_eq!(response.files_count, 3);
    assert_eq!(response.files_written, 1);
    assert!(mock.calls_to("crm.lead.get").is_empty());
    assert_eq!(
        mock.calls_to("crm.lead.update")[0]["fields"]["UF_CRM_1700000002"],
        file_data("doc101.pdf", b"one")
    );
    assert!(sink.contains("keeping the first"));
}

#[tokio::test]
async fn unresolvable_references_are_skipped() {
    let mock = portal(latest_with_files(&["1", "2", "3", "4", "5"]))
        .respond(
            "crm.item.fields",
            json!({"result": {"fields": {FILE_FIELD: {"type": "file", "multiple": "Y"}}}}),
        )
        .respond("crm.company.get", json!({"result": {"ID": "7"}}))
        .respond("crm.company.update", json!({"result": true}));

    let (outcome, mock, sink) = run(mock, request("company", FILE_FIELD, None)).await;
    let response = completed(outcome);

    assert!(response.success);
    assert_eq!(response.files_ids, vec!["101", "103", "105"]);
    assert_eq!(response.files_written, 3);
    let written = mock.calls_to("crm.company.update")[0]["fields"][FILE_FIELD].clone();
    assert_eq!(written.as_array().map(Vec::len), Some(3));
    assert_eq!(
        sink.entries()
            .iter()
            .filter(|e| e.message == "Attachment reference could not be resolved")
            .count(),
        2
    );
}

#[tokio::test]
async fn generic_entity_matches_schema_by_converted_spelling() {
    let mock = portal(latest_with_files(&["1"]))
        .respond(
            "crm.item.fields",
            json!({"result": {"fields": {"ufCrm_5_1700000003": {"type": "file", "isMultiple": "Y"}}}}),
        )
        .respond(
            "crm.item.get",
            json!({"result": {"item": {"id": 7, "ufCrm_5_1700000003": [{"id": 900}]}}}),
        )
        .respond("crm.item.update", json!({"result": {"item": {"id": 7}}}));

    let (outcome, mock, _) = run(mock, request("smart_process", "UF_CRM_5_1700000003", Some(180))).await;
    let response = completed(outcome);

    assert!(response.success);
    assert_eq!(mock.calls_to("crm.item.fields")[0], json!({"entityTypeId": 180}));
    let update = &mock.calls_to("crm.item.update")[0];
    assert_eq!(update["entityTypeId"], json!(180));
    assert_eq!(
        update["fields"]["ufCrm_5_1700000003"],
        json!([{"id": 900}, ["doc101.pdf", STANDARD.encode(b"one")]])
    );
    assert!(update["fields"].get("UF_CRM_5_1700000003").is_none());
}

#[tokio::test]
async fn fixed_kind_writes_the_callers_spelling() {
    let mock = portal(latest_with_files(&["1"]))
        .respond(
            "crm.item.fields",
            json!({"result": {"fields": {"ufCrm_1700000004": {"type": "file"}}}}),
        )
        .respond("crm.contact.update", json!({"result": true}));

    let (outcome, mock, _) = run(mock, request("contact", "UF_CRM_1700000004", None)).await;
    assert!(completed(outcome).success);

    let fields = &mock.calls_to("crm.contact.update")[0]["fields"];
    assert!(fields.get("UF_CRM_1700000004").is_some());
    assert!(fields.get("ufCrm_1700000004").is_none());
}

#[tokio::test]
async fn generic_entity_without_sub_type_fails_before_writing() {
    let mock = portal(latest_with_files(&["1"]));

    let (outcome, mock, sink) = run(mock, request("smart_process", FILE_FIELD, None)).await;
    let response = completed(outcome);

    assert!(!response.success);
    assert!(!response.entity_updated);
    assert_eq!(response.message, MESSAGE_WRITE_FAILED);
    let methods = mock.methods();
    assert!(!methods.iter().any(|m| m == "crm.item.fields"));
    assert!(!methods.iter().any(|m| m == "crm.item.update"));
    assert!(sink.contains("Field resolution failed"));

    let report = &mock.calls_to("bizproc.event.send")[0];
    assert_eq!(report["return_values"]["success"], json!(false));
    assert_eq!(report["return_values"]["message"], json!(MESSAGE_WRITE_FAILED));
}

#[tokio::test]
async fn unknown_field_fails_the_write_but_still_reports() {
    let mock = portal(latest_with_files(&["1"])).respond(
        "crm.item.fields",
        json!({"result": {"fields": {"TITLE": {"type": "string"}}}}),
    );

    let (outcome, mock, sink) = run(mock, request("deal", FILE_FIELD, None)).await;
    let response = completed(outcome);

    assert!(!response.success);
    assert_eq!(response.files_count, 1);
    assert!(mock.calls_to("crm.deal.update").is_empty());
    assert_eq!(mock.calls_to("bizproc.event.send").len(), 1);
    assert!(!sink.at_least(LogLevel::Error).is_empty());
}

#[tokio::test]
async fn unsupported_entity_kind_fails_the_write() {
    let mock = portal(latest_with_files(&["1"]));

    let (outcome, mock, _) = run(mock, request("invoice", FILE_FIELD, None)).await;
    let response = completed(outcome);

    assert!(!response.success);
    assert!(mock.calls_to("crm.item.fields").is_empty());
    assert_eq!(mock.calls_to("bizproc.event.send").len(), 1);
}

#[tokio::test]
async fn missing_task_is_not_found_and_reported() {
    let mock = MockTransport::new()
        .respond("tasks.task.get", json!({"result": {}}))
        .respond("bizproc.event.send", json!({"result": true}));

    let (outcome, mock, _) = run(mock, request("deal", FILE_FIELD, None)).await;

    assert_eq!(outcome.status(), 404);
    assert_eq!(outcome.body(), json!({"error": "Task #42 not found"}));
    assert_eq!(
        mock.calls_to("bizproc.event.send")[0],
        json!({
            "event_token": "evt|42",
            "return_values": {
                "success": false,
                "files_count": 0,
                "files_ids": "",
                "text_result": "",
                "message": "Task #42 not found"
            }
        })
    );
    assert!(mock.calls_to("tasks.task.result.list").is_empty());
}

#[tokio::test]
async fn no_files_counts_as_success() {
    let mock = portal(json!([
        {"id": "9", "createdAt": "2024-03-01 10:00:00", "text": "Done, nothing attached", "files": []}
    ]));

    let (outcome, mock, _) = run(mock, request("deal", FILE_FIELD, None)).await;
    let response = completed(outcome);

    assert!(response.success);
    assert!(response.entity_updated);
    assert_eq!(response.message, MESSAGE_NO_FILES);
    assert_eq!(response.files_count, 0);
    assert_eq!(response.text_result, "Done, nothing attached");
    assert!(mock.calls_to("crm.item.fields").is_empty());

    let values = &mock.calls_to("bizproc.event.send")[0]["return_values"];
    assert_eq!(values["files_ids"], json!(""));
    assert_eq!(values["text_result"], json!("Done, nothing attached"));
}

#[tokio::test]
async fn failed_result_listing_is_treated_as_empty() {
    let mock = portal(json!([])).fail("tasks.task.result.list");

    let (outcome, _, sink) = run(mock, request("deal", FILE_FIELD, None)).await;
    let response = completed(outcome);

    assert!(response.success);
    assert_eq!(response.files_count, 0);
    assert!(sink.contains("Task results unavailable"));
}

#[tokio::test]
async fn comment_attachments_take_precedence() {
    let mock = portal(json!([{
        "id": "3",
        "createdAt": "2024-06-01T00:00:00Z",
        "files": ["71", "72"],
        "commentId": "555"
    }]))
    .respond(
        "task.commentitem.get",
        json!({"result": {"ATTACHED_OBJECTS": {
            "71": {"ATTACHMENT_ID": "71", "FILE_ID": "102"},
            "72": {"ATTACHMENT_ID": "72", "FILE_ID": "104"}
        }}}),
    )
    .respond(
        "crm.item.fields",
        json!({"result": {"fields": {FILE_FIELD: {"type": "file", "isMultiple": 1}}}}),
    )
    .respond("crm.deal.get", json!({"result": {"ID": "7", FILE_FIELD: false}}))
    .respond("crm.deal.update", json!({"result": true}));

    let (outcome, mock, _) = run(mock, request("deal", FILE_FIELD, None)).await;
    let response = completed(outcome);

    assert_eq!(response.files_ids, vec!["102", "104"]);
    assert!(mock.calls_to("disk.attachedObject.get").is_empty());
    assert_eq!(
        mock.calls_to("task.commentitem.get")[0],
        json!({"TASKID": 42, "ITEMID": "555"})
    );
    assert_eq!(
        mock.calls_to("crm.deal.update")[0]["fields"][FILE_FIELD],
        json!([file_data("doc102.pdf", b"two"), file_data("doc104.pdf", b"four")])
    );
}

#[tokio::test]
async fn failed_download_drops_only_that_file() {
    let mock = portal(latest_with_files(&["1", "3"]))
        .fail_download("https://files.example/103")
        .respond(
            "crm.item.fields",
            json!({"result": {"fields": {FILE_FIELD: {"type": "file", "isMultiple": true}}}}),
        )
        .respond("crm.deal.get", json!({"result": {"ID": "7"}}))
        .respond("crm.deal.update", json!({"result": true}));

    let (outcome, mock, sink) = run(mock, request("deal", FILE_FIELD, None)).await;
    let response = completed(outcome);

    assert!(response.success);
    assert_eq!(response.files_count, 2);
    assert_eq!(response.files_written, 1);
    assert_eq!(
        mock.calls_to("crm.deal.update")[0]["fields"][FILE_FIELD],
        json!([file_data("doc101.pdf", b"one")])
    );
    assert!(sink.contains("File preparation failed"));
}

#[tokio::test]
async fn unreadable_current_value_aborts_the_merge() {
    let mock = portal(latest_with_files(&["1"]))
        .respond(
            "crm.item.fields",
            json!({"result": {"fields": {FILE_FIELD: {"type": "file", "isMultiple": true}}}}),
        )
        .fail("crm.deal.get");

    let (outcome, mock, _) = run(mock, request("deal", FILE_FIELD, None)).await;

    assert!(!completed(outcome).success);
    assert!(mock.calls_to("crm.deal.update").is_empty());
}

#[tokio::test]
async fn rejected_update_is_a_failed_write() {
    let mock = portal(latest_with_files(&["1"]))
        .respond(
            "crm.item.fields",
            json!({"result": {"fields": {FILE_FIELD: {"type": "file"}}}}),
        )
        .on("crm.deal.update", |_| {
            Err(RemoteError::Api {
                code: "ACCESS_DENIED".into(),
                description: "Access denied".into(),
            })
        });

    let (outcome, _, _) = run(mock, request("deal", FILE_FIELD, None)).await;
    let response = completed(outcome);

    assert!(!response.success);
    assert_eq!(response.files_written, 0);
    assert_eq!(response.message, MESSAGE_WRITE_FAILED);
}

#[tokio::test]
async fn missing_event_token_skips_the_report() {
    let mut request = request("deal", FILE_FIELD, None);
    request.event_token = None;
    let mock = portal(json!([]));

    let (outcome, mock, sink) = run(mock, request).await;

    assert!(completed(outcome).success);
    assert!(mock.calls_to("bizproc.event.send").is_empty());
    assert!(sink.contains("No event_token"));
}

#[tokio::test]
async fn panic_becomes_internal_error_and_is_reported() {
    let mock = portal(json!([])).on("tasks.task.result.list", |_| panic!("results exploded"));

    let (outcome, mock, _) = run(mock, request("deal", FILE_FIELD, None)).await;

    assert_eq!(outcome.status(), 500);
    assert_eq!(
        outcome.body(),
        json!({"error": "Internal server error: results exploded"})
    );
    let values = &mock.calls_to("bizproc.event.send")[0]["return_values"];
    assert_eq!(values["success"], json!(false));
    assert_eq!(values["message"], json!("Internal server error: results exploded"));
}
