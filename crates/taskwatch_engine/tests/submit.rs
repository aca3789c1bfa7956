use pretty_assertions::assert_eq;
use serde_json::json;
use taskwatch_core::TaskId;
use taskwatch_engine::{FailureKind, QueryRequest, ReqwestTransport, Submission, TransportSettings};
use wiremock::matchers::{body_json, body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn transport_for(server: &MockServer) -> ReqwestTransport {
    ReqwestTransport::new(TransportSettings {
        base_url: server.uri(),
        ..TransportSettings::default()
    })
    .unwrap()
}

#[tokio::test]
async fn chat_message_is_sent_as_form_and_returns_task() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_string_contains("message=export+DATA-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "response": "Working on it",
            "task_id": "c0ffee"
        })))
        .mount(&server)
        .await;

    let submission = transport_for(&server)
        .submit_chat("export DATA-1")
        .await
        .expect("chat ok");
    assert_eq!(
        submission,
        Submission {
            success: true,
            message: "Working on it".into(),
            task_id: Some(TaskId::from("c0ffee")),
        }
    );
}

#[tokio::test]
async fn jira_status_without_task_has_no_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/check-jira-status"))
        .and(body_json(json!({"jira_ticket": "DATA-2"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "message": "Ticket is not approved",
            "task_id": null
        })))
        .mount(&server)
        .await;

    let submission = transport_for(&server)
        .check_jira_status("DATA-2")
        .await
        .unwrap();
    assert!(!submission.success);
    assert_eq!(submission.message, "Ticket is not approved");
    assert_eq!(submission.task_id, None);
}

#[tokio::test]
async fn query_submission_posts_all_fields() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/submit-query"))
        .and(body_json(json!({
            "jira_ticket": "DATA-3",
            "approver": "ops-lead",
            "query_description": "monthly totals"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "message": "Query submitted",
            "task_id": "t-3"
        })))
        .mount(&server)
        .await;

    let request = QueryRequest {
        jira_ticket: "DATA-3".into(),
        approver: "ops-lead".into(),
        query_description: "monthly totals".into(),
    };
    let submission = transport_for(&server).submit_query(&request).await.unwrap();
    assert_eq!(submission.task_id, Some(TaskId::from("t-3")));
}

#[tokio::test]
async fn validation_errors_surface_as_http_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/submit-query"))
        .respond_with(ResponseTemplate::new(422))
        .mount(&server)
        .await;

    let request = QueryRequest {
        jira_ticket: String::new(),
        approver: String::new(),
        query_description: String::new(),
    };
    let err = transport_for(&server)
        .submit_query(&request)
        .await
        .unwrap_err();
    assert_eq!(err.kind, FailureKind::HttpStatus(422));
}

#[tokio::test]
async fn refusal_with_error_status_keeps_server_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/submit-query"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "success": false,
            "message": "查询失败: ticket locked"
        })))
        .mount(&server)
        .await;

    let request = QueryRequest {
        jira_ticket: "DATA-5".into(),
        approver: "ops-lead".into(),
        query_description: "locked ticket".into(),
    };
    let submission = transport_for(&server)
        .submit_query(&request)
        .await
        .expect("refusal is an answer");
    assert_eq!(
        submission,
        Submission {
            success: false,
            message: "查询失败: ticket locked".into(),
            task_id: None,
        }
    );
}

#[tokio::test]
async fn error_status_with_unrelated_json_stays_http_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(
            ResponseTemplate::new(422).set_body_json(json!({"detail": [{"msg": "field required"}]})),
        )
        .mount(&server)
        .await;

    let err = transport_for(&server).submit_chat("").await.unwrap_err();
    assert_eq!(err.kind, FailureKind::HttpStatus(422));
}

#[test]
fn download_url_is_absolute_and_escaped() {
    let transport = ReqwestTransport::new(TransportSettings {
        base_url: "http://reports.local:8000".into(),
        ..TransportSettings::default()
    })
    .unwrap();
    let url = transport.download_url("DATA 4.xlsx").unwrap();
    assert_eq!(url.as_str(), "http://reports.local:8000/api/download/DATA%204.xlsx");
}
