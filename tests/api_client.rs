use indicatif::ProgressBar;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use scriptgen::api::{
    ApiClient, ApiError, AuthContext, ExportFormat, GenerationRequest, JobService, PollResult,
    ScriptQuery, ScriptStatus,
};
use scriptgen::workflow::{GenerationController, PollPolicy, WorkflowState};
use wiremock::matchers::{body_json, body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer, auth: Arc<AuthContext>) -> ApiClient {
    ApiClient::new(
        format!("{}/api/v1/", server.uri()),
        Duration::from_secs(5),
        auth,
    )
    .expect("client builds")
}

fn logged_in() -> Arc<AuthContext> {
    Arc::new(AuthContext::in_memory(Some("tok".to_string())))
}

fn script_record(id: u64) -> serde_json::Value {
    json!({
        "id": id,
        "user_id": 1,
        "video_url": "https://www.youtube.com/watch?v=abc123",
        "video_title": "Intro to Rust",
        "video_duration": 600,
        "status": "completed",
        "created_at": "2024-05-01T09:00:00.000123",
        "completed_at": null,
        "transcript_text": "raw words",
        "formatted_script": "[00:00] Formatted words",
        "error_message": null
    })
}

#[tokio::test]
async fn submit_sends_url_and_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/transcribe/"))
        .and(header("authorization", "Bearer tok"))
        .and(body_json(json!({ "video_url": "https://youtu.be/abc123" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "task_id": "t1",
            "status": "processing",
            "progress": 0,
            "message": "Video processing started",
            "script_id": null
        })))
        .expect(1)
        .mount(&server)
        .await;

    let handle = client(&server, logged_in())
        .submit(&GenerationRequest::new("https://youtu.be/abc123"))
        .await
        .expect("submit ok");

    assert_eq!(handle.task_id, "t1");
    assert_eq!(handle.script_id, None);
}

#[tokio::test]
async fn requests_without_token_carry_no_authorization() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/transcribe/status/t1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "task_id": "t1", "status": "pending", "progress": 0, "message": "Task is waiting to be processed"
        })))
        .mount(&server)
        .await;

    let result = client(&server, Arc::new(AuthContext::in_memory(None)))
        .poll_status("t1")
        .await
        .expect("poll ok");
    assert_eq!(result.status(), "processing");

    let requests = server.received_requests().await.expect("recording enabled");
    assert!(requests[0].headers.get("authorization").is_none());
}

#[tokio::test]
async fn poll_maps_completed_status_with_numeric_id() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/transcribe/status/t1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "task_id": "t1",
            "status": "completed",
            "progress": 100,
            "message": "Script generated successfully",
            "script_id": 42
        })))
        .mount(&server)
        .await;

    let result = client(&server, logged_in()).poll_status("t1").await.unwrap();
    match result {
        PollResult::Completed(update) => {
            assert_eq!(update.progress, 100);
            assert_eq!(update.script_id.as_deref(), Some("42"));
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn unknown_status_is_a_protocol_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/transcribe/status/t1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "task_id": "t1", "status": "RETRY", "progress": 0, "message": ""
        })))
        .mount(&server)
        .await;

    let err = client(&server, logged_in()).poll_status("t1").await.unwrap_err();
    assert!(matches!(err, ApiError::Protocol(_)));
}

#[tokio::test]
async fn unauthorized_clears_stored_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/scripts/7"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "detail": "Could not validate credentials" })))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let token_path = dir.path().join("token");
    let auth = Arc::new(AuthContext::load(&token_path).unwrap());
    auth.set("expired").unwrap();

    let err = client(&server, auth.clone()).fetch_artifact("7").await.unwrap_err();

    assert!(matches!(err, ApiError::Unauthorized { .. }));
    assert_eq!(auth.get(), None);
    assert!(!token_path.exists());
}

#[tokio::test]
async fn error_detail_becomes_user_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/transcribe/"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "detail": "Daily limit reached. Upgrade to Pro for unlimited videos."
        })))
        .mount(&server)
        .await;

    let err = client(&server, logged_in())
        .submit(&GenerationRequest::new("https://youtu.be/abc123"))
        .await
        .unwrap_err();

    match &err {
        ApiError::Status { status, detail } => {
            assert_eq!(*status, 429);
            assert_eq!(
                detail.as_deref(),
                Some("Daily limit reached. Upgrade to Pro for unlimited videos.")
            );
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(err.user_message().is_some());
}

#[tokio::test]
async fn error_without_json_body_has_no_detail() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/scripts/7"))
        .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
        .mount(&server)
        .await;

    let err = client(&server, logged_in()).fetch_artifact("7").await.unwrap_err();
    assert!(matches!(err, ApiError::Status { status: 502, detail: None }));
}

#[tokio::test]
async fn fetch_artifact_parses_record() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/scripts/7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(script_record(7)))
        .mount(&server)
        .await;

    let artifact = client(&server, logged_in()).fetch_artifact("7").await.unwrap();

    assert_eq!(artifact.id, "7");
    assert_eq!(artifact.title(), "Intro to Rust");
    assert_eq!(artifact.video_duration, Some(600));
    assert_eq!(artifact.body(), Some("[00:00] Formatted words"));
}

#[tokio::test]
async fn download_uses_server_file_name() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/scripts/7/download"))
        .and(query_param("format", "excel"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-disposition", "attachment; filename=7_Intro_to_Rust.xlsx")
                .set_body_bytes(vec![0x50, 0x4b, 0x03, 0x04]),
        )
        .mount(&server)
        .await;

    let download = client(&server, logged_in())
        .download("7", ExportFormat::Excel, &ProgressBar::hidden())
        .await
        .unwrap();

    assert_eq!(download.filename, "7_Intro_to_Rust.xlsx");
    assert_eq!(download.bytes, vec![0x50, 0x4b, 0x03, 0x04]);
}

#[tokio::test]
async fn download_falls_back_to_default_name() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/scripts/7/download"))
        .and(query_param("format", "txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
        .mount(&server)
        .await;

    let download = client(&server, logged_in())
        .download("7", ExportFormat::Txt, &ProgressBar::hidden())
        .await
        .unwrap();

    assert_eq!(download.filename, "script_7.txt");
    assert_eq!(download.bytes, b"hello");
}

#[tokio::test]
async fn login_stores_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/users/login"))
        .and(body_string_contains("username=ada%40example.com"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "fresh", "token_type": "bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let auth = Arc::new(AuthContext::in_memory(None));
    client(&server, auth.clone())
        .login("ada@example.com", "hunter2")
        .await
        .unwrap();

    assert_eq!(auth.get().as_deref(), Some("fresh"));
}

#[tokio::test]
async fn rejected_login_reports_service_detail() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/users/login"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "detail": "Incorrect email or password"
        })))
        .mount(&server)
        .await;

    let auth = Arc::new(AuthContext::in_memory(None));
    let err = client(&server, auth.clone())
        .login("ada@example.com", "wrong")
        .await
        .unwrap_err();

    match &err {
        ApiError::Unauthorized { detail } => {
            assert_eq!(detail.as_deref(), Some("Incorrect email or password"));
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(err.to_string(), "Incorrect email or password");
    assert_eq!(auth.get(), None);
}

#[tokio::test]
async fn list_scripts_sends_paging_and_filters() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/scripts/"))
        .and(query_param("skip", "10"))
        .and(query_param("limit", "10"))
        .and(query_param("status", "completed"))
        .and(query_param("search", "rust"))
        .and(header("authorization", "Bearer tok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "scripts": [script_record(7), script_record(8)],
            "total": 12,
            "page": 2,
            "pages": 2
        })))
        .expect(1)
        .mount(&server)
        .await;

    let query = ScriptQuery {
        page: 2,
        search: Some("rust".to_string()),
        status: Some(ScriptStatus::Completed),
        ..ScriptQuery::default()
    };
    let page = client(&server, logged_in()).list_scripts(&query).await.unwrap();

    assert_eq!(page.total, 12);
    assert_eq!(page.page, 2);
    let ids: Vec<&str> = page.scripts.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, ["7", "8"]);
}

#[tokio::test]
async fn regenerate_returns_new_job() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/scripts/7/regenerate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": "Script queued for regeneration", "task_id": "t9"
        })))
        .mount(&server)
        .await;

    let handle = client(&server, logged_in()).regenerate("7").await.unwrap();
    assert_eq!(handle.task_id, "t9");
    assert_eq!(handle.script_id.as_deref(), Some("7"));
}

#[tokio::test]
async fn controller_runs_a_generation_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/transcribe/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "task_id": "t1", "status": "processing", "progress": 0, "message": "Video processing started"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/transcribe/status/t1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "task_id": "t1", "status": "processing", "progress": 40, "message": "Transcribing"
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/transcribe/status/t1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "task_id": "t1", "status": "completed", "progress": 100,
            "message": "Script generated successfully", "script_id": 7
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/scripts/7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(script_record(7)))
        .expect(1)
        .mount(&server)
        .await;

    let policy = PollPolicy {
        interval: Duration::from_millis(25),
        ..PollPolicy::default()
    };
    let controller = GenerationController::new(Arc::new(client(&server, logged_in())), policy);

    controller
        .submit("https://www.youtube.com/watch?v=abc123")
        .await
        .unwrap();

    let outcome = tokio::time::timeout(Duration::from_secs(5), controller.wait_for_outcome())
        .await
        .expect("generation settles");

    assert_eq!(outcome.state, WorkflowState::Completed);
    assert_eq!(outcome.artifact.unwrap().id, "7");
}
