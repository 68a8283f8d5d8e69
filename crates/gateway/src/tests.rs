//! Router tests driving the full middleware stack

use super::*;
use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, HeaderMap, Method, Request, StatusCode},
};
use serde_json::{json, Value};
use std::time::Duration;
use synthesis_common::{
    llm::{LlmBackend, MockBackend},
    tools::{SearchHit, WebSearch},
};
use tower::ServiceExt;

const BOUNDARY: &str = "synthesis-test-boundary";

struct StubSearch;

#[async_trait]
impl WebSearch for StubSearch {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        Ok(vec![SearchHit {
            title: format!("About {}", query),
            url: "https://example.com/ocean".to_string(),
            snippet: "Oceans absorb most excess heat.".to_string(),
        }])
    }
}

fn test_app() -> Router {
    let mut config = AppConfig::default();
    config.rate_limit.enabled = false;
    config.storage.persistence_enabled = false;

    let backends: Vec<Arc<dyn LlmBackend>> = vec![Arc::new(MockBackend::new())];
    let gateway = LlmGateway::new(backends, Duration::from_secs(5), 20_000);
    let search = Arc::new(WebSearchService::new(Arc::new(StubSearch), Duration::from_secs(60)));
    let store: Arc<dyn SessionStore> = Arc::new(MemoryStore::new());

    let state = AppState::build(Arc::new(config), store, gateway, search).unwrap();
    create_router(state)
}

struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl Reply {
    fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap_or(Value::Null)
    }

    fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// `session_id=...` pair from Set-Cookie, if one was issued
    fn session_cookie(&self) -> Option<String> {
        self.headers
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(str::to_string)
    }
}

async fn send(app: &Router, request: Request<Body>) -> Reply {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec();
    Reply { status, headers, body }
}

fn request(method: Method, uri: &str, cookie: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn upload_request(cookie: &str, filename: &str, content: &str) -> Request<Body> {
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{f}\"\r\n\
         Content-Type: text/plain\r\n\r\n{c}\r\n--{b}--\r\n",
        b = BOUNDARY,
        f = filename,
        c = content
    );
    Request::builder()
        .method(Method::POST)
        .uri("/upload?format=bullets")
        .header(header::COOKIE, cookie)
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={}", BOUNDARY))
        .body(Body::from(body))
        .unwrap()
}

/// Start a session by sending one chat message; returns the cookie pair
async fn start_session(app: &Router) -> String {
    let reply = send(
        app,
        request(Method::POST, "/chat", None, Some(json!({ "message": "hello", "use_reasoning": false }))),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    reply.session_cookie().unwrap()
}

const DOCUMENT: &str = "Ocean heat content has risen steadily since the 1950s. \
    Most of the excess energy trapped by greenhouse gases ends up in the ocean. \
    Warmer oceans drive sea level rise through thermal expansion.";

#[tokio::test]
async fn test_health_and_ready() {
    let app = test_app();

    let health = send(&app, request(Method::GET, "/health", None, None)).await;
    assert_eq!(health.status, StatusCode::OK);
    assert_eq!(health.json()["status"], "healthy");
    assert!(health.session_cookie().is_none());

    let ready = send(&app, request(Method::GET, "/ready", None, None)).await;
    assert_eq!(ready.status, StatusCode::OK);
    assert_eq!(ready.json()["status"], "ready");
    assert_eq!(ready.json()["checks"]["llm"]["detail"], "mock");
}

#[tokio::test]
async fn test_chat_issues_cookie_and_records_history() {
    let app = test_app();

    let reply = send(
        &app,
        request(Method::POST, "/chat", None, Some(json!({ "message": "What warms the ocean?" }))),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    let body = reply.json();
    assert!(body["reply"].as_str().unwrap().contains("Mock response"));
    assert_eq!(body["context_id"], "default");
    assert_eq!(body["used_reasoning"], true);

    let cookie = reply.session_cookie().unwrap();
    assert!(cookie.starts_with("session_id="));

    let history = send(&app, request(Method::GET, "/chat/history", Some(&cookie), None)).await;
    let messages = history.json()["messages"].as_array().unwrap().clone();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["role"], "user");
    assert_eq!(messages[1]["role"], "assistant");
    assert!(history.session_cookie().is_none());
}

#[tokio::test]
async fn test_chat_rejects_blank_message() {
    let app = test_app();

    for message in ["", "   "] {
        let reply = send(&app, request(Method::POST, "/chat", None, Some(json!({ "message": message })))).await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    }
}

#[tokio::test]
async fn test_chat_unknown_context_is_not_found() {
    let app = test_app();
    let cookie = start_session(&app).await;

    let reply = send(
        &app,
        request(Method::POST, "/chat", Some(&cookie), Some(json!({ "message": "hi", "context_id": "nope" }))),
    )
    .await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_upload_lifecycle() {
    let app = test_app();
    let cookie = start_session(&app).await;

    let uploaded = send(&app, upload_request(&cookie, "ocean.txt", DOCUMENT)).await;
    assert_eq!(uploaded.status, StatusCode::CREATED);
    let body = uploaded.json();
    assert_eq!(body["filename"], "ocean.txt");
    assert_eq!(body["summary_format"], "bullets");
    assert!(body["chunks"].as_u64().unwrap() >= 1);
    assert!(!body["summary"].as_str().unwrap().is_empty());

    let duplicate = send(&app, upload_request(&cookie, "copy.txt", DOCUMENT)).await;
    assert_eq!(duplicate.status, StatusCode::CONFLICT);

    let history = send(&app, request(Method::GET, "/upload/history", Some(&cookie), None)).await;
    let files = history.json()["files"].as_array().unwrap().clone();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0]["filename"], "ocean.txt");

    let chart = send(&app, request(Method::GET, "/visualize", Some(&cookie), None)).await;
    assert_eq!(chart.status, StatusCode::OK);
    assert_eq!(chart.json()["chart"], "sources");
    assert_eq!(chart.json()["data"][0]["name"], "ocean.txt");

    let keywords = send(&app, request(Method::GET, "/visualize?kind=keywords", Some(&cookie), None)).await;
    assert!(!keywords.json()["data"].as_array().unwrap().is_empty());

    let removed = send(&app, request(Method::DELETE, "/upload/ocean.txt", Some(&cookie), None)).await;
    assert_eq!(removed.status, StatusCode::OK);
    assert_eq!(removed.json()["chunks_removed"], body["chunks"]);

    let missing = send(&app, request(Method::DELETE, "/upload/ocean.txt", Some(&cookie), None)).await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_upload_rejects_unsupported_type() {
    let app = test_app();
    let cookie = start_session(&app).await;

    let reply = send(&app, upload_request(&cookie, "slides.pptx", "binary")).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_context_management() {
    let app = test_app();
    let cookie = start_session(&app).await;

    let created = send(
        &app,
        request(Method::POST, "/context", Some(&cookie), Some(json!({ "topic": "Climate", "description": "Ocean heat" }))),
    )
    .await;
    assert_eq!(created.status, StatusCode::CREATED);
    let id = created.json()["id"].as_str().unwrap().to_string();
    assert_eq!(id.len(), 8);
    assert_eq!(created.json()["is_current"], false);

    let switched = send(
        &app,
        request(Method::POST, "/context/switch", Some(&cookie), Some(json!({ "context_id": id }))),
    )
    .await;
    assert_eq!(switched.json()["current_context"], id.as_str());

    let current = send(&app, request(Method::GET, "/context/current", Some(&cookie), None)).await;
    assert_eq!(current.json()["topic"], "Climate");

    let updated = send(
        &app,
        request(Method::PUT, &format!("/context/{}", id), Some(&cookie), Some(json!({ "topic": "Oceans" }))),
    )
    .await;
    assert_eq!(updated.json()["topic"], "Oceans");
    assert_eq!(updated.json()["description"], "Ocean heat");

    let delete_current = send(&app, request(Method::DELETE, &format!("/context/{}", id), Some(&cookie), None)).await;
    assert_eq!(delete_current.status, StatusCode::BAD_REQUEST);

    let delete_default = send(&app, request(Method::DELETE, "/context/default", Some(&cookie), None)).await;
    assert_eq!(delete_default.status, StatusCode::BAD_REQUEST);

    let summary = send(&app, request(Method::GET, &format!("/context/{}/summary", id), Some(&cookie), None)).await;
    assert_eq!(summary.status, StatusCode::OK);
    assert_eq!(summary.json()["topic"], "Oceans");

    let archived = send(&app, request(Method::POST, &format!("/context/{}/archive", id), Some(&cookie), None)).await;
    assert_eq!(archived.json()["current_context"], "default");

    let listed = send(&app, request(Method::GET, "/context", Some(&cookie), None)).await;
    let ids: Vec<String> = listed.json()["contexts"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(ids, vec!["default".to_string()]);

    let with_archived = send(&app, request(Method::GET, "/context?include_archived=true", Some(&cookie), None)).await;
    assert_eq!(with_archived.json()["contexts"].as_array().unwrap().len(), 2);

    let deleted = send(&app, request(Method::DELETE, &format!("/context/{}", id), Some(&cookie), None)).await;
    assert_eq!(deleted.status, StatusCode::NO_CONTENT);

    let gone = send(&app, request(Method::GET, &format!("/context/{}/summary", id), Some(&cookie), None)).await;
    assert_eq!(gone.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_note_and_tool_dispatch() {
    let app = test_app();
    let cookie = start_session(&app).await;

    let saved = send(
        &app,
        request(Method::POST, "/note", Some(&cookie), Some(json!({ "note": "check 2023 data" }))),
    )
    .await;
    assert_eq!(saved.status, StatusCode::OK);

    let noted = send(
        &app,
        request(Method::POST, "/tools/note_taker", Some(&cookie), Some(json!({ "input": "compare with NOAA" }))),
    )
    .await;
    assert_eq!(noted.status, StatusCode::OK);
    assert_eq!(noted.json()["kind"], "note_taker");

    let current = send(&app, request(Method::GET, "/context/current", Some(&cookie), None)).await;
    let notes = current.json()["notes"].as_array().unwrap().clone();
    assert_eq!(notes.len(), 2);

    let history = send(&app, request(Method::GET, "/chat/history", Some(&cookie), None)).await;
    let messages = history.json()["messages"].as_array().unwrap().clone();
    assert!(messages
        .iter()
        .any(|m| m["content"] == "[NOTE] check 2023 data" && m["role"] == "user"));

    let unknown = send(
        &app,
        request(Method::POST, "/tools/teleporter", Some(&cookie), Some(json!({ "input": "x" }))),
    )
    .await;
    assert_eq!(unknown.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_explain_appends_exchange() {
    let app = test_app();
    let cookie = start_session(&app).await;

    let reply = send(
        &app,
        request(Method::POST, "/explain", Some(&cookie), Some(json!({ "query": "thermal expansion" }))),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(!reply.json()["response"].as_str().unwrap().is_empty());

    let history = send(&app, request(Method::GET, "/chat/history", Some(&cookie), None)).await;
    let messages = history.json()["messages"].as_array().unwrap().clone();
    assert_eq!(messages.len(), 4);
    assert!(messages[2]["content"]
        .as_str()
        .unwrap()
        .starts_with("Please explain the following concept in simple terms"));
}

#[tokio::test]
async fn test_search_cache_and_history() {
    let app = test_app();
    let cookie = start_session(&app).await;

    let first = send(&app, request(Method::GET, "/search?query=ocean%20heat", Some(&cookie), None)).await;
    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(first.json()["cached"], false);
    assert_eq!(first.json()["sources"][0], "https://example.com/ocean");

    let second = send(
        &app,
        request(Method::GET, "/search?query=Ocean%20Heat&verify=true", Some(&cookie), None),
    )
    .await;
    assert_eq!(second.json()["cached"], true);
    assert_eq!(second.json()["verified"], true);

    let history = send(&app, request(Method::GET, "/search/history", Some(&cookie), None)).await;
    let searches = history.json()["searches"].as_array().unwrap().clone();
    assert_eq!(searches.len(), 2);
    assert_eq!(searches[0]["query"], "ocean heat");

    let cleared = send(&app, request(Method::DELETE, "/search/cache", Some(&cookie), None)).await;
    assert_eq!(cleared.json()["cleared"], 1);

    let blank = send(&app, request(Method::GET, "/search?query=%20", Some(&cookie), None)).await;
    assert_eq!(blank.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_verify_claim() {
    let app = test_app();
    let cookie = start_session(&app).await;

    let reply = send(
        &app,
        request(Method::POST, "/search/verify?claim=oceans%20are%20warming", Some(&cookie), None),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.json()["claim"], "oceans are warming");
    assert!(reply.json()["search_results"].as_str().unwrap().contains("About fact check"));
}

#[tokio::test]
async fn test_insights_task_lifecycle() {
    let app = test_app();
    let cookie = start_session(&app).await;

    let empty = send(&app, request(Method::POST, "/insights", Some(&cookie), None)).await;
    assert_eq!(empty.status, StatusCode::BAD_REQUEST);

    send(&app, upload_request(&cookie, "ocean.txt", DOCUMENT)).await;
    let created = send(&app, request(Method::POST, "/insights", Some(&cookie), None)).await;
    assert_eq!(created.status, StatusCode::ACCEPTED);
    let task_id = created.json()["task_id"].as_str().unwrap().to_string();

    let uri = format!("/insights/{}", task_id);
    let mut status = String::new();
    for _ in 0..100 {
        let polled = send(&app, request(Method::GET, &uri, Some(&cookie), None)).await;
        assert_eq!(polled.status, StatusCode::OK);
        status = polled.json()["status"].as_str().unwrap().to_string();
        if status == "completed" || status == "failed" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    // The mock backend does not answer with JSON
    assert_eq!(status, "failed");

    let foreign = send(&app, request(Method::GET, &uri, Some("session_id=someone-else"), None)).await;
    assert_eq!(foreign.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_export_formats() {
    let app = test_app();

    let no_session = send(&app, request(Method::GET, "/export", None, None)).await;
    assert_eq!(no_session.status, StatusCode::NOT_FOUND);

    let cookie = start_session(&app).await;

    let txt = send(&app, request(Method::GET, "/export", Some(&cookie), None)).await;
    assert_eq!(txt.status, StatusCode::OK);
    assert!(txt.text().starts_with("User:\nhello\n\nAssistant:\n"));
    let disposition = txt.headers.get(header::CONTENT_DISPOSITION).unwrap().to_str().unwrap();
    assert!(disposition.starts_with("attachment; filename=\"conversation_"));
    assert!(disposition.ends_with(".txt\""));

    let json_export = send(&app, request(Method::GET, "/export?format=json", Some(&cookie), None)).await;
    assert_eq!(json_export.json()["message_count"], 2);

    let bad = send(&app, request(Method::GET, "/export?format=pdf", Some(&cookie), None)).await;
    assert_eq!(bad.status, StatusCode::BAD_REQUEST);
}
