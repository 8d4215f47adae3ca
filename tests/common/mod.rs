#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    extract::{Multipart, State},
    http::{Request, Response, StatusCode, header},
    routing,
};
use data_extractor::config::Config;
use data_extractor::error::RemoteError;
use data_extractor::remote::Processor;
use data_extractor::{AppState, router};
use http_body_util::BodyExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tower::ServiceExt;

pub const BOUNDARY: &str = "---------------------------123456789012345678901234567";

/// Processor answering every call with a fixed reply
pub struct StubProcessor {
    reply: Mutex<Result<String, RemoteError>>,
    calls: AtomicUsize,
}

impl StubProcessor {
    pub fn new(reply: Result<String, RemoteError>) -> Arc<Self> {
        Arc::new(StubProcessor {
            reply: Mutex::new(reply),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn set_reply(&self, reply: Result<String, RemoteError>) {
        *self.reply.lock().unwrap() = reply;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Processor for StubProcessor {
    async fn process(&self, _file_name: &str, _bytes: Vec<u8>) -> Result<String, RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reply.lock().unwrap().clone()
    }
}

pub fn test_config(tmp: &TempDir) -> Config {
    Config {
        upload_dir: tmp.path().join("uploads"),
        result_dir: tmp.path().join("results"),
        sample_file: tmp.path().join("sample.xlsx"),
        ..Config::default()
    }
}

pub fn test_app(tmp: &TempDir, processor: Arc<dyn Processor>) -> Router {
    let state = AppState::new(test_config(tmp), processor).unwrap();
    router(Arc::new(state))
}

pub async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

pub async fn body_string(response: Response<Body>) -> String {
    String::from_utf8(body_bytes(response).await).unwrap()
}

pub fn login_request(username: &str, password: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/login")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(format!(
            "username={}&password={}",
            username, password
        )))
        .unwrap()
}

/// `session=<id>` pair from a login response, if one was set
pub fn session_cookie(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("session="))
        .and_then(|v| v.split(';').next())
        .map(|v| v.to_string())
}

/// Log in as admin and return the session cookie
pub async fn login(app: &Router) -> String {
    let response = send(app, login_request("admin", "password")).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    session_cookie(&response).expect("login sets a session cookie")
}

pub fn get(uri: &str, cookie: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::COOKIE, cookie)
        .body(Body::empty())
        .unwrap()
}

pub fn post(uri: &str, cookie: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::COOKIE, cookie)
        .body(Body::empty())
        .unwrap()
}

pub fn upload_request(cookie: &str, filename: &str, bytes: &[u8]) -> Request<Body> {
    let mut body = format!(
        "--{boundary}\r\n\
        Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
        Content-Type: application/octet-stream\r\n\r\n",
        boundary = BOUNDARY,
        filename = filename
    )
    .into_bytes();
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method("POST")
        .uri("/upload")
        .header(header::COOKIE, cookie)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

pub async fn session_json(app: &Router, cookie: &str) -> serde_json::Value {
    let response = send(app, get("/api/session", cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// One multipart upload as seen by the fake remote endpoint
#[derive(Debug, Clone)]
pub struct Received {
    pub field: String,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Clone)]
struct RemoteState {
    status: StatusCode,
    body: &'static str,
    received: Arc<Mutex<Vec<Received>>>,
}

async fn fake_upload(State(state): State<RemoteState>, mut multipart: Multipart) -> (StatusCode, String) {
    while let Some(field) = multipart.next_field().await.unwrap() {
        let received = Received {
            field: field.name().unwrap_or_default().to_string(),
            file_name: field.file_name().map(|s| s.to_string()),
            content_type: field.content_type().map(|s| s.to_string()),
            bytes: field.bytes().await.unwrap().to_vec(),
        };
        state.received.lock().unwrap().push(received);
    }
    (state.status, state.body.to_string())
}

/// Start a throwaway remote endpoint; returns its URL and what it received
pub async fn spawn_remote(
    status: StatusCode,
    body: &'static str,
) -> (String, Arc<Mutex<Vec<Received>>>) {
    let received = Arc::new(Mutex::new(Vec::new()));
    let state = RemoteState {
        status,
        body,
        received: received.clone(),
    };
    let app = Router::new()
        .route("/upload/", routing::post(fake_upload))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}/upload/", addr), received)
}
