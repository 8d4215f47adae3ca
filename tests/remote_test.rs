mod common;

use axum::http::StatusCode;
use common::*;
use data_extractor::error::RemoteError;
use data_extractor::remote::{HttpProcessor, Processor, XLS_MIME, XLSX_MIME};
use data_extractor::{AppState, Config, router};
use std::sync::Arc;
use tempfile::TempDir;

#[tokio::test]
async fn test_posts_file_field_and_returns_body() {
    let (url, received) = spawn_remote(StatusCode::OK, "a,b\n1,2").await;
    let processor = HttpProcessor::new(url);

    let body = processor
        .process("data.xlsx", b"workbook".to_vec())
        .await
        .unwrap();
    assert_eq!(body, "a,b\n1,2");

    let received = received.lock().unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].field, "file");
    assert_eq!(received[0].file_name.as_deref(), Some("data.xlsx"));
    assert_eq!(received[0].content_type.as_deref(), Some(XLSX_MIME));
    assert_eq!(received[0].bytes, b"workbook");
}

#[tokio::test]
async fn test_xls_is_sent_with_legacy_mime() {
    let (url, received) = spawn_remote(StatusCode::OK, "x\n1").await;
    let processor = HttpProcessor::new(url);

    processor.process("old.xls", vec![1, 2, 3]).await.unwrap();

    let received = received.lock().unwrap();
    assert_eq!(received[0].content_type.as_deref(), Some(XLS_MIME));
}

#[tokio::test]
async fn test_non_200_is_a_status_error() {
    let (url, _) = spawn_remote(StatusCode::INTERNAL_SERVER_ERROR, "boom").await;
    let processor = HttpProcessor::new(url);

    let err = processor.process("data.xlsx", vec![]).await.unwrap_err();
    assert_eq!(err, RemoteError::Status(500));
    assert_eq!(
        err.to_string(),
        "Failed to process the file. Status code: 500"
    );
}

#[tokio::test]
async fn test_full_stack_against_remote() {
    let (url, received) = spawn_remote(StatusCode::OK, "name,score\nann,9.5\nbob,NA").await;
    let tmp = TempDir::new().unwrap();
    let config = Config {
        remote_endpoint: url.clone(),
        ..test_config(&tmp)
    };
    let state = AppState::new(config, Arc::new(HttpProcessor::new(url))).unwrap();
    let app = router(Arc::new(state));

    let cookie = login(&app).await;
    let response = send(&app, upload_request(&cookie, "scores.xlsx", b"PK")).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(received.lock().unwrap().len(), 1);

    let session = session_json(&app, &cookie).await;
    assert_eq!(session["state"], "result_ready");
    assert_eq!(session["rows"][0]["name"], "ann");
    assert_eq!(session["rows"][0]["score"], 9.5);
    assert!(session["rows"][1]["score"].is_null());
}
