//! HTTP API tests driven through the router with `tower::ServiceExt::oneshot`.

#![cfg(feature = "server")]

mod common;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use common::*;
use dragonscale_storyteller::server::{router, ErrorResponse};
use dragonscale_storyteller::{ServiceConfig, StoryResponse};
use std::sync::Arc;
use tower::ServiceExt;

const BOUNDARY: &str = "XstoryBoundaryX";

fn multipart_body(file: Option<(&str, &str, &[u8])>, fields: &[(&str, &str)]) -> Vec<u8> {
    let mut body = Vec::new();
    if let Some((name, content_type, bytes)) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{name}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    for (name, value) in fields {
        body.extend_from_slice(
            format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                .as_bytes(),
        );
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn upload_request(body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/storygenerator/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

/// The router plus the temp dir backing its storage, which must outlive it.
async fn app_with(ai: FakeAi, config: ServiceConfig) -> (Router, tempfile::TempDir) {
    let h = harness_with(ai, FakeExtractor(Some("some text".into())), config).await;
    (router(Arc::new(h.service)), h.dir)
}

async fn app() -> (Router, tempfile::TempDir) {
    app_with(FakeAi::default(), ServiceConfig::default()).await
}

async fn json_body<T: serde::de::DeserializeOwned>(resp: axum::response::Response) -> T {
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn hello_world_is_alive() {
    let (app, _h) = app().await;
    let resp = app.oneshot(get("/helloworld")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn upload_then_get_and_export() {
    let (app, _h) = app().await;

    let body = multipart_body(
        Some(("manual.pdf", "application/pdf", b"%PDF-1.4 hello")),
        &[("language", "en"), ("mood", "epic"), ("keywords", "dragon, gold")],
    );
    let resp = app.clone().oneshot(upload_request(body)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let created: StoryResponse = json_body(resp).await;
    assert!(created.success);
    let id = created.story_id.unwrap();
    assert_eq!(created.story.as_ref().unwrap().phases.len(), 4);

    let resp = app
        .clone()
        .oneshot(get(&format!("/api/storygenerator/{id}")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let fetched: StoryResponse = json_body(resp).await;
    assert_eq!(fetched.story.unwrap().id, id);

    let resp = app
        .clone()
        .oneshot(get(&format!("/api/storygenerator/{id}/export/json")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/json");
    assert_eq!(
        resp.headers()[header::CONTENT_DISPOSITION],
        format!("attachment; filename=\"story-{id}.json\"").as_str()
    );

    let resp = app
        .oneshot(get(&format!("/api/storygenerator/{id}/export/pdf")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/pdf");
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], FAKE_PDF);
}

#[tokio::test]
async fn missing_file_is_no_file() {
    let (app, _h) = app().await;
    let resp = app
        .oneshot(upload_request(multipart_body(None, &[("language", "de")])))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let err: ErrorResponse = json_body(resp).await;
    assert_eq!(err.error_code, "NO_FILE");
}

#[tokio::test]
async fn non_pdf_is_invalid_file() {
    let (app, _h) = app().await;
    let body = multipart_body(Some(("cat.png", "image/png", b"\x89PNG....")), &[]);
    let resp = app.oneshot(upload_request(body)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let err: ErrorResponse = json_body(resp).await;
    assert_eq!(err.error_code, "INVALID_FILE");
    assert!(!err.user_friendly_message.is_empty());
}

#[tokio::test]
async fn unknown_language_is_a_bad_request() {
    let (app, _h) = app().await;
    let body = multipart_body(
        Some(("manual.pdf", "application/pdf", b"%PDF-1.4 hello")),
        &[("language", "fr")],
    );
    let resp = app.oneshot(upload_request(body)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let err: ErrorResponse = json_body(resp).await;
    assert_eq!(err.error_code, "INVALID_ARGUMENT");
}

#[tokio::test]
async fn prompt_failure_maps_to_service_unavailable() {
    let (app, _h) = app_with(
        FakeAi {
            prompt_failure: Some("Introduction"),
            ..Default::default()
        },
        ServiceConfig::default(),
    )
    .await;
    let body = multipart_body(Some(("manual.pdf", "application/pdf", b"%PDF-1.4 hello")), &[]);
    let resp = app.oneshot(upload_request(body)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    let err: ErrorResponse = json_body(resp).await;
    assert_eq!(err.error_code, "AI_IMAGEPROMPTGENERATIONFAILED");
}

#[tokio::test]
async fn unknown_story_is_not_found() {
    let (app, _h) = app().await;
    for uri in [
        "/api/storygenerator/deadbeef",
        "/api/storygenerator/deadbeef/export/json",
        "/api/storygenerator/deadbeef/export/pdf",
    ] {
        let resp = app.clone().oneshot(get(uri)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND, "{uri}");
        let err: ErrorResponse = json_body(resp).await;
        assert_eq!(err.error_code, "STORY_NOT_FOUND", "{uri}");
    }
}
