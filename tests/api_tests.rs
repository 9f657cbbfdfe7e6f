//! API integration tests: the router driven with `tower::ServiceExt::oneshot`.

mod common;

use std::path::Path;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use common::*;
use pretty_assertions::assert_eq;
use royalbit_sheetmap::api::{router, AppState};
use royalbit_sheetmap::config::AppConfig;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

fn app(templates: &Path) -> Router {
    let config = AppConfig {
        templates_dir: templates.to_path_buf(),
        ..AppConfig::default()
    };
    router(Arc::new(AppState::from_config(&config).unwrap()))
}

/// A working directory holding two source workbooks and an output dir.
fn workspace() -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("alpha.xlsx"), source_workbook("Alpha")).unwrap();
    std::fs::write(dir.path().join("beta.xlsx"), source_workbook("Beta")).unwrap();
    dir
}

async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    read(response).await
}

async fn post(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    read(response).await
}

async fn read(response: axum::response::Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn path_str(path: &Path) -> String {
    path.display().to_string()
}

// ═══════════════════════════════════════════════════════════════════════════
// INFO ENDPOINTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_health() {
    let templates = template_dir();
    let (status, body) = get(app(templates.path()), "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "healthy");
    assert_eq!(body["data"]["templates"], 7);
    assert_eq!(body["request_id"].as_str().unwrap().len(), 36);
}

#[tokio::test]
async fn test_root_lists_endpoints() {
    let templates = template_dir();
    let (status, body) = get(app(templates.path()), "/").await;

    assert_eq!(status, StatusCode::OK);
    let paths: Vec<&str> = body["data"]["endpoints"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["path"].as_str().unwrap())
        .collect();
    assert!(paths.contains(&"/api/v1/merge"));
    assert!(paths.contains(&"/api/v1/templates/reload"));
}

#[tokio::test]
async fn test_version() {
    let templates = template_dir();
    let (_, body) = get(app(templates.path()), "/version").await;
    assert_eq!(body["data"]["version"], env!("CARGO_PKG_VERSION"));
}

// ═══════════════════════════════════════════════════════════════════════════
// TEMPLATES
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_list_templates() {
    let templates = template_dir();

    let (status, body) = get(app(templates.path()), "/api/v1/templates").await;
    assert_eq!(status, StatusCode::OK);
    let listed = body["data"]["templates"].as_array().unwrap();
    assert_eq!(listed.len(), 6);
    assert_eq!(listed[0]["id"], "form_a");
    assert_eq!(listed[0]["cell_count"], 4);
    assert_eq!(listed[0]["file_ok"], true);
    assert_eq!(body["data"]["max_rows_per_run"], 1000);

    let (_, body) = get(app(templates.path()), "/api/v1/templates?all=true").await;
    assert_eq!(body["data"]["templates"].as_array().unwrap().len(), 7);
}

#[tokio::test]
async fn test_reload_templates() {
    let templates = template_dir();
    let app = app(templates.path());

    std::fs::write(
        templates.path().join("template_config.json"),
        r#"{"templates":[{"id":"only","name":"Only","filename":"form_a.xlsx","output_filename":"o.xlsx"}]}"#,
    )
    .unwrap();

    let (status, body) = post(app.clone(), "/api/v1/templates/reload", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["templates"], 1);

    let (_, body) = get(app, "/health").await;
    assert_eq!(body["data"]["templates"], 1);
}

// ═══════════════════════════════════════════════════════════════════════════
// CONVERSION
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_convert_writes_output() {
    let templates = template_dir();
    let work = workspace();
    let out_dir = work.path().join("out");

    let (status, body) = post(
        app(templates.path()),
        "/api/v1/convert",
        json!({
            "source_path": path_str(&work.path().join("alpha.xlsx")),
            "template_id": "form_a",
            "output_dir": path_str(&out_dir),
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["count"], 4);
    let written = std::fs::read(out_dir.join("form_a_out.xlsx")).unwrap();
    assert_eq!(
        cell(&written, TARGET_SHEET, "E14"),
        calamine::Data::String("Alpha".into())
    );
}

#[tokio::test]
async fn test_convert_unknown_template() {
    let templates = template_dir();
    let work = workspace();

    let (status, body) = post(
        app(templates.path()),
        "/api/v1/convert",
        json!({
            "source_path": path_str(&work.path().join("alpha.xlsx")),
            "template_id": "nope",
            "output_dir": path_str(work.path()),
        }),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert!(body.get("data").is_none());
    assert!(body["error"].as_str().unwrap().contains("nope"));
}

#[tokio::test]
async fn test_convert_rejects_unsupported_file() {
    let templates = template_dir();
    let work = workspace();
    let notes = work.path().join("notes.txt");
    std::fs::write(&notes, "x".repeat(500)).unwrap();

    let (status, _) = post(
        app(templates.path()),
        "/api/v1/convert",
        json!({
            "source_path": path_str(&notes),
            "template_id": "form_a",
            "output_dir": path_str(work.path()),
        }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_batch_reports_failures() {
    let templates = template_dir();
    let work = workspace();

    let (status, body) = post(
        app(templates.path()),
        "/api/v1/batch",
        json!({
            "source_path": path_str(&work.path().join("alpha.xlsx")),
            "template_ids": ["form_a", "broken"],
            "facility_label": "Alpha",
            "output_dir": path_str(work.path()),
            "date": "20250401",
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["count"], 1);
    assert_eq!(body["data"]["failures"][0]["item"], "broken");
    assert!(work.path().join("Alpha_20250401.zip").exists());
}

#[tokio::test]
async fn test_merge_rows() {
    let templates = template_dir();
    let work = workspace();

    let (status, body) = post(
        app(templates.path()),
        "/api/v1/merge",
        json!({
            "source_paths": [
                path_str(&work.path().join("alpha.xlsx")),
                path_str(&work.path().join("missing.xlsx")),
                path_str(&work.path().join("beta.xlsx")),
            ],
            "labels": ["A", "M", "B"],
            "template_id": "roster",
            "output_dir": path_str(work.path()),
            "date": "20250401",
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["processed_count"], 2);
    assert_eq!(body["data"]["rows"], json!([{"label": "A", "row": 14}, {"label": "B", "row": 15}]));
    assert_eq!(body["data"]["failures"].as_array().unwrap().len(), 1);

    let written = std::fs::read(work.path().join("roster_merged_2_20250401.xlsx")).unwrap();
    assert_eq!(
        cell(&written, TARGET_SHEET, "B15"),
        calamine::Data::String("Beta".into())
    );
}

#[tokio::test]
async fn test_merge_label_mismatch() {
    let templates = template_dir();
    let work = workspace();

    let (status, body) = post(
        app(templates.path()),
        "/api/v1/merge",
        json!({
            "source_paths": [path_str(&work.path().join("alpha.xlsx"))],
            "labels": [],
            "template_id": "roster",
            "output_dir": path_str(work.path()),
        }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}
