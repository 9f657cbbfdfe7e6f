//! API request handlers
//!
//! Conversion handlers run the engine on the blocking thread pool, one task
//! per request.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::server::AppState;
use crate::cli::parse_date;
use crate::cli::session::{BatchReport, ConvertReport, MergeReport, Session, TemplateSummary};
use crate::error::{TransferError, TransferResult};

/// Standard API response wrapper
#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            request_id: Uuid::new_v4().to_string(),
            data: Some(data),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self
    where
        T: Default,
    {
        Self {
            success: false,
            request_id: Uuid::new_v4().to_string(),
            data: None,
            error: Some(message.into()),
        }
    }
}

/// HTTP status for an engine error.
pub fn status_for(error: &TransferError) -> StatusCode {
    match error {
        TransferError::TemplateNotFound(_) => StatusCode::NOT_FOUND,
        TransferError::Io(e) if e.kind() == std::io::ErrorKind::NotFound => StatusCode::NOT_FOUND,
        TransferError::InvalidRequest(_)
        | TransferError::InvalidFile(_)
        | TransferError::InvalidAddress(_)
        | TransferError::TemplateInactive(_)
        | TransferError::MissingMapping(_)
        | TransferError::NoTemplatesSelected => StatusCode::BAD_REQUEST,
        TransferError::CapacityExceeded(_)
        | TransferError::SheetNotFound(_)
        | TransferError::Extraction(_)
        | TransferError::AllItemsFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn respond<T: Serialize + Default>(result: TransferResult<T>) -> (StatusCode, Json<ApiResponse<T>>) {
    match result {
        Ok(data) => (StatusCode::OK, Json(ApiResponse::ok(data))),
        Err(e) => (status_for(&e), Json(ApiResponse::err(e.to_string()))),
    }
}

/// Run `job` against the session on the blocking pool.
async fn run_blocking<T, F>(state: Arc<AppState>, job: F) -> TransferResult<T>
where
    T: Send + 'static,
    F: FnOnce(&Session) -> TransferResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || job(&state.session))
        .await
        .map_err(|e| TransferError::Io(std::io::Error::other(e)))?
}

fn request_date(date: Option<&str>) -> TransferResult<chrono::NaiveDate> {
    match date {
        Some(text) => parse_date(text).map_err(TransferError::InvalidRequest),
        None => Ok(chrono::Local::now().date_naive()),
    }
}

/// Root endpoint response
#[derive(Serialize)]
pub struct RootResponse {
    pub name: String,
    pub version: String,
    pub description: String,
    pub endpoints: Vec<EndpointInfo>,
}

#[derive(Serialize)]
pub struct EndpointInfo {
    pub path: String,
    pub method: String,
    pub description: String,
}

impl EndpointInfo {
    fn new(path: &str, method: &str, description: &str) -> Self {
        Self {
            path: path.to_string(),
            method: method.to_string(),
            description: description.to_string(),
        }
    }
}

/// GET / - Root info
pub async fn root(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let response = RootResponse {
        name: "Sheetmap API Server".to_string(),
        version: state.version.clone(),
        description: "Template mapping engine for spreadsheets".to_string(),
        endpoints: vec![
            EndpointInfo::new("/health", "GET", "Health check endpoint"),
            EndpointInfo::new("/version", "GET", "Get server version"),
            EndpointInfo::new("/api/v1/templates", "GET", "List templates (?all=true for inactive)"),
            EndpointInfo::new("/api/v1/templates/reload", "POST", "Reload the template configuration"),
            EndpointInfo::new("/api/v1/convert", "POST", "Fill one template from one source"),
            EndpointInfo::new("/api/v1/batch", "POST", "Fill several templates into a zip archive"),
            EndpointInfo::new("/api/v1/merge", "POST", "Fold several sources into one template"),
        ],
    };
    Json(ApiResponse::ok(response))
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub templates: usize,
}

/// GET /health - Health check
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(ApiResponse::ok(HealthResponse {
        status: "healthy".to_string(),
        templates: state.session.catalog().snapshot().len(),
    }))
}

/// Version response
#[derive(Serialize)]
pub struct VersionResponse {
    pub version: String,
    pub features: Vec<String>,
}

/// GET /version - Server version
pub async fn version(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(ApiResponse::ok(VersionResponse {
        version: state.version.clone(),
        features: vec![
            "convert".to_string(),
            "batch".to_string(),
            "merge".to_string(),
            "xlsb".to_string(),
        ],
    }))
}

#[derive(Deserialize, Default)]
pub struct TemplatesQuery {
    #[serde(default)]
    pub all: bool,
}

#[derive(Serialize, Default)]
pub struct TemplatesResponse {
    pub templates: Vec<TemplateSummary>,
    /// Upper bound on sources per multi-source run
    pub max_rows_per_run: usize,
}

/// GET /api/v1/templates - List templates
pub async fn list_templates(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TemplatesQuery>,
) -> impl IntoResponse {
    Json(ApiResponse::ok(TemplatesResponse {
        templates: state.session.list_templates(query.all),
        max_rows_per_run: state.session.converter().limits().max_rows_per_run,
    }))
}

#[derive(Serialize, Default)]
pub struct ReloadResponse {
    pub templates: usize,
}

/// POST /api/v1/templates/reload - Re-read the template configuration
pub async fn reload_templates(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let result = run_blocking(state, |session| session.reload())
        .await
        .map(|templates| ReloadResponse { templates });
    respond(result)
}

/// Convert request
#[derive(Deserialize)]
pub struct ConvertRequest {
    pub source_path: String,
    pub template_id: String,
    pub output_dir: String,
}

/// POST /api/v1/convert - Fill one template
pub async fn convert(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ConvertRequest>,
) -> impl IntoResponse {
    let result: TransferResult<ConvertReport> = run_blocking(state, move |session| {
        session.convert(
            &PathBuf::from(&req.source_path),
            &req.template_id,
            &PathBuf::from(&req.output_dir),
        )
    })
    .await;
    respond(result)
}

/// Batch request
#[derive(Deserialize)]
pub struct BatchRequest {
    pub source_path: String,
    pub template_ids: Vec<String>,
    pub facility_label: String,
    pub output_dir: String,
    /// YYYYMMDD, default today
    #[serde(default)]
    pub date: Option<String>,
}

/// POST /api/v1/batch - Fill several templates into one archive
pub async fn batch(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BatchRequest>,
) -> impl IntoResponse {
    let result: TransferResult<BatchReport> = run_blocking(state, move |session| {
        let date = request_date(req.date.as_deref())?;
        session.batch(
            &PathBuf::from(&req.source_path),
            &req.template_ids,
            &req.facility_label,
            date,
            &PathBuf::from(&req.output_dir),
        )
    })
    .await;
    respond(result)
}

/// Merge request
#[derive(Deserialize)]
pub struct MergeRequest {
    pub source_paths: Vec<String>,
    pub labels: Vec<String>,
    pub template_id: String,
    pub output_dir: String,
    #[serde(default)]
    pub start_row: Option<u32>,
    /// YYYYMMDD, default today
    #[serde(default)]
    pub date: Option<String>,
}

/// POST /api/v1/merge - Fold several sources into one template
pub async fn merge(
    State(state): State<Arc<AppState>>,
    Json(req): Json<MergeRequest>,
) -> impl IntoResponse {
    let result: TransferResult<MergeReport> = run_blocking(state, move |session| {
        let date = request_date(req.date.as_deref())?;
        let sources: Vec<PathBuf> = req.source_paths.iter().map(PathBuf::from).collect();
        session.merge(
            &sources,
            &req.labels,
            &req.template_id,
            req.start_row,
            date,
            &PathBuf::from(&req.output_dir),
        )
    })
    .await;
    respond(result)
}
