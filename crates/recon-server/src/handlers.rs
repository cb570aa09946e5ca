//! Route handlers

use axum::extract::{Multipart, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use recon_core::{
    CancellationHandle, CompareRequest, ComparisonSummary, ExportKind, Separator, Side,
};
use tracing::info;

use crate::error::ApiError;
use crate::state::AppState;
use crate::types::{
    ApiResponse, CancelData, ExportQuery, IndexData, ProgressData, SideStats, StatsData,
    UploadData, UploadQuery,
};

pub const ENDPOINTS: &[&str] = &[
    "GET /",
    "POST /upload?type=A|B&separator=X",
    "POST /compare",
    "GET /stats",
    "GET /progress",
    "POST /cancel",
    "POST /export?kind=results|notfound&side=A|B",
];

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

fn parse_side(value: Option<&str>, param: &str) -> Result<Side, ApiError> {
    let value = value.ok_or_else(|| ApiError::bad_request(format!("missing '{}' parameter", param)))?;
    Ok(value.parse::<Side>()?)
}

fn parse_export_kind(value: Option<&str>) -> Result<ExportKind, ApiError> {
    match value.map(str::to_ascii_lowercase).as_deref() {
        Some("results") => Ok(ExportKind::Results),
        Some("notfound") => Ok(ExportKind::NotFound),
        Some(other) => Err(ApiError::bad_request(format!(
            "kind must be 'results' or 'notfound', got '{}'",
            other
        ))),
        None => Err(ApiError::bad_request("missing 'kind' parameter")),
    }
}

/// Service status and endpoint listing
pub async fn index() -> Json<ApiResponse<IndexData>> {
    Json(ApiResponse::success(IndexData {
        status: "running".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        endpoints: ENDPOINTS.iter().map(|e| e.to_string()).collect(),
        timestamp: Utc::now(),
    }))
}

/// Receive a file for one side and load its preview
pub async fn upload(
    State(state): State<AppState>,
    Query(query): Query<UploadQuery>,
    mut multipart: Multipart,
) -> ApiResult<UploadData> {
    let side = parse_side(query.side.as_deref(), "type")?;
    let separator = match query.separator.as_deref() {
        Some(s) => Separator::parse(s)?,
        None => return Err(ApiError::bad_request("missing 'separator' parameter")),
    };

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("multipart read error: {}", e)))?
    {
        // first field carrying a file name, or one named "file"
        if field.file_name().is_none() && field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(format!("failed to read file: {}", e)))?;
        upload = Some((file_name, bytes));
        break;
    }
    let (file_name, bytes) = upload.ok_or_else(|| ApiError::bad_request("no file uploaded"))?;
    let size = bytes.len();

    let worker_state = state.clone();
    let (headers, rows) = tokio::task::spawn_blocking(move || {
        worker_state.load_upload(side, separator, &bytes)
    })
    .await??;

    info!(side = %side, file = ?file_name, bytes = size, columns = headers.len(), "file uploaded");
    let preview = rows.iter().map(|r| r.project(&headers).map(str::to_string).collect()).collect();
    Ok(Json(ApiResponse::success(UploadData {
        side,
        file_name,
        separator: separator.to_string(),
        headers,
        preview,
    })))
}

/// Set the rules and run a comparison on a blocking worker
pub async fn compare(State(state): State<AppState>, body: String) -> ApiResult<ComparisonSummary> {
    let request = CompareRequest::from_json(&body)?;
    let (plan, cancel, progress) = state.begin_run(&request)?;
    let _cancel_on_drop = CancelOnDrop(cancel.clone());

    let start_index = request.start_index;
    let worker = state.clone();
    let result = tokio::task::spawn_blocking(move || {
        worker.execute(plan, start_index, &cancel, &progress)
    })
    .await??;

    Ok(Json(ApiResponse::success(result.summary())))
}

/// Stops this request's run if the client goes away mid-run; the worker
/// releases the run slot itself once it returns
struct CancelOnDrop(CancellationHandle);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

/// Loaded files, rule counts and run state
pub async fn stats(State(state): State<AppState>) -> Json<ApiResponse<StatsData>> {
    let running = state.is_running();
    let reconciler = state.reconciler();
    let side_stats = |side: Side| match reconciler.file(side) {
        Some(file) => SideStats {
            loaded: true,
            separator: Some(file.source.separator.to_string()),
            headers: file.headers.clone(),
        },
        None => SideStats::default(),
    };

    Json(ApiResponse::success(StatsData {
        file_a: side_stats(Side::A),
        file_b: side_stats(Side::B),
        match_rules: reconciler.match_rules().len(),
        transfer_rules: reconciler.transfer_rules().len(),
        has_result: reconciler.last_result().is_some(),
        running,
    }))
}

/// Latest progress snapshot of the active or last run
pub async fn progress(State(state): State<AppState>) -> Json<ApiResponse<ProgressData>> {
    let (snapshot, running) = state.progress();
    Json(ApiResponse::success(ProgressData {
        processed: snapshot.processed,
        total: snapshot.total,
        phase: snapshot.phase,
        running,
    }))
}

/// Request cancellation of the active run
pub async fn cancel(State(state): State<AppState>) -> Json<ApiResponse<CancelData>> {
    let cancelled = state.cancel_run();
    if cancelled {
        info!("cancellation requested");
    }
    Json(ApiResponse::success(CancelData { cancelled }))
}

/// Export part of the last result as delimited text
pub async fn export(
    State(state): State<AppState>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, ApiError> {
    let kind = parse_export_kind(query.kind.as_deref())?;
    let side = parse_side(query.side.as_deref(), "side")?;

    let mut buf = Vec::new();
    state.reconciler().write_export(&mut buf, kind, side)?;
    let text = String::from_utf8_lossy(&buf).into_owned();

    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], text).into_response())
}
