//! JSON HTTP API over the hybrid result store.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/simulations` | List simulations |
//! | `POST` | `/simulations` | Save (upsert) a simulation |
//! | `DELETE` | `/simulations/{id}` | Delete a simulation |
//! | `GET`  | `/uploads` | List uploads |
//! | `POST` | `/uploads` | Register an upload |
//! | `DELETE` | `/uploads/{id}` | Delete an upload |
//! | `GET`  | `/analyses` | List remote analyses |
//! | `POST` | `/analyses` | Save an analysis |
//! | `GET`  | `/analyses/{file_name}` | Cached analysis for a file |
//!
//! Store responses wrap the value with where it was served:
//!
//! ```json
//! { "result": [...], "sync": { "backing": "degraded", "degraded": true, "reason": "..." } }
//! ```
//!
//! Errors use `{ "error": { "code": "bad_request", "message": "..." } }`
//! with codes `bad_request` (400), `not_found` (404) and
//! `local_storage_failed` (500, the device store could not be read).
//!
//! All origins, methods, and headers are permitted for browser clients.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get},
    Json, Router,
};
use policy_sim_core::hybrid::{Outcome, SyncStatus};
use policy_sim_core::models::{now_iso, AnalysisResult, SimulationResult, UploadedFile};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::context::AppContext;
use crate::workflow::Uploaded;

type AppState = Arc<AppContext>;

/// Bind to `[server].bind` and serve until the process is terminated.
pub async fn run_server(ctx: Arc<AppContext>) -> anyhow::Result<()> {
    let bind_addr = ctx.config.server.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(%bind_addr, "server listening");
    eprintln!("Listening on http://{}", bind_addr);
    axum::serve(listener, router(ctx)).await?;
    Ok(())
}

/// All routes, with CORS applied.
pub fn router(ctx: Arc<AppContext>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route(
            "/simulations",
            get(handle_list_simulations).post(handle_save_simulation),
        )
        .route("/simulations/{id}", delete(handle_delete_simulation))
        .route("/uploads", get(handle_list_uploads).post(handle_save_upload))
        .route("/uploads/{id}", delete(handle_delete_upload))
        .route(
            "/analyses",
            get(handle_list_analyses).post(handle_save_analysis),
        )
        .route("/analyses/{file_name}", get(handle_get_analysis))
        .layer(cors)
        .with_state(ctx)
}

// ============ Responses ============

#[derive(Serialize)]
struct StoreResponse<T> {
    result: T,
    sync: SyncView,
}

#[derive(Serialize)]
struct SyncView {
    backing: &'static str,
    degraded: bool,
    reason: Option<String>,
}

impl From<&SyncStatus> for SyncView {
    fn from(sync: &SyncStatus) -> Self {
        let backing = match sync {
            SyncStatus::Local => "local",
            SyncStatus::Remote => "remote",
            SyncStatus::Degraded { .. } => "degraded",
            SyncStatus::LocalFailed { .. } => "local_failed",
        };
        Self {
            backing,
            degraded: sync.is_degraded(),
            reason: sync.reason().map(str::to_string),
        }
    }
}

fn respond<T: Serialize>(outcome: Outcome<T>) -> Json<StoreResponse<T>> {
    let sync = SyncView::from(&outcome.sync);
    Json(StoreResponse {
        result: outcome.value,
        sync,
    })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn local_storage_failed(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "local_storage_failed",
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ /simulations ============

async fn handle_list_simulations(
    State(ctx): State<AppState>,
) -> Json<StoreResponse<Vec<SimulationResult>>> {
    respond(ctx.store.list_simulations().await)
}

async fn handle_save_simulation(
    State(ctx): State<AppState>,
    body: Result<Json<SimulationResult>, JsonRejection>,
) -> Result<Json<StoreResponse<SimulationResult>>, AppError> {
    let Json(result) = body?;
    if result.id.trim().is_empty() {
        return Err(bad_request("id must not be empty"));
    }
    if result.scenario_name.trim().is_empty() {
        return Err(bad_request("scenarioName must not be empty"));
    }
    let outcome = ctx.store.save_simulation(&result).await;
    Ok(respond(Outcome::new(result, outcome.sync)))
}

async fn handle_delete_simulation(
    State(ctx): State<AppState>,
    Path(id): Path<String>,
) -> Json<StoreResponse<()>> {
    respond(ctx.store.delete_simulation(&id).await)
}

// ============ /uploads ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadRequest {
    name: String,
    #[serde(default)]
    size_bytes: u64,
    #[serde(default)]
    source: String,
}

async fn handle_list_uploads(
    State(ctx): State<AppState>,
) -> Json<StoreResponse<Vec<UploadedFile>>> {
    respond(ctx.store.list_uploads().await)
}

async fn handle_save_upload(
    State(ctx): State<AppState>,
    body: Result<Json<UploadRequest>, JsonRejection>,
) -> Result<Json<StoreResponse<Uploaded>>, AppError> {
    let Json(req) = body?;
    let name = req.name.trim();
    if name.is_empty() {
        return Err(bad_request("name must not be empty"));
    }
    Ok(respond(
        ctx.workflow
            .register_upload(name, req.size_bytes, &req.source)
            .await,
    ))
}

async fn handle_delete_upload(
    State(ctx): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<StoreResponse<()>>, AppError> {
    let Path(id) = id?;
    Ok(respond(ctx.store.delete_upload(id).await))
}

// ============ /analyses ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalysisRequest {
    file_name: String,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    timestamp: Option<String>,
}

async fn handle_list_analyses(
    State(ctx): State<AppState>,
) -> Json<StoreResponse<Vec<AnalysisResult>>> {
    respond(ctx.store.list_analyses().await)
}

async fn handle_save_analysis(
    State(ctx): State<AppState>,
    body: Result<Json<AnalysisRequest>, JsonRejection>,
) -> Result<Json<StoreResponse<AnalysisResult>>, AppError> {
    let Json(req) = body?;
    if req.file_name.trim().is_empty() {
        return Err(bad_request("fileName must not be empty"));
    }
    let result = AnalysisResult {
        file_name: req.file_name,
        data: req.data,
        timestamp: req.timestamp.unwrap_or_else(now_iso),
    };
    let outcome = ctx.store.save_analysis(&result).await;
    Ok(respond(Outcome::new(result, outcome.sync)))
}

async fn handle_get_analysis(
    State(ctx): State<AppState>,
    Path(file_name): Path<String>,
) -> Result<Json<StoreResponse<AnalysisResult>>, AppError> {
    let outcome = ctx.store.get_analysis(&file_name).await;
    let sync = outcome.sync;
    if let Some(result) = outcome.value {
        return Ok(respond(Outcome::new(result, sync)));
    }
    // Absent and unreadable are different answers.
    match sync {
        SyncStatus::LocalFailed { reason, .. } => Err(local_storage_failed(format!(
            "could not read analysis for {}: {}",
            file_name, reason
        ))),
        _ => Err(not_found(format!("no analysis for {}", file_name))),
    }
}
