//! HTTP surface over the [`Orchestrator`].
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/{scope}_description` | Descriptive analysis |
//! | `POST` | `/{scope}_cqual_analysis` | Code-quality analysis |
//! | `POST` | `/{scope}_sec_analysis` | Security analysis |
//! | `POST` | `/init` | Clone a repository if absent |
//! | `POST` | `/cache/flush` | Remove all cached results |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! `{scope}` is `file`, `folder` or `repo`. Analysis requests take
//! `{"path": "...", "force_recompute": false}`; for `repo` the path may be
//! a git URL. The target travels with each request: there is no
//! server-side notion of a "current" repository.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "path not found: /tmp/x.rs" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404),
//! `analysis_failed` (502), `internal` (500).

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::config::Config;
use crate::error::AnalysisError;
use crate::mode::AnalysisMode;
use crate::models::{AggregatedResult, Analysis};
use crate::orchestrator::{Orchestrator, Scope};

#[derive(Clone)]
struct AppState {
    orchestrator: Arc<Orchestrator>,
}

/// Start the server on `[server].bind` and run until the process exits.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let orchestrator = Arc::new(Orchestrator::from_config(config)?);
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(bind = %config.server.bind, "listening");
    axum::serve(listener, router(orchestrator)).await?;
    Ok(())
}

/// Build the application router. Exposed so callers can serve it on a
/// listener of their choosing.
pub fn router(orchestrator: Arc<Orchestrator>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut app = Router::new();
    for scope in [Scope::File, Scope::Folder, Scope::Repo] {
        for mode in AnalysisMode::ALL {
            app = app.route(
                &format!("/{}", endpoint_name(scope, mode)),
                post(
                    move |state: State<AppState>,
                          body: Result<Json<AnalysisRequest>, JsonRejection>| {
                        handle_analysis(state, scope, mode, body)
                    },
                ),
            );
        }
    }

    app.route("/init", post(handle_init))
        .route("/cache/flush", post(handle_flush))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(AppState { orchestrator })
}

/// Route name for a scope/mode pair, e.g. `folder_sec_analysis`.
pub fn endpoint_name(scope: Scope, mode: AnalysisMode) -> String {
    let suffix = match mode {
        AnalysisMode::Descriptive => "description",
        AnalysisMode::Quality => "cqual_analysis",
        AnalysisMode::Security => "sec_analysis",
    };
    format!("{}_{}", scope.as_str(), suffix)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
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
                code: self.code,
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

impl From<AnalysisError> for AppError {
    fn from(err: AnalysisError) -> Self {
        let message = err.to_string();
        match err {
            AnalysisError::NotFound(_) => AppError {
                status: StatusCode::NOT_FOUND,
                code: "not_found",
                message,
            },
            AnalysisError::InvalidTarget(_) => bad_request(message),
            e if e.is_collaborator_failure() => AppError {
                status: StatusCode::BAD_GATEWAY,
                code: "analysis_failed",
                message,
            },
            _ => {
                error!(error = %message, "request failed");
                AppError {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    code: "internal",
                    message,
                }
            }
        }
    }
}

/// Unwrap a JSON body, reporting malformed bodies in the error contract.
fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    body.map(|Json(v)| v)
        .map_err(|e| bad_request(e.body_text()))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============ POST /{scope}_{mode} ============

#[derive(Deserialize)]
struct AnalysisRequest {
    path: String,
    #[serde(default)]
    force_recompute: bool,
}

/// Response body shared with the CLI's `analyze` output.
#[derive(Debug, Serialize)]
pub struct AnalysisResponse {
    pub path: String,
    pub analysis_type: &'static str,
    #[serde(flatten)]
    pub result: AggregatedResult,
    pub cached: bool,
}

impl AnalysisResponse {
    pub fn new(path: String, mode: AnalysisMode, analysis: Analysis) -> Self {
        Self {
            path,
            analysis_type: mode.analysis_type(),
            result: analysis.result,
            cached: analysis.cached,
        }
    }
}

async fn handle_analysis(
    State(state): State<AppState>,
    scope: Scope,
    mode: AnalysisMode,
    body: Result<Json<AnalysisRequest>, JsonRejection>,
) -> Result<Json<AnalysisResponse>, AppError> {
    let req = json_body(body)?;
    if req.path.trim().is_empty() {
        return Err(bad_request("path must not be empty"));
    }

    let analysis = state
        .orchestrator
        .run(scope, &req.path, mode, req.force_recompute)
        .await?;
    Ok(Json(AnalysisResponse::new(req.path, mode, analysis)))
}

// ============ POST /init ============

#[derive(Deserialize)]
struct InitRequest {
    url: String,
}

#[derive(Serialize)]
struct InitResponse {
    path: String,
}

async fn handle_init(
    State(state): State<AppState>,
    body: Result<Json<InitRequest>, JsonRejection>,
) -> Result<Json<InitResponse>, AppError> {
    let req = json_body(body)?;
    if req.url.trim().is_empty() {
        return Err(bad_request("url must not be empty"));
    }
    let path = state.orchestrator.clone_repo(&req.url).await?;
    Ok(Json(InitResponse {
        path: path.display().to_string(),
    }))
}

// ============ POST /cache/flush ============

async fn handle_flush(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    state.orchestrator.store().flush().await.map_err(|e| AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: e.to_string(),
    })?;
    Ok(Json(serde_json::json!({ "flushed": true })))
}
