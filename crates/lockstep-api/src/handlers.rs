//! API Handlers
use crate::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use lockstep_core::{
    ConfigError, Orchestrator, OrchestratorConfig, RunError, RunReport, RunResult, SessionState,
    SetupError,
};
use lockstep_stages::{Catalog, CatalogError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

/// Either the name of a shipped catalog or an inline one
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CatalogSource {
    Builtin(String),
    Inline(Catalog),
}

impl CatalogSource {
    fn load(self) -> Result<Catalog, CatalogError> {
        match self {
            CatalogSource::Builtin(name) => Catalog::builtin(&name),
            CatalogSource::Inline(catalog) => {
                catalog.validate()?;
                Ok(catalog)
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    pub catalog: CatalogSource,
    #[serde(default)]
    pub initial_state: SessionState,
    #[serde(default)]
    pub config: Option<OrchestratorConfig>,
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Setup(#[from] SetupError),

    #[error(transparent)]
    Run(#[from] RunError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        match self {
            ApiError::Catalog(_) | ApiError::Config(_) | ApiError::Setup(_) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "error": message })),
            )
                .into_response(),
            ApiError::Run(RunError::RollbackFailed {
                stage_index,
                reason,
                cause,
                transitions,
            }) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": message,
                    "stage_index": stage_index,
                    "reason": reason,
                    "cause": cause,
                    "transitions": transitions,
                })),
            )
                .into_response(),
            ApiError::Run(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": message })),
            )
                .into_response(),
        }
    }
}

pub async fn create_run(
    State(state): State<AppState>,
    Json(request): Json<RunRequest>,
) -> Result<Json<RunReport>, ApiError> {
    let outcome = execute(request, state.timeout_ceiling).await;

    let label = match &outcome {
        Ok(report) => match report.result {
            RunResult::Committed { .. } => "committed",
            RunResult::RolledBack { .. } => "rolled_back",
        },
        Err(ApiError::Run(_)) => "rollback_failed",
        Err(_) => "rejected",
    };
    state.metrics.observe(label);

    outcome.map(Json)
}

/// Requests cannot lift or disable the server's timeout ceiling
async fn execute(request: RunRequest, ceiling: Duration) -> Result<RunReport, ApiError> {
    let config = request.config.unwrap_or_default();
    config.validate()?;
    let config = config.capped(ceiling);

    let registry = request.catalog.load()?.into_registry()?;
    let orchestrator = Orchestrator::with_config(&registry, config)?;

    tracing::info!(stages = orchestrator.stage_count(), "starting run");
    Ok(orchestrator.run_with_report(request.initial_state).await?)
}

pub async fn list_catalogs() -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({ "catalogs": Catalog::builtin_names() })),
    )
}

pub async fn health() -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({ "status": "ok", "version": lockstep_core::LOCKSTEP_VERSION })),
    )
}

pub async fn metrics(State(state): State<AppState>) -> Response {
    match state.metrics.encode() {
        Ok(body) => (StatusCode::OK, body).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}
