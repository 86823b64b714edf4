use crate::catalog::selection::{resolve, Cascade, FallbackPolicy, SelectionRequest};
use crate::catalog::MetadataSource;
use crate::chart::{LineChart, LineChartRenderer};
use crate::error::{PipelineError, SelectionError};
use crate::pipeline::extract::IndexExtractor;
use crate::pipeline::orchestrator::{run_selection, DashboardRun, PipelineConfig};
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use thiserror::Error;

/// Shared collaborators for every request.
pub struct AppState {
    pub catalog: Arc<dyn MetadataSource>,
    pub extractor: Arc<dyn IndexExtractor>,
    pub config: PipelineConfig,
    pub fallback: FallbackPolicy,
    pub renderer: LineChartRenderer,
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Selection(#[from] SelectionError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Selection(SelectionError::Catalog(_)) => StatusCode::BAD_GATEWAY,
            Self::Selection(_) => StatusCode::BAD_REQUEST,
            Self::Pipeline(PipelineError::EmptyResult { .. }) => StatusCode::NOT_FOUND,
            Self::Pipeline(PipelineError::Catalog(_)) => StatusCode::BAD_GATEWAY,
            Self::Pipeline(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::Pipeline(PipelineError::EmptyResult { detail }) => serde_json::json!({
                "error": "no data for this selection",
                "detail": detail,
            }),
            other => serde_json::json!({ "error": other.to_string() }),
        };
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::info!("Request rejected ({}): {}", status, self);
        }
        (status, Json(body)).into_response()
    }
}

/// Resolve the request and run the pipeline. Blocking; call off the executor.
pub fn series_for(
    state: &AppState,
    request: &SelectionRequest,
) -> Result<DashboardRun<LineChart>, ApiError> {
    let cascade = resolve(request, state.catalog.as_ref(), state.fallback)?;
    let run = run_selection(
        &cascade.selection,
        state.catalog.as_ref(),
        state.extractor.as_ref(),
        &state.renderer,
        &state.config,
    )?;
    Ok(run)
}

async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

pub async fn get_cascade(
    State(state): State<Arc<AppState>>,
    Query(request): Query<SelectionRequest>,
) -> Result<Json<Cascade>, ApiError> {
    let cascade = blocking(move || {
        resolve(&request, state.catalog.as_ref(), state.fallback).map_err(ApiError::from)
    })
    .await?;
    Ok(Json(cascade))
}

pub async fn get_series(
    State(state): State<Arc<AppState>>,
    Query(request): Query<SelectionRequest>,
) -> Result<Json<DashboardRun<LineChart>>, ApiError> {
    let run = blocking(move || series_for(&state, &request)).await?;
    Ok(Json(run))
}

pub async fn get_series_csv(
    State(state): State<Arc<AppState>>,
    Query(request): Query<SelectionRequest>,
) -> Result<Response, ApiError> {
    let run = blocking(move || series_for(&state, &request)).await?;

    let mut body = Vec::new();
    run.report
        .observed
        .write_csv(&mut body)
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(([(header::CONTENT_TYPE, "text/csv; charset=utf-8")], body).into_response())
}
