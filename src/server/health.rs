use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use crate::core::{check_cache, check_llm, check_vector_store, HealthReport};
use crate::server::{ApiError, AppState};

fn respond(report: HealthReport) -> Result<Json<Value>, ApiError> {
    if report.healthy {
        Ok(Json(json!({ "status": "ok", "backend": report.backend })))
    } else {
        Err(ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            format!(
                "{} ({}) unavailable: {}",
                report.component,
                report.backend,
                report.detail.unwrap_or_default()
            ),
        ))
    }
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn health_llm(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    respond(check_llm(state.services.llm.as_ref()).await)
}

pub async fn health_cache(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    respond(check_cache(state.services.cache.as_ref()).await)
}

pub async fn health_vector(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    respond(check_vector_store(state.services.index.as_ref()).await)
}
