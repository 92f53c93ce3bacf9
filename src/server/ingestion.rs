//! POST /ingestion/upload：multipart 字段 `file`

use std::sync::Arc;

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;

use crate::rag::IngestReport;
use crate::server::{ApiError, AppState};

pub async fn upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<IngestReport>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| ApiError::new(StatusCode::BAD_REQUEST, "file name is required"))?;
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.to_string()))?;

        tracing::info!(file = %file_name, size = bytes.len(), "[Ingestion] upload received");
        let report = state.services.ingestion.ingest_bytes(&file_name, &bytes).await?;
        return Ok(Json(report));
    }
    Err(ApiError::new(StatusCode::BAD_REQUEST, "multipart field `file` is required"))
}
