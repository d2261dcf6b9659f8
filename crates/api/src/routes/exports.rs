//! Export creation, status and manual transition endpoints.

use axum::{
    extract::{Path, State},
    Json,
};
use domain::errors::ExportError;
use domain::models::{
    CreateExportResponse, ExportRecord, ExportStatus, JobPayload, UpdateExportRequest,
    UpdateExportResponse,
};
use uuid::Uuid;
use validator::Validate;

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::metrics::{
    record_dispatch_failure, record_export_created, record_export_transition,
};

/// Create an export and schedule its job.
///
/// POST /api/v1/export
///
/// If the job cannot be scheduled the export is marked failed and the
/// request fails with 503.
pub async fn create_export(
    State(state): State<AppState>,
) -> Result<Json<CreateExportResponse>, ApiError> {
    let record = state.lifecycle.create().await?;
    record_export_created();

    let payload = JobPayload::new(record.id, state.config.export.source_url.clone());
    if let Err(err) = state
        .lifecycle
        .dispatch_or_fail(state.dispatcher.as_ref(), payload)
        .await
    {
        record_dispatch_failure();
        if matches!(
            err,
            ExportError::Dispatch {
                marked_failed: true,
                ..
            }
        ) {
            record_export_transition(ExportStatus::Failed);
        }
        return Err(err.into());
    }

    Ok(Json(CreateExportResponse::from(&record)))
}

/// Most recent export whose download link is still valid, or `null`.
///
/// GET /api/v1/export/latest
pub async fn get_latest_export(
    State(state): State<AppState>,
) -> Result<Json<Option<ExportRecord>>, ApiError> {
    Ok(Json(state.lifecycle.get_latest_active().await?))
}

/// GET /api/v1/export/:id
pub async fn get_export(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ExportRecord>, ApiError> {
    state
        .lifecycle
        .get_by_id(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Export not found".to_string()))
}

/// Apply a status transition by hand.
///
/// PATCH /api/v1/export/:id
pub async fn update_export(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateExportRequest>,
) -> Result<Json<UpdateExportResponse>, ApiError> {
    request.validate()?;
    let status = request.parsed_status().map_err(ApiError::Validation)?;

    let export = state
        .lifecycle
        .transition(id, status, request.download_url)
        .await?;
    record_export_transition(export.status);

    Ok(Json(UpdateExportResponse {
        success: true,
        export,
    }))
}
