//! Job webhook endpoint.
//!
//! Receives the payload posted by `WebhookDispatcher`, claims the export and
//! finishes the job in the background.

use axum::{body::Bytes, extract::State, http::HeaderMap, http::StatusCode, Json};
use domain::models::JobPayload;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::app::AppState;
use crate::error::ApiError;
use crate::services::dispatcher::SIGNATURE_HEADER;

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub success: bool,
}

/// Just enough of a payload to find the export it targets.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobTarget {
    export_id: Uuid,
}

/// POST /api/v1/webhooks/export-job
///
/// Answers 202 once the export is processing. A signed payload that names an
/// export but cannot run marks that export failed before the 400.
pub async fn export_job_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<WebhookResponse>), ApiError> {
    if let Some(secret) = state.config.dispatcher.secret() {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("Missing webhook signature".to_string()))?;
        if !shared::crypto::verify_signature(&body, secret, signature) {
            tracing::warn!("Rejected export job webhook with bad signature");
            return Err(ApiError::Unauthorized(
                "Invalid webhook signature".to_string(),
            ));
        }
    }

    let payload: JobPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            let message = format!("Invalid job payload: {}", e);
            if let Ok(target) = serde_json::from_slice::<JobTarget>(&body) {
                state.processor.reject(target.export_id, &message).await;
            }
            return Err(ApiError::Validation(message));
        }
    };

    if let Err(errors) = payload.validate() {
        state
            .processor
            .reject(payload.export_id, &format!("Invalid job payload: {}", errors))
            .await;
        return Err(errors.into());
    }

    state.processor.start(&payload).await?;

    let processor = Arc::clone(&state.processor);
    tokio::spawn(async move {
        // Errors are logged and recorded by the processor.
        let _ = processor.finish(&payload).await;
    });

    Ok((StatusCode::ACCEPTED, Json(WebhookResponse { success: true })))
}
