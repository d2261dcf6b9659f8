//! Download link resolution.
//!
//! A link is served only while its export is completed and unexpired. Every
//! other case redirects to a small JSON explanation route.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Redirect, Response},
};
use domain::services::LinkState;
use uuid::Uuid;

use crate::app::AppState;
use crate::config::DownloadMode;
use crate::error::ApiError;

const DOWNLOAD_PREFIX: &str = "/api/v1/download";

/// GET /api/v1/download/:id
pub async fn download_export(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let Ok(id) = id.parse::<Uuid>() else {
        return Ok(explanation_redirect(LinkState::NotFound));
    };

    let resolved = state.lifecycle.resolve_download(id).await?;
    let record = match (resolved.state, resolved.record) {
        (LinkState::Active, Some(record)) => record,
        (other, _) => {
            tracing::info!(export_id = %id, link_state = other.as_path(), "Download refused");
            return Ok(explanation_redirect(other));
        }
    };

    let source_url = &state.config.export.source_url;
    match state.config.download.mode {
        DownloadMode::Redirect => Ok(Redirect::temporary(source_url).into_response()),
        DownloadMode::Proxy => {
            let upstream = state
                .http_client
                .get(source_url)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| {
                    tracing::error!(export_id = %id, error = %e, "Artifact fetch failed");
                    ApiError::ServiceUnavailable("Export file is unavailable".to_string())
                })?;
            let bytes = upstream.bytes().await.map_err(|e| {
                tracing::error!(export_id = %id, error = %e, "Artifact read failed");
                ApiError::ServiceUnavailable("Export file is unavailable".to_string())
            })?;

            let mut response = (StatusCode::OK, Body::from(bytes)).into_response();
            let headers = response.headers_mut();
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/pdf"));
            headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
            if let Ok(value) = HeaderValue::from_str(&format!("inline; filename=\"{}.pdf\"", id)) {
                headers.insert(header::CONTENT_DISPOSITION, value);
            }
            if let Some(expires_at) = record.expires_at {
                if let Ok(value) = HeaderValue::from_str(&expires_at.to_rfc3339()) {
                    headers.insert("x-expires-at", value);
                }
            }
            Ok(response)
        }
    }
}

fn explanation_redirect(state: LinkState) -> Response {
    Redirect::temporary(&format!("{}/{}", DOWNLOAD_PREFIX, state.as_path())).into_response()
}

/// GET /api/v1/download/not-found
pub async fn not_found() -> ApiError {
    ApiError::NotFound("This download link does not exist".to_string())
}

/// GET /api/v1/download/not-ready
pub async fn not_ready() -> ApiError {
    ApiError::Conflict("The export is still being generated. Try again shortly".to_string())
}

/// GET /api/v1/download/expired
pub async fn expired() -> ApiError {
    ApiError::Gone("This download link has expired. Request a new export".to_string())
}
