//! HTTP access to the export API.

use async_trait::async_trait;
use domain::models::{CreateExportResponse, ExportRecord};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

// ============================================================================
// Error Types
// ============================================================================

/// Errors raised while talking to the export API.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Invalid base URL: {0}")]
    InvalidBaseUrl(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Export {0} not found")]
    NotFound(Uuid),

    #[error("Export API returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Invalid response from export API: {0}")]
    Decode(String),
}

/// Error body produced by the server's `ApiError`.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

// ============================================================================
// API Trait
// ============================================================================

/// The three reads and writes the poller needs.
#[async_trait]
pub trait ExportApi: Send + Sync {
    /// `POST /export`
    async fn create_export(&self) -> Result<CreateExportResponse, ClientError>;

    /// `GET /export/{id}`; a missing or expired export is `NotFound`.
    async fn get_export(&self, id: Uuid) -> Result<ExportRecord, ClientError>;

    /// `GET /export/latest`
    async fn latest_export(&self) -> Result<Option<ExportRecord>, ClientError>;
}

/// `ExportApi` over reqwest.
#[derive(Debug, Clone)]
pub struct HttpExportApi {
    client: Client,
    base_url: String,
}

impl HttpExportApi {
    /// `base_url` is the server root, e.g. `http://localhost:8080`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        shared::validation::validate_http_url(base_url)
            .map_err(|_| ClientError::InvalidBaseUrl(base_url.to_string()))?;

        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: shared::validation::normalize_base_url(base_url).to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base_url, path)
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let status = response.status();
    if !status.is_success() {
        let message = match response.json::<ErrorBody>().await {
            Ok(body) => body.message,
            Err(_) => status.canonical_reason().unwrap_or("unknown").to_string(),
        };
        return Err(ClientError::Status {
            status: status.as_u16(),
            message,
        });
    }

    response
        .json::<T>()
        .await
        .map_err(|e| ClientError::Decode(e.to_string()))
}

#[async_trait]
impl ExportApi for HttpExportApi {
    async fn create_export(&self) -> Result<CreateExportResponse, ClientError> {
        let response = self.client.post(self.url("/export")).send().await?;
        let created: CreateExportResponse = decode(response).await?;
        debug!(export_id = %created.id, "Export created");
        Ok(created)
    }

    async fn get_export(&self, id: Uuid) -> Result<ExportRecord, ClientError> {
        let response = self
            .client
            .get(self.url(&format!("/export/{}", id)))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound(id));
        }
        decode(response).await
    }

    async fn latest_export(&self) -> Result<Option<ExportRecord>, ClientError> {
        let response = self.client.get(self.url("/export/latest")).send().await?;
        decode(response).await
    }
}
