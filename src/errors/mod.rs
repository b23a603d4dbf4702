use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::models::candle::SeriesError;

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub message: String,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound(message) => (StatusCode::NOT_FOUND, message.clone()),
            AppError::Internal(message) => (StatusCode::INTERNAL_SERVER_ERROR, message.clone()),
        };

        let body = Json(ErrorResponse { message });
        (status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        AppError::Internal(error.to_string())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Validation(#[from] validator::ValidationErrors),
    #[error("instrument {0} is configured twice")]
    DuplicateInstrument(String),
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unsupported interval: {0}")]
    UnsupportedInterval(String),
    #[error("unsupported period: {0}")]
    UnsupportedPeriod(String),
    #[error("invalid candle series: {0}")]
    InvalidSeries(#[from] SeriesError),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("dedup store io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("dedup store json error: {0}")]
    Json(#[from] serde_json::Error),
}
