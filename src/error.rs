//! Error types for jdrelay.

use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::relay::extract::JobDescription;

/// Result type alias for jdrelay operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Message sent to clients for any upstream failure. Details stay in the logs.
pub const UPSTREAM_FAILURE_MESSAGE: &str = "AI generation failed";

/// Main error type for jdrelay.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Upstream request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Upstream call timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("Extraction failed: {0}")]
    Extraction(String),
}

impl Error {
    pub fn status(&self) -> StatusCode {
        match self {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Error::Config(_) | Error::Upstream(_) | Error::Http(_) | Error::Extraction(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Error::Validation(_) | Error::Config(_) | Error::Timeout(_) => self.to_string(),
            Error::Upstream(_) | Error::Http(_) => UPSTREAM_FAILURE_MESSAGE.to_string(),
            // Callers degrade gracefully on the default object instead of a parse failure.
            Error::Extraction(_) => {
                return (status, axum::Json(JobDescription::default())).into_response();
            }
        };

        let body = serde_json::json!({
            "error": {
                "message": message,
                "type": "relay_error",
                "code": status.as_u16()
            }
        });

        (status, axum::Json(body)).into_response()
    }
}
