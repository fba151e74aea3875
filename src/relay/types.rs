//! Request and response bodies for the relay endpoints.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Body of `POST /generate`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub prompt: Option<String>,
}

/// Body of `POST /api/extract-jd`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ExtractRequest {
    #[serde(default)]
    pub text: Option<String>,
}

/// `{ success, data }` envelope used by the raw extraction mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawExtractResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RawExtractResponse {
    pub fn ok(data: String) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

/// Return the field's value, or a validation error naming it when it is
/// absent or blank.
pub fn require_non_empty(value: Option<String>, field: &str) -> Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(Error::Validation(format!("Missing {}", field))),
    }
}

impl GenerateRequest {
    pub fn into_prompt(self) -> Result<String> {
        require_non_empty(self.prompt, "prompt")
    }
}

impl ExtractRequest {
    pub fn into_text(self) -> Result<String> {
        require_non_empty(self.text, "text")
    }
}
