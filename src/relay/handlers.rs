//! HTTP request handlers.

use axum::{
    extract::{rejection::JsonRejection, Extension, State},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;

use super::extract::{build_prompt, parse_extraction};
use super::server::{AppState, RequestId};
use super::stream::{bounded, relay_stream};
use super::types::{ExtractRequest, GenerateRequest, RawExtractResponse};
use crate::config::ExtractResponse;
use crate::error::{Error, Result};

/// Body of the health probe.
pub const HEALTH_MESSAGE: &str = "jdrelay is running";

/// Turn a body that could not be read as the expected JSON into a 400.
fn reject_body(rejection: JsonRejection) -> Error {
    Error::Validation(rejection.body_text())
}

/// Log a failed request at a level matching who is at fault.
fn log_failure(request_id: &RequestId, route: &str, error: &Error) {
    match error {
        Error::Validation(_) => {
            tracing::warn!(request_id = %request_id.0, route, error = %error, "Rejected request")
        }
        _ => tracing::error!(request_id = %request_id.0, route, error = %error, "Request failed"),
    }
}

/// Handle GET /
pub async fn health() -> &'static str {
    HEALTH_MESSAGE
}

/// Handle POST /generate
pub async fn generate(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    body: std::result::Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Response> {
    let result = execute_generate(&state, &request_id, body).await;
    if let Err(e) = &result {
        log_failure(&request_id, "/generate", e);
    }
    result
}

async fn execute_generate(
    state: &AppState,
    request_id: &RequestId,
    body: std::result::Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Response> {
    let Json(request) = body.map_err(reject_body)?;
    let prompt = request.into_prompt()?;
    let model = state.model()?;

    tracing::info!(
        request_id = %request_id.0,
        model = %model.model_name(),
        prompt_chars = prompt.chars().count(),
        "Relaying streaming generation"
    );

    relay_stream(
        model,
        &prompt,
        state.config.upstream.timeout(),
        request_id.0.to_string(),
    )
    .await
}

/// Handle POST /api/extract-jd
pub async fn extract_jd(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    body: std::result::Result<Json<ExtractRequest>, JsonRejection>,
) -> Response {
    let mode = state.config.extract.response;

    match execute_extraction(&state, &request_id, body, mode).await {
        Ok(response) => response,
        Err(e) => {
            log_failure(&request_id, "/api/extract-jd", &e);
            match (mode, &e) {
                (_, Error::Validation(_)) | (ExtractResponse::Parsed, _) => e.into_response(),
                (ExtractResponse::Raw, _) => (
                    e.status(),
                    Json(RawExtractResponse::failed("JD extraction failed")),
                )
                    .into_response(),
            }
        }
    }
}

async fn execute_extraction(
    state: &AppState,
    request_id: &RequestId,
    body: std::result::Result<Json<ExtractRequest>, JsonRejection>,
    mode: ExtractResponse,
) -> Result<Response> {
    let Json(request) = body.map_err(reject_body)?;
    let text = request.into_text()?;
    let model = state.model()?;

    let extract = &state.config.extract;
    let prompt = build_prompt(&text, extract.max_input_chars);

    tracing::info!(
        request_id = %request_id.0,
        model = %model.model_name(),
        text_chars = text.chars().count(),
        "Relaying job-description extraction"
    );

    let reply = bounded(state.config.upstream.timeout(), model.generate(&prompt)).await??;

    match mode {
        ExtractResponse::Raw => Ok(Json(RawExtractResponse::ok(reply)).into_response()),
        ExtractResponse::Parsed => {
            let fields = parse_extraction(&reply).inspect_err(|e| {
                tracing::debug!(request_id = %request_id.0, error = %e, reply = %reply, "Unparseable extraction reply");
            })?;
            Ok(Json(Value::Object(fields)).into_response())
        }
    }
}
