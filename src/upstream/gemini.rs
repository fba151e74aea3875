//! Gemini REST client (`generateContent` / `streamGenerateContent`).

use axum::http::header;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::stream::decode_sse_text_stream;
use super::{GenerativeModel, TextStream};
use crate::config::{ApiKey, UpstreamConfig};
use crate::error::{Error, Result};

const API_VERSION: &str = "v1beta";
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Gemini `generateContent` request body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

impl GenerateContentRequest {
    /// A request holding a single user-role message.
    pub fn user_prompt(prompt: &str, generation_config: Option<GenerationConfig>) -> Self {
        Self {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: Some(prompt.to_string()),
                }],
            }],
            generation_config,
        }
    }
}

/// A role-tagged list of parts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

/// One part of a content. Only text parts are relayed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}

/// Gemini response, also the shape of every streamed SSE chunk.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    pub prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Content,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    pub block_reason: Option<String>,
}

impl GenerateContentResponse {
    /// Concatenated text parts of the first candidate.
    ///
    /// A response with no candidates is only an error when the prompt was
    /// blocked; otherwise it carries no text (e.g. a trailing usage chunk).
    pub fn text(&self) -> Result<String> {
        let Some(candidate) = self.candidates.first() else {
            if let Some(reason) = self
                .prompt_feedback
                .as_ref()
                .and_then(|f| f.block_reason.as_deref())
            {
                return Err(Error::Upstream(format!("Prompt blocked: {}", reason)));
            }
            return Ok(String::new());
        };

        Ok(candidate
            .content
            .parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect())
    }
}

/// Gemini client over the public REST API.
///
/// Built once at startup and shared by reference; holds no per-request state.
pub struct GeminiClient {
    http: Client,
    base_url: String,
    model: String,
    api_key: ApiKey,
    generation_config: Option<GenerationConfig>,
}

impl GeminiClient {
    pub fn new(http: Client, upstream: &UpstreamConfig, api_key: ApiKey) -> Self {
        let generation_config = match (upstream.temperature, upstream.max_output_tokens) {
            (None, None) => None,
            (temperature, max_output_tokens) => Some(GenerationConfig {
                temperature,
                max_output_tokens,
            }),
        };

        Self {
            http,
            base_url: upstream.base_url.trim_end_matches('/').to_string(),
            model: upstream
                .model
                .trim()
                .trim_start_matches("models/")
                .to_string(),
            api_key,
            generation_config,
        }
    }

    /// Build a client with its own `reqwest::Client` using the configured timeouts.
    ///
    /// Only the connect timeout is set here: a total timeout would cut long
    /// streams short. Call bounds are applied by the relay.
    pub fn from_config(upstream: &UpstreamConfig, api_key: ApiKey) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(upstream.connect_timeout())
            .build()?;
        Ok(Self::new(http, upstream, api_key))
    }

    fn endpoint(&self, stream: bool) -> String {
        let method = if stream {
            "streamGenerateContent?alt=sse"
        } else {
            "generateContent"
        };
        format!(
            "{}/{}/models/{}:{}",
            self.base_url, API_VERSION, self.model, method
        )
    }

    async fn send(&self, prompt: &str, stream: bool) -> Result<reqwest::Response> {
        let body = GenerateContentRequest::user_prompt(prompt, self.generation_config.clone());

        let response = self
            .http
            .post(self.endpoint(stream))
            .header(header::CONTENT_TYPE, "application/json")
            .header(API_KEY_HEADER, self.api_key.expose_secret())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            tracing::error!(
                status = %status,
                model = %self.model,
                body = %error_body,
                "Gemini returned error"
            );
            return Err(Error::Upstream(format!(
                "Gemini returned {}: {}",
                status, error_body
            )));
        }

        Ok(response)
    }
}

#[async_trait::async_trait]
impl GenerativeModel for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let response: GenerateContentResponse =
            self.send(prompt, false).await?.json().await.map_err(|e| {
                Error::Upstream(format!("Failed to parse Gemini response: {}", e))
            })?;
        response.text()
    }

    async fn generate_stream(&self, prompt: &str) -> Result<TextStream> {
        let response = self.send(prompt, true).await?;
        Ok(decode_sse_text_stream(response.bytes_stream()))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
