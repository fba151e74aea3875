//! Upstream generative-language service.
//!
//! The relay only talks to the upstream through [`GenerativeModel`], so the
//! HTTP handlers can be driven by any implementation. [`GeminiClient`] is the
//! production one.

mod gemini;
pub mod stream;

pub use gemini::{
    Candidate, Content, GeminiClient, GenerateContentRequest, GenerateContentResponse,
    GenerationConfig, Part, PromptFeedback,
};
pub use stream::{decode_sse_text_stream, SseDecoder};

use futures::stream::BoxStream;

use crate::error::Result;

/// Lazy, finite, non-restartable sequence of generated text fragments.
pub type TextStream = BoxStream<'static, Result<String>>;

/// The two operations the relay needs from the upstream service.
#[async_trait::async_trait]
pub trait GenerativeModel: Send + Sync {
    /// Run a single buffered generation and return the full response text.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Open a streaming generation. Errors opening the call are returned
    /// directly; errors after that arrive as items of the stream.
    async fn generate_stream(&self, prompt: &str) -> Result<TextStream>;

    /// Model identifier, for logging.
    fn model_name(&self) -> &str;
}
