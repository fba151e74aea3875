//! HTTP relay module.
//!
//! Accepts generation and extraction requests, forwards them to the
//! upstream model, and adapts the result into the outbound response.

pub mod extract;
mod handlers;
mod server;
pub mod stream;
pub mod types;

pub use extract::{parse_extraction, strip_code_fences, JobDescription};
pub use handlers::HEALTH_MESSAGE;
pub use server::{build_model, create_router, run_server, AppState, RequestId, REQUEST_ID_HEADER};
pub use types::{ExtractRequest, GenerateRequest, RawExtractResponse};
