//! jdrelay - streaming relay for the Gemini generative-language API
//!
//! This library provides the core functionality for the jdrelay server,
//! including configuration, the upstream client, and the HTTP relay.

pub mod config;
pub mod error;
pub mod relay;
pub mod upstream;

pub use config::Config;
pub use error::{Error, Result};
