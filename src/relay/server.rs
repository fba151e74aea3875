//! HTTP server setup and configuration.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::Request,
    http::{self, HeaderName, HeaderValue},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use super::handlers;
use crate::config::{Config, ConfigError};
use crate::error::{Error, Result};
use crate::upstream::{GeminiClient, GenerativeModel};

/// Response header carrying the per-request correlation ID.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Per-request correlation ID, inserted as a request extension.
#[derive(Debug, Clone, Copy)]
pub struct RequestId(pub Uuid);

/// Shared application state.
///
/// `model` is `None` when no upstream key is configured; the health probe
/// still answers and the generation routes report a configuration error.
#[derive(Clone)]
pub struct AppState {
    pub model: Option<Arc<dyn GenerativeModel>>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config, model: Option<Arc<dyn GenerativeModel>>) -> Self {
        Self {
            model,
            config: Arc::new(config),
        }
    }

    /// The upstream model, or the missing-credential error.
    pub fn model(&self) -> Result<Arc<dyn GenerativeModel>> {
        self.model
            .clone()
            .ok_or_else(|| Error::Config(ConfigError::missing_credential()))
    }
}

async fn assign_request_id(mut request: Request, next: Next) -> Response {
    let id = Uuid::new_v4();
    request.extensions_mut().insert(RequestId(id));

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&id.to_string()) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
    response
}

fn create_cors_layer(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.is_empty() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([http::Method::GET, http::Method::POST, http::Method::OPTIONS])
        .allow_headers([http::header::CONTENT_TYPE])
        .expose_headers([HeaderName::from_static(REQUEST_ID_HEADER)])
        .max_age(Duration::from_secs(3600))
}

/// Create the axum router with all endpoints.
pub fn create_router(state: AppState) -> Router {
    let cors = create_cors_layer(&state.config.server.cors_origins);

    let trace = TraceLayer::new_for_http().make_span_with(|request: &http::Request<Body>| {
        let request_id = request
            .extensions()
            .get::<RequestId>()
            .map(|id| id.0.to_string())
            .unwrap_or_default();
        tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id,
        )
    });

    Router::new()
        .route("/", get(handlers::health))
        .route("/generate", post(handlers::generate))
        .route("/api/extract-jd", post(handlers::extract_jd))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn(assign_request_id))
                .layer(trace)
                .layer(cors),
        )
}

/// Build the Gemini client when a key is configured.
pub fn build_model(config: &Config) -> Result<Option<Arc<dyn GenerativeModel>>> {
    let api_key = match config.api_key() {
        Ok(key) => key.clone(),
        Err(e) => {
            tracing::warn!(error = %e, "Generation routes will fail until a key is set");
            return Ok(None);
        }
    };

    let client = GeminiClient::from_config(&config.upstream, api_key)?;
    tracing::info!(
        model = %client.model_name(),
        base_url = %config.upstream.base_url,
        "Upstream client ready"
    );
    let model: Arc<dyn GenerativeModel> = Arc::new(client);
    Ok(Some(model))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

/// Run the HTTP server.
pub async fn run_server(config: Config) -> anyhow::Result<()> {
    let listen_addr = config.server.listen.clone();

    let model = build_model(&config)?;
    let state = AppState::new(config, model);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    tracing::info!(address = %listen_addr, "Starting jdrelay server");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
