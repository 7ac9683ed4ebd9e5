//! HTTP server: OpenAI-compatible API plus model/knowledge registration.
//!
//! - [`openai_api`]: Chat completions, model listing, health, metrics
//! - [`admin_api`]: Model and knowledge-base registration
//! - [`streaming`]: SSE streaming of completion chunks
//! - [`auth`]: Bearer API-key extractor
//!
//! When `server.console_dir` is set, its `index.html` is served at `/` and
//! the directory itself under `/static`.

pub mod admin_api;
pub mod auth;
pub mod openai_api;
pub mod streaming;

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::chain::PromptTemplate;
use crate::config::Config;
use crate::knowledge::ingest::Ingestor;
use crate::metrics::{track_requests, Metrics};
use crate::model::BackendFactory;
use crate::registry::Registry;

/// Application state shared across handlers.
pub struct AppState {
    pub registry: Registry,
    pub ingestor: Ingestor,
    pub backends: BackendFactory,
    pub prompt: PromptTemplate,
    pub config: Arc<Config>,
    pub metrics: Arc<Metrics>,
    pub start_time: Instant,
}

impl AppState {
    /// Build fresh state: empty registry, one shared upstream client.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let prompt = PromptTemplate::new(&config.retrieval.prompt_template)?;
        let backends = BackendFactory::new(&config.upstream);
        let ingestor = Ingestor::new(&config, backends.client());

        Ok(Self {
            registry: Registry::new(),
            ingestor,
            backends,
            prompt,
            config: Arc::new(config),
            metrics: Arc::new(Metrics::new()?),
            start_time: Instant::now(),
        })
    }
}

/// Build the axum router with all API routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    let body_limit = state.config.server.max_upload_bytes;
    let timeout = Duration::from_secs(state.config.server.request_timeout_secs);
    let console_dir = state.config.server.console_dir.clone();

    let mut router = Router::new()
        .route("/api/model", post(admin_api::register_model))
        .route("/api/model/{model_id}", delete(admin_api::delete_model))
        .route("/api/knowledge", post(admin_api::register_knowledge))
        .route("/api/knowledge/{kb_id}", delete(admin_api::delete_knowledge))
        .route("/v1/chat/completions", post(openai_api::chat_completions))
        .route("/v1/models", get(openai_api::list_models))
        .route("/health", get(openai_api::health))
        .route("/metrics", get(openai_api::metrics))
        .route_layer(middleware::from_fn_with_state(
            state.metrics.clone(),
            track_requests,
        ));

    if let Some(dir) = console_dir {
        router = router
            .route_service("/", ServeFile::new(dir.join("index.html")))
            .nest_service("/static", ServeDir::new(dir));
    }

    router
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TimeoutLayer::new(timeout))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
