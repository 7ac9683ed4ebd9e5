//! Prometheus metrics owned by the application state.

use std::sync::Arc;

use axum::extract::{MatchedPath, Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use tracing::error;

use crate::registry::RegistryCounts;

pub struct Metrics {
    registry: Registry,
    requests: IntCounterVec,
    registered_models: IntGauge,
    knowledge_bases: IntGauge,
    active_streams: IntGauge,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests = IntCounterVec::new(
            Opts::new("kb_gateway_requests_total", "HTTP requests by route and status"),
            &["route", "status"],
        )?;
        let registered_models =
            IntGauge::new("kb_gateway_registered_models", "Currently registered chat models")?;
        let knowledge_bases =
            IntGauge::new("kb_gateway_knowledge_bases", "Currently registered knowledge bases")?;
        let active_streams =
            IntGauge::new("kb_gateway_active_streams", "Open streaming chat responses")?;

        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(registered_models.clone()))?;
        registry.register(Box::new(knowledge_bases.clone()))?;
        registry.register(Box::new(active_streams.clone()))?;

        Ok(Self {
            registry,
            requests,
            registered_models,
            knowledge_bases,
            active_streams,
        })
    }

    pub fn record_request(&self, route: &str, status: StatusCode) {
        self.requests
            .with_label_values(&[route, status.as_str()])
            .inc();
    }

    pub fn set_registry_counts(&self, counts: RegistryCounts) {
        self.registered_models.set(counts.models as i64);
        self.knowledge_bases.set(counts.knowledge_bases as i64);
    }

    /// Gauge handle for [`crate::server::streaming::StreamGuard`].
    pub fn active_streams(&self) -> IntGauge {
        self.active_streams.clone()
    }

    /// Prometheus text exposition of every metric.
    pub fn render(&self) -> Result<Vec<u8>, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(buffer)
    }
}

/// Count every request by matched route template and response status.
pub async fn track_requests(State(metrics): State<Arc<Metrics>>, request: Request, next: Next) -> Response {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(request).await;
    metrics.record_request(&route, response.status());
    response
}

/// Encode metrics as an HTTP response.
pub fn metrics_response(metrics: &Metrics) -> Response {
    match metrics.render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {e}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
