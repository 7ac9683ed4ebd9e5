//! Bearer API-key authentication for the OpenAI-compatible routes.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use tracing::debug;

use crate::error::GatewayError;
use crate::server::AppState;

/// The model bound to the caller's API key.
///
/// Resolved from request headers only, so it rejects before any body is read.
#[derive(Debug, Clone)]
pub struct ApiKeyAuth {
    pub model_id: String,
}

/// The credential is the last whitespace-separated token of the header value.
pub fn bearer_token(header: &str) -> Option<&str> {
    header.split_whitespace().last()
}

impl FromRequestParts<Arc<AppState>> for ApiKeyAuth {
    type Rejection = GatewayError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(bearer_token)
            .ok_or(GatewayError::Unauthorized)?;

        let model_id = state
            .registry
            .lookup_model_by_key(token)
            .await
            .ok_or(GatewayError::Unauthorized)?;

        debug!(model_id = %model_id, "Authenticated request");
        Ok(Self { model_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_token_takes_last_segment() {
        assert_eq!(bearer_token("Bearer sk-abc"), Some("sk-abc"));
        assert_eq!(bearer_token("sk-abc"), Some("sk-abc"));
        assert_eq!(bearer_token("Bearer   sk-abc  "), Some("sk-abc"));
        assert_eq!(bearer_token("   "), None);
    }
}
