//! HTTP client wrapper for upstream model and embedding APIs.

use std::fmt;
use std::time::Duration;

use reqwest::header::ACCEPT;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::UpstreamConfig;
use crate::error::UpstreamError;

/// Build the process-wide client. Only connecting is bounded here; request
/// deadlines are applied per call by [`HttpClient`], since a streamed body
/// may legitimately outlive any fixed total.
pub fn build_client(config: &UpstreamConfig) -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Per-call deadlines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Whole blocking call; headers only for a streaming call.
    pub request: Duration,
    /// Gap allowed between two reads of a streamed body.
    pub stream_idle: Duration,
}

impl Timeouts {
    pub fn from_config(config: &UpstreamConfig) -> Self {
        Self {
            request: Duration::from_secs(config.request_timeout_secs),
            stream_idle: Duration::from_secs(config.stream_idle_timeout_secs),
        }
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self::from_config(&UpstreamConfig::default())
    }
}

/// How requests authenticate against the upstream.
#[derive(Clone)]
pub enum AuthConfig {
    None,
    /// `Authorization: Bearer {token}`.
    Bearer(String),
    /// Custom header, e.g. Azure's `api-key: {key}`.
    ApiKey { header: String, key: String },
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Bearer(_) => f.debug_tuple("Bearer").field(&"[REDACTED]").finish(),
            Self::ApiKey { header, .. } => f
                .debug_struct("ApiKey")
                .field("header", header)
                .field("key", &"[REDACTED]")
                .finish(),
        }
    }
}

/// Client bound to one upstream base URL and credential.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    base_url: String,
    auth: AuthConfig,
    query: Vec<(String, String)>,
    timeouts: Timeouts,
}

impl HttpClient {
    fn new(client: reqwest::Client, base_url: &str, auth: AuthConfig) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
            query: Vec::new(),
            timeouts: Timeouts::default(),
        }
    }

    pub fn bearer(client: reqwest::Client, base_url: &str, token: &str) -> Self {
        Self::new(client, base_url, AuthConfig::Bearer(token.to_string()))
    }

    pub fn api_key(client: reqwest::Client, base_url: &str, header: &str, key: &str) -> Self {
        Self::new(
            client,
            base_url,
            AuthConfig::ApiKey {
                header: header.to_string(),
                key: key.to_string(),
            },
        )
    }

    pub fn anonymous(client: reqwest::Client, base_url: &str) -> Self {
        Self::new(client, base_url, AuthConfig::None)
    }

    /// Append a query parameter to every request (Azure's `api-version`).
    pub fn with_query(mut self, key: &str, value: &str) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let mut request = self.client.post(self.url(path));
        if !self.query.is_empty() {
            request = request.query(&self.query);
        }
        match &self.auth {
            AuthConfig::None => request,
            AuthConfig::Bearer(token) => request.bearer_auth(token),
            AuthConfig::ApiKey { header, key } => request.header(header.as_str(), key.as_str()),
        }
    }

    /// POST a JSON body and deserialize the JSON response.
    pub async fn post_json<T: Serialize, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<R, UpstreamError> {
        let response = self
            .post(path)
            .timeout(self.timeouts.request)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        serde_json::from_str(&text)
            .map_err(|e| UpstreamError::Decode(format!("{e}; body: {text}")))
    }

    /// POST a JSON body asking for an event stream.
    ///
    /// Returns the successful response; its body is consumed incrementally by
    /// the caller, which bounds each read with [`Timeouts::stream_idle`].
    pub async fn post_stream<T: Serialize>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<reqwest::Response, UpstreamError> {
        let send = self
            .post(path)
            .header(ACCEPT, "text/event-stream")
            .json(body)
            .send();
        let response = tokio::time::timeout(self.timeouts.request, send)
            .await
            .map_err(|_| UpstreamError::Timeout(self.timeouts.request))??;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        Ok(response)
    }
}
