//! Registration parameters for each backend kind.

use std::fmt;

use serde::Deserialize;
use serde_json::Value;

use crate::error::GatewayError;
use crate::model::BackendKind;

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Body of a model registration request, discriminated by its `type` field.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ModelSpec {
    #[serde(rename = "openai")]
    OpenAi(OpenAiParams),
    #[serde(rename = "azure")]
    Azure(AzureParams),
    #[serde(rename = "ollama")]
    Ollama(OllamaParams),
}

#[derive(Clone, Deserialize)]
pub struct OpenAiParams {
    pub base_url: String,
    pub api_key: String,
    pub chat_model: String,
}

#[derive(Clone, Deserialize)]
pub struct AzureParams {
    pub deployment_name: String,
    pub api_version: String,
    pub endpoint: String,
    pub api_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OllamaParams {
    #[serde(default = "default_ollama_url")]
    pub base_url: String,
    pub model_name: String,
}

fn default_ollama_url() -> String {
    DEFAULT_OLLAMA_URL.to_string()
}

impl fmt::Debug for OpenAiParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiParams")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("chat_model", &self.chat_model)
            .finish()
    }
}

impl fmt::Debug for AzureParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureParams")
            .field("deployment_name", &self.deployment_name)
            .field("api_version", &self.api_version)
            .field("endpoint", &self.endpoint)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl AzureParams {
    /// Base URL of the deployment; chat calls append `/chat/completions`.
    pub fn deployment_url(&self) -> String {
        format!(
            "{}/openai/deployments/{}",
            self.endpoint.trim_end_matches('/'),
            self.deployment_name
        )
    }
}

impl ModelSpec {
    /// Parse and validate a registration body.
    ///
    /// An unknown or missing `type` and any missing or empty required field
    /// are client errors.
    pub fn parse(body: &[u8]) -> Result<Self, GatewayError> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| GatewayError::invalid(format!("Invalid JSON body: {e}")))?;

        match value.get("type").and_then(Value::as_str) {
            Some("openai" | "azure" | "ollama") => {}
            Some(other) => {
                return Err(GatewayError::invalid(format!("Invalid model type: {other}")))
            }
            None => return Err(GatewayError::invalid("Missing model type")),
        }

        let spec: ModelSpec =
            serde_json::from_value(value).map_err(|e| GatewayError::invalid(e.to_string()))?;
        spec.validate()?;
        Ok(spec)
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            ModelSpec::OpenAi(_) => BackendKind::OpenAi,
            ModelSpec::Azure(_) => BackendKind::Azure,
            ModelSpec::Ollama(_) => BackendKind::Ollama,
        }
    }

    /// Reject empty required parameters.
    pub fn validate(&self) -> Result<(), GatewayError> {
        let fields: Vec<(&str, &str)> = match self {
            ModelSpec::OpenAi(p) => vec![
                ("base_url", p.base_url.as_str()),
                ("api_key", p.api_key.as_str()),
                ("chat_model", p.chat_model.as_str()),
            ],
            ModelSpec::Azure(p) => vec![
                ("deployment_name", p.deployment_name.as_str()),
                ("api_version", p.api_version.as_str()),
                ("endpoint", p.endpoint.as_str()),
                ("api_key", p.api_key.as_str()),
            ],
            ModelSpec::Ollama(p) => vec![
                ("base_url", p.base_url.as_str()),
                ("model_name", p.model_name.as_str()),
            ],
        };

        if let Some((name, _)) = fields.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(GatewayError::invalid(format!(
                "Field `{name}` must not be empty for {} models",
                self.kind()
            )));
        }

        // The deployment name becomes one URL path segment.
        if let ModelSpec::Azure(p) = self {
            let name = p.deployment_name.as_str();
            if name == "." || name == ".." || name.contains(['/', '\\', '?', '#', '%']) {
                return Err(GatewayError::invalid(format!(
                    "Invalid deployment_name: {name}"
                )));
            }
        }
        Ok(())
    }
}
