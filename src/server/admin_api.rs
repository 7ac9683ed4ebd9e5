//! Registration API for models and knowledge bases.
//!
//! - POST /api/model, DELETE /api/model/{model_id}
//! - POST /api/knowledge (multipart), DELETE /api/knowledge/{kb_id}

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use tracing::info;

use crate::error::GatewayError;
use crate::knowledge::embedding::EmbeddingParams;
use crate::knowledge::ingest::Upload;
use crate::model::spec::ModelSpec;
use crate::registry::generate_id;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct RegisterModelResponse {
    pub model_id: String,
    pub api_key: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterKnowledgeResponse {
    pub kb_id: String,
    pub embedding_model: String,
    pub embedding_base_url: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    fn new(message: &str) -> Json<Self> {
        Json(Self {
            message: message.to_string(),
        })
    }
}

pub async fn register_model(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<(StatusCode, Json<RegisterModelResponse>), GatewayError> {
    let spec = ModelSpec::parse(&body)?;
    info!(spec = ?spec, "Registering model");

    let backend = state.backends.connect(&spec);
    let registration = state.registry.register_model(backend).await;

    Ok((
        StatusCode::CREATED,
        Json(RegisterModelResponse {
            model_id: registration.model_id,
            api_key: registration.api_key,
        }),
    ))
}

pub async fn delete_model(
    State(state): State<Arc<AppState>>,
    Path(model_id): Path<String>,
) -> Result<Json<MessageResponse>, GatewayError> {
    state.registry.delete_model(&model_id).await?;
    Ok(MessageResponse::new("Model deleted successfully"))
}

fn multipart_error(e: MultipartError) -> GatewayError {
    GatewayError::invalid(format!("Malformed multipart body: {}", e.body_text()))
}

/// Fields of a knowledge upload, as received.
#[derive(Default)]
struct KnowledgeForm {
    file: Option<(String, Bytes)>,
    embedding_model: Option<String>,
    base_url: Option<String>,
    api_key: Option<String>,
}

impl KnowledgeForm {
    async fn read(mut multipart: Multipart) -> Result<Self, GatewayError> {
        let mut form = Self::default();
        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            let name = field.name().map(str::to_string);
            match name.as_deref() {
                Some("file") => {
                    let file_name = field.file_name().unwrap_or_default().to_string();
                    let data = field.bytes().await.map_err(multipart_error)?;
                    form.file = Some((file_name, data));
                }
                Some("embedding_model") => {
                    form.embedding_model = Some(field.text().await.map_err(multipart_error)?)
                }
                Some("base_url") => form.base_url = Some(field.text().await.map_err(multipart_error)?),
                Some("api_key") => form.api_key = Some(field.text().await.map_err(multipart_error)?),
                _ => {}
            }
        }
        Ok(form)
    }
}

pub async fn register_knowledge(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<RegisterKnowledgeResponse>), GatewayError> {
    let form = KnowledgeForm::read(multipart).await?;

    // Everything is validated before the first filesystem write.
    let (file_name, data) = form
        .file
        .filter(|(name, _)| !name.trim().is_empty())
        .ok_or_else(|| GatewayError::invalid("No file part with a file name in the request"))?;
    let params = EmbeddingParams::new(form.embedding_model, form.base_url, form.api_key)?;
    let upload = Upload::new(&file_name, data)?;

    let kb_id = generate_id();
    info!(
        kb_id = %kb_id,
        file = upload.file_name(),
        kind = ?upload.kind(),
        embedding_model = %params.model,
        "Ingesting knowledge base"
    );

    let ingested = state.ingestor.ingest(&kb_id, upload, &params).await?;
    state
        .registry
        .register_knowledge_base(ingested.knowledge_base, ingested.embedder)
        .await;

    Ok((
        StatusCode::CREATED,
        Json(RegisterKnowledgeResponse {
            kb_id,
            embedding_model: params.model,
            embedding_base_url: params.base_url,
        }),
    ))
}

pub async fn delete_knowledge(
    State(state): State<Arc<AppState>>,
    Path(kb_id): Path<String>,
) -> Result<Json<MessageResponse>, GatewayError> {
    let knowledge_base = state.registry.delete_knowledge_base(&kb_id).await?;
    state.ingestor.remove_artifacts(&knowledge_base.id).await?;

    info!(kb_id = %kb_id, dir = %knowledge_base.dir.display(), "Knowledge base deleted");
    Ok(MessageResponse::new("Knowledge base deleted successfully"))
}
