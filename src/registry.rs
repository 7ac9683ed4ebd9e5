//! In-memory registry of models, API keys, knowledge bases and their
//! embedding functions.
//!
//! All four tables sit behind one lock so that a model and its key, or a
//! knowledge base and its embedding function, always appear and disappear
//! together.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::chain::Retriever;
use crate::error::GatewayError;
use crate::knowledge::embedding::Embedder;
use crate::knowledge::KnowledgeBase;
use crate::model::{BackendKind, ChatBackend};

/// Fresh 128-bit random identifier.
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

/// `sk-` followed by 32 lowercase hex digits, unrelated to any model id.
pub fn generate_api_key() -> String {
    format!("sk-{}", Uuid::new_v4().simple())
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Credentials handed back once on model registration.
#[derive(Debug, Clone)]
pub struct Registration {
    pub model_id: String,
    pub api_key: String,
}

/// A registered chat model.
#[derive(Clone)]
pub struct ModelEntry {
    pub id: String,
    pub kind: BackendKind,
    pub backend: Arc<dyn ChatBackend>,
    /// Registration time, seconds since the epoch.
    pub created: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryCounts {
    pub models: usize,
    pub api_keys: usize,
    pub knowledge_bases: usize,
}

#[derive(Default)]
struct Tables {
    models: HashMap<String, ModelEntry>,
    /// API key → model id.
    api_keys: HashMap<String, String>,
    knowledge_bases: HashMap<String, Arc<KnowledgeBase>>,
    /// Knowledge base id → embedding function used to build it.
    embeddings: HashMap<String, Arc<dyn Embedder>>,
}

#[derive(Default)]
pub struct Registry {
    tables: RwLock<Tables>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register_model(&self, backend: Arc<dyn ChatBackend>) -> Registration {
        let model_id = generate_id();
        let api_key = generate_api_key();
        let kind = backend.kind();

        let mut tables = self.tables.write().await;
        tables.models.insert(
            model_id.clone(),
            ModelEntry {
                id: model_id.clone(),
                kind,
                backend,
                created: unix_now(),
            },
        );
        tables.api_keys.insert(api_key.clone(), model_id.clone());
        drop(tables);

        info!(model_id = %model_id, kind = %kind, "Model registered");
        Registration { model_id, api_key }
    }

    /// Remove a model and every key bound to it.
    pub async fn delete_model(&self, model_id: &str) -> Result<(), GatewayError> {
        let mut tables = self.tables.write().await;
        if tables.models.remove(model_id).is_none() {
            return Err(GatewayError::ModelNotFound);
        }
        tables.api_keys.retain(|_, bound| bound != model_id);
        drop(tables);

        info!(model_id, "Model deleted");
        Ok(())
    }

    pub async fn lookup_model_by_key(&self, api_key: &str) -> Option<String> {
        self.tables.read().await.api_keys.get(api_key).cloned()
    }

    pub async fn model(&self, model_id: &str) -> Option<ModelEntry> {
        self.tables.read().await.models.get(model_id).cloned()
    }

    /// Publish a fully ingested knowledge base.
    pub async fn register_knowledge_base(
        &self,
        knowledge_base: KnowledgeBase,
        embedder: Arc<dyn Embedder>,
    ) -> String {
        let kb_id = knowledge_base.id.clone();
        let chunks = knowledge_base.index.len();

        let mut tables = self.tables.write().await;
        tables.knowledge_bases.insert(kb_id.clone(), Arc::new(knowledge_base));
        tables.embeddings.insert(kb_id.clone(), embedder);
        drop(tables);

        info!(kb_id = %kb_id, chunks, "Knowledge base registered");
        kb_id
    }

    /// Remove a knowledge base and its embedding binding. Files on disk are
    /// left to the caller.
    pub async fn delete_knowledge_base(&self, kb_id: &str) -> Result<Arc<KnowledgeBase>, GatewayError> {
        let mut tables = self.tables.write().await;
        let knowledge_base = tables
            .knowledge_bases
            .remove(kb_id)
            .ok_or(GatewayError::KnowledgeBaseNotFound)?;
        tables.embeddings.remove(kb_id);
        Ok(knowledge_base)
    }

    pub async fn knowledge_base(&self, kb_id: &str) -> Option<Arc<KnowledgeBase>> {
        self.tables.read().await.knowledge_bases.get(kb_id).cloned()
    }

    /// Retriever over `kb_id` paired with its own embedding function.
    pub async fn retriever(&self, kb_id: &str, top_k: usize) -> Option<Retriever> {
        let tables = self.tables.read().await;
        let knowledge_base = tables.knowledge_bases.get(kb_id)?.clone();
        let embedder = tables.embeddings.get(kb_id)?.clone();
        Some(Retriever::new(knowledge_base, embedder, top_k))
    }

    pub async fn counts(&self) -> RegistryCounts {
        let tables = self.tables.read().await;
        RegistryCounts {
            models: tables.models.len(),
            api_keys: tables.api_keys.len(),
            knowledge_bases: tables.knowledge_bases.len(),
        }
    }
}
