//! kb-gateway: OpenAI-compatible gateway for dynamically registered chat
//! models and retrieval-augmented knowledge bases.
//!
//! Clients register a backend (OpenAI-compatible, Azure OpenAI or Ollama) and
//! receive an API key; they may also upload a PDF or CSV that is chunked,
//! embedded and indexed. Chat completions are then served through the usual
//! `/v1/chat/completions` route, optionally answered from a knowledge base and
//! optionally streamed as server-sent events.

pub mod chain;
pub mod config;
pub mod error;
pub mod knowledge;
pub mod metrics;
pub mod model;
pub mod registry;
pub mod server;
