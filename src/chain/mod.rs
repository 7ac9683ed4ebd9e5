//! Retrieval-augmented answering.
//!
//! - [`prompt`]: Template with `{context}` and `{question}` slots
//! - [`memory`]: Request-scoped conversation buffer
//! - [`retrieval`]: Retriever plus blocking and streaming answer paths

pub mod memory;
pub mod prompt;
pub mod retrieval;

pub use memory::ChatMemory;
pub use prompt::PromptTemplate;
pub use retrieval::{ChainOutput, RetrievalChain, Retriever};
