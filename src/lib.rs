//! # founder-rag
//!
//! Retrieval-augmented question answering over a fixed set of startup
//! founder records. Answers are generated only from retrieved evidence and
//! cite the records they rely on; with no evidence the pipeline refuses.
//!
//! ## Architecture
//!
//! ```text
//!   founders.json ──► Record Store ──► generation N
//!                          │
//!            ┌─────────────┴─────────────┐
//!            ▼                           ▼
//!   ┌─────────────────┐         ┌─────────────────┐
//!   │ Embedding Index │         │  Keyword Index  │
//!   │ (hash reuse,    │         │  (tantivy BM25) │
//!   │  normalized)    │         └────────┬────────┘
//!   └────────┬────────┘                  │
//!            │                           │
//!   query ──► Query Encoder              │
//!            │                           │
//!            ▼                           │
//!   ┌─────────────────┐                  │
//!   │ cosine >= floor │◄─────────────────┘
//!   │ RRF over admitted, diversity caps  │
//!   └────────┬────────┘
//!            ▼
//!   ┌─────────────────┐
//!   │ Context (chars) │  greedy, rank order
//!   └────────┬────────┘
//!            ▼
//!   ┌─────────────────┐
//!   │   Generation    │  refusal if empty, [id] citations
//!   └────────┬────────┘
//!            ▼
//!         Answer
//! ```
//!
//! ## Module Overview
//!
//! - [`config`] - Environment-based configuration, validated once at startup
//! - [`models`] - Shared data types: `Record`, `RetrievalResult`, `AssembledContext`, `Answer`
//! - [`store`] - Generation-stamped record snapshots and the JSON loader
//! - [`search::vector`] - Normalized in-memory vector index with content-hash reuse and persistence
//! - [`search::keyword`] - BM25 full-text index powered by tantivy
//! - [`search::hybrid`] - Weighted Reciprocal Rank Fusion
//! - [`encoder`] - Query text to vector through the indexing embedder
//! - [`retriever`] - Floor, fusion and diversity capping
//! - [`context`] - Budgeted snippet packing
//! - [`generation`] - Grounded prompt, citation validation, refusal
//! - [`llm`] - `Embedder`/`Generator` traits with Ollama, OpenAI and Cohere clients
//! - [`pipeline`] - Owns everything above; `load_records`, `search`, `ask`, `persist_index`

pub mod config;
pub mod context;
pub mod encoder;
pub mod error;
pub mod generation;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod retriever;
pub mod search;
pub mod store;

#[cfg(test)]
mod test_support;

pub use error::{RagError, Result};
pub use pipeline::{LoadReport, Pipeline};
