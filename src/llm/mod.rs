//! Black-box model capabilities: embedding and text generation.
//!
//! Pipeline code only sees the [`Embedder`] and [`Generator`] traits, so tests
//! can swap in deterministic stubs and production can point at any of the
//! HTTP providers below.

pub mod embeddings;
pub mod generate;
pub mod prompt;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use embeddings::HttpEmbedder;
pub use generate::HttpGenerator;
pub use prompt::Prompt;

/// Whether a text is being embedded for storage or for lookup. Providers
/// with asymmetric models (Cohere) embed the two differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputKind {
    Document,
    Query,
}

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Declared output dimension. Checked against the index at startup.
    fn dimension(&self) -> usize;

    /// Embed `texts`, returning one vector per input in the same order.
    async fn embed(&self, texts: &[String], kind: InputKind) -> Result<Vec<Vec<f32>>>;
}

#[async_trait]
pub trait Generator: Send + Sync {
    async fn complete(&self, prompt: &Prompt) -> Result<String>;
}
