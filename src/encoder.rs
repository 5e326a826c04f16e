//! Query encoder: free text into the index's vector space.

use std::sync::Arc;
use std::time::Duration;

use crate::error::{RagError, Result};
use crate::llm::{Embedder, InputKind};
use crate::search::vector::{embed_with_timeout, normalize};

#[derive(Clone)]
pub struct QueryEncoder {
    embedder: Arc<dyn Embedder>,
    timeout: Duration,
}

impl QueryEncoder {
    pub fn new(embedder: Arc<dyn Embedder>, timeout: Duration) -> Self {
        Self { embedder, timeout }
    }

    pub fn dimension(&self) -> usize {
        self.embedder.dimension()
    }

    /// Startup check that this encoder produces vectors the index can use.
    pub fn verify(&self, index_dimension: usize) -> Result<()> {
        let dimension = self.dimension();
        if dimension != index_dimension {
            return Err(RagError::DimensionMismatch {
                expected: index_dimension,
                actual: dimension,
            });
        }
        Ok(())
    }

    /// Encode `query_text` into a unit-length vector.
    pub async fn encode(&self, query_text: &str) -> Result<Vec<f32>> {
        let texts = [query_text.to_string()];
        let mut vectors =
            embed_with_timeout(self.embedder.as_ref(), &texts, InputKind::Query, self.timeout)
                .await?;

        let mut vector = match vectors.pop() {
            Some(v) if vectors.is_empty() => v,
            _ => {
                return Err(RagError::EncodingFailure(
                    "embedder did not return exactly one query vector".into(),
                ))
            }
        };

        if vector.len() != self.dimension() {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension(),
                actual: vector.len(),
            });
        }
        if !normalize(&mut vector) {
            return Err(RagError::EncodingFailure(
                "query produced a zero or non-finite vector".into(),
            ));
        }
        Ok(vector)
    }
}
