//! Vector index abstraction.
//!
//! The pipeline only ever reads from the index, so the trait is the query
//! side. Writes happen through the concrete backend during import.

use citewise_core::AppResult;

/// Nearest-neighbour results as parallel arrays, ordered by ascending distance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub ids: Vec<String>,
    pub texts: Vec<String>,
    pub metadatas: Vec<serde_json::Value>,
    /// Cosine distance; `None` when it could not be computed
    pub distances: Vec<Option<f32>>,
}

impl QueryResult {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn push(
        &mut self,
        id: impl Into<String>,
        text: impl Into<String>,
        metadata: serde_json::Value,
        distance: Option<f32>,
    ) {
        self.ids.push(id.into());
        self.texts.push(text.into());
        self.metadatas.push(metadata);
        self.distances.push(distance);
    }
}

/// Trait for vector index backends.
///
/// Implementations are shared across concurrent pipeline invocations.
#[async_trait::async_trait]
pub trait VectorIndex: Send + Sync {
    /// Return up to `n_results` entries nearest to `embedding`.
    async fn query(&self, embedding: &[f32], n_results: usize) -> AppResult<QueryResult>;

    /// Number of stored entries.
    async fn count(&self) -> AppResult<usize>;
}
