use async_trait::async_trait;

use crate::error::{AdapterError, LlmError};
use crate::types::{
    CatalogRecord, Completion, ExactKey, Prompt, RecordScope, SchemaHint, SearchCriteria, SemanticHit, SourceKind, TextScope,
};

pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}

/// Relational catalog of parts, compatibility, repair guides and articles.
///
/// Absence is reported as `Ok(None)` / an empty vector; errors are reserved for
/// connection and query failures.
#[async_trait]
pub trait StructuredStore: Send + Sync {
    async fn lookup_by_exact_key(&self, key: &ExactKey) -> Result<Option<CatalogRecord>, AdapterError>;

    async fn filtered_search(&self, criteria: &SearchCriteria, limit: usize) -> Result<Vec<CatalogRecord>, AdapterError>;

    /// Results are ordered by the store's own relevance, best first.
    async fn full_text_search(&self, text: &str, scope: &TextScope, limit: usize) -> Result<Vec<CatalogRecord>, AdapterError>;

    /// Number of records stored under `scope`.
    async fn count(&self, scope: RecordScope) -> Result<usize, AdapterError>;
}

#[async_trait]
pub trait SemanticStore: Send + Sync {
    /// Hits ordered by descending similarity; `source_filter` restricts the
    /// source-type tags considered (all when `None`).
    async fn nearest_neighbors(&self, text: &str, k: usize, source_filter: Option<&[SourceKind]>) -> Result<Vec<SemanticHit>, AdapterError>;
}

#[async_trait]
pub trait LlmCaller: Send + Sync {
    async fn complete(&self, prompt: &Prompt, schema: Option<&SchemaHint>) -> Result<Completion, LlmError>;
}
