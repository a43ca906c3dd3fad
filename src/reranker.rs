//! Reranker trait for re-scoring search results.

use async_trait::async_trait;

use crate::document::SearchResult;
use crate::error::Result;

/// A secondary, more expensive relevance pass over an already-ranked
/// shortlist.
///
/// Implementations assign `rerank_score` to each result; the search engine
/// owns the final ordering (rerank score descending, hybrid score breaking
/// ties). Cross-encoder models and LLM-based scorers are typical backends.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Assign rerank scores to the given results for the original query.
    async fn rerank(&self, query: &str, results: Vec<SearchResult>) -> Result<Vec<SearchResult>>;
}

/// A no-op reranker that leaves `rerank_score` unset.
///
/// Useful as a default when no reranking backend is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpReranker;

#[async_trait]
impl Reranker for NoOpReranker {
    async fn rerank(&self, _query: &str, results: Vec<SearchResult>) -> Result<Vec<SearchResult>> {
        Ok(results)
    }
}
