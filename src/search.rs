//! Hybrid search: vector + lexical scoring, optional rerank pass.
//!
//! [`SearchEngine`] embeds the query, pulls dual-scored candidates from the
//! configured [`VectorIndex`], combines the scores with configurable
//! [`HybridWeights`](crate::config::HybridWeights), filters by threshold,
//! and orders results deterministically. An optional [`Reranker`] re-scores
//! the shortlist before final ordering.

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::SearchConfig;
use crate::document::{ConversationMessage, MessageRole, SearchResult};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::reranker::Reranker;
use crate::store::{SearchFacets, VectorIndex};

/// Retrieval strategy for one query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SearchType {
    /// Rank by cosine similarity only.
    Vector,
    /// Rank by the weighted combination of similarity and lexical score.
    Hybrid,
    /// Hybrid, with the query expanded from recent conversation context.
    ContextAware,
    /// Hybrid, run per query sentence and merged by best score per chunk.
    MultiStep,
}

/// One search invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    /// The query text.
    pub query: String,
    /// Retrieval strategy.
    pub search_type: SearchType,
    /// Maximum number of results to return.
    pub limit: usize,
    /// Minimum primary score for a result to be kept, in `[0, 1]`.
    pub threshold: f32,
    /// Optional facet filters applied before scoring.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facets: Option<SearchFacets>,
    /// Recent conversation, consulted by [`SearchType::ContextAware`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Vec<ConversationMessage>>,
}

impl SearchRequest {
    /// Create a hybrid request with default limit and threshold.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            search_type: SearchType::Hybrid,
            limit: 10,
            threshold: 0.0,
            facets: None,
            context: None,
        }
    }

    /// Set the retrieval strategy.
    pub fn with_search_type(mut self, search_type: SearchType) -> Self {
        self.search_type = search_type;
        self
    }

    /// Set the result limit.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Set the score threshold.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Set facet filters.
    pub fn with_facets(mut self, facets: SearchFacets) -> Self {
        self.facets = Some(facets);
        self
    }

    /// Attach conversation context for context-aware search.
    pub fn with_context(mut self, context: Vec<ConversationMessage>) -> Self {
        self.context = Some(context);
        self
    }

    /// Validate request ranges.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Validation`] for an empty query, zero limit, or
    /// out-of-range threshold.
    pub fn validate(&self) -> Result<()> {
        if self.query.trim().is_empty() {
            return Err(RagError::Validation("query must not be empty".to_string()));
        }
        if self.limit == 0 {
            return Err(RagError::Validation("limit must be greater than zero".to_string()));
        }
        if !(0.0..=1.0).contains(&self.threshold) || !self.threshold.is_finite() {
            return Err(RagError::Validation(format!(
                "threshold must be in [0, 1], got {}",
                self.threshold
            )));
        }
        Ok(())
    }
}

/// Ranked results plus query accounting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    /// Results in final ranked order.
    pub results: Vec<SearchResult>,
    /// Candidates that passed the threshold, before the limit was applied.
    pub total_results: usize,
    /// Wall-clock time for the search.
    pub response_time: Duration,
}

/// Hybrid search engine over an indexed chunk corpus.
pub struct SearchEngine {
    config: SearchConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    index: Option<Arc<dyn VectorIndex>>,
    reranker: Option<Arc<dyn Reranker>>,
}

impl SearchEngine {
    /// Create an engine.
    ///
    /// `index` may be `None` at construction time; queries then fail with a
    /// configuration error rather than panicking at startup.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] when the config is invalid.
    pub fn new(
        config: SearchConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Option<Arc<dyn VectorIndex>>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, embedder, index, reranker: None })
    }

    /// Attach a reranker for a secondary relevance pass.
    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Execute one search request.
    ///
    /// Zero matches is a successful, empty response — never an error.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Validation`] for a malformed request,
    /// [`RagError::Config`] when no retrieval backend is configured, and
    /// provider/store errors as they occur.
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        request.validate()?;
        let index = self.index.as_ref().ok_or_else(|| {
            RagError::Config("no retrieval backend configured".to_string())
        })?;
        let started = Instant::now();

        let mut results = match request.search_type {
            SearchType::MultiStep => self.multi_step(index.as_ref(), request).await?,
            _ => {
                let embed_text = self.embeddable_query(request);
                self.single_pass(index.as_ref(), request, &embed_text).await?
            }
        };

        sort_results(&mut results);
        let total_results = results.len();
        results.truncate(request.limit);

        if let Some(reranker) = &self.reranker {
            results = reranker.rerank(&request.query, results).await?;
            sort_results(&mut results);
        }

        let response_time = started.elapsed();
        info!(
            query_len = request.query.len(),
            search_type = ?request.search_type,
            total_results,
            returned = results.len(),
            elapsed_ms = response_time.as_millis() as u64,
            "search completed"
        );

        Ok(SearchResponse { results, total_results, response_time })
    }

    /// The text actually embedded: context-aware searches prepend the most
    /// recent user turns so follow-up questions carry their referent.
    /// Lexical scoring always uses the raw query so exact-term matching is
    /// not diluted.
    fn embeddable_query(&self, request: &SearchRequest) -> String {
        if request.search_type != SearchType::ContextAware {
            return request.query.clone();
        }
        let Some(context) = &request.context else {
            return request.query.clone();
        };
        let recent: Vec<&str> = context
            .iter()
            .rev()
            .filter(|m| m.role == MessageRole::User)
            .take(2)
            .map(|m| m.content.as_str())
            .collect();
        if recent.is_empty() {
            return request.query.clone();
        }
        let mut expanded = recent.into_iter().rev().collect::<Vec<_>>().join("\n");
        expanded.push('\n');
        expanded.push_str(&request.query);
        expanded
    }

    /// Embed, fetch candidates, combine scores, filter by threshold.
    async fn single_pass(
        &self,
        index: &dyn VectorIndex,
        request: &SearchRequest,
        embed_text: &str,
    ) -> Result<Vec<SearchResult>> {
        let query_embedding = self.embedder.embed(embed_text).await?;
        let pool = self.config.candidate_pool.max(request.limit);
        let candidates = index
            .candidates(&query_embedding, &request.query, pool, request.facets.as_ref())
            .await?;

        let weights = self.config.weights;
        let vector_only = request.search_type == SearchType::Vector;

        Ok(candidates
            .into_iter()
            .map(|c| {
                let hybrid_score = if vector_only {
                    c.similarity
                } else {
                    weights.combine(c.similarity, c.text_score)
                };
                SearchResult {
                    chunk: c.chunk,
                    similarity: c.similarity,
                    text_score: c.text_score,
                    hybrid_score,
                    rerank_score: None,
                }
            })
            .filter(|r| {
                let primary = if vector_only { r.similarity } else { r.hybrid_score };
                primary >= request.threshold
            })
            .collect())
    }

    /// Run one sub-query per sentence of the query and merge results,
    /// keeping the best-scoring occurrence of each chunk.
    async fn multi_step(
        &self,
        index: &dyn VectorIndex,
        request: &SearchRequest,
    ) -> Result<Vec<SearchResult>> {
        let sub_queries = split_sentences(&request.query);
        let mut best: std::collections::HashMap<String, SearchResult> =
            std::collections::HashMap::new();

        for sub_query in sub_queries {
            let sub_request = SearchRequest {
                query: sub_query.clone(),
                search_type: SearchType::Hybrid,
                ..request.clone()
            };
            let results = self.single_pass(index, &sub_request, &sub_query).await?;
            for result in results {
                let entry = best.entry(result.chunk.id.clone());
                entry
                    .and_modify(|existing| {
                        if result.hybrid_score > existing.hybrid_score {
                            *existing = result.clone();
                        }
                    })
                    .or_insert(result);
            }
        }

        Ok(best.into_values().collect())
    }
}

/// Deterministic result ordering: rerank score descending (reranked
/// results ahead of unscored ones, keeping the comparison a total order
/// when a reranker scores only part of the shortlist), then hybrid score
/// descending, then `chunk_index` ascending.
fn sort_results(results: &mut [SearchResult]) {
    results.sort_by(|a, b| {
        let by_rerank = match (a.rerank_score, b.rerank_score) {
            (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        by_rerank
            .then_with(|| {
                b.hybrid_score.partial_cmp(&a.hybrid_score).unwrap_or(Ordering::Equal)
            })
            .then_with(|| a.chunk.chunk_index.cmp(&b.chunk.chunk_index))
    });
}

/// Split a query into sentence-sized sub-queries.
fn split_sentences(text: &str) -> Vec<String> {
    let sentences: Vec<String> = text
        .split(['.', '?', '!'])
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect();
    if sentences.is_empty() {
        vec![text.trim().to_string()]
    } else {
        sentences
    }
}
