//! Storage contracts and the in-memory reference backend.
//!
//! Two seams separate this crate from its persistence collaborators:
//! [`DocumentStore`] covers document status and chunk persistence, and
//! [`VectorIndex`] covers similarity/lexical retrieval. Production
//! deployments implement these over their database and vector store of
//! choice; [`InMemoryIndex`] implements both for tests and small setups.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::document::{Chunk, Document, DocumentStatus, ElementType, StructuralElement};
use crate::error::{RagError, Result};

/// Persistence contract for documents and their chunks.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Record a new document.
    async fn insert_document(&self, document: &Document) -> Result<()>;

    /// Fetch a document by id.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::NotFound`] when the id is unknown.
    async fn get_document(&self, id: &str) -> Result<Document>;

    /// Persist a status change, clearing or setting the error message.
    async fn update_status(
        &self,
        id: &str,
        status: DocumentStatus,
        error_message: Option<&str>,
    ) -> Result<()>;

    /// Replace the extracted elements for a document version.
    ///
    /// Elements are written once per extraction run and read back when a
    /// later pipeline re-entry skips the extraction stage.
    async fn replace_elements(
        &self,
        document_id: &str,
        elements: &[StructuralElement],
    ) -> Result<()>;

    /// Fetch the extracted elements of a document in page order.
    async fn elements_for_document(&self, document_id: &str) -> Result<Vec<StructuralElement>>;

    /// Replace all chunks for a document.
    ///
    /// Replacement (rather than append) keeps re-runs free of duplicates.
    async fn replace_chunks(&self, document_id: &str, chunks: &[Chunk]) -> Result<()>;

    /// Fetch the chunks of a document ordered by `chunk_index`.
    async fn chunks_for_document(&self, document_id: &str) -> Result<Vec<Chunk>>;

    /// Delete a document and cascade to its chunks.
    async fn delete_document(&self, document_id: &str) -> Result<()>;
}

/// Optional facet filters applied before scoring.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SearchFacets {
    /// Restrict to chunks of these element types.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element_types: Option<Vec<ElementType>>,
    /// Restrict to chunks within this inclusive page range.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_range: Option<(u32, u32)>,
}

impl SearchFacets {
    fn matches(&self, chunk: &Chunk) -> bool {
        if let Some(types) = &self.element_types {
            match chunk.element_type {
                Some(t) if types.contains(&t) => {}
                _ => return false,
            }
        }
        if let Some((lo, hi)) = self.page_range {
            match chunk.page_number {
                Some(p) if p >= lo && p <= hi => {}
                _ => return false,
            }
        }
        true
    }
}

/// A retrieval candidate scored on both axes by the index backend.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// The candidate chunk.
    pub chunk: Chunk,
    /// Cosine similarity against the query embedding.
    pub similarity: f32,
    /// Lexical match score against the query text.
    pub text_score: f32,
}

/// Retrieval contract for the indexed chunk corpus.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or replace embedded chunks in the index.
    async fn upsert(&self, chunks: &[Chunk]) -> Result<()>;

    /// Remove every chunk belonging to a document.
    async fn remove_document(&self, document_id: &str) -> Result<()>;

    /// Return up to `pool` candidates scored on both similarity and lexical
    /// match, ordered by descending similarity.
    async fn candidates(
        &self,
        query_embedding: &[f32],
        query_text: &str,
        pool: usize,
        facets: Option<&SearchFacets>,
    ) -> Result<Vec<Candidate>>;
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude or the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Lowercased alphanumeric terms of a text.
fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Fraction of query terms present in the chunk text.
///
/// A deliberately simple lexical signal: 1.0 when every query term appears,
/// 0.0 when none do. Real deployments substitute their index's FTS score
/// through [`VectorIndex::candidates`].
pub fn lexical_overlap(query: &str, text: &str) -> f32 {
    let query_terms = terms(query);
    if query_terms.is_empty() {
        return 0.0;
    }
    let text_terms = terms(text);
    let hits = query_terms.iter().filter(|t| text_terms.contains(*t)).count();
    hits as f32 / query_terms.len() as f32
}

/// In-memory [`DocumentStore`] + [`VectorIndex`] backed by `HashMap`s under
/// `tokio::sync::RwLock`.
#[derive(Debug, Default)]
pub struct InMemoryIndex {
    documents: RwLock<HashMap<String, Document>>,
    elements: RwLock<HashMap<String, Vec<StructuralElement>>>,
    chunks: RwLock<HashMap<String, Vec<Chunk>>>,
    index: RwLock<HashMap<String, Chunk>>,
}

impl InMemoryIndex {
    /// Create an empty store/index pair.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for InMemoryIndex {
    async fn insert_document(&self, document: &Document) -> Result<()> {
        let mut documents = self.documents.write().await;
        documents.insert(document.id.clone(), document.clone());
        Ok(())
    }

    async fn get_document(&self, id: &str) -> Result<Document> {
        let documents = self.documents.read().await;
        documents.get(id).cloned().ok_or_else(|| RagError::NotFound(id.to_string()))
    }

    async fn update_status(
        &self,
        id: &str,
        status: DocumentStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        let mut documents = self.documents.write().await;
        let document =
            documents.get_mut(id).ok_or_else(|| RagError::NotFound(id.to_string()))?;
        document.status = status;
        document.error_message = error_message.map(|m| m.to_string());
        document.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn replace_elements(
        &self,
        document_id: &str,
        elements: &[StructuralElement],
    ) -> Result<()> {
        let mut stored = self.elements.write().await;
        stored.insert(document_id.to_string(), elements.to_vec());
        Ok(())
    }

    async fn elements_for_document(&self, document_id: &str) -> Result<Vec<StructuralElement>> {
        let stored = self.elements.read().await;
        Ok(stored.get(document_id).cloned().unwrap_or_default())
    }

    async fn replace_chunks(&self, document_id: &str, chunks: &[Chunk]) -> Result<()> {
        let mut stored = self.chunks.write().await;
        stored.insert(document_id.to_string(), chunks.to_vec());
        Ok(())
    }

    async fn chunks_for_document(&self, document_id: &str) -> Result<Vec<Chunk>> {
        let stored = self.chunks.read().await;
        let mut chunks = stored.get(document_id).cloned().unwrap_or_default();
        chunks.sort_by_key(|c| c.chunk_index);
        Ok(chunks)
    }

    async fn delete_document(&self, document_id: &str) -> Result<()> {
        self.documents.write().await.remove(document_id);
        self.elements.write().await.remove(document_id);
        self.chunks.write().await.remove(document_id);
        self.remove_document(document_id).await
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn upsert(&self, chunks: &[Chunk]) -> Result<()> {
        for chunk in chunks {
            if chunk.embedding.is_empty() {
                return Err(RagError::Store {
                    backend: "InMemory".to_string(),
                    message: format!("chunk '{}' has no embedding", chunk.id),
                });
            }
        }
        let mut index = self.index.write().await;
        for chunk in chunks {
            index.insert(chunk.id.clone(), chunk.clone());
        }
        Ok(())
    }

    async fn remove_document(&self, document_id: &str) -> Result<()> {
        let mut index = self.index.write().await;
        index.retain(|_, chunk| chunk.document_id != document_id);
        Ok(())
    }

    async fn candidates(
        &self,
        query_embedding: &[f32],
        query_text: &str,
        pool: usize,
        facets: Option<&SearchFacets>,
    ) -> Result<Vec<Candidate>> {
        let index = self.index.read().await;
        let mut scored: Vec<Candidate> = index
            .values()
            .filter(|&chunk| facets.is_none_or(|f| f.matches(chunk)))
            .map(|chunk| Candidate {
                similarity: cosine_similarity(&chunk.embedding, query_embedding),
                text_score: lexical_overlap(query_text, &chunk.text),
                chunk: chunk.clone(),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.chunk.chunk_index.cmp(&b.chunk.chunk_index))
        });
        scored.truncate(pool);
        Ok(scored)
    }
}
