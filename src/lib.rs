//! # ragstack
//!
//! Document ingestion, hybrid retrieval, and bounded context assembly for
//! RAG chat backends.
//!
//! Three pieces form the core:
//!
//! - **Ingestion** — [`ProcessingPipeline`] drives a document through
//!   structural extraction, chunking, and embedding, tracking progress as a
//!   per-document status machine with idempotent re-entry and batch runs
//!   under bounded parallelism.
//! - **Retrieval** — [`SearchEngine`] combines cosine similarity and
//!   lexical match into a hybrid score, optionally reranks the shortlist,
//!   and returns a deterministically ordered result list.
//! - **Assembly** — [`ContextFormatter`] renders ranked results into a
//!   token-bounded, structure-aware context block, and
//!   [`prune_conversation`] bounds multi-turn history without breaking turn
//!   semantics.
//!
//! External collaborators (embedding models, page extraction providers,
//! document and vector storage) plug in behind the [`EmbeddingProvider`],
//! [`PageExtractor`], [`DocumentStore`], and [`VectorIndex`] traits.
//! [`InMemoryIndex`] implements the storage traits for tests and small
//! deployments.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ragstack::{
//!     ContextFormatter, ExtractorConfig, FormatOptions, InMemoryIndex, PipelineConfig,
//!     ProcessingOptions, ProcessingPipeline, SearchConfig, SearchEngine, SearchRequest,
//!     StructuralExtractor,
//! };
//!
//! let storage: Arc<InMemoryIndex> = Arc::new(InMemoryIndex::new());
//! let extractor = Arc::new(StructuralExtractor::new(
//!     ExtractorConfig::new("/srv/documents"),
//!     my_page_extractor,
//! ));
//!
//! let pipeline = ProcessingPipeline::builder()
//!     .config(PipelineConfig::default())
//!     .store(storage.clone())
//!     .index(storage.clone())
//!     .embedder(my_embedder)
//!     .extractor(extractor)
//!     .build()?;
//!
//! pipeline.process_document("doc1", "user1", &ProcessingOptions::default()).await?;
//!
//! let engine = SearchEngine::new(SearchConfig::default(), my_embedder, Some(storage))?;
//! let response = engine.search(&SearchRequest::new("bleed the hydraulic line")).await?;
//! let context = ContextFormatter::new().format(&response.results, &FormatOptions::default());
//! ```

pub mod chunking;
pub mod config;
pub mod context;
pub mod document;
pub mod embedding;
pub mod error;
pub mod extractor;
pub mod history;
pub mod pipeline;
pub mod reranker;
pub mod search;
pub mod store;

pub use chunking::{Chunker, ElementChunker};
pub use config::{
    ChunkerConfig, ExtractorConfig, HybridWeights, PipelineConfig, ProcessingOptions,
    PrunerConfig, RetryPolicy, SearchConfig,
};
pub use context::{
    ContextFormatter, FormatOptions, FormattedContext, QueryCategory, estimate_tokens,
    validate_priority_tables,
};
pub use document::{
    Chunk, ConversationMessage, Document, DocumentStatus, ElementType, MessageRole, SearchResult,
    StructuralElement,
};
pub use embedding::EmbeddingProvider;
pub use error::{RagError, Result};
pub use extractor::{ExtractionOutcome, PageExtractor, StructuralExtractor};
pub use history::{PruneMetrics, PruneOutcome, prune_conversation};
pub use pipeline::{
    BatchOutcome, ProcessingOutcome, ProcessingPipeline, ProcessingPipelineBuilder, Stage,
    StageTiming,
};
pub use reranker::{NoOpReranker, Reranker};
pub use search::{SearchEngine, SearchRequest, SearchResponse, SearchType};
pub use store::{
    Candidate, DocumentStore, InMemoryIndex, SearchFacets, VectorIndex, cosine_similarity,
    lexical_overlap,
};
