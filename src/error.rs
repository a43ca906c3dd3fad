//! Error types for the `ragstack` crate.

use thiserror::Error;

/// Errors that can occur in RAG core operations.
///
/// The taxonomy mirrors how failures propagate: validation, authorization,
/// and configuration errors are returned to the caller before any stage
/// runs; stage failures are caught by the pipeline and recorded on the
/// document instead of crossing the orchestrator boundary.
#[derive(Debug, Error)]
pub enum RagError {
    /// Malformed or out-of-range input rejected before any work starts.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The caller does not own the document they asked to process.
    #[error("Unauthorized: document '{document_id}' is not owned by user '{user_id}'")]
    Unauthorized {
        /// The document that was requested.
        document_id: String,
        /// The user who made the request.
        user_id: String,
    },

    /// An error occurred during structural extraction.
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// An error occurred during document chunking.
    #[error("Chunking error: {0}")]
    Chunking(String),

    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    Embedding {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred in the document store or vector index backend.
    #[error("Store error ({backend}): {message}")]
    Store {
        /// The backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred during result reranking.
    #[error("Reranker error ({reranker}): {message}")]
    Reranker {
        /// The reranker that produced the error.
        reranker: String,
        /// A description of the failure.
        message: String,
    },

    /// A configuration validation error, including a missing retrieval backend.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A referenced document does not exist.
    #[error("Document not found: {0}")]
    NotFound(String),

    /// An error in pipeline orchestration outside any single stage.
    #[error("Pipeline error: {0}")]
    Pipeline(String),
}

/// A convenience result type for RAG core operations.
pub type Result<T> = std::result::Result<T, RagError>;
