//! Document processing pipeline orchestrator.
//!
//! [`ProcessingPipeline`] drives a document through
//! `uploaded → processing → text_extracted → chunked → embedded → processed`,
//! composing a [`StructuralExtractor`], a [`Chunker`], an
//! [`EmbeddingProvider`], a [`DocumentStore`], and a [`VectorIndex`].
//! Re-entry is idempotent: stages already completed (per the persisted
//! status) are skipped. Batch runs process documents concurrently under a
//! semaphore, with per-document failure isolation.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ragstack::{ProcessingPipeline, PipelineConfig, ProcessingOptions};
//!
//! let pipeline = ProcessingPipeline::builder()
//!     .config(PipelineConfig::default())
//!     .store(store.clone())
//!     .index(store)
//!     .embedder(Arc::new(my_embedder))
//!     .extractor(Arc::new(extractor))
//!     .build()?;
//!
//! let outcome = pipeline.process_document("doc1", "user1", &ProcessingOptions::default()).await?;
//! assert!(outcome.success);
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::chunking::{Chunker, ElementChunker};
use crate::config::{PipelineConfig, ProcessingOptions, RetryPolicy};
use crate::document::{Chunk, Document, DocumentStatus};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::extractor::StructuralExtractor;
use crate::store::{DocumentStore, VectorIndex};

/// One stage of the processing pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Structural extraction of typed elements.
    Extraction,
    /// Splitting elements into chunks.
    Chunking,
    /// Generating and attaching embeddings.
    Embedding,
}

impl Stage {
    fn as_str(&self) -> &'static str {
        match self {
            Stage::Extraction => "extraction",
            Stage::Chunking => "chunking",
            Stage::Embedding => "embedding",
        }
    }
}

/// Wall-clock timing for one executed stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageTiming {
    /// The stage that ran.
    pub stage: Stage,
    /// How long it took.
    pub elapsed: Duration,
}

/// Result of processing one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingOutcome {
    /// The document that was processed.
    pub document_id: String,
    /// Whether the document reached `processed`.
    pub success: bool,
    /// Terminal status after this run.
    pub status: DocumentStatus,
    /// Timings for the stages that actually executed (skipped stages are
    /// absent).
    pub stage_timings: Vec<StageTiming>,
    /// Captured cause when `status` is `error`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregate result of a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOutcome {
    /// Per-document outcomes, in input order.
    pub outcomes: Vec<ProcessingOutcome>,
    /// Number of documents that reached `processed`.
    pub succeeded: usize,
    /// Number of documents that did not.
    pub failed: usize,
}

/// The pipeline orchestrator. Cheap to clone; all collaborators are shared.
#[derive(Clone)]
pub struct ProcessingPipeline {
    config: PipelineConfig,
    store: Arc<dyn DocumentStore>,
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    extractor: Arc<StructuralExtractor>,
    chunker: Arc<dyn Chunker>,
    // One async mutex per document id so two runs of the same document
    // never interleave status writes.
    document_locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl ProcessingPipeline {
    /// Create a new [`ProcessingPipelineBuilder`].
    pub fn builder() -> ProcessingPipelineBuilder {
        ProcessingPipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    async fn lock_for(&self, document_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.document_locks.lock().await;
        locks.entry(document_id.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Drop the tracked entry once no other run holds a handle to it, so
    /// the map does not grow with every distinct document id processed.
    async fn release_lock(&self, document_id: &str, lock: &Arc<Mutex<()>>) {
        let mut locks = self.document_locks.lock().await;
        // Two handles left: the map's and ours. A concurrent run cannot
        // clone a third while we hold the map lock.
        if Arc::strong_count(lock) == 2 {
            locks.remove(document_id);
        }
    }

    #[cfg(test)]
    async fn tracked_lock_count(&self) -> usize {
        self.document_locks.lock().await.len()
    }

    /// Process a single document through all remaining stages.
    ///
    /// Stages already completed (per the persisted status) are skipped; a
    /// `processed` document returns success without doing any work. A stage
    /// failure is recorded on the document as `status = error` and reported
    /// in the outcome, not thrown.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Validation`] for bad options,
    /// [`RagError::NotFound`] for an unknown document, and
    /// [`RagError::Unauthorized`] when `user_id` does not own the document.
    pub async fn process_document(
        &self,
        document_id: &str,
        user_id: &str,
        options: &ProcessingOptions,
    ) -> Result<ProcessingOutcome> {
        options.validate()?;
        let document = self.store.get_document(document_id).await?;
        if document.owner_id != user_id {
            return Err(RagError::Unauthorized {
                document_id: document_id.to_string(),
                user_id: user_id.to_string(),
            });
        }

        let lock = self.lock_for(document_id).await;
        let outcome = {
            let _guard = lock.lock().await;
            // Re-read under the lock; a concurrent run may have advanced it.
            match self.store.get_document(document_id).await {
                Ok(document) => self.run_stages(document, options).await,
                Err(e) => Err(e),
            }
        };
        self.release_lock(document_id, &lock).await;
        outcome
    }

    /// Process a document, retrying failed runs under an explicit policy.
    ///
    /// Retry is a named operation: each attempt is a full re-invocation,
    /// with exponential backoff between attempts. Validation, authorization,
    /// and not-found errors are not retried.
    ///
    /// # Errors
    ///
    /// Same as [`process_document`](Self::process_document), plus
    /// [`RagError::Config`] for an invalid policy.
    pub async fn process_with_retry(
        &self,
        document_id: &str,
        user_id: &str,
        options: &ProcessingOptions,
        policy: &RetryPolicy,
    ) -> Result<ProcessingOutcome> {
        policy.validate()?;
        let mut backoff = policy.backoff;
        let mut outcome = self.process_document(document_id, user_id, options).await?;

        for attempt in 2..=policy.max_attempts {
            if outcome.success {
                break;
            }
            warn!(
                document.id = document_id,
                attempt,
                backoff_ms = backoff.as_millis() as u64,
                "retrying document processing"
            );
            tokio::time::sleep(backoff).await;
            backoff *= 2;
            outcome = self.process_document(document_id, user_id, options).await?;
        }

        Ok(outcome)
    }

    /// Process a batch of documents with bounded parallelism.
    ///
    /// One document's failure never aborts its siblings: rejections
    /// (validation, authorization, not-found) and stage failures alike are
    /// collected into per-document outcomes.
    pub async fn process_batch(
        &self,
        document_ids: &[String],
        user_id: &str,
        options: &ProcessingOptions,
    ) -> BatchOutcome {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency));
        let mut tasks = JoinSet::new();

        for (position, document_id) in document_ids.iter().enumerate() {
            let pipeline = self.clone();
            let semaphore = semaphore.clone();
            let document_id = document_id.clone();
            let user_id = user_id.to_string();
            let options = options.clone();

            tasks.spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => {
                        pipeline.process_document(&document_id, &user_id, &options).await
                    }
                    Err(e) => Err(RagError::Pipeline(format!("batch semaphore closed: {e}"))),
                };
                let outcome = match result {
                    Ok(outcome) => outcome,
                    Err(e) => pipeline.rejection_outcome(&document_id, e).await,
                };
                (position, outcome)
            });
        }

        let mut indexed = Vec::with_capacity(document_ids.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(entry) => indexed.push(entry),
                Err(e) => error!(error = %e, "batch worker panicked"),
            }
        }
        indexed.sort_by_key(|(position, _)| *position);

        let outcomes: Vec<ProcessingOutcome> =
            indexed.into_iter().map(|(_, outcome)| outcome).collect();
        let succeeded = outcomes.iter().filter(|o| o.success).count();
        let failed = outcomes.len() - succeeded;

        info!(total = outcomes.len(), succeeded, failed, "batch processing finished");
        BatchOutcome { outcomes, succeeded, failed }
    }

    /// Outcome for a document rejected before any stage ran.
    ///
    /// The document's persisted status is untouched; the outcome reports
    /// whatever state it is currently in.
    async fn rejection_outcome(&self, document_id: &str, cause: RagError) -> ProcessingOutcome {
        let status = match self.store.get_document(document_id).await {
            Ok(document) => document.status,
            Err(_) => DocumentStatus::Error,
        };
        ProcessingOutcome {
            document_id: document_id.to_string(),
            success: false,
            status,
            stage_timings: Vec::new(),
            error: Some(cause.to_string()),
        }
    }

    /// Run every stage the document has not yet completed.
    async fn run_stages(
        &self,
        document: Document,
        options: &ProcessingOptions,
    ) -> Result<ProcessingOutcome> {
        let document_id = document.id.clone();

        if document.status == DocumentStatus::Processed {
            info!(document.id = %document_id, "document already processed, nothing to do");
            return Ok(ProcessingOutcome {
                document_id,
                success: true,
                status: DocumentStatus::Processed,
                stage_timings: Vec::new(),
                error: None,
            });
        }

        // A document that errored before any forward progress was durable
        // restarts from the beginning; otherwise resume past completed
        // stages. `Processing` is only written when starting fresh so a
        // resumed status never regresses.
        let resume_rank = document.status.rank().unwrap_or(0);
        let mut timings = Vec::new();

        if resume_rank <= 1 {
            self.store.update_status(&document_id, DocumentStatus::Processing, None).await?;
        }

        // Stage 1: extraction.
        if resume_rank < DocumentStatus::TextExtracted.rank().unwrap_or(u8::MAX) {
            match self.run_extraction(&document, options, &mut timings).await {
                Ok(()) => {}
                Err(e) => return self.fail(&document_id, Stage::Extraction, e, timings).await,
            }
        }

        // Stage 2: chunking.
        if resume_rank < DocumentStatus::Chunked.rank().unwrap_or(u8::MAX) {
            match self.run_chunking(&document_id, &mut timings).await {
                Ok(()) => {}
                Err(e) => return self.fail(&document_id, Stage::Chunking, e, timings).await,
            }
        }

        // Stage 3: embedding.
        if resume_rank < DocumentStatus::Embedded.rank().unwrap_or(u8::MAX) {
            match self.run_embedding(&document_id, &mut timings).await {
                Ok(()) => {}
                Err(e) => return self.fail(&document_id, Stage::Embedding, e, timings).await,
            }
        }

        self.store.update_status(&document_id, DocumentStatus::Processed, None).await?;
        info!(document.id = %document_id, stages = timings.len(), "document processed");

        Ok(ProcessingOutcome {
            document_id,
            success: true,
            status: DocumentStatus::Processed,
            stage_timings: timings,
            error: None,
        })
    }

    async fn run_extraction(
        &self,
        document: &Document,
        options: &ProcessingOptions,
        timings: &mut Vec<StageTiming>,
    ) -> Result<()> {
        let started = Instant::now();
        let outcome = self.extractor.extract(&document.source_path, options).await?;
        if let Some(cause) = outcome.error {
            return Err(RagError::Extraction(cause));
        }
        self.store.replace_elements(&document.id, &outcome.elements).await?;
        self.store.update_status(&document.id, DocumentStatus::TextExtracted, None).await?;
        timings.push(StageTiming { stage: Stage::Extraction, elapsed: started.elapsed() });
        Ok(())
    }

    async fn run_chunking(
        &self,
        document_id: &str,
        timings: &mut Vec<StageTiming>,
    ) -> Result<()> {
        let started = Instant::now();
        let elements = self.store.elements_for_document(document_id).await?;
        let chunks = self.chunker.chunk(document_id, &elements)?;
        if chunks.is_empty() {
            return Err(RagError::Chunking(format!(
                "no chunks produced for document '{document_id}'"
            )));
        }
        self.store.replace_chunks(document_id, &chunks).await?;
        self.store.update_status(document_id, DocumentStatus::Chunked, None).await?;
        timings.push(StageTiming { stage: Stage::Chunking, elapsed: started.elapsed() });
        Ok(())
    }

    async fn run_embedding(
        &self,
        document_id: &str,
        timings: &mut Vec<StageTiming>,
    ) -> Result<()> {
        let started = Instant::now();
        let mut chunks: Vec<Chunk> = self.store.chunks_for_document(document_id).await?;
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;
        if embeddings.len() != chunks.len() {
            return Err(RagError::Embedding {
                provider: "batch".to_string(),
                message: format!(
                    "provider returned {} embeddings for {} chunks",
                    embeddings.len(),
                    chunks.len()
                ),
            });
        }
        for (chunk, embedding) in chunks.iter_mut().zip(embeddings) {
            chunk.embedding = embedding;
        }
        self.store.replace_chunks(document_id, &chunks).await?;
        self.index.upsert(&chunks).await?;
        self.store.update_status(document_id, DocumentStatus::Embedded, None).await?;
        timings.push(StageTiming { stage: Stage::Embedding, elapsed: started.elapsed() });
        Ok(())
    }

    /// Record a stage failure on the document and convert it into an
    /// outcome. Stage errors stop at this boundary; they are not re-thrown.
    async fn fail(
        &self,
        document_id: &str,
        stage: Stage,
        cause: RagError,
        timings: Vec<StageTiming>,
    ) -> Result<ProcessingOutcome> {
        let message = format!("{} failed: {cause}", stage.as_str());
        error!(document.id = %document_id, stage = stage.as_str(), error = %cause, "stage failed");
        self.store.update_status(document_id, DocumentStatus::Error, Some(&message)).await?;
        Ok(ProcessingOutcome {
            document_id: document_id.to_string(),
            success: false,
            status: DocumentStatus::Error,
            stage_timings: timings,
            error: Some(message),
        })
    }
}

/// Builder for constructing a [`ProcessingPipeline`].
///
/// All collaborators are required except the chunker, which defaults to an
/// [`ElementChunker`] built from the pipeline config.
#[derive(Default)]
pub struct ProcessingPipelineBuilder {
    config: Option<PipelineConfig>,
    store: Option<Arc<dyn DocumentStore>>,
    index: Option<Arc<dyn VectorIndex>>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    extractor: Option<Arc<StructuralExtractor>>,
    chunker: Option<Arc<dyn Chunker>>,
}

impl ProcessingPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the document store backend.
    pub fn store(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the vector index backend.
    pub fn index(mut self, index: Arc<dyn VectorIndex>) -> Self {
        self.index = Some(index);
        self
    }

    /// Set the embedding provider.
    pub fn embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Set the structural extractor.
    pub fn extractor(mut self, extractor: Arc<StructuralExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Override the default chunker.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Build the [`ProcessingPipeline`], validating config and presence of
    /// all required collaborators.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if the config is inconsistent or a
    /// required collaborator is missing.
    pub fn build(self) -> Result<ProcessingPipeline> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let store =
            self.store.ok_or_else(|| RagError::Config("store is required".to_string()))?;
        let index =
            self.index.ok_or_else(|| RagError::Config("index is required".to_string()))?;
        let embedder =
            self.embedder.ok_or_else(|| RagError::Config("embedder is required".to_string()))?;
        let extractor = self
            .extractor
            .ok_or_else(|| RagError::Config("extractor is required".to_string()))?;
        let chunker = match self.chunker {
            Some(chunker) => chunker,
            None => Arc::new(ElementChunker::new(config.chunker.clone())?),
        };

        Ok(ProcessingPipeline {
            config,
            store,
            index,
            embedder,
            extractor,
            chunker,
            document_locks: Arc::new(Mutex::new(HashMap::new())),
        })
    }
}
