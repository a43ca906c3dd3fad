//! Configuration for every RAG core component.
//!
//! Each component takes an explicit, validated config struct rather than a
//! dynamic option bag. Builders validate ranges in `build()` and reject
//! inconsistent parameters with [`RagError::Config`].

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Per-invocation options for document processing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessingOptions {
    /// Extract table text elements.
    pub extract_tables: bool,
    /// Extract figure caption elements.
    pub extract_figures: bool,
    /// Keep whitespace formatting in extracted text.
    pub preserve_formatting: bool,
    /// Minimum extractor confidence for an element to be kept, in `[0, 1]`.
    pub confidence: f32,
}

impl Default for ProcessingOptions {
    fn default() -> Self {
        Self {
            extract_tables: true,
            extract_figures: true,
            preserve_formatting: false,
            confidence: 0.5,
        }
    }
}

impl ProcessingOptions {
    /// Validate option ranges.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Validation`] if `confidence` is outside `[0, 1]`.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence) || !self.confidence.is_finite() {
            return Err(RagError::Validation(format!(
                "confidence must be in [0, 1], got {}",
                self.confidence
            )));
        }
        Ok(())
    }
}

/// Configuration for the structural extractor.
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Root directory all source paths must resolve within.
    pub storage_root: PathBuf,
    /// Maximum number of pages converted per document; pages beyond the cap
    /// are skipped, not failed.
    pub max_pages: u32,
    /// Recognized source file extensions (lowercase, no dot).
    pub allowed_extensions: Vec<String>,
}

impl ExtractorConfig {
    /// Create a config with default page cap and extensions.
    pub fn new(storage_root: impl Into<PathBuf>) -> Self {
        Self {
            storage_root: storage_root.into(),
            max_pages: 50,
            allowed_extensions: ["pdf", "png", "jpg", "jpeg", "tiff", "docx", "txt", "md"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    /// Override the page cap.
    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages;
        self
    }
}

/// Configuration for the element chunker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkerConfig {
    /// Target maximum chunk size in characters.
    pub max_chunk_size: usize,
    /// Overlap in characters between consecutive chunks split from one
    /// oversized element.
    pub overlap: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self { max_chunk_size: 512, overlap: 100 }
    }
}

impl ChunkerConfig {
    /// Validate that the overlap leaves forward progress.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if `overlap >= max_chunk_size` or
    /// `max_chunk_size == 0`.
    pub fn validate(&self) -> Result<()> {
        if self.max_chunk_size == 0 {
            return Err(RagError::Config("max_chunk_size must be greater than zero".to_string()));
        }
        if self.overlap >= self.max_chunk_size {
            return Err(RagError::Config(format!(
                "overlap ({}) must be less than max_chunk_size ({})",
                self.overlap, self.max_chunk_size
            )));
        }
        Ok(())
    }
}

/// Configuration for the processing pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum number of documents processed concurrently in a batch.
    pub max_concurrency: usize,
    /// Chunker settings used by the chunking stage.
    pub chunker: ChunkerConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { max_concurrency: 4, chunker: ChunkerConfig::default() }
    }
}

impl PipelineConfig {
    /// Validate pipeline settings.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if `max_concurrency == 0` or the chunker
    /// config is inconsistent.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrency == 0 {
            return Err(RagError::Config("max_concurrency must be greater than zero".to_string()));
        }
        self.chunker.validate()
    }
}

/// Explicit retry policy for pipeline re-invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles after each failure.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, backoff: Duration::from_millis(500) }
    }
}

impl RetryPolicy {
    /// Validate the policy.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if `max_attempts == 0`.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(RagError::Config("max_attempts must be greater than zero".to_string()));
        }
        Ok(())
    }
}

/// Weights for combining vector similarity and lexical score.
///
/// Configurable so deployments can tune between semantic recall (raise
/// `vector`) and exact-term matching (raise `text`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct HybridWeights {
    /// Weight applied to cosine similarity.
    pub vector: f32,
    /// Weight applied to the lexical score.
    pub text: f32,
}

impl Default for HybridWeights {
    fn default() -> Self {
        Self { vector: 0.7, text: 0.3 }
    }
}

impl HybridWeights {
    /// Validate that the weights are usable.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if either weight is negative, not
    /// finite, or the sum is zero.
    pub fn validate(&self) -> Result<()> {
        if !self.vector.is_finite() || !self.text.is_finite() {
            return Err(RagError::Config("hybrid weights must be finite".to_string()));
        }
        if self.vector < 0.0 || self.text < 0.0 {
            return Err(RagError::Config("hybrid weights must be non-negative".to_string()));
        }
        if self.vector + self.text <= 0.0 {
            return Err(RagError::Config("hybrid weights must sum to a positive value".to_string()));
        }
        Ok(())
    }

    /// Combine the two scores into a hybrid score.
    pub fn combine(&self, similarity: f32, text_score: f32) -> f32 {
        (self.vector * similarity + self.text * text_score) / (self.vector + self.text)
    }
}

/// Configuration for the search engine.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Weights used in hybrid scoring.
    pub weights: HybridWeights,
    /// Number of candidates fetched from the index before filtering; must
    /// be at least the requested limit.
    pub candidate_pool: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { weights: HybridWeights::default(), candidate_pool: 50 }
    }
}

impl SearchConfig {
    /// Validate search settings.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] on invalid weights or a zero pool.
    pub fn validate(&self) -> Result<()> {
        self.weights.validate()?;
        if self.candidate_pool == 0 {
            return Err(RagError::Config("candidate_pool must be greater than zero".to_string()));
        }
        Ok(())
    }
}

/// Configuration for conversation pruning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PrunerConfig {
    /// Maximum number of complete turns retained before the current message.
    pub max_turns: usize,
    /// Keep the oldest complete turn in addition to the most recent
    /// `max_turns` turns when truncation occurs.
    pub preserve_first_turn: bool,
}

impl Default for PrunerConfig {
    fn default() -> Self {
        Self { max_turns: 10, preserve_first_turn: false }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_are_valid() {
        ProcessingOptions::default().validate().unwrap();
    }

    #[test]
    fn confidence_out_of_range_rejected() {
        let opts = ProcessingOptions { confidence: 1.5, ..Default::default() };
        assert!(opts.validate().is_err());
        let opts = ProcessingOptions { confidence: -0.1, ..Default::default() };
        assert!(opts.validate().is_err());
    }

    #[test]
    fn chunker_overlap_must_leave_progress() {
        let cfg = ChunkerConfig { max_chunk_size: 100, overlap: 100 };
        assert!(cfg.validate().is_err());
        let cfg = ChunkerConfig { max_chunk_size: 100, overlap: 20 };
        cfg.validate().unwrap();
    }

    #[test]
    fn hybrid_weights_validated() {
        assert!(HybridWeights { vector: -0.1, text: 0.5 }.validate().is_err());
        assert!(HybridWeights { vector: 0.0, text: 0.0 }.validate().is_err());
        HybridWeights::default().validate().unwrap();
    }

    #[test]
    fn hybrid_combine_is_weighted_mean() {
        let w = HybridWeights { vector: 0.5, text: 0.5 };
        let combined = w.combine(0.8, 0.4);
        assert!((combined - 0.6).abs() < 1e-6);
    }

    #[test]
    fn zero_concurrency_rejected() {
        let cfg = PipelineConfig { max_concurrency: 0, ..Default::default() };
        assert!(cfg.validate().is_err());
    }
}
