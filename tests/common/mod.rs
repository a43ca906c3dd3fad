//! Shared test doubles: a deterministic embedder and a scripted page
//! extractor.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use ragstack::{
    ElementType, EmbeddingProvider, PageExtractor, RagError, Result, StructuralElement,
};

pub const DIM: usize = 64;

/// Deterministic bag-of-words embedder: each term is hashed to a dimension,
/// so texts sharing terms have higher cosine similarity.
pub struct MockEmbedder;

#[async_trait]
impl EmbeddingProvider for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut v = vec![0.0f32; DIM];
        for term in text.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()) {
            let hash = term
                .to_lowercase()
                .bytes()
                .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
            v[(hash % DIM as u64) as usize] += 1.0;
        }
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        Ok(v)
    }

    fn dimensions(&self) -> usize {
        DIM
    }
}

/// An embedder that fails a fixed number of times before recovering.
pub struct FlakyEmbedder {
    pub failures_left: AtomicU32,
}

impl FlakyEmbedder {
    pub fn failing(times: u32) -> Self {
        Self { failures_left: AtomicU32::new(times) }
    }
}

#[async_trait]
impl EmbeddingProvider for FlakyEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let remaining = self.failures_left.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_left.store(remaining - 1, Ordering::SeqCst);
            return Err(RagError::Embedding {
                provider: "flaky".to_string(),
                message: "transient provider outage".to_string(),
            });
        }
        MockEmbedder.embed(text).await
    }

    fn dimensions(&self) -> usize {
        DIM
    }
}

/// Scripted page extractor: one paragraph element per page, with optional
/// failure injection by source file name.
pub struct ScriptedExtractor {
    pub pages: Vec<String>,
    pub fail_sources: Vec<String>,
}

impl ScriptedExtractor {
    pub fn with_pages(pages: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            pages: pages.iter().map(|p| p.to_string()).collect(),
            fail_sources: Vec::new(),
        })
    }
}

#[async_trait]
impl PageExtractor for ScriptedExtractor {
    async fn page_count(&self, _source: &Path) -> Result<u32> {
        Ok(self.pages.len() as u32)
    }

    async fn extract_page(&self, source: &Path, page: u32) -> Result<Vec<StructuralElement>> {
        let name = source.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        if self.fail_sources.iter().any(|f| f == name) {
            return Err(RagError::Extraction(format!("scripted failure for '{name}'")));
        }
        Ok(vec![StructuralElement {
            element_type: ElementType::Paragraph,
            page_number: Some(page),
            bbox: Some([10.0, 10.0, 500.0, 40.0]),
            confidence: 0.95,
            text: self.pages[(page - 1) as usize].clone(),
        }])
    }
}
