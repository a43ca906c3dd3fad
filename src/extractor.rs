//! Structural extraction: document → page-ordered typed elements.
//!
//! The heavy lifting (page rasterization, layout analysis, OCR) is done by
//! an external provider behind the [`PageExtractor`] trait. The
//! [`StructuralExtractor`] owns everything around it: source path
//! validation, the page cap, per-page failure isolation, and filtering
//! elements against the caller's [`ProcessingOptions`].

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::{ExtractorConfig, ProcessingOptions};
use crate::document::{ElementType, StructuralElement};
use crate::error::{RagError, Result};

/// External provider contract for page-level structural extraction.
///
/// A provider converts one page of a source document into typed, positioned
/// elements. Calls are the only network-bound suspension points in the
/// extraction stage.
#[async_trait]
pub trait PageExtractor: Send + Sync {
    /// Number of pages in the source document.
    async fn page_count(&self, source: &Path) -> Result<u32>;

    /// Extract the structural elements of one page (1-based).
    async fn extract_page(&self, source: &Path, page: u32) -> Result<Vec<StructuralElement>>;
}

/// Result of one extraction run.
#[derive(Debug, Clone)]
pub struct ExtractionOutcome {
    /// Elements produced across all converted pages, in page order.
    pub elements: Vec<StructuralElement>,
    /// Total pages reported by the provider.
    pub total_pages: u32,
    /// Pages actually converted (capped and minus failures).
    pub converted_pages: u32,
    /// Wall-clock time for the whole run.
    pub elapsed: std::time::Duration,
    /// Set only when no elements could be produced at all.
    pub error: Option<String>,
}

/// Orchestrates structural extraction for one document.
pub struct StructuralExtractor {
    config: ExtractorConfig,
    provider: Arc<dyn PageExtractor>,
}

impl StructuralExtractor {
    /// Create an extractor over the given provider.
    pub fn new(config: ExtractorConfig, provider: Arc<dyn PageExtractor>) -> Self {
        Self { config, provider }
    }

    /// Validate a source path and resolve it under the storage root.
    ///
    /// Runs before any I/O: the path must be relative, free of traversal
    /// components, and carry a recognized extension.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Validation`] for absolute paths, `..` components,
    /// or unrecognized extensions.
    pub fn validate_source_path(&self, source: &str) -> Result<PathBuf> {
        let path = Path::new(source);
        if path.is_absolute() {
            return Err(RagError::Validation(format!(
                "source path '{source}' must be relative to the storage root"
            )));
        }
        for component in path.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => {
                    return Err(RagError::Validation(format!(
                        "source path '{source}' contains a traversal component"
                    )));
                }
            }
        }
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .ok_or_else(|| {
                RagError::Validation(format!("source path '{source}' has no file extension"))
            })?;
        if !self.config.allowed_extensions.iter().any(|e| *e == extension) {
            return Err(RagError::Validation(format!(
                "unsupported document extension '.{extension}'"
            )));
        }
        Ok(self.config.storage_root.join(path))
    }

    /// Extract all elements for a document.
    ///
    /// Pages beyond the configured cap are skipped, not failed. A page that
    /// fails extraction is logged and skipped; the run still returns
    /// whatever elements the remaining pages produced. `outcome.error` is
    /// set only when nothing at all could be extracted.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Validation`] for a bad source path and
    /// [`RagError::Extraction`] when the provider cannot even report a page
    /// count.
    pub async fn extract(
        &self,
        source: &str,
        options: &ProcessingOptions,
    ) -> Result<ExtractionOutcome> {
        options.validate()?;
        let resolved = self.validate_source_path(source)?;
        let started = Instant::now();

        let total_pages = self.provider.page_count(&resolved).await.map_err(|e| {
            RagError::Extraction(format!("page count failed for '{source}': {e}"))
        })?;
        let page_limit = total_pages.min(self.config.max_pages);
        if total_pages > self.config.max_pages {
            warn!(
                source,
                total_pages,
                max_pages = self.config.max_pages,
                "page cap reached, extra pages skipped"
            );
        }

        let mut elements = Vec::new();
        let mut converted_pages = 0u32;

        for page in 1..=page_limit {
            match self.provider.extract_page(&resolved, page).await {
                Ok(page_elements) => {
                    converted_pages += 1;
                    elements.extend(
                        page_elements.into_iter().filter_map(|e| self.filter_element(e, options)),
                    );
                }
                Err(e) => {
                    warn!(source, page, error = %e, "page extraction failed, skipping");
                }
            }
        }

        let elapsed = started.elapsed();
        let error = if elements.is_empty() {
            Some(format!("no elements extracted from '{source}'"))
        } else {
            None
        };

        info!(
            source,
            total_pages,
            converted_pages,
            element_count = elements.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "extraction finished"
        );

        Ok(ExtractionOutcome { elements, total_pages, converted_pages, elapsed, error })
    }

    /// Apply per-invocation options to one element.
    fn filter_element(
        &self,
        mut element: StructuralElement,
        options: &ProcessingOptions,
    ) -> Option<StructuralElement> {
        if element.confidence < options.confidence {
            return None;
        }
        match element.element_type {
            ElementType::TableText if !options.extract_tables => return None,
            ElementType::FigureCaption if !options.extract_figures => return None,
            _ => {}
        }
        if !options.preserve_formatting {
            element.text = element.text.split_whitespace().collect::<Vec<_>>().join(" ");
        }
        Some(element)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex;

    /// Provider with a fixed page layout; selected pages can be made to fail.
    struct FakeProvider {
        pages: Vec<Vec<StructuralElement>>,
        failing_pages: Vec<u32>,
        calls: Mutex<Vec<u32>>,
    }

    impl FakeProvider {
        fn new(pages: Vec<Vec<StructuralElement>>) -> Self {
            Self { pages, failing_pages: Vec::new(), calls: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl PageExtractor for FakeProvider {
        async fn page_count(&self, _source: &Path) -> Result<u32> {
            Ok(self.pages.len() as u32)
        }

        async fn extract_page(&self, _source: &Path, page: u32) -> Result<Vec<StructuralElement>> {
            self.calls.lock().await.push(page);
            if self.failing_pages.contains(&page) {
                return Err(RagError::Extraction(format!("page {page} unreadable")));
            }
            Ok(self.pages[(page - 1) as usize].clone())
        }
    }

    fn para(page: u32, text: &str, confidence: f32) -> StructuralElement {
        StructuralElement {
            element_type: ElementType::Paragraph,
            page_number: Some(page),
            bbox: None,
            confidence,
            text: text.to_string(),
        }
    }

    fn extractor(provider: FakeProvider, max_pages: u32) -> StructuralExtractor {
        StructuralExtractor::new(
            ExtractorConfig::new("/srv/storage").with_max_pages(max_pages),
            Arc::new(provider),
        )
    }

    #[test]
    fn traversal_paths_rejected_before_io() {
        let ex = extractor(FakeProvider::new(vec![]), 50);
        assert!(ex.validate_source_path("../etc/passwd").is_err());
        assert!(ex.validate_source_path("/etc/passwd.pdf").is_err());
        assert!(ex.validate_source_path("docs/../../secret.pdf").is_err());
        assert!(ex.validate_source_path("report.exe").is_err());
        assert!(ex.validate_source_path("report").is_err());
        let ok = ex.validate_source_path("user1/report.PDF").unwrap();
        assert!(ok.starts_with("/srv/storage"));
    }

    #[tokio::test]
    async fn page_cap_skips_without_error() {
        let pages = (1..=5).map(|p| vec![para(p, &format!("page {p}"), 0.9)]).collect();
        let ex = extractor(FakeProvider::new(pages), 1);
        let outcome = ex.extract("doc.pdf", &ProcessingOptions::default()).await.unwrap();
        assert_eq!(outcome.total_pages, 5);
        assert_eq!(outcome.converted_pages, 1);
        assert_eq!(outcome.elements.len(), 1);
        assert!(outcome.error.is_none());
    }

    #[tokio::test]
    async fn failed_page_is_skipped_and_rest_survive() {
        let pages = (1..=3).map(|p| vec![para(p, &format!("page {p}"), 0.9)]).collect();
        let mut provider = FakeProvider::new(pages);
        provider.failing_pages = vec![2];
        let ex = extractor(provider, 50);
        let outcome = ex.extract("doc.pdf", &ProcessingOptions::default()).await.unwrap();
        assert_eq!(outcome.converted_pages, 2);
        assert_eq!(outcome.elements.len(), 2);
        assert!(outcome.error.is_none());
    }

    #[tokio::test]
    async fn error_set_only_when_nothing_extracted() {
        let mut provider = FakeProvider::new(vec![vec![para(1, "x", 0.9)]]);
        provider.failing_pages = vec![1];
        let ex = extractor(provider, 50);
        let outcome = ex.extract("doc.pdf", &ProcessingOptions::default()).await.unwrap();
        assert!(outcome.elements.is_empty());
        assert!(outcome.error.is_some());
    }

    #[tokio::test]
    async fn confidence_and_type_filters_apply() {
        let page = vec![
            para(1, "confident", 0.9),
            para(1, "shaky", 0.2),
            StructuralElement {
                element_type: ElementType::TableText,
                page_number: Some(1),
                bbox: None,
                confidence: 0.9,
                text: "a | b".into(),
            },
        ];
        let ex = extractor(FakeProvider::new(vec![page]), 50);
        let options = ProcessingOptions { extract_tables: false, ..Default::default() };
        let outcome = ex.extract("doc.pdf", &options).await.unwrap();
        assert_eq!(outcome.elements.len(), 1);
        assert_eq!(outcome.elements[0].text, "confident");
    }

    #[tokio::test]
    async fn formatting_collapsed_unless_preserved() {
        let page = vec![para(1, "two\n  spaced   words", 0.9)];
        let ex = extractor(FakeProvider::new(vec![page.clone()]), 50);
        let outcome = ex.extract("doc.pdf", &ProcessingOptions::default()).await.unwrap();
        assert_eq!(outcome.elements[0].text, "two spaced words");

        let ex = extractor(FakeProvider::new(vec![page]), 50);
        let options = ProcessingOptions { preserve_formatting: true, ..Default::default() };
        let outcome = ex.extract("doc.pdf", &options).await.unwrap();
        assert_eq!(outcome.elements[0].text, "two\n  spaced   words");
    }
}
