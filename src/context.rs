//! Context assembly: ranked results → token-bounded LLM context.
//!
//! [`ContextFormatter`] renders [`SearchResult`]s into a structured text
//! block: category-driven element prioritization, `[ELEMENT_TYPE (Page N)]`
//! prefixes, an optional metadata block per result, and a whole-block token
//! budget.

use serde::{Deserialize, Serialize};

use crate::document::{ElementType, SearchResult};
use crate::error::{RagError, Result};

/// The broad intent category of a query, used to prioritize element types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryCategory {
    /// Specs, numbers, measurements — tables and figures first.
    Technical,
    /// How-to questions — steps and their headings first.
    Procedural,
    /// Explanations — prose first.
    Conceptual,
    /// Diagnosing problems — headings and symptom lists first.
    Troubleshooting,
}

impl QueryCategory {
    /// The fixed priority ordering over all six known element types for
    /// this category. Earlier entries render first.
    pub fn priority_table(&self) -> [ElementType; 6] {
        match self {
            QueryCategory::Technical => [
                ElementType::TableText,
                ElementType::FigureCaption,
                ElementType::Heading,
                ElementType::Paragraph,
                ElementType::ListItem,
                ElementType::Title,
            ],
            QueryCategory::Procedural => [
                ElementType::ListItem,
                ElementType::Heading,
                ElementType::Paragraph,
                ElementType::Title,
                ElementType::TableText,
                ElementType::FigureCaption,
            ],
            QueryCategory::Conceptual => [
                ElementType::Paragraph,
                ElementType::Heading,
                ElementType::Title,
                ElementType::ListItem,
                ElementType::FigureCaption,
                ElementType::TableText,
            ],
            QueryCategory::Troubleshooting => [
                ElementType::Heading,
                ElementType::ListItem,
                ElementType::Paragraph,
                ElementType::TableText,
                ElementType::FigureCaption,
                ElementType::Title,
            ],
        }
    }

    const ALL: [QueryCategory; 4] = [
        QueryCategory::Technical,
        QueryCategory::Procedural,
        QueryCategory::Conceptual,
        QueryCategory::Troubleshooting,
    ];
}

/// Verify every category's priority table covers each known element type
/// exactly once. Intended to run at startup.
///
/// # Errors
///
/// Returns [`RagError::Config`] naming the offending category.
pub fn validate_priority_tables() -> Result<()> {
    for category in QueryCategory::ALL {
        let table = category.priority_table();
        for element_type in ElementType::KNOWN {
            let count = table.iter().filter(|t| **t == element_type).count();
            if count != 1 {
                return Err(RagError::Config(format!(
                    "priority table for {category:?} lists {} {count} times",
                    element_type.as_str()
                )));
            }
        }
    }
    Ok(())
}

/// Options for one formatting invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormatOptions {
    /// Prefix each block with `[ELEMENT_TYPE (Page N)]`.
    pub include_prefixes: bool,
    /// Append a metadata block (source, chunk index, score, type, page,
    /// bbox) to each result.
    pub include_metadata: bool,
    /// Include page numbers in prefixes and metadata.
    pub include_page_numbers: bool,
    /// Include bounding boxes in metadata.
    pub include_bboxes: bool,
    /// Token budget for the assembled context; `None` means unbounded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<usize>,
    /// Query category whose priority table orders the results.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<QueryCategory>,
    /// Explicit element-type priority list; takes precedence over
    /// `category`. May be partial — unlisted types sort last.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prioritize_element_types: Option<Vec<ElementType>>,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            include_prefixes: true,
            include_metadata: false,
            include_page_numbers: true,
            include_bboxes: false,
            max_tokens: None,
            category: None,
            prioritize_element_types: None,
        }
    }
}

/// The assembled context.
#[derive(Debug, Clone)]
pub struct FormattedContext {
    /// The concatenated formatted blocks.
    pub text: String,
    /// The results that made it into the context, in inclusion order.
    pub sources: Vec<SearchResult>,
    /// Estimated token count of `text`; never exceeds the budget when one
    /// was supplied.
    pub total_tokens: usize,
}

/// Estimate the token count of a text.
///
/// Uses the chars/4 heuristic. This is a documented approximation chosen
/// for internal consistency, not parity with any real tokenizer; the
/// budget guarantee in [`ContextFormatter::format`] depends only on this
/// same function being used on both sides.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Separator between rendered blocks.
const BLOCK_SEPARATOR: &str = "\n\n";

/// Formats ranked search results into an LLM-ready context block.
#[derive(Debug, Clone, Default)]
pub struct ContextFormatter;

impl ContextFormatter {
    /// Create a formatter.
    pub fn new() -> Self {
        Self
    }

    /// Assemble a context from ranked results.
    ///
    /// Results are stable-sorted by the priority list when one applies (the
    /// incoming ranking is preserved within each priority class), rendered,
    /// and accumulated until the token budget would be exceeded. A block is
    /// included whole or not at all.
    pub fn format(&self, results: &[SearchResult], options: &FormatOptions) -> FormattedContext {
        let ordered = self.prioritize(results, options);

        let mut text = String::new();
        let mut sources = Vec::new();
        let mut total_tokens = 0usize;

        for result in ordered {
            let block = self.render_block(result, options);
            if block.is_empty() {
                continue;
            }
            let separator = if text.is_empty() { "" } else { BLOCK_SEPARATOR };
            let block_tokens = estimate_tokens(separator) + estimate_tokens(&block);
            if let Some(budget) = options.max_tokens {
                if total_tokens + block_tokens > budget {
                    break;
                }
            }
            text.push_str(separator);
            text.push_str(&block);
            total_tokens += block_tokens;
            sources.push(result.clone());
        }

        FormattedContext { text, sources, total_tokens }
    }

    /// Stable-sort results by the index of their element type in the
    /// effective priority list. Types absent from the list (including
    /// missing/unknown types) sort last; ties keep the original ranking.
    fn prioritize<'a>(
        &self,
        results: &'a [SearchResult],
        options: &FormatOptions,
    ) -> Vec<&'a SearchResult> {
        let priority: Option<Vec<ElementType>> = options
            .prioritize_element_types
            .clone()
            .or_else(|| options.category.map(|c| c.priority_table().to_vec()));

        let mut ordered: Vec<&SearchResult> = results.iter().collect();
        if let Some(priority) = priority {
            let rank = |element_type: Option<ElementType>| -> usize {
                element_type
                    .and_then(|t| priority.iter().position(|p| *p == t))
                    .unwrap_or(usize::MAX)
            };
            ordered.sort_by_key(|r| rank(r.chunk.element_type));
        }
        ordered
    }

    /// Render one result as a block: optional prefix, content, optional
    /// metadata. Lines whose metadata is absent are omitted entirely.
    fn render_block(&self, result: &SearchResult, options: &FormatOptions) -> String {
        let content = result.chunk.text.trim();
        if content.is_empty() {
            return String::new();
        }

        let mut block = String::new();

        if options.include_prefixes {
            if let Some(element_type) = result.chunk.element_type {
                match (options.include_page_numbers, result.chunk.page_number) {
                    (true, Some(page)) => {
                        block.push_str(&format!("[{} (Page {page})] ", element_type.label()));
                    }
                    _ => {
                        block.push_str(&format!("[{}] ", element_type.label()));
                    }
                }
            }
        }
        block.push_str(content);

        if options.include_metadata {
            block.push_str("\n---");
            block.push_str(&format!("\nSource: {}", result.chunk.document_id));
            block.push_str(&format!("\nChunk: {}", result.chunk.chunk_index));
            block.push_str(&format!("\nRelevance: {:.3}", result.hybrid_score));
            if let Some(element_type) = result.chunk.element_type {
                block.push_str(&format!("\nType: {}", element_type.as_str()));
            }
            if options.include_page_numbers {
                if let Some(page) = result.chunk.page_number {
                    block.push_str(&format!("\nPage: {page}"));
                }
            }
            if options.include_bboxes {
                if let Some([x0, y0, x1, y1]) = result.chunk.bbox {
                    block.push_str(&format!("\nBBox: [{x0:.1}, {y0:.1}, {x1:.1}, {y1:.1}]"));
                }
            }
        }

        block
    }
}
