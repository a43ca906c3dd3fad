//! Structure-preserving chunking of extracted elements.
//!
//! The [`Chunker`] trait turns the ordered [`StructuralElement`]s of one
//! document into ordered [`Chunk`]s. The provided [`ElementChunker`] keeps
//! each element whole when it fits the target size and splits oversized
//! elements on sentence, then word boundaries, with both halves retaining
//! the element's type, page, and bounding box.

use uuid::Uuid;

use crate::config::ChunkerConfig;
use crate::document::{Chunk, StructuralElement};
use crate::error::Result;

/// A strategy for splitting extracted elements into chunks.
///
/// Implementations produce chunks with text and structural metadata but no
/// embeddings; embeddings are attached later by the pipeline.
pub trait Chunker: Send + Sync {
    /// Split a document's elements into ordered chunks.
    ///
    /// `chunk_index` values in the output are contiguous ascending from 0.
    /// Returns an empty `Vec` when `elements` is empty.
    fn chunk(&self, document_id: &str, elements: &[StructuralElement]) -> Result<Vec<Chunk>>;
}

/// Chunker that respects structural element boundaries.
///
/// An element shorter than `max_chunk_size` always becomes exactly one
/// chunk; a longer element is split hierarchically (paragraphs → sentences
/// → words) with overlap between consecutive pieces.
#[derive(Debug, Clone)]
pub struct ElementChunker {
    config: ChunkerConfig,
}

impl ElementChunker {
    /// Create a chunker from a validated config.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`](crate::RagError::Config) if the config
    /// is inconsistent.
    pub fn new(config: ChunkerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }
}

impl Chunker for ElementChunker {
    fn chunk(&self, document_id: &str, elements: &[StructuralElement]) -> Result<Vec<Chunk>> {
        let mut chunks = Vec::new();
        let mut chunk_index: u32 = 0;

        for element in elements {
            let text = element.text.trim();
            if text.is_empty() {
                continue;
            }

            let pieces = if text.len() <= self.config.max_chunk_size {
                vec![text.to_string()]
            } else {
                let separators = ["\n\n", ". ", "! ", "? ", " "];
                split_and_merge(text, self.config.max_chunk_size, self.config.overlap, &separators)
            };

            for piece in pieces {
                if piece.trim().is_empty() {
                    continue;
                }
                chunks.push(Chunk {
                    id: Uuid::new_v4().to_string(),
                    document_id: document_id.to_string(),
                    chunk_index,
                    element_type: Some(element.element_type),
                    page_number: element.page_number,
                    bbox: element.bbox,
                    text: piece,
                    embedding: Vec::new(),
                });
                chunk_index += 1;
            }
        }

        Ok(chunks)
    }
}

/// Split text by a separator, then merge segments into pieces that respect
/// `max_size`. A segment that still exceeds `max_size` is split further
/// using the next-level separator.
fn split_and_merge(
    text: &str,
    max_size: usize,
    overlap: usize,
    separators: &[&str],
) -> Vec<String> {
    if text.len() <= max_size || separators.is_empty() {
        return split_by_size(text, max_size, overlap);
    }

    let separator = separators[0];
    let remaining = &separators[1..];

    // Keep the separator attached at every level, including the word level,
    // so rejoined pieces never glue adjacent words together.
    let segments: Vec<&str> = split_keeping_separator(text, separator);

    let mut pieces = Vec::new();
    let mut current = String::new();

    for segment in segments {
        if current.is_empty() {
            current = segment.to_string();
        } else if current.len() + segment.len() <= max_size {
            current.push_str(segment);
        } else {
            flush_piece(&mut pieces, current, max_size, overlap, remaining);
            current = segment.to_string();
        }
    }

    if !current.is_empty() {
        flush_piece(&mut pieces, current, max_size, overlap, remaining);
    }

    pieces
}

fn flush_piece(
    pieces: &mut Vec<String>,
    piece: String,
    max_size: usize,
    overlap: usize,
    remaining: &[&str],
) {
    if piece.len() > max_size {
        pieces.extend(split_and_merge(&piece, max_size, overlap, remaining));
    } else {
        pieces.push(piece);
    }
}

/// Split text at a separator while keeping the separator attached to the
/// preceding segment.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    let mut result = Vec::new();
    let mut start = 0;

    while let Some(pos) = text[start..].find(separator) {
        let end = start + pos + separator.len();
        result.push(&text[start..end]);
        start = end;
    }

    if start < text.len() {
        result.push(&text[start..]);
    }

    result
}

/// Character-count splitting with overlap, the last-resort level.
fn split_by_size(text: &str, max_size: usize, overlap: usize) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }

    let chars: Vec<char> = text.chars().collect();
    let mut pieces = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let end = (start + max_size).min(chars.len());
        pieces.push(chars[start..end].iter().collect());
        let step = max_size.saturating_sub(overlap);
        if step == 0 || end == chars.len() {
            break;
        }
        start += step;
    }

    pieces
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::ElementType;

    fn element(element_type: ElementType, page: u32, text: &str) -> StructuralElement {
        StructuralElement {
            element_type,
            page_number: Some(page),
            bbox: Some([0.0, 0.0, 100.0, 20.0]),
            confidence: 0.9,
            text: text.to_string(),
        }
    }

    fn chunker(max: usize, overlap: usize) -> ElementChunker {
        ElementChunker::new(ChunkerConfig { max_chunk_size: max, overlap }).unwrap()
    }

    #[test]
    fn indices_are_contiguous_from_zero() {
        let elements = vec![
            element(ElementType::Title, 1, "Report Title"),
            element(ElementType::Paragraph, 1, "First paragraph."),
            element(ElementType::Paragraph, 2, "Second paragraph."),
        ];
        let chunks = chunker(512, 100).chunk("doc1", &elements).unwrap();
        assert_eq!(chunks.len(), 3);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i as u32);
            assert_eq!(chunk.document_id, "doc1");
        }
    }

    #[test]
    fn short_element_is_never_split() {
        let elements = vec![element(ElementType::ListItem, 3, "a short list item")];
        let chunks = chunker(64, 8).chunk("doc1", &elements).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].element_type, Some(ElementType::ListItem));
        assert_eq!(chunks[0].page_number, Some(3));
        assert_eq!(chunks[0].text, "a short list item");
    }

    #[test]
    fn long_element_splits_and_keeps_type() {
        let long = "A sentence here. ".repeat(40);
        let elements = vec![element(ElementType::Paragraph, 2, &long)];
        let chunks = chunker(128, 16).chunk("doc1", &elements).unwrap();
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert_eq!(chunk.element_type, Some(ElementType::Paragraph));
            assert_eq!(chunk.page_number, Some(2));
            assert_eq!(chunk.bbox, Some([0.0, 0.0, 100.0, 20.0]));
            assert!(chunk.text.len() <= 128);
        }
    }

    #[test]
    fn word_level_split_keeps_word_boundaries() {
        // No sentence separators anywhere, so the split falls all the way
        // through to the word level.
        let long = (0..60).map(|i| format!("word{i}")).collect::<Vec<_>>().join(" ");
        let elements = vec![element(ElementType::Paragraph, 1, &long)];
        let chunks = chunker(64, 8).chunk("doc1", &elements).unwrap();
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            for token in chunk.text.split_whitespace() {
                let digits = token.strip_prefix("word").unwrap_or("");
                assert!(
                    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()),
                    "adjacent words were merged across a split: {token:?}"
                );
            }
        }
    }

    #[test]
    fn metadata_carried_through_unmodified() {
        let elements = vec![
            element(ElementType::TableText, 4, "cell a | cell b"),
            element(ElementType::FigureCaption, 5, "Figure 2: throughput"),
        ];
        let chunks = chunker(512, 100).chunk("doc1", &elements).unwrap();
        assert_eq!(chunks[0].element_type, Some(ElementType::TableText));
        assert_eq!(chunks[0].page_number, Some(4));
        assert_eq!(chunks[1].element_type, Some(ElementType::FigureCaption));
        assert_eq!(chunks[1].page_number, Some(5));
    }

    #[test]
    fn empty_and_whitespace_elements_are_skipped() {
        let elements = vec![
            element(ElementType::Paragraph, 1, "   "),
            element(ElementType::Paragraph, 1, "kept"),
        ];
        let chunks = chunker(512, 100).chunk("doc1", &elements).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "kept");
        assert_eq!(chunks[0].chunk_index, 0);
    }

    #[test]
    fn no_elements_yields_no_chunks() {
        let chunks = chunker(512, 100).chunk("doc1", &[]).unwrap();
        assert!(chunks.is_empty());
    }
}
