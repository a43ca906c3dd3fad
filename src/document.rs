//! Data types for documents, structural elements, chunks, search results,
//! and conversation messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Processing state of a [`Document`].
///
/// Transitions move strictly forward through
/// `uploaded → processing → text_extracted → chunked → embedded → processed`,
/// except `error`, which is reachable from any non-terminal state and halts
/// automatic progression until the pipeline is explicitly re-invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    /// Raw file received, nothing processed yet.
    Uploaded,
    /// A pipeline run is in flight.
    Processing,
    /// Structural extraction completed.
    TextExtracted,
    /// Chunks created from extracted elements.
    Chunked,
    /// Embeddings attached to all chunks.
    Embedded,
    /// Terminal success state.
    Processed,
    /// Terminal-until-retried failure state.
    Error,
}

impl DocumentStatus {
    /// The persisted wire string for this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Uploaded => "uploaded",
            DocumentStatus::Processing => "processing",
            DocumentStatus::TextExtracted => "text_extracted",
            DocumentStatus::Chunked => "chunked",
            DocumentStatus::Embedded => "embedded",
            DocumentStatus::Processed => "processed",
            DocumentStatus::Error => "error",
        }
    }

    /// Parse a persisted status string.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Validation`] for unrecognized values. Consumers
    /// must treat unknown statuses as an error condition, never skip them.
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "uploaded" => Ok(DocumentStatus::Uploaded),
            "processing" => Ok(DocumentStatus::Processing),
            "text_extracted" => Ok(DocumentStatus::TextExtracted),
            "chunked" => Ok(DocumentStatus::Chunked),
            "embedded" => Ok(DocumentStatus::Embedded),
            "processed" => Ok(DocumentStatus::Processed),
            "error" => Ok(DocumentStatus::Error),
            other => Err(RagError::Validation(format!("unrecognized document status '{other}'"))),
        }
    }

    /// Position of this status in the forward progression, if it is a
    /// forward state. `Error` has no rank.
    pub(crate) fn rank(&self) -> Option<u8> {
        match self {
            DocumentStatus::Uploaded => Some(0),
            DocumentStatus::Processing => Some(1),
            DocumentStatus::TextExtracted => Some(2),
            DocumentStatus::Chunked => Some(3),
            DocumentStatus::Embedded => Some(4),
            DocumentStatus::Processed => Some(5),
            DocumentStatus::Error => None,
        }
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A source document tracked through the processing pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Unique identifier for the document.
    pub id: String,
    /// The user who owns this document.
    pub owner_id: String,
    /// Source file path relative to the configured storage root.
    pub source_path: String,
    /// Current processing status.
    pub status: DocumentStatus,
    /// Captured cause when `status` is [`DocumentStatus::Error`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// When the document was first recorded.
    pub created_at: DateTime<Utc>,
    /// When the document was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// Create a new document in the `uploaded` state.
    pub fn new(
        id: impl Into<String>,
        owner_id: impl Into<String>,
        source_path: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            owner_id: owner_id.into(),
            source_path: source_path.into(),
            status: DocumentStatus::Uploaded,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// The structural role of an extracted element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementType {
    /// Document title.
    Title,
    /// Section heading.
    Heading,
    /// Body paragraph.
    Paragraph,
    /// Text extracted from a table.
    TableText,
    /// Caption attached to a figure.
    FigureCaption,
    /// Item within a bulleted or numbered list.
    ListItem,
    /// Extractor could not classify the element.
    Unknown,
}

impl ElementType {
    /// The six known (classifiable) element types, excluding [`ElementType::Unknown`].
    pub const KNOWN: [ElementType; 6] = [
        ElementType::Title,
        ElementType::Heading,
        ElementType::Paragraph,
        ElementType::TableText,
        ElementType::FigureCaption,
        ElementType::ListItem,
    ];

    /// The wire string for this element type.
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementType::Title => "title",
            ElementType::Heading => "heading",
            ElementType::Paragraph => "paragraph",
            ElementType::TableText => "table_text",
            ElementType::FigureCaption => "figure_caption",
            ElementType::ListItem => "list_item",
            ElementType::Unknown => "unknown",
        }
    }

    /// Uppercase label used in formatted context prefixes, e.g. `TABLE_TEXT`.
    pub fn label(&self) -> &'static str {
        match self {
            ElementType::Title => "TITLE",
            ElementType::Heading => "HEADING",
            ElementType::Paragraph => "PARAGRAPH",
            ElementType::TableText => "TABLE_TEXT",
            ElementType::FigureCaption => "FIGURE_CAPTION",
            ElementType::ListItem => "LIST_ITEM",
            ElementType::Unknown => "UNKNOWN",
        }
    }
}

/// A typed, positioned element produced by structural extraction.
///
/// Immutable once produced for a given document version.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StructuralElement {
    /// The structural role of this element.
    pub element_type: ElementType,
    /// 1-based page number, when the source is page-based.
    pub page_number: Option<u32>,
    /// Bounding box as `[x0, y0, x1, y1]` in page coordinates.
    pub bbox: Option<[f64; 4]>,
    /// Extractor confidence in `[0, 1]`.
    pub confidence: f32,
    /// Raw text content.
    pub text: String,
}

/// A retrieval-sized segment of a [`Document`] with inherited structural
/// metadata and, once embedded, a fixed-length vector.
///
/// Chunks are created by the chunker, mutated only to attach an embedding,
/// and deleted only by cascading document deletion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Unique identifier for the chunk.
    pub id: String,
    /// The ID of the parent [`Document`].
    pub document_id: String,
    /// Stable ordering key, contiguous ascending from 0 per document.
    pub chunk_index: u32,
    /// Structural type inherited from the source element.
    pub element_type: Option<ElementType>,
    /// Page number inherited from the source element.
    pub page_number: Option<u32>,
    /// Bounding box inherited from the source element.
    pub bbox: Option<[f64; 4]>,
    /// The text content of the chunk.
    pub text: String,
    /// The vector embedding; empty until the embedding stage runs.
    pub embedding: Vec<f32>,
}

/// A retrieved [`Chunk`] with its query-time scores.
///
/// Ephemeral: search results are a projection, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// The retrieved chunk.
    pub chunk: Chunk,
    /// Cosine similarity between the query embedding and the chunk.
    pub similarity: f32,
    /// Lexical match score against the chunk text.
    pub text_score: f32,
    /// Weighted combination of `similarity` and `text_score`.
    pub hybrid_score: f32,
    /// Score assigned by the rerank pass, when one ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f32>,
}

/// The author of a [`ConversationMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    /// Instructions injected by the application, never shown to the client.
    System,
    /// A message from the end user.
    User,
    /// A model reply.
    Assistant,
}

/// One message in a conversation, ordered by occurrence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationMessage {
    /// Who authored the message.
    pub role: MessageRole,
    /// The message text.
    pub content: String,
}

impl ConversationMessage {
    /// Convenience constructor.
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self { role, content: content.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_wire_strings() {
        for status in [
            DocumentStatus::Uploaded,
            DocumentStatus::Processing,
            DocumentStatus::TextExtracted,
            DocumentStatus::Chunked,
            DocumentStatus::Embedded,
            DocumentStatus::Processed,
            DocumentStatus::Error,
        ] {
            assert_eq!(DocumentStatus::parse(status.as_str()).unwrap(), status);
        }
    }

    #[test]
    fn unrecognized_status_is_an_error() {
        assert!(matches!(
            DocumentStatus::parse("pending"),
            Err(RagError::Validation(_))
        ));
    }

    #[test]
    fn status_serializes_to_snake_case() {
        let json = serde_json::to_string(&DocumentStatus::TextExtracted).unwrap();
        assert_eq!(json, "\"text_extracted\"");
    }

    #[test]
    fn known_types_exclude_unknown() {
        assert_eq!(ElementType::KNOWN.len(), 6);
        assert!(!ElementType::KNOWN.contains(&ElementType::Unknown));
    }
}
