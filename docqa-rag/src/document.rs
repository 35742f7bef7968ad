//! Data types for documents, chunks, and search results.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{DocQaError, Result};

/// Metadata key holding the document a unit or chunk came from.
pub const SOURCE_KEY: &str = "source";

/// Stable identity of an uploaded document: its file name.
///
/// The full name including extension is the key, so `report.csv` and
/// `report.txt` never share an index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentId(String);

impl DocumentId {
    /// Validate and wrap a document name.
    ///
    /// # Errors
    ///
    /// Returns [`DocQaError::InvalidDocumentId`] if the name is empty, is `.`
    /// or `..`, or contains a path separator or NUL.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let trimmed = name.trim();
        if trimmed.is_empty()
            || trimmed == "."
            || trimmed == ".."
            || trimmed.contains(['/', '\\', '\0'])
        {
            return Err(DocQaError::InvalidDocumentId(name));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// The document name.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The kind implied by the file extension, if supported.
    pub fn kind(&self) -> Option<DocumentKind> {
        DocumentKind::from_name(&self.0)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for DocumentId {
    type Error = DocQaError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<DocumentId> for String {
    fn from(value: DocumentId) -> Self {
        value.0
    }
}

/// The closed set of document formats the loader understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    /// Comma-separated rows with a header line.
    Tabular,
    /// UTF-8 plain text.
    PlainText,
    /// Page-oriented documents (PDF).
    Paged,
    /// Workbooks with one or more sheets.
    Spreadsheet,
}

impl DocumentKind {
    /// File extensions accepted for upload.
    pub const EXTENSIONS: [&'static str; 5] = ["csv", "txt", "pdf", "xlsx", "xls"];

    /// Resolve the kind of a file from its extension (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        let ext = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "csv" => Some(Self::Tabular),
            "txt" => Some(Self::PlainText),
            "pdf" => Some(Self::Paged),
            "xlsx" | "xls" => Some(Self::Spreadsheet),
            _ => None,
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Tabular => "tabular",
            Self::PlainText => "plain text",
            Self::Paged => "paged",
            Self::Spreadsheet => "spreadsheet",
        };
        f.write_str(name)
    }
}

/// One loaded text unit: a CSV row, a PDF page, a sheet, or a whole text file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentUnit {
    /// The text content of the unit.
    pub text: String,
    /// Key-value metadata (`source`, plus `row`, `page` or `sheet`).
    pub metadata: HashMap<String, String>,
}

impl DocumentUnit {
    /// Create a unit tagged with its source document.
    pub fn new(source: &DocumentId, text: impl Into<String>) -> Self {
        let mut metadata = HashMap::new();
        metadata.insert(SOURCE_KEY.to_string(), source.to_string());
        Self { text: text.into(), metadata }
    }

    /// Add a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.metadata.insert(key.into(), value.to_string());
        self
    }
}

/// A loaded document: its identity, kind and ordered text units.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// The document identity.
    pub id: DocumentId,
    /// The format the units were decoded from.
    pub kind: DocumentKind,
    /// Text units in source order.
    pub units: Vec<DocumentUnit>,
}

/// A contiguous span of one [`DocumentUnit`], the unit of retrieval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Unique identifier for the chunk: `{document_id}_{ordinal}`.
    pub id: String,
    /// The ID of the parent document.
    pub document_id: DocumentId,
    /// Position of the chunk within the whole document.
    pub ordinal: usize,
    /// Position of the source unit within the document.
    pub unit: usize,
    /// Character offset where the chunk starts inside its unit.
    pub start: usize,
    /// Character offset one past the chunk's last character.
    pub end: usize,
    /// The text content of the chunk.
    pub text: String,
    /// Metadata inherited from the unit plus `chunk_index`.
    pub metadata: HashMap<String, String>,
}

/// A retrieved [`Chunk`] paired with its similarity score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// The retrieved chunk.
    pub chunk: Chunk,
    /// Cosine similarity to the query (higher is more relevant).
    pub score: f32,
}
