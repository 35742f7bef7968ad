//! Document chunking.
//!
//! This module provides the [`Chunker`] trait and [`RecursiveChunker`], which
//! splits each document unit into overlapping, size-bounded chunks that end on
//! the strongest separator available: a paragraph break, then a line break,
//! then a space.

use crate::config::DocQaConfig;
use crate::document::{Chunk, Document};

/// Separators tried when choosing where a chunk ends, strongest first.
const SEPARATORS: [&str; 3] = ["\n\n", "\n", " "];

/// A strategy for splitting documents into chunks.
pub trait Chunker: Send + Sync {
    /// Split a document into chunks, in document order.
    ///
    /// Returns an empty `Vec` if every unit has empty text.
    fn chunk(&self, document: &Document) -> Vec<Chunk>;
}

/// A span of text selected by [`RecursiveChunker::split`].
///
/// Offsets count characters, not bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    /// Offset of the first character.
    pub start: usize,
    /// Offset one past the last character.
    pub end: usize,
    /// The covered text.
    pub text: String,
}

/// Splits text into chunks of at most `chunk_size` characters, each
/// overlapping its predecessor by up to `chunk_overlap` characters.
///
/// Chunk IDs are generated as `{document_id}_{ordinal}`. Each chunk inherits
/// the metadata of its unit plus a `chunk_index` field.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::RecursiveChunker;
///
/// let chunker = RecursiveChunker::new(700, 100);
/// let spans = chunker.split("some long text ...");
/// ```
#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl RecursiveChunker {
    /// Create a new `RecursiveChunker`.
    ///
    /// # Arguments
    ///
    /// * `chunk_size`: maximum number of characters per chunk
    /// * `chunk_overlap`: number of overlapping characters between consecutive chunks
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self { chunk_size, chunk_overlap }
    }

    /// Create a chunker with the sizes from a validated configuration.
    pub fn from_config(config: &DocQaConfig) -> Self {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    /// Split `text` into ordered, overlapping spans.
    ///
    /// Identical input always yields identical spans. Every character of
    /// `text` falls into at least one span; text no longer than `chunk_size`
    /// yields exactly one span and empty text yields none.
    pub fn split(&self, text: &str) -> Vec<Span> {
        let chars: Vec<char> = text.chars().collect();
        let len = chars.len();
        if len == 0 {
            return Vec::new();
        }

        // Byte offset of every character boundary, including the end.
        let bytes: Vec<usize> =
            text.char_indices().map(|(i, _)| i).chain(std::iter::once(text.len())).collect();

        let size = self.chunk_size.max(1);
        let overlap = self.chunk_overlap.min(size - 1);

        let mut spans = Vec::new();
        let mut start = 0;
        loop {
            let hard_end = (start + size).min(len);
            let end =
                if hard_end == len { len } else { break_point(&chars, start, hard_end, overlap) };

            spans.push(Span { start, end, text: text[bytes[start]..bytes[end]].to_string() });

            if end == len {
                break;
            }
            start = next_start(&chars, end, overlap);
        }

        spans
    }
}

/// Pick where a chunk starting at `start` ends, at most at `hard_end`.
///
/// The end lands just after the last occurrence of the strongest separator
/// found beyond the overlap region, so the following chunk always starts
/// after `start`.
fn break_point(chars: &[char], start: usize, hard_end: usize, overlap: usize) -> usize {
    let floor = start + overlap;
    for separator in SEPARATORS {
        let sep: Vec<char> = separator.chars().collect();
        let found = (floor + 1..=hard_end)
            .rev()
            .find(|&p| p >= start + sep.len() && chars[p - sep.len()..p] == sep[..]);
        if let Some(p) = found {
            return p;
        }
    }
    hard_end
}

/// Start the next chunk `overlap` characters before `end`, moved forward to
/// the first word start inside the overlap window when there is one.
fn next_start(chars: &[char], end: usize, overlap: usize) -> usize {
    let candidate = end - overlap;
    (candidate..end)
        .find(|&q| q > 0 && chars[q - 1].is_whitespace() && !chars[q].is_whitespace())
        .unwrap_or(candidate)
}

impl Chunker for RecursiveChunker {
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        let mut ordinal = 0;

        for (unit_index, unit) in document.units.iter().enumerate() {
            for span in self.split(&unit.text) {
                let mut metadata = unit.metadata.clone();
                metadata.insert("chunk_index".to_string(), ordinal.to_string());

                chunks.push(Chunk {
                    id: format!("{}_{ordinal}", document.id),
                    document_id: document.id.clone(),
                    ordinal,
                    unit: unit_index,
                    start: span.start,
                    end: span.end,
                    text: span.text,
                    metadata,
                });
                ordinal += 1;
            }
        }

        chunks
    }
}

/// Rebuild the text of every chunked unit by dropping the overlapping prefix
/// of each chunk.
///
/// Returns one string per unit that produced chunks, in unit order. `chunks`
/// must be in the order a [`Chunker`] produced them.
pub fn reassemble(chunks: &[Chunk]) -> Vec<String> {
    let mut units: Vec<String> = Vec::new();
    let mut current_unit = None;
    let mut covered: usize = 0;

    for chunk in chunks {
        if current_unit != Some(chunk.unit) {
            current_unit = Some(chunk.unit);
            covered = 0;
            units.push(String::new());
        }
        let skip = covered.saturating_sub(chunk.start);
        if let Some(text) = units.last_mut() {
            text.extend(chunk.text.chars().skip(skip));
        }
        covered = covered.max(chunk.end);
    }

    units
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{DocumentId, DocumentKind, DocumentUnit};

    fn document(units: &[&str]) -> Document {
        let id = DocumentId::new("notes.txt").unwrap();
        let units = units.iter().map(|text| DocumentUnit::new(&id, *text)).collect();
        Document { id, kind: DocumentKind::PlainText, units }
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        let chunker = RecursiveChunker::new(700, 100);
        assert!(chunker.split("").is_empty());
        assert!(chunker.chunk(&document(&[""])).is_empty());
    }

    #[test]
    fn short_text_yields_single_chunk() {
        let chunker = RecursiveChunker::new(700, 100);
        let spans = chunker.split("ML stands for Machine Learning.");
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].start, 0);
        assert_eq!(spans[0].text, "ML stands for Machine Learning.");
    }

    #[test]
    fn prefers_paragraph_breaks() {
        let chunker = RecursiveChunker::new(20, 5);
        let spans = chunker.split("aaaa bbbb\n\ncccc dddd eeee");
        assert_eq!(spans[0].text, "aaaa bbbb\n\n");
        assert!(spans.iter().all(|s| s.end - s.start <= 20));
    }

    #[test]
    fn falls_back_to_hard_limit_without_separators() {
        let chunker = RecursiveChunker::new(10, 3);
        let spans = chunker.split("abcdefghijklmnopqrstuvwxyz");
        assert_eq!(spans[0].text, "abcdefghij");
        assert_eq!(spans[1].start, 7);
        assert_eq!(spans.last().map(|s| s.end), Some(26));
    }

    #[test]
    fn overlap_starts_at_word_boundary() {
        let chunker = RecursiveChunker::new(16, 6);
        let spans = chunker.split("alpha beta gamma delta epsilon");
        assert!(spans.len() > 1);
        for pair in spans.windows(2) {
            assert!(pair[1].start < pair[0].end, "chunks must overlap or touch");
            assert!(pair[0].end - pair[1].start <= 6);
        }
        assert_eq!(spans[1].text, "beta gamma ");
    }

    #[test]
    fn multibyte_text_is_split_on_char_boundaries() {
        let chunker = RecursiveChunker::new(4, 1);
        let text = "ગુજરાતી हिन्दी தமிழ்";
        let spans = chunker.split(text);
        assert!(spans.iter().all(|s| s.text.chars().count() <= 4));
    }

    #[test]
    fn chunks_carry_unit_metadata_and_reassemble() {
        let chunker = RecursiveChunker::new(12, 4);
        let doc = document(&["first unit of some text", "second unit"]);
        let chunks = chunker.chunk(&doc);

        assert_eq!(chunks[0].id, "notes.txt_0");
        assert_eq!(chunks[0].metadata.get("source").map(String::as_str), Some("notes.txt"));
        assert!(chunks.windows(2).all(|w| w[0].ordinal + 1 == w[1].ordinal));
        assert_eq!(chunks.last().map(|c| c.unit), Some(1));
        assert_eq!(reassemble(&chunks), vec!["first unit of some text", "second unit"]);
    }
}
