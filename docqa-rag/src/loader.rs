//! Document loading: turning an uploaded file into ordered text units.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, error};

use crate::document::{Document, DocumentId, DocumentKind, DocumentUnit};
use crate::error::{DocQaError, Result};

/// Metadata key for the 0-based CSV row of a unit.
pub const ROW_KEY: &str = "row";
/// Metadata key for the 1-based PDF page of a unit.
pub const PAGE_KEY: &str = "page";
/// Metadata key for the sheet name of a spreadsheet unit.
pub const SHEET_KEY: &str = "sheet";

/// Loads a document by identity.
///
/// Any failure to read or decode the document is reported as
/// [`DocQaError::DocumentUnreadable`].
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    /// Load every text unit of `document`, in source order.
    async fn load(&self, document: &DocumentId) -> Result<Document>;
}

/// Loads documents from files in one directory.
#[derive(Debug, Clone)]
pub struct FsDocumentLoader {
    root: PathBuf,
}

impl FsDocumentLoader {
    /// Create a loader reading files under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The directory documents are read from.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The file backing `document`.
    pub fn path_for(&self, document: &DocumentId) -> PathBuf {
        self.root.join(document.as_str())
    }

    /// Documents in the directory with a supported extension, sorted by name.
    pub async fn list(&self) -> Result<Vec<DocumentId>> {
        let mut entries = tokio::fs::read_dir(&self.root).await.map_err(|e| {
            error!(root = %self.root.display(), error = %e, "failed to list documents");
            DocQaError::unreadable(self.root.display(), e.to_string())
        })?;

        let mut documents = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => return Err(DocQaError::unreadable(self.root.display(), e.to_string())),
            };
            let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if !is_file || DocumentKind::from_name(&name).is_none() {
                continue;
            }
            if let Ok(id) = DocumentId::new(name) {
                documents.push(id);
            }
        }
        documents.sort();
        Ok(documents)
    }
}

#[async_trait]
impl DocumentLoader for FsDocumentLoader {
    async fn load(&self, document: &DocumentId) -> Result<Document> {
        let kind = document
            .kind()
            .ok_or_else(|| DocQaError::unreadable(document, "unsupported file extension"))?;
        let path = self.path_for(document);

        let units = match kind {
            DocumentKind::PlainText => load_text(document, &path).await?,
            DocumentKind::Tabular => load_csv(document, &path).await?,
            DocumentKind::Paged => load_pdf(document, path).await?,
            DocumentKind::Spreadsheet => load_spreadsheet(document, path).await?,
        };

        debug!(document.id = %document, kind = %kind, unit_count = units.len(), "loaded document");
        Ok(Document { id: document.clone(), kind, units })
    }
}

async fn read_bytes(document: &DocumentId, path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path).await.map_err(|e| {
        error!(
            document.id = %document,
            path = %path.display(),
            error = %e,
            "failed to read document"
        );
        DocQaError::unreadable(document, e.to_string())
    })
}

async fn load_text(document: &DocumentId, path: &Path) -> Result<Vec<DocumentUnit>> {
    let bytes = read_bytes(document, path).await?;
    let text = String::from_utf8(bytes)
        .map_err(|_| DocQaError::unreadable(document, "file is not valid UTF-8"))?;
    Ok(vec![DocumentUnit::new(document, text)])
}

async fn load_csv(document: &DocumentId, path: &Path) -> Result<Vec<DocumentUnit>> {
    let bytes = read_bytes(document, path).await?;
    csv_units(document, &bytes)
}

/// One unit per CSV row, rendered as `header: value` lines.
pub(crate) fn csv_units(document: &DocumentId, bytes: &[u8]) -> Result<Vec<DocumentUnit>> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(bytes);
    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| DocQaError::unreadable(document, format!("invalid CSV header: {e}")))?
        .iter()
        .map(|h| h.trim().trim_start_matches('\u{feff}').to_string())
        .collect();

    let mut units = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record
            .map_err(|e| DocQaError::unreadable(document, format!("invalid CSV row {row}: {e}")))?;
        let text = record
            .iter()
            .enumerate()
            .map(|(i, value)| {
                let header = headers.get(i).map(String::as_str).unwrap_or_default();
                format!("{header}: {}", value.trim())
            })
            .collect::<Vec<_>>()
            .join("\n");
        units.push(DocumentUnit::new(document, text).with_metadata(ROW_KEY, row));
    }
    Ok(units)
}

#[cfg(feature = "pdf")]
async fn load_pdf(document: &DocumentId, path: PathBuf) -> Result<Vec<DocumentUnit>> {
    let id = document.clone();
    let pages = tokio::task::spawn_blocking(move || pdf_extract::extract_text_by_pages(&path))
        .await
        .map_err(|e| DocQaError::unreadable(&id, format!("PDF decoder task failed: {e}")))?
        .map_err(|e| {
            error!(document.id = %id, error = %e, "failed to decode PDF");
            DocQaError::unreadable(&id, e.to_string())
        })?;

    Ok(pages
        .into_iter()
        .enumerate()
        .map(|(i, text)| DocumentUnit::new(document, text).with_metadata(PAGE_KEY, i + 1))
        .collect())
}

#[cfg(not(feature = "pdf"))]
async fn load_pdf(document: &DocumentId, _path: PathBuf) -> Result<Vec<DocumentUnit>> {
    Err(DocQaError::unreadable(document, "PDF support is not enabled (feature `pdf`)"))
}

#[cfg(feature = "xlsx")]
async fn load_spreadsheet(document: &DocumentId, path: PathBuf) -> Result<Vec<DocumentUnit>> {
    use calamine::{Reader, open_workbook_auto};

    let id = document.clone();
    let sheets = tokio::task::spawn_blocking(move || -> std::result::Result<_, String> {
        let mut workbook = open_workbook_auto(&path).map_err(|e| e.to_string())?;
        let mut sheets = Vec::new();
        for name in workbook.sheet_names() {
            let range = workbook.worksheet_range(&name).map_err(|e| e.to_string())?;
            let text = range
                .rows()
                .map(|row| row.iter().map(ToString::to_string).collect::<Vec<_>>().join("\t"))
                .collect::<Vec<_>>()
                .join("\n");
            sheets.push((name, text));
        }
        Ok(sheets)
    })
    .await
    .map_err(|e| DocQaError::unreadable(&id, format!("spreadsheet decoder task failed: {e}")))?
    .map_err(|e| {
        error!(document.id = %id, error = %e, "failed to decode spreadsheet");
        DocQaError::unreadable(&id, e)
    })?;

    Ok(sheets
        .into_iter()
        .map(|(name, text)| DocumentUnit::new(document, text).with_metadata(SHEET_KEY, name))
        .collect())
}

#[cfg(not(feature = "xlsx"))]
async fn load_spreadsheet(document: &DocumentId, _path: PathBuf) -> Result<Vec<DocumentUnit>> {
    Err(DocQaError::unreadable(document, "spreadsheet support is not enabled (feature `xlsx`)"))
}

/// Serves documents held in memory; handy for tests and embedding hosts.
#[derive(Debug, Default)]
pub struct InMemoryDocumentLoader {
    documents: RwLock<HashMap<DocumentId, Document>>,
}

impl InMemoryDocumentLoader {
    /// Create an empty loader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a document.
    pub async fn insert(&self, document: Document) {
        self.documents.write().await.insert(document.id.clone(), document);
    }

    /// Add or replace a single-unit plain text document.
    pub async fn insert_text(&self, id: DocumentId, text: impl Into<String>) {
        let unit = DocumentUnit::new(&id, text);
        self.insert(Document { id, kind: DocumentKind::PlainText, units: vec![unit] }).await;
    }

    /// Remove a document.
    pub async fn remove(&self, id: &DocumentId) -> bool {
        self.documents.write().await.remove(id).is_some()
    }
}

#[async_trait]
impl DocumentLoader for InMemoryDocumentLoader {
    async fn load(&self, document: &DocumentId) -> Result<Document> {
        self.documents
            .read()
            .await
            .get(document)
            .cloned()
            .ok_or_else(|| DocQaError::unreadable(document, "document not found"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::SOURCE_KEY;
    use crate::error::ErrorKind;

    fn id(name: &str) -> DocumentId {
        DocumentId::new(name).unwrap()
    }

    #[test]
    fn csv_rows_become_header_value_units() {
        let doc = id("faq.csv");
        let csv = concat!(
            "question,answer\n",
            "What is ML?, ML stands for Machine Learning.\n",
            "Deploy day?,Friday\n",
        );
        let units = csv_units(&doc, csv.as_bytes()).unwrap();

        assert_eq!(units.len(), 2);
        assert_eq!(units[0].text, "question: What is ML?\nanswer: ML stands for Machine Learning.");
        assert_eq!(units[1].text, "question: Deploy day?\nanswer: Friday");
        assert_eq!(units[1].metadata[ROW_KEY], "1");
        assert_eq!(units[0].metadata[SOURCE_KEY], "faq.csv");
    }

    #[test]
    fn csv_quoted_fields_keep_commas_and_newlines() {
        let doc = id("faq.csv");
        let units = csv_units(&doc, b"q,a\n\"a, b\",\"line1\nline2\"\n").unwrap();
        assert_eq!(units[0].text, "q: a, b\na: line1\nline2");
    }

    #[tokio::test]
    async fn fs_loader_reads_text_and_lists_supported_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "Release code is 42.").unwrap();
        std::fs::write(dir.path().join("faq.csv"), "q,a\nx,y\n").unwrap();
        std::fs::write(dir.path().join("image.png"), [0u8; 4]).unwrap();

        let loader = FsDocumentLoader::new(dir.path());
        let listed = loader.list().await.unwrap();
        assert_eq!(listed, vec![id("faq.csv"), id("notes.txt")]);

        let document = loader.load(&id("notes.txt")).await.unwrap();
        assert_eq!(document.kind, DocumentKind::PlainText);
        assert_eq!(document.units.len(), 1);
        assert_eq!(document.units[0].text, "Release code is 42.");
    }

    #[tokio::test]
    async fn missing_or_unsupported_files_are_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let loader = FsDocumentLoader::new(dir.path());

        let err = loader.load(&id("absent.txt")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DocumentUnreadable);

        let err = loader.load(&id("image.png")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DocumentUnreadable);
    }

    #[tokio::test]
    async fn in_memory_loader_serves_inserted_documents() {
        let loader = InMemoryDocumentLoader::new();
        loader.insert_text(id("a.txt"), "hello").await;
        assert_eq!(loader.load(&id("a.txt")).await.unwrap().units[0].text, "hello");

        assert!(loader.remove(&id("a.txt")).await);
        assert!(loader.load(&id("a.txt")).await.is_err());
    }
}
