//! Uploaded documents and the plain-text context built from them.
//!
//! There is no retrieval here: "searching" the documents means pasting the
//! extracted text of every upload into the prompt.

use std::path::Path;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

/// Characters of extracted text kept per document.
pub const MAX_DOCUMENT_CHARS: usize = 50_000;
/// Characters per reported chunk.
pub const CHUNK_CHARS: usize = 1_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedDocument {
    pub id: u64,
    pub name: String,
    pub mime_type: String,
    pub size: u64,
    pub chunks: usize,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct DocumentStore {
    documents: Vec<UploadedDocument>,
    // Keyed by file name, kept in first-upload order.
    texts: Vec<(String, String)>,
    next_id: u64,
}

/// Truncate extracted text and count its chunks.
pub fn extract_text(bytes: &[u8]) -> (String, usize) {
    let decoded = String::from_utf8_lossy(bytes);
    let text: String = decoded.chars().take(MAX_DOCUMENT_CHARS).collect();
    let chunks = text.chars().count().div_ceil(CHUNK_CHARS);
    (text, chunks)
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a document whose content has already been read. A read
    /// failure still registers the document, with zero chunks and no text.
    pub fn ingest(
        &mut self,
        name: &str,
        mime_type: &str,
        size: u64,
        content: std::io::Result<Vec<u8>>,
    ) -> &UploadedDocument {
        let chunks = match content {
            Ok(bytes) => {
                let (text, chunks) = extract_text(&bytes);
                self.set_text(name, text);
                chunks
            }
            Err(err) => {
                warn!(document = name, error = %err, "could not read document text");
                0
            }
        };

        self.next_id += 1;
        let document = UploadedDocument {
            id: self.next_id,
            name: name.to_string(),
            mime_type: mime_type.to_string(),
            size,
            chunks,
            uploaded_at: Utc::now(),
        };
        debug!(document = name, chunks, "document registered");
        self.documents.push(document);
        &self.documents[self.documents.len() - 1]
    }

    /// Read a file from disk and register it.
    pub async fn upload_path(&mut self, path: &Path) -> &UploadedDocument {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let mime_type = mime_guess::from_path(path)
            .first_raw()
            .unwrap_or("application/octet-stream");

        let content = tokio::fs::read(path).await;
        let size = match &content {
            Ok(bytes) => bytes.len() as u64,
            Err(_) => 0,
        };
        self.ingest(&name, mime_type, size, content)
    }

    /// Remove a document and the text stored under its name.
    pub fn remove(&mut self, id: u64) -> Option<UploadedDocument> {
        let index = self.documents.iter().position(|doc| doc.id == id)?;
        let removed = self.documents.remove(index);
        self.texts.retain(|(name, _)| name != &removed.name);
        Some(removed)
    }

    pub fn documents(&self) -> &[UploadedDocument] {
        &self.documents
    }

    pub fn text_count(&self) -> usize {
        self.texts.len()
    }

    pub fn has_text(&self) -> bool {
        !self.texts.is_empty()
    }

    /// Concatenate every stored text under a per-document header.
    pub fn build_context(&self) -> String {
        self.texts
            .iter()
            .map(|(name, text)| format!("--- Document: {name} ---\n{text}"))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    fn set_text(&mut self, name: &str, text: String) {
        match self.texts.iter_mut().find(|(existing, _)| existing == name) {
            Some(entry) => entry.1 = text,
            None => self.texts.push((name.to_string(), text)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use tempfile::TempDir;

    #[test]
    fn chunk_count_rounds_up() {
        assert_eq!(extract_text(b"").1, 0);
        assert_eq!(extract_text(b"a").1, 1);
        assert_eq!(extract_text(&[b'x'; 1000]).1, 1);
        assert_eq!(extract_text(&[b'x'; 1001]).1, 2);
    }

    #[test]
    fn text_is_truncated_by_characters() {
        let long = "é".repeat(MAX_DOCUMENT_CHARS + 10);
        let (text, chunks) = extract_text(long.as_bytes());
        assert_eq!(text.chars().count(), MAX_DOCUMENT_CHARS);
        assert_eq!(chunks, MAX_DOCUMENT_CHARS / CHUNK_CHARS);
    }

    #[test]
    fn empty_document_registers_with_zero_chunks() {
        let mut store = DocumentStore::new();
        let doc = store.ingest("empty.txt", "text/plain", 0, Ok(Vec::new()));
        assert_eq!(doc.chunks, 0);
        assert_eq!(store.documents().len(), 1);
    }

    #[test]
    fn read_failure_registers_with_zero_chunks_and_no_text() {
        let mut store = DocumentStore::new();
        let failure = Err(io::Error::new(io::ErrorKind::PermissionDenied, "nope"));
        let doc = store.ingest("secret.pdf", "application/pdf", 0, failure);
        assert_eq!(doc.chunks, 0);
        assert_eq!(store.documents().len(), 1);
        assert!(!store.has_text());
        assert_eq!(store.build_context(), "");
    }

    #[test]
    fn context_joins_documents_in_upload_order() {
        let mut store = DocumentStore::new();
        store.ingest("a.txt", "text/plain", 5, Ok(b"alpha".to_vec()));
        store.ingest("b.txt", "text/plain", 4, Ok(b"beta".to_vec()));
        assert_eq!(
            store.build_context(),
            "--- Document: a.txt ---\nalpha\n\n--- Document: b.txt ---\nbeta"
        );
    }

    #[test]
    fn reupload_replaces_text_in_place() {
        let mut store = DocumentStore::new();
        store.ingest("a.txt", "text/plain", 3, Ok(b"old".to_vec()));
        store.ingest("b.txt", "text/plain", 1, Ok(b"b".to_vec()));
        store.ingest("a.txt", "text/plain", 3, Ok(b"new".to_vec()));

        assert_eq!(store.documents().len(), 3);
        assert_eq!(store.text_count(), 2);
        assert_eq!(
            store.build_context(),
            "--- Document: a.txt ---\nnew\n\n--- Document: b.txt ---\nb"
        );
    }

    #[test]
    fn remove_drops_record_and_text() {
        let mut store = DocumentStore::new();
        let first = store.ingest("a.txt", "text/plain", 1, Ok(b"a".to_vec())).id;
        store.ingest("b.txt", "text/plain", 1, Ok(b"b".to_vec()));

        let removed = store.remove(first).expect("document exists");
        assert_eq!(removed.name, "a.txt");
        assert_eq!(store.documents().len(), 1);
        assert_eq!(store.build_context(), "--- Document: b.txt ---\nb");
        assert!(store.remove(first).is_none());
    }

    #[tokio::test]
    async fn upload_path_reads_file_and_guesses_type() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("notes.txt");
        std::fs::write(&path, "# Notes").expect("write failed");

        let mut store = DocumentStore::new();
        let doc = store.upload_path(&path).await.clone();
        assert_eq!(doc.name, "notes.txt");
        assert_eq!(doc.mime_type, "text/plain");
        assert_eq!(doc.size, 7);
        assert_eq!(doc.chunks, 1);
    }

    #[tokio::test]
    async fn upload_of_missing_file_still_registers() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let mut store = DocumentStore::new();
        let doc = store
            .upload_path(&temp_dir.path().join("missing.csv"))
            .await
            .clone();
        assert_eq!(doc.chunks, 0);
        assert_eq!(doc.mime_type, "text/csv");
        assert_eq!(store.documents().len(), 1);
    }
}
