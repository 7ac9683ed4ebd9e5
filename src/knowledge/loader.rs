//! Document loaders selected by file extension.

use std::path::Path;

use tracing::debug;

use crate::error::GatewayError;
use crate::knowledge::{Document, DocumentMetadata};

/// Supported upload formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Csv,
}

impl DocumentKind {
    /// Pick the loader for a file name (extension is case-insensitive).
    pub fn from_file_name(name: &str) -> Result<Self, GatewayError> {
        let ext = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        match ext.as_deref() {
            Some("pdf") => Ok(DocumentKind::Pdf),
            Some("csv") => Ok(DocumentKind::Csv),
            Some(other) => Err(GatewayError::UnsupportedFileType(format!(".{other}"))),
            None => Err(GatewayError::UnsupportedFileType(name.to_string())),
        }
    }
}

/// Load the persisted upload at `path`.
pub async fn load(kind: DocumentKind, path: &Path, source: &str) -> Result<Vec<Document>, GatewayError> {
    let bytes = tokio::fs::read(path).await?;

    let documents = match kind {
        DocumentKind::Pdf => {
            let source = source.to_string();
            // Text extraction is CPU-bound and may panic on malformed input.
            tokio::task::spawn_blocking(move || load_pdf(&bytes, &source))
                .await
                .map_err(|e| GatewayError::Document(format!("PDF extraction aborted: {e}")))??
        }
        DocumentKind::Csv => load_csv(&bytes, source)?,
    };

    debug!(source, kind = ?kind, documents = documents.len(), "Loaded documents");
    Ok(documents)
}

/// Extract the text of a PDF as one document.
pub fn load_pdf(bytes: &[u8], source: &str) -> Result<Vec<Document>, GatewayError> {
    let text = pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| GatewayError::Document(format!("PDF extraction failed: {e}")))?;

    Ok(vec![Document::new(
        text,
        DocumentMetadata {
            source: source.to_string(),
            row: None,
        },
    )])
}

/// One document per CSV row, rendered as `header: value` lines.
pub fn load_csv(bytes: &[u8], source: &str) -> Result<Vec<Document>, GatewayError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(bytes);
    let headers = reader
        .headers()
        .map_err(|e| GatewayError::Document(format!("CSV header: {e}")))?
        .clone();

    let mut documents = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record.map_err(|e| GatewayError::Document(format!("CSV row {row}: {e}")))?;
        let content = headers
            .iter()
            .zip(record.iter())
            .map(|(key, value)| format!("{}: {}", key.trim(), value.trim()))
            .collect::<Vec<_>>()
            .join("\n");

        documents.push(Document::new(
            content,
            DocumentMetadata {
                source: source.to_string(),
                row: Some(row),
            },
        ));
    }

    Ok(documents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_extension() {
        assert_eq!(DocumentKind::from_file_name("report.pdf").unwrap(), DocumentKind::Pdf);
        assert_eq!(DocumentKind::from_file_name("DATA.CSV").unwrap(), DocumentKind::Csv);
    }

    #[test]
    fn test_unsupported_extension() {
        let err = DocumentKind::from_file_name("notes.txt").unwrap_err();
        assert!(matches!(err, GatewayError::UnsupportedFileType(ref ext) if ext == ".txt"));
        assert!(DocumentKind::from_file_name("README").is_err());
    }

    #[test]
    fn test_csv_rows_become_documents() {
        let csv = b"name, color\nsky, blue\ngrass,green\n";
        let docs = load_csv(csv, "facts.csv").unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].content, "name: sky\ncolor: blue");
        assert_eq!(docs[1].content, "name: grass\ncolor: green");
        assert_eq!(docs[1].metadata.row, Some(1));
        assert_eq!(docs[1].metadata.source, "facts.csv");
    }

    #[test]
    fn test_malformed_pdf_is_document_error() {
        let err = load_pdf(b"definitely not a pdf", "x.pdf").unwrap_err();
        assert!(matches!(err, GatewayError::Document(_)));
    }

    #[tokio::test]
    async fn test_load_reads_persisted_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("facts.csv");
        tokio::fs::write(&path, "q,a\nwho,me\n").await.unwrap();

        let docs = load(DocumentKind::Csv, &path, "facts.csv").await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].content, "q: who\na: me");
    }
}
