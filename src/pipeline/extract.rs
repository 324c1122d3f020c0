//! Upload validation and PDF text extraction.
//!
//! Validation runs on upload metadata before any bytes are parsed so that
//! obviously wrong files (a 40 MB JPEG renamed to `.pdf`) are rejected
//! cheaply. Extraction then checks the `%PDF` magic bytes before handing the
//! buffer to pdfium, so callers get a meaningful error rather than a pdfium
//! parse failure.

use crate::error::{PdfErrorKind, StoryError};
use crate::pipeline::bind_pdfium;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const ALLOWED_CONTENT_TYPES: &[&str] = &["application/pdf"];
const ALLOWED_EXTENSIONS: &[&str] = &["pdf"];

/// Metadata of an uploaded file, as reported by the client.
#[derive(Debug, Clone)]
pub struct UploadMeta<'a> {
    pub file_name: &'a str,
    pub content_type: Option<&'a str>,
    pub size: usize,
}

/// Validate upload metadata: non-empty, within `max_bytes`, PDF content type
/// and `.pdf` extension.
pub fn validate_upload(upload: &UploadMeta<'_>, max_bytes: usize) -> Result<(), StoryError> {
    if upload.size == 0 {
        warn!("File validation failed: file is empty");
        return Err(StoryError::pdf(
            PdfErrorKind::InvalidFormat,
            format!("File '{}' is empty", upload.file_name),
        ));
    }

    if upload.size > max_bytes {
        warn!(
            "File validation failed: size {} exceeds maximum {}",
            upload.size, max_bytes
        );
        return Err(StoryError::pdf(
            PdfErrorKind::FileSizeExceeded,
            format!(
                "File '{}' is {} bytes; the limit is {} bytes",
                upload.file_name, upload.size, max_bytes
            ),
        ));
    }

    let content_type_ok = upload.content_type.is_some_and(|ct| {
        // Ignore parameters such as `; charset=binary`.
        let essence = ct.split(';').next().unwrap_or("").trim();
        ALLOWED_CONTENT_TYPES
            .iter()
            .any(|allowed| essence.eq_ignore_ascii_case(allowed))
    });
    if !content_type_ok {
        warn!(
            "File validation failed: invalid content type {:?}",
            upload.content_type
        );
        return Err(StoryError::pdf(
            PdfErrorKind::InvalidFormat,
            format!("Content type {:?} is not a PDF", upload.content_type),
        ));
    }

    let extension_ok = Path::new(upload.file_name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            ALLOWED_EXTENSIONS
                .iter()
                .any(|allowed| ext.eq_ignore_ascii_case(allowed))
        });
    if !extension_ok {
        warn!(
            "File validation failed: invalid extension on '{}'",
            upload.file_name
        );
        return Err(StoryError::pdf(
            PdfErrorKind::InvalidFormat,
            format!("File '{}' does not have a .pdf extension", upload.file_name),
        ));
    }

    info!(
        "File validation successful: {}, {} bytes",
        upload.file_name, upload.size
    );
    Ok(())
}

/// `true` when `bytes` start with the PDF magic `%PDF`.
pub fn has_pdf_magic(bytes: &[u8]) -> bool {
    bytes.len() >= 4 && &bytes[..4] == b"%PDF"
}

/// Join per-page text into one document.
///
/// Blank pages are skipped; remaining pages are separated by a blank line
/// and the result is trimmed.
pub fn page_texts_to_document<I, S>(pages: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = String::new();
    for page in pages {
        let page = page.as_ref();
        if page.trim().is_empty() {
            continue;
        }
        out.push_str(page);
        out.push_str("\n\n");
    }
    out.trim().to_string()
}

/// Turns PDF bytes into plain text.
///
/// Implementations are blocking; [`crate::StoryService`] calls them from
/// `spawn_blocking`.
pub trait PdfTextExtractor: Send + Sync {
    fn extract_text(&self, bytes: &[u8]) -> Result<String, StoryError>;
}

/// Text extraction backed by pdfium.
#[derive(Debug, Clone, Default)]
pub struct PdfiumExtractor {
    lib_path: Option<PathBuf>,
}

impl PdfiumExtractor {
    pub fn new(lib_path: Option<PathBuf>) -> Self {
        Self { lib_path }
    }
}

impl PdfTextExtractor for PdfiumExtractor {
    fn extract_text(&self, bytes: &[u8]) -> Result<String, StoryError> {
        if !has_pdf_magic(bytes) {
            let shown = &bytes[..bytes.len().min(4)];
            return Err(StoryError::pdf(
                PdfErrorKind::InvalidFormat,
                format!("Not a PDF; first bytes: {shown:?}"),
            ));
        }

        info!("Starting PDF text extraction ({} bytes)", bytes.len());
        let pdfium = bind_pdfium(self.lib_path.as_deref())?;

        let document = pdfium.load_pdf_from_byte_slice(bytes, None).map_err(|e| {
            StoryError::pdf(
                PdfErrorKind::CorruptedFile,
                format!("Failed to extract text from PDF. The file may be corrupted or unreadable: {e:?}"),
            )
        })?;

        let pages = document.pages();
        let page_count = pages.len() as usize;
        info!("PDF opened successfully. Page count: {}", page_count);

        if page_count == 0 {
            warn!("PDF document contains no pages");
            return Err(StoryError::pdf(
                PdfErrorKind::NoTextContent,
                "PDF document contains no pages",
            ));
        }

        let mut texts = Vec::with_capacity(page_count);
        for (idx, page) in pages.iter().enumerate() {
            let text = page.text().map_err(|e| {
                StoryError::pdf(
                    PdfErrorKind::ExtractionFailed,
                    format!("Failed to read text of page {}: {e:?}", idx + 1),
                )
            })?;
            let content = text.all();
            debug!("Page {}: {} chars", idx + 1, content.len());
            texts.push(content);
        }

        let document_text = page_texts_to_document(&texts);
        if document_text.is_empty() {
            warn!("PDF document contains no extractable text");
            return Err(StoryError::pdf(
                PdfErrorKind::NoTextContent,
                "PDF document contains no extractable text",
            ));
        }

        info!(
            "PDF text extraction completed. Extracted {} characters",
            document_text.len()
        );
        Ok(document_text)
    }
}
