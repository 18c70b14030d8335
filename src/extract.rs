//! Text extraction for note files (PDF and plain text).
//!
//! Ingestion and snippet rendering both read source files through here.
//! Failures are returned as [`ExtractError`]; callers decide whether a
//! failure skips the file or is shown as [`failure_placeholder`].

use std::path::Path;

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_TEXT: &str = "text/plain";

/// Page separator emitted by the PDF extractor.
const FORM_FEED: char = '\x0c';

#[derive(Debug)]
pub enum ExtractError {
    UnsupportedContentType(String),
    Pdf(String),
    Io(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::UnsupportedContentType(ct) => {
                write!(f, "unsupported content-type: {}", ct)
            }
            ExtractError::Pdf(e) => write!(f, "PDF extraction failed: {}", e),
            ExtractError::Io(e) => write!(f, "read failed: {}", e),
        }
    }
}

impl std::error::Error for ExtractError {}

/// Content type from the file extension.
pub fn content_type_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "pdf" => Some(MIME_PDF),
        "txt" | "text" => Some(MIME_TEXT),
        _ => None,
    }
}

/// Extracts text page by page, splitting on form feeds.
pub fn extract_pages(bytes: &[u8], content_type: &str) -> Result<Vec<String>, ExtractError> {
    match content_type {
        MIME_PDF => {
            let text = pdf_extract::extract_text_from_mem(bytes)
                .map_err(|e| ExtractError::Pdf(e.to_string()))?;
            Ok(text.split(FORM_FEED).map(String::from).collect())
        }
        MIME_TEXT => Ok(decode_text(bytes)
            .split(FORM_FEED)
            .map(String::from)
            .collect()),
        _ => Err(ExtractError::UnsupportedContentType(
            content_type.to_string(),
        )),
    }
}

/// Extracts the whole text, pages joined by newlines.
pub fn extract_text(bytes: &[u8], content_type: &str) -> Result<String, ExtractError> {
    Ok(extract_pages(bytes, content_type)?.join("\n"))
}

/// Reads a file from disk and extracts its pages.
pub fn extract_file_pages(path: &Path) -> Result<Vec<String>, ExtractError> {
    let content_type = content_type_for(path)
        .ok_or_else(|| ExtractError::UnsupportedContentType(path.display().to_string()))?;
    let bytes = std::fs::read(path).map_err(|e| ExtractError::Io(e.to_string()))?;
    extract_pages(&bytes, content_type)
}

/// Decodes text files of unknown encoding.
///
/// Order: UTF-8 (BOM stripped), UTF-16 with a BOM, then Latin-1, which
/// accepts any byte sequence.
pub fn decode_text(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        return String::from_utf8_lossy(rest).into_owned();
    }
    if let Some(rest) = bytes.strip_prefix(&[0xFF, 0xFE]) {
        return decode_utf16(rest, u16::from_le_bytes);
    }
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        return decode_utf16(rest, u16::from_be_bytes);
    }
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

fn decode_utf16(bytes: &[u8], unit: fn([u8; 2]) -> u16) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| unit([pair[0], pair[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}

/// Text shown in place of a snippet when the source cannot be read.
pub fn failure_placeholder(err: &ExtractError) -> String {
    format!("[Falha ao abrir arquivo: {}]", err)
}
