//! Text extraction from raw document content.
//!
//! Fetchers and uploads hand over a [`RawContent`]; this module returns the
//! single normalized text string every downstream stage works on. Multi-page
//! PDFs come back in page order without page markers, since chunking is
//! offset-based.
//!
//! Markup is not text: a DOI that resolves to a publisher's HTML landing
//! page is rejected rather than chunked as page source.

use encoding_rs::{Encoding, UTF_16BE, WINDOWS_1252};
use tracing::{debug, warn};

use crate::document::{Document, DocumentId};
use crate::error::ExtractionError;

pub const MIME_PDF: &str = "application/pdf";

const MARKUP_TYPES: &[&str] = &["text/html", "application/xhtml+xml"];

/// Raw content as delivered by a fetcher or an upload.
#[derive(Debug, Clone, PartialEq)]
pub enum RawContent {
    /// Binary PDF content.
    Pdf(Vec<u8>),

    /// Already-decoded text.
    Text(String),

    /// Bytes with a declared content type.
    Bytes { bytes: Vec<u8>, content_type: String },
}

impl RawContent {
    /// Size of the payload in bytes.
    pub fn len(&self) -> usize {
        match self {
            RawContent::Pdf(bytes) => bytes.len(),
            RawContent::Text(text) => text.len(),
            RawContent::Bytes { bytes, .. } => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Extract normalized plain text from raw content.
pub fn extract_text(raw: &RawContent) -> Result<String, ExtractionError> {
    let text = match raw {
        RawContent::Pdf(bytes) => extract_pdf(bytes)?,
        RawContent::Text(text) => text.clone(),
        RawContent::Bytes {
            bytes,
            content_type,
        } => {
            let (mime, charset) = parse_content_type(content_type);
            if mime == MIME_PDF {
                extract_pdf(bytes)?
            } else if MARKUP_TYPES.contains(&mime.as_str()) {
                return Err(ExtractionError::UnsupportedContentType(mime));
            } else if mime.starts_with("text/") {
                decode_text(bytes, charset.as_deref())?
            } else {
                return Err(ExtractionError::UnsupportedContentType(mime));
            }
        }
    };

    let normalized = normalize(&text);
    if normalized.is_empty() {
        return Err(ExtractionError::Empty);
    }

    debug!("Extracted {} characters", normalized.chars().count());
    Ok(normalized)
}

/// Extract a [`Document`], carrying the title a PDF declares in its info
/// dictionary.
pub fn extract_document(
    id: impl Into<DocumentId>,
    raw: &RawContent,
) -> Result<Document, ExtractionError> {
    let document = Document::new(id, extract_text(raw)?);
    Ok(match extract_title(raw) {
        Some(title) => document.with_title(title),
        None => document,
    })
}

/// The `/Title` entry of a PDF's info dictionary, if there is a non-blank one.
pub fn extract_title(raw: &RawContent) -> Option<String> {
    match raw {
        RawContent::Pdf(bytes) => pdf_title(bytes),
        RawContent::Bytes {
            bytes,
            content_type,
        } if parse_content_type(content_type).0 == MIME_PDF => pdf_title(bytes),
        _ => None,
    }
}

fn pdf_title(bytes: &[u8]) -> Option<String> {
    let pdf = lopdf::Document::load_mem(bytes).ok()?;
    let (_, info) = pdf.dereference(pdf.trailer.get(b"Info").ok()?).ok()?;
    let title = info.as_dict().ok()?.get(b"Title").ok()?;
    let (_, title) = pdf.dereference(title).ok()?;
    let raw = title.as_str().ok()?;

    // Text strings are UTF-16BE with a byte order mark, or PDFDocEncoding,
    // which agrees with Windows-1252 on printable characters.
    let (decoded, _, _) = if raw.starts_with(&[0xFE, 0xFF]) {
        UTF_16BE.decode(raw)
    } else {
        WINDOWS_1252.decode(raw)
    };
    let title = decoded.split_whitespace().collect::<Vec<_>>().join(" ");
    (!title.is_empty()).then_some(title)
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractionError> {
    if bytes.is_empty() {
        return Err(ExtractionError::Pdf("no content".to_string()));
    }
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractionError::Pdf(e.to_string()))
}

/// Split `type/subtype; charset=...` into a lowercase mime type and charset.
fn parse_content_type(content_type: &str) -> (String, Option<String>) {
    let mut parts = content_type.split(';');
    let mime = parts.next().unwrap_or_default().trim().to_ascii_lowercase();
    let charset = parts.find_map(|param| {
        let (key, value) = param.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches('"').to_string())
    });
    (mime, charset)
}

/// Decode text bytes, honouring a declared charset and otherwise preferring
/// UTF-8 before falling back to detection.
fn decode_text(bytes: &[u8], charset: Option<&str>) -> Result<String, ExtractionError> {
    if let Some(label) = charset {
        let encoding = Encoding::for_label(label.as_bytes())
            .ok_or_else(|| ExtractionError::Encoding(format!("unknown charset {label}")))?;
        let (text, _, had_errors) = encoding.decode(bytes);
        if had_errors {
            return Err(ExtractionError::Encoding(format!(
                "content is not valid {}",
                encoding.name()
            )));
        }
        return Ok(text.into_owned());
    }

    if let Ok(text) = std::str::from_utf8(bytes) {
        return Ok(text.to_string());
    }

    let mut detector = chardetng::EncodingDetector::new();
    detector.feed(bytes, true);
    let encoding = detector.guess(None, true);
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        return Err(ExtractionError::Encoding(format!(
            "could not decode content as {}",
            encoding.name()
        )));
    }
    warn!("Decoded non-UTF-8 text as {}", encoding.name());
    Ok(text.into_owned())
}

/// Unify line endings, drop control characters, trim the ends.
fn normalize(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");
    unified
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect::<String>()
        .trim()
        .to_string()
}
