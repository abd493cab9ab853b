//! Format-specific text extraction from stored document files.
//!
//! Plain text and unknown formats are read directly (lossy UTF-8). Word
//! documents and slide decks are OOXML zip archives; their XML parts are
//! read and stripped down to text. PDF extraction is delegated to the
//! pdf-extract crate behind the `pdf` feature.

use std::io::Read;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use palaver_core::error::PalaverError;
use palaver_core::types::DocumentKind;

use crate::TextExtractor;

/// Extractor that reads document files from local storage.
#[derive(Debug, Clone, Default)]
pub struct FileExtractor;

impl FileExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl TextExtractor for FileExtractor {
    fn extract(&self, path: &Path, kind: DocumentKind) -> Result<String, PalaverError> {
        debug!(file = %path.display(), ?kind, "Extracting document text");
        match kind {
            DocumentKind::Pdf => extract_pdf(path),
            DocumentKind::Word => extract_ooxml(path, &["word/document.xml"]),
            DocumentKind::SlideDeck => extract_slides(path),
            DocumentKind::PlainText | DocumentKind::Unknown => extract_plain(path),
        }
    }
}

/// Read a file as text, replacing invalid UTF-8 rather than failing.
fn extract_plain(path: &Path) -> Result<String, PalaverError> {
    let bytes = std::fs::read(path)
        .map_err(|e| PalaverError::Extraction(format!("Failed to read {}: {}", path.display(), e)))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(feature = "pdf")]
fn extract_pdf(path: &Path) -> Result<String, PalaverError> {
    pdf_extract::extract_text(path)
        .map_err(|e| PalaverError::Extraction(format!("PDF extraction failed: {}", e)))
}

#[cfg(not(feature = "pdf"))]
fn extract_pdf(_path: &Path) -> Result<String, PalaverError> {
    Err(PalaverError::Extraction(
        "PDF extraction requires the `pdf` feature to be enabled".to_string(),
    ))
}

/// Pull the named XML parts out of an OOXML archive and strip them to text.
fn extract_ooxml(path: &Path, parts: &[&str]) -> Result<String, PalaverError> {
    let file = std::fs::File::open(path)
        .map_err(|e| PalaverError::Extraction(format!("Failed to open {}: {}", path.display(), e)))?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| PalaverError::Extraction(format!("Not a valid OOXML archive: {}", e)))?;

    let mut out = String::new();
    for part in parts {
        let mut entry = archive
            .by_name(part)
            .map_err(|e| PalaverError::Extraction(format!("Missing {}: {}", part, e)))?;
        let mut xml = String::new();
        entry
            .read_to_string(&mut xml)
            .map_err(|e| PalaverError::Extraction(format!("Failed to read {}: {}", part, e)))?;
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&xml_to_text(&xml));
    }
    Ok(out)
}

/// Slide decks keep one XML part per slide under ppt/slides/.
fn extract_slides(path: &Path) -> Result<String, PalaverError> {
    let file = std::fs::File::open(path)
        .map_err(|e| PalaverError::Extraction(format!("Failed to open {}: {}", path.display(), e)))?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| PalaverError::Extraction(format!("Not a valid OOXML archive: {}", e)))?;

    let mut slide_parts: Vec<String> = (0..archive.len())
        .filter_map(|i| archive.by_index(i).ok().map(|e| e.name().to_string()))
        .filter(|name| name.starts_with("ppt/slides/slide") && name.ends_with(".xml"))
        .collect();
    slide_parts.sort();

    let mut out = String::new();
    for part in &slide_parts {
        let mut entry = archive
            .by_name(part)
            .map_err(|e| PalaverError::Extraction(format!("Missing {}: {}", part, e)))?;
        let mut xml = String::new();
        entry
            .read_to_string(&mut xml)
            .map_err(|e| PalaverError::Extraction(format!("Failed to read {}: {}", part, e)))?;
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&xml_to_text(&xml));
    }
    Ok(out)
}

fn tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]*>").expect("static regex"))
}

/// Reduce OOXML markup to readable text: paragraph closes become newlines,
/// remaining tags are dropped, and the common XML entities are decoded.
fn xml_to_text(xml: &str) -> String {
    let with_breaks = xml.replace("</w:p>", "\n").replace("</a:p>", "\n");
    let stripped = tag_regex().replace_all(&with_breaks, "");
    let decoded = stripped
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'");

    decoded
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
