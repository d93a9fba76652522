//! Text extraction for uploaded files (plain text, PDF, DOCX, PPTX).
//!
//! Extraction returns per-page text. Paginated formats (PDF pages, PPTX
//! slides) yield one [`PageText`] per page in document order; flowing
//! formats yield a single page. The normalizer joins pages with
//! [`docqa_core::pages::join_pages`], and all citation offsets are
//! relative to that join.

use std::io::Read;
use std::path::Path;

use docqa_core::pages::{number_pages, PageText};
use thiserror::Error;

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_PPTX: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.presentation";
pub const MIME_OCTET_STREAM: &str = "application/octet-stream";

/// Default bound on a single decompressed ZIP entry.
pub const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Extensions treated as plain text when no usable MIME hint is given.
const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "markdown", "rst", "csv", "tsv", "json", "xml", "html", "htm", "log", "yaml",
    "yml", "toml",
];

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("unsupported content-type: {0}")]
    UnsupportedContentType(String),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("OOXML extraction failed: {0}")]
    Ooxml(String),
    #[error("text is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// How a file's bytes are turned into text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    PlainText,
    Pdf,
    Docx,
    Pptx,
}

impl DocumentFormat {
    /// Pick a format from an explicit MIME hint, falling back to the file
    /// extension when the hint is missing or generic.
    pub fn detect(file_name: &str, mime_hint: Option<&str>) -> Result<Self, ExtractError> {
        let hint = mime_hint
            .map(|h| h.split(';').next().unwrap_or("").trim().to_ascii_lowercase())
            .filter(|h| !h.is_empty() && h != MIME_OCTET_STREAM);

        match hint.as_deref() {
            Some(MIME_PDF) => Ok(DocumentFormat::Pdf),
            Some(MIME_DOCX) => Ok(DocumentFormat::Docx),
            Some(MIME_PPTX) => Ok(DocumentFormat::Pptx),
            Some(h)
                if h.starts_with("text/")
                    || h == "application/json"
                    || h == "application/xml"
                    || h == "application/markdown" =>
            {
                Ok(DocumentFormat::PlainText)
            }
            Some(h) => Err(ExtractError::UnsupportedContentType(h.to_string())),
            None => Ok(Self::from_extension(file_name)),
        }
    }

    fn from_extension(file_name: &str) -> Self {
        let ext = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("pdf") => DocumentFormat::Pdf,
            Some("docx") => DocumentFormat::Docx,
            Some("pptx") => DocumentFormat::Pptx,
            Some(e) if TEXT_EXTENSIONS.contains(&e) => DocumentFormat::PlainText,
            // Unknown: try UTF-8 and let decoding decide.
            _ => DocumentFormat::PlainText,
        }
    }

    pub fn is_paginated(self) -> bool {
        matches!(self, DocumentFormat::Pdf | DocumentFormat::Pptx)
    }
}

/// Extract per-page text from `bytes`.
pub fn extract_pages(
    bytes: &[u8],
    format: DocumentFormat,
    max_entry_bytes: u64,
) -> Result<Vec<PageText>, ExtractError> {
    match format {
        DocumentFormat::PlainText => {
            let text = String::from_utf8(bytes.to_vec())?;
            Ok(vec![PageText::new(1, text)])
        }
        DocumentFormat::Pdf => extract_pdf_pages(bytes),
        DocumentFormat::Docx => {
            extract_docx(bytes, max_entry_bytes).map(|text| vec![PageText::new(1, text)])
        }
        DocumentFormat::Pptx => extract_pptx_slides(bytes, max_entry_bytes),
    }
}

fn extract_pdf_pages(bytes: &[u8]) -> Result<Vec<PageText>, ExtractError> {
    let pages = pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|e| ExtractError::Pdf(e.to_string()))?;
    Ok(number_pages(pages))
}

type ZipArchive<'a> = zip::ZipArchive<std::io::Cursor<&'a [u8]>>;

fn open_zip(bytes: &[u8]) -> Result<ZipArchive<'_>, ExtractError> {
    zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(|e| ExtractError::Ooxml(e.to_string()))
}

fn read_zip_entry_bounded(
    archive: &mut ZipArchive<'_>,
    name: &str,
    max_bytes: u64,
) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::Ooxml(format!("{}: {}", name, e)))?;
    let mut out = Vec::new();
    entry
        .take(max_bytes.saturating_add(1))
        .read_to_end(&mut out)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    if out.len() as u64 > max_bytes {
        return Err(ExtractError::Ooxml(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, max_bytes
        )));
    }
    Ok(out)
}

fn extract_docx(bytes: &[u8], max_entry_bytes: u64) -> Result<String, ExtractError> {
    let mut archive = open_zip(bytes)?;
    let xml = read_zip_entry_bounded(&mut archive, "word/document.xml", max_entry_bytes)?;
    extract_paragraphs(&xml)
}

fn extract_pptx_slides(bytes: &[u8], max_entry_bytes: u64) -> Result<Vec<PageText>, ExtractError> {
    let mut archive = open_zip(bytes)?;
    let mut slides: Vec<(u32, String)> = archive
        .file_names()
        .filter(|n| n.starts_with("ppt/slides/slide") && n.ends_with(".xml"))
        .filter_map(|name| {
            name.trim_start_matches("ppt/slides/slide")
                .trim_end_matches(".xml")
                .parse::<u32>()
                .ok()
                .map(|number| (number, name.to_string()))
        })
        .collect();
    slides.sort_by_key(|(number, _)| *number);

    let mut pages = Vec::with_capacity(slides.len());
    for (number, name) in slides {
        let xml = read_zip_entry_bounded(&mut archive, &name, max_entry_bytes)?;
        pages.push(PageText::new(number, extract_paragraphs(&xml)?));
    }
    Ok(pages)
}

/// Collect `<*:t>` runs, one line per `<*:p>` paragraph.
///
/// Works for both WordprocessingML (`w:`) and DrawingML (`a:`) since only
/// local names are compared. Whitespace inside runs is preserved.
fn extract_paragraphs(xml: &[u8]) -> Result<String, ExtractError> {
    use quick_xml::events::Event;

    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut buf = Vec::new();
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_text = false;
    let mut in_paragraph = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"p" => {
                    in_paragraph = true;
                    current.clear();
                }
                b"t" => in_text = true,
                _ => {}
            },
            Ok(Event::Empty(e)) => {
                // <w:tab/> and <w:br/> inside a run
                match e.local_name().as_ref() {
                    b"tab" if in_paragraph => current.push('\t'),
                    b"br" if in_paragraph => current.push('\n'),
                    b"p" => paragraphs.push(String::new()),
                    _ => {}
                }
            }
            Ok(Event::Text(te)) if in_text => {
                let text = te.unescape().map_err(|e| ExtractError::Ooxml(e.to_string()))?;
                current.push_str(&text);
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    in_paragraph = false;
                    paragraphs.push(std::mem::take(&mut current));
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok(paragraphs.join("\n"))
}
