//! Document normalization: any [`DocumentSource`] → one [`CanonicalDocument`].
//!
//! | Source | Title | Text |
//! |--------|-------|------|
//! | `RawText` | `"Untitled"` | verbatim |
//! | `File` (plain text) | file name | verbatim UTF-8 |
//! | `File` (PDF / PPTX) | file name | pages joined with `"\n\n"` in page order |
//! | `File` (DOCX) | file name | paragraphs joined with `"\n"` |
//! | `Url` | page title | extracted page text |
//!
//! URL sources never fail: any fetch or extraction problem yields the
//! fixed placeholder from [`url_error_document`].

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use docqa_core::models::UNTITLED;
use docqa_core::pages::join_pages;
use docqa_core::{CanonicalDocument, DocumentSource, IngestionError};

use crate::config::{Config, FetchConfig, IngestConfig};
use crate::extract::{extract_pages, DocumentFormat, ExtractError};
use crate::html::HtmlExtractor;
use crate::traits::ContentExtractor;

pub const URL_ERROR_TITLE: &str = "Error";
pub const URL_ERROR_TEXT: &str = "Could not fetch or process the URL.";

/// Placeholder used whenever a URL cannot be fetched or processed.
pub fn url_error_document() -> CanonicalDocument {
    CanonicalDocument::new(URL_ERROR_TITLE, URL_ERROR_TEXT)
}

/// Converts document sources into canonical text.
pub struct Normalizer {
    client: reqwest::Client,
    fetch: FetchConfig,
    ingest: IngestConfig,
    extractor: Arc<dyn ContentExtractor>,
}

impl Normalizer {
    /// Build a normalizer using the built-in [`HtmlExtractor`].
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config, Arc::new(HtmlExtractor))
    }

    pub fn new(config: &Config, extractor: Arc<dyn ContentExtractor>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.fetch.timeout_secs))
            .user_agent(config.fetch.user_agent.clone())
            .build()?;
        Ok(Self {
            client,
            fetch: config.fetch.clone(),
            ingest: config.ingest.clone(),
            extractor,
        })
    }

    /// Normalize `source`.
    ///
    /// # Errors
    ///
    /// Only file sources fail: oversize input, an unsupported content type,
    /// invalid UTF-8, or a failed PDF/OOXML extraction. URL sources degrade
    /// to [`url_error_document`] instead.
    pub async fn normalize(&self, source: DocumentSource) -> Result<CanonicalDocument, IngestionError> {
        let label = source.label();
        let document = match source {
            DocumentSource::RawText { text } => CanonicalDocument::new(UNTITLED, text),
            DocumentSource::File {
                name,
                mime_hint,
                raw_bytes,
            } => self.normalize_file(name, mime_hint, raw_bytes).await?,
            DocumentSource::Url { address } => self.normalize_url(&address).await,
        };
        info!(
            source = %label,
            title = %document.title,
            bytes = document.text.len(),
            "document normalized"
        );
        Ok(document)
    }

    async fn normalize_file(
        &self,
        name: String,
        mime_hint: Option<String>,
        raw_bytes: Vec<u8>,
    ) -> Result<CanonicalDocument, IngestionError> {
        if raw_bytes.len() > self.ingest.max_file_bytes {
            return Err(IngestionError::TooLarge {
                size: raw_bytes.len(),
                limit: self.ingest.max_file_bytes,
            });
        }

        let format = DocumentFormat::detect(&name, mime_hint.as_deref()).map_err(to_ingestion_error)?;
        debug!(file = %name, ?format, paginated = format.is_paginated(), "extracting file");

        let max_entry = self.ingest.max_xml_entry_bytes;
        let pages = tokio::task::spawn_blocking(move || extract_pages(&raw_bytes, format, max_entry))
            .await
            .map_err(|e| IngestionError::Extraction(format!("extraction task panicked: {}", e)))?
            .map_err(to_ingestion_error)?;

        let title = if name.trim().is_empty() {
            UNTITLED.to_string()
        } else {
            name
        };
        Ok(CanonicalDocument::new(title, join_pages(pages)))
    }

    async fn normalize_url(&self, address: &str) -> CanonicalDocument {
        let markup = match self.fetch_markup(address).await {
            Ok(markup) => markup,
            Err(e) => {
                warn!(url = %address, error = %e, "URL fetch failed; using placeholder document");
                return url_error_document();
            }
        };

        match self.extractor.extract(address, &markup).await {
            Ok(extracted) => CanonicalDocument::new(extracted.title, extracted.content),
            Err(e) => {
                warn!(url = %address, error = %e, "content extraction failed; using placeholder document");
                url_error_document()
            }
        }
    }

    /// GET `address` and return the body as text, bounded by `fetch.max_bytes`.
    async fn fetch_markup(&self, address: &str) -> Result<String, IngestionError> {
        let url = reqwest::Url::parse(address)
            .map_err(|e| IngestionError::Fetch(format!("invalid URL: {}", e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(IngestionError::Fetch(format!(
                "unsupported URL scheme: {}",
                url.scheme()
            )));
        }

        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| IngestionError::Fetch(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(IngestionError::Fetch(format!("HTTP {}", status)));
        }

        let limit = self.fetch.max_bytes;
        if let Some(len) = response.content_length() {
            if len as usize > limit {
                return Err(IngestionError::TooLarge {
                    size: len as usize,
                    limit,
                });
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| IngestionError::Fetch(e.to_string()))?
        {
            body.extend_from_slice(&chunk);
            if body.len() > limit {
                return Err(IngestionError::TooLarge {
                    size: body.len(),
                    limit,
                });
            }
        }

        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}

fn to_ingestion_error(err: ExtractError) -> IngestionError {
    match err {
        ExtractError::UnsupportedContentType(ct) => IngestionError::UnsupportedContentType(ct),
        ExtractError::Utf8(e) => IngestionError::InvalidUtf8(e),
        other => IngestionError::Extraction(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer() -> Normalizer {
        Normalizer::from_config(&Config::default()).unwrap()
    }

    fn file(name: &str, mime: Option<&str>, bytes: &[u8]) -> DocumentSource {
        DocumentSource::File {
            name: name.to_string(),
            mime_hint: mime.map(str::to_string),
            raw_bytes: bytes.to_vec(),
        }
    }

    #[tokio::test]
    async fn raw_text_is_verbatim_and_untitled() {
        let text = "  spaced\n\n text\t";
        let doc = normalizer()
            .normalize(DocumentSource::RawText {
                text: text.to_string(),
            })
            .await
            .unwrap();
        assert_eq!(doc, CanonicalDocument::new("Untitled", text));
    }

    #[tokio::test]
    async fn plain_file_uses_file_name_as_title() {
        let doc = normalizer()
            .normalize(file("notes.md", Some("text/markdown"), b"# Notes\nBody"))
            .await
            .unwrap();
        assert_eq!(doc.title, "notes.md");
        assert_eq!(doc.text, "# Notes\nBody");
    }

    #[tokio::test]
    async fn nameless_file_is_untitled() {
        let doc = normalizer()
            .normalize(file("", Some("text/plain"), b"x"))
            .await
            .unwrap();
        assert_eq!(doc.title, "Untitled");
    }

    #[tokio::test]
    async fn corrupt_pdf_is_an_ingestion_error() {
        let err = normalizer()
            .normalize(file("bad.pdf", None, b"not a valid pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestionError::Extraction(_)));
    }

    #[tokio::test]
    async fn oversized_file_is_rejected() {
        let mut config = Config::default();
        config.ingest.max_file_bytes = 4;
        let normalizer = Normalizer::from_config(&config).unwrap();
        let err = normalizer
            .normalize(file("a.txt", None, b"12345"))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestionError::TooLarge { size: 5, limit: 4 }));
    }

    #[tokio::test]
    async fn unsupported_content_type_is_rejected() {
        let err = normalizer()
            .normalize(file("pic.png", Some("image/png"), b"\x89PNG"))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestionError::UnsupportedContentType(_)));
    }

    #[tokio::test]
    async fn non_http_url_degrades_to_placeholder() {
        for address in ["file:///etc/passwd", "not a url"] {
            let doc = normalizer()
                .normalize(DocumentSource::Url {
                    address: address.to_string(),
                })
                .await
                .unwrap();
            assert_eq!(doc, url_error_document());
        }
    }
}
