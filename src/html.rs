//! Built-in [`ContentExtractor`] for HTML pages.
//!
//! Deterministic and local: the title comes from `<title>`, the body from
//! `html2text` rendering with a wide line width so sentences are not
//! hard-wrapped.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::io::Cursor;

use crate::traits::{ContentExtractor, ExtractedContent};

const RENDER_WIDTH: usize = 4096;

#[derive(Debug, Clone, Default)]
pub struct HtmlExtractor;

#[async_trait]
impl ContentExtractor for HtmlExtractor {
    async fn extract(&self, url: &str, markup: &str) -> Result<ExtractedContent> {
        let content = html_to_text(markup);
        if content.trim().is_empty() {
            bail!("no readable content at {}", url);
        }
        let title = page_title(markup).unwrap_or_else(|| url.to_string());
        Ok(ExtractedContent { title, content })
    }
}

/// Render HTML to plain text, trimming trailing blank lines.
pub fn html_to_text(markup: &str) -> String {
    let rendered = html2text::from_read(Cursor::new(markup.as_bytes()), RENDER_WIDTH)
        .unwrap_or_else(|_| markup.to_string());
    rendered.trim_end().to_string()
}

/// Inner text of the first `<title>` element, whitespace-collapsed.
pub fn page_title(markup: &str) -> Option<String> {
    let lower = markup.to_ascii_lowercase();
    let open = lower.find("<title")?;
    let content_start = open + lower[open..].find('>')? + 1;
    let content_end = content_start + lower[content_start..].find("</title")?;
    let raw = &markup[content_start..content_end];

    let decoded = html_to_text(raw);
    let title = decoded.split_whitespace().collect::<Vec<_>>().join(" ");
    (!title.is_empty()).then_some(title)
}
