//! Joining per-page text into one canonical buffer.
//!
//! Citation offsets are computed against the joined string, so the page
//! order and the separator must never change for a given document.

/// Separator placed between consecutive pages.
pub const PAGE_SEPARATOR: &str = "\n\n";

/// Text extracted from a single page (1-based number).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

impl PageText {
    pub fn new(number: u32, text: impl Into<String>) -> Self {
        Self {
            number,
            text: text.into(),
        }
    }
}

/// Concatenate pages in ascending page order, separated by
/// [`PAGE_SEPARATOR`]. Empty pages still contribute their separator so
/// page boundaries stay where the extractor put them.
pub fn join_pages(mut pages: Vec<PageText>) -> String {
    pages.sort_by_key(|page| page.number);
    pages
        .iter()
        .map(|page| page.text.as_str())
        .collect::<Vec<_>>()
        .join(PAGE_SEPARATOR)
}

/// Number pages 1.. in the order an extractor produced them.
pub fn number_pages<I>(texts: I) -> Vec<PageText>
where
    I: IntoIterator<Item = String>,
{
    texts
        .into_iter()
        .enumerate()
        .map(|(i, text)| PageText::new(i as u32 + 1, text))
        .collect()
}
