//! Citation resolution: turn a claimed supporting span into one that is
//! provably extractable from the context, or into the sentinel.
//!
//! The answer gateway reports where in the document its answer came from,
//! but those offsets are untrusted. They may have been computed against a
//! whitespace-normalized copy of the text, against a different document,
//! or simply invented. [`resolve`] checks the claim and repairs it:
//!
//! ```text
//! claimed ──▶ sentinel? ──yes──▶ sentinel
//!                │no
//!                ▼
//!         offsets verify? ──yes──▶ claimed span, verbatim
//!                │no
//!                ▼
//!   leftmost case-insensitive ──found──▶ span of the text actually found
//!        match of claimed.text
//!                │not found
//!                ▼
//!            sentinel
//! ```
//!
//! Offsets are UTF-8 byte offsets into the context `str`. Offsets that do
//! not land on `char` boundaries fail verification and fall through to the
//! text search.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::MalformedCitationError;
use crate::models::CitationSpan;

/// Which resolution step produced the returned span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolveOutcome {
    /// The claim was the sentinel; nothing to ground.
    Unclaimed,
    /// The claimed offsets were exact and accepted as-is.
    Verified,
    /// The offsets were wrong but the text was found by search.
    Relocated,
    /// The text does not occur in the context.
    NotFound,
}

/// Resolve `claimed` against `context`.
///
/// Never fails. The result is either the sentinel or a span with
/// `&context[start_index..end_index] == text`.
pub fn resolve(context: &str, claimed: &CitationSpan) -> CitationSpan {
    resolve_with_outcome(context, claimed).0
}

/// Like [`resolve`], also reporting which step produced the result.
pub fn resolve_with_outcome(context: &str, claimed: &CitationSpan) -> (CitationSpan, ResolveOutcome) {
    if claimed.is_sentinel() {
        return (CitationSpan::sentinel(), ResolveOutcome::Unclaimed);
    }

    if verify_offsets(context, claimed) {
        return (claimed.clone(), ResolveOutcome::Verified);
    }

    match find_case_insensitive(context, &claimed.text) {
        Some((start, end)) => {
            debug!(
                claimed_start = claimed.start_index,
                claimed_end = claimed.end_index,
                start,
                end,
                "citation relocated by text search"
            );
            (
                CitationSpan::new(&context[start..end], start as i64, end as i64),
                ResolveOutcome::Relocated,
            )
        }
        None => {
            debug!(
                claimed_len = claimed.text.len(),
                "citation text not found in context"
            );
            (CitationSpan::sentinel(), ResolveOutcome::NotFound)
        }
    }
}

/// True when the claimed offsets are in range, on `char` boundaries, and
/// select exactly `claimed.text`.
fn verify_offsets(context: &str, claimed: &CitationSpan) -> bool {
    let (Ok(start), Ok(end)) = (
        usize::try_from(claimed.start_index),
        usize::try_from(claimed.end_index),
    ) else {
        return false;
    };
    if start > end || end > context.len() {
        return false;
    }
    context.get(start..end) == Some(claimed.text.as_str())
}

/// Byte range of the leftmost case-insensitive occurrence of `needle`.
///
/// Comparison is per-`char` on full Unicode lowercase mappings, so the
/// matched range may differ in byte length from `needle`.
pub fn find_case_insensitive(haystack: &str, needle: &str) -> Option<(usize, usize)> {
    let folded: Vec<char> = needle.chars().flat_map(char::to_lowercase).collect();
    if folded.is_empty() {
        return None;
    }

    haystack.char_indices().find_map(|(start, _)| {
        match_folded_prefix(&haystack[start..], &folded).map(|len| (start, start + len))
    })
}

/// If `hay` starts with a case-insensitive match of `folded`, the byte
/// length of the matching prefix.
fn match_folded_prefix(hay: &str, folded: &[char]) -> Option<usize> {
    let mut matched = 0;
    for (offset, ch) in hay.char_indices() {
        if matched == folded.len() {
            return Some(offset);
        }
        for lower in ch.to_lowercase() {
            if folded.get(matched) != Some(&lower) {
                return None;
            }
            matched += 1;
        }
    }
    (matched == folded.len()).then_some(hay.len())
}

/// A resolved span split out of its context for rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Highlight<'a> {
    pub prefix: &'a str,
    pub excerpt: &'a str,
    pub suffix: &'a str,
}

impl<'a> Highlight<'a> {
    /// Split `context` around `span`, or `None` when the span is the
    /// sentinel or does not verify against `context`.
    pub fn split(context: &'a str, span: &CitationSpan) -> Option<Self> {
        if span.is_sentinel() || !verify_offsets(context, span) {
            return None;
        }
        let start = span.start_index as usize;
        let end = span.end_index as usize;
        Some(Self {
            prefix: &context[..start],
            excerpt: &context[start..end],
            suffix: &context[end..],
        })
    }
}

// ============ Raw gateway citations ============

/// A citation exactly as the answer gateway sent it.
///
/// Offsets are kept as raw JSON so a string, float, or `null` can be told
/// apart from a missing field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCitation {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub start_index: Option<Value>,
    #[serde(default)]
    pub end_index: Option<Value>,
}

impl RawCitation {
    pub fn new(text: impl Into<String>, start: i64, end: i64) -> Self {
        Self {
            text: Some(text.into()),
            start_index: Some(Value::from(start)),
            end_index: Some(Value::from(end)),
        }
    }
}

/// Convert a gateway citation into a [`CitationSpan`] the resolver accepts.
///
/// - integral numbers, integral floats, and numeric strings → that offset
/// - no citation, no text, or a missing / `null` / non-integer offset →
///   sentinel
///
/// The second value reports what was wrong, for logging.
pub fn normalize_citation(
    raw: Option<&RawCitation>,
) -> (CitationSpan, Option<MalformedCitationError>) {
    let Some(raw) = raw else {
        return (
            CitationSpan::sentinel(),
            Some(MalformedCitationError::MissingField("citation")),
        );
    };

    let text = match raw.text.as_deref() {
        Some(text) if !text.is_empty() => text,
        _ => return (CitationSpan::sentinel(), None),
    };

    let offsets = parse_offset("startIndex", raw.start_index.as_ref())
        .and_then(|start| Ok((start, parse_offset("endIndex", raw.end_index.as_ref())?)));

    match offsets {
        Ok((start, end)) => (CitationSpan::new(text, start, end), None),
        Err(err) => (CitationSpan::sentinel(), Some(err)),
    }
}

fn parse_offset(field: &'static str, value: Option<&Value>) -> Result<i64, MalformedCitationError> {
    let not_an_offset = |value: &Value| MalformedCitationError::NotAnOffset {
        field,
        value: value.to_string(),
    };

    match value {
        None | Some(Value::Null) => Err(MalformedCitationError::MissingField(field)),
        Some(v @ Value::Number(n)) => {
            if let Some(i) = n.as_i64() {
                return Ok(i);
            }
            match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 => {
                    Ok(f as i64)
                }
                _ => Err(not_an_offset(v)),
            }
        }
        Some(v @ Value::String(s)) => s.trim().parse::<i64>().map_err(|_| not_an_offset(v)),
        Some(v) => Err(not_an_offset(v)),
    }
}
