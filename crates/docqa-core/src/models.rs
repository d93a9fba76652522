//! Core data models for the grounded-answer pipeline.
//!
//! These types describe what flows between the normalizer, the answer
//! gateway, the citation resolver, and the conversation history. All
//! citation offsets are UTF-8 byte offsets into [`CanonicalDocument::text`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Title used when a source carries no name of its own.
pub const UNTITLED: &str = "Untitled";

/// Where a document comes from. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentSource {
    /// Uploaded bytes plus an optional MIME hint.
    File {
        name: String,
        mime_hint: Option<String>,
        raw_bytes: Vec<u8>,
    },
    /// A remote page to fetch.
    Url { address: String },
    /// Text pasted directly by the user.
    RawText { text: String },
}

impl DocumentSource {
    /// Short label for logs (`file:report.pdf`, `url:https://…`, `text`).
    pub fn label(&self) -> String {
        match self {
            DocumentSource::File { name, .. } => format!("file:{}", name),
            DocumentSource::Url { address } => format!("url:{}", address),
            DocumentSource::RawText { .. } => "text".to_string(),
        }
    }
}

/// The single normalized text buffer a document is reduced to.
///
/// `text` is never edited after construction; switching documents
/// replaces the whole value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalDocument {
    pub title: String,
    pub text: String,
}

impl CanonicalDocument {
    pub fn new(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            text: text.into(),
        }
    }

    /// The document a session starts with before anything is loaded.
    pub fn empty() -> Self {
        Self::new(UNTITLED, "")
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// SHA-256 hex digest of `text`.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.text.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

impl Default for CanonicalDocument {
    fn default() -> Self {
        Self::empty()
    }
}

/// Error returned when parsing an [`AnswerStyle`] or [`Domain`] name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
    pub expected: &'static str,
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown {}: '{}'. Must be one of: {}",
            self.kind, self.value, self.expected
        )
    }
}

impl std::error::Error for UnknownVariant {}

/// How the answer should be written. Passed to the gateway only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerStyle {
    #[default]
    Brief,
    Classic,
    Educational,
    Technical,
    Creative,
}

impl AnswerStyle {
    pub const ALL: [AnswerStyle; 5] = [
        AnswerStyle::Brief,
        AnswerStyle::Classic,
        AnswerStyle::Educational,
        AnswerStyle::Technical,
        AnswerStyle::Creative,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AnswerStyle::Brief => "brief",
            AnswerStyle::Classic => "classic",
            AnswerStyle::Educational => "educational",
            AnswerStyle::Technical => "technical",
            AnswerStyle::Creative => "creative",
        }
    }
}

impl fmt::Display for AnswerStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnswerStyle {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AnswerStyle::ALL
            .into_iter()
            .find(|style| style.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownVariant {
                kind: "answer style",
                value: s.to_string(),
                expected: "brief, classic, educational, technical, creative",
            })
    }
}

/// Subject area of the document. Passed to the gateway only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    #[default]
    General,
    Education,
    Job,
    Law,
    Research,
}

impl Domain {
    pub const ALL: [Domain; 5] = [
        Domain::General,
        Domain::Education,
        Domain::Job,
        Domain::Law,
        Domain::Research,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Domain::General => "general",
            Domain::Education => "education",
            Domain::Job => "job",
            Domain::Law => "law",
            Domain::Research => "research",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Domain::ALL
            .into_iter()
            .find(|domain| domain.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownVariant {
                kind: "domain",
                value: s.to_string(),
                expected: "general, education, job, law, research",
            })
    }
}

/// A claimed or resolved supporting excerpt.
///
/// Unless it is the sentinel, a span returned by the resolver satisfies
/// `0 <= start_index <= end_index <= context.len()` and
/// `context[start_index..end_index] == text`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CitationSpan {
    pub text: String,
    pub start_index: i64,
    pub end_index: i64,
}

impl CitationSpan {
    pub fn new(text: impl Into<String>, start_index: i64, end_index: i64) -> Self {
        Self {
            text: text.into(),
            start_index,
            end_index,
        }
    }

    /// The "no supporting excerpt available" value: `("", -1, -1)`.
    pub fn sentinel() -> Self {
        Self::new("", -1, -1)
    }

    /// True when this span carries no usable claim: either offset is `-1`
    /// or the text is empty.
    pub fn is_sentinel(&self) -> bool {
        self.start_index == -1 || self.end_index == -1 || self.text.is_empty()
    }
}

impl Default for CitationSpan {
    fn default() -> Self {
        Self::sentinel()
    }
}

/// A gateway answer after citation normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerResult {
    pub answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// In `[0, 1]` when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    pub citation: CitationSpan,
}

impl AnswerResult {
    /// Fixed reply recorded when the gateway fails, so the conversation
    /// still gets an assistant turn.
    pub fn apology() -> Self {
        Self {
            answer: "Sorry, I couldn't generate an answer right now. Please try again."
                .to_string(),
            source: None,
            confidence: Some(0.0),
            citation: CitationSpan::sentinel(),
        }
    }
}

/// One conversation turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    User {
        text: String,
        at: DateTime<Utc>,
    },
    Assistant {
        result: AnswerResult,
        at: DateTime<Utc>,
    },
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Message::User {
            text: text.into(),
            at: Utc::now(),
        }
    }

    pub fn assistant(result: AnswerResult) -> Self {
        Message::Assistant {
            result,
            at: Utc::now(),
        }
    }

    pub fn at(&self) -> DateTime<Utc> {
        match self {
            Message::User { at, .. } | Message::Assistant { at, .. } => *at,
        }
    }

    pub fn as_assistant(&self) -> Option<&AnswerResult> {
        match self {
            Message::Assistant { result, .. } => Some(result),
            Message::User { .. } => None,
        }
    }
}
