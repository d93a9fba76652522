//! Error kinds for the grounded-answer pipeline.
//!
//! Every kind except [`ValidationError`] is recovered locally into a
//! degraded but well-typed value (a placeholder document, an apology
//! answer, the sentinel citation). Only validation failures are meant to
//! reach a user, and only as a message.

use thiserror::Error;

/// A document source could not be fetched, decoded, or extracted.
#[derive(Error, Debug)]
pub enum IngestionError {
    /// The byte source exceeded the configured size bound.
    #[error("document too large: {size} bytes (limit {limit})")]
    TooLarge { size: usize, limit: usize },

    /// No extractor exists for the content type.
    #[error("unsupported content-type: {0}")]
    UnsupportedContentType(String),

    /// A plain-text source was not valid UTF-8.
    #[error("document is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// Text extraction from a binary format failed.
    #[error("extraction failed: {0}")]
    Extraction(String),

    /// Fetching a remote source failed.
    #[error("fetch failed: {0}")]
    Fetch(String),
}

/// The answer gateway failed or produced nothing usable.
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("answer gateway failed: {0}")]
    Gateway(String),

    #[error("answer gateway returned no output")]
    EmptyOutput,
}

/// A gateway citation had missing or unusable offset fields.
///
/// Never returned to callers: the citation is normalized to the sentinel
/// and this value is only logged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MalformedCitationError {
    #[error("citation is missing field `{0}`")]
    MissingField(&'static str),

    #[error("citation field `{field}` is not an integer offset: {value}")]
    NotAnOffset { field: &'static str, value: String },
}

/// A question was rejected before any network call.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Please enter a question.")]
    EmptyQuestion,

    #[error("Question must be {max} characters or less.")]
    QuestionTooLong { max: usize },
}
