//! Input validation and answer sanitation.

use crate::error::ValidationError;

/// Default upper bound on question length, in characters.
pub const DEFAULT_MAX_QUESTION_CHARS: usize = 500;

/// Trim and check a question before any network call.
///
/// Returns the trimmed question on success.
pub fn validate_question(question: &str, max_chars: usize) -> Result<&str, ValidationError> {
    let trimmed = question.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyQuestion);
    }
    if trimmed.chars().count() > max_chars {
        return Err(ValidationError::QuestionTooLong { max: max_chars });
    }
    Ok(trimmed)
}

/// Clamp a gateway confidence into `[0, 1]`; non-finite values are dropped.
pub fn sanitize_confidence(confidence: Option<f64>) -> Option<f64> {
    confidence
        .filter(|c| c.is_finite())
        .map(|c| c.clamp(0.0, 1.0))
}
