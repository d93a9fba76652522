//! Extension seams for the two external collaborators.
//!
//! The grounded-answer pipeline never generates language or parses web
//! pages itself. It calls out through these traits:
//!
//! ```text
//!   DocumentSource::Url ──fetch──▶ ContentExtractor ──▶ CanonicalDocument
//!
//!   question + document ──▶ AnswerGateway ──▶ GatewayAnswer ──▶ resolver
//! ```
//!
//! Built-in implementations live in [`crate::gateway`] and [`crate::html`].
//! Implement the traits directly to plug in a different model backend or
//! a readability engine.
//!
//! # Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use anyhow::Result;
//! use docqa::traits::{AnswerGateway, AnswerRequest, GatewayAnswer};
//!
//! pub struct EchoGateway;
//!
//! #[async_trait]
//! impl AnswerGateway for EchoGateway {
//!     fn name(&self) -> &str { "echo" }
//!
//!     async fn generate(&self, request: &AnswerRequest) -> Result<GatewayAnswer> {
//!         Ok(GatewayAnswer::text(format!("You asked: {}", request.question)))
//!     }
//! }
//! ```

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use docqa_core::{AnswerStyle, Domain, RawCitation};

// ═══════════════════════════════════════════════════════════════════════
// Answer gateway
// ═══════════════════════════════════════════════════════════════════════

/// Everything the answer backend receives for one turn.
///
/// `style` and `domain` are generation hints only; nothing downstream of
/// the gateway reads them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnswerRequest {
    pub question: String,
    /// The full canonical document text; empty for conversational turns.
    pub context: String,
    pub style: AnswerStyle,
    pub domain: Domain,
}

/// An answer as the backend produced it, before any validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GatewayAnswer {
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub source: Option<String>,
    /// Expected to be a number in `[0, 1]`, but kept raw.
    #[serde(default)]
    pub confidence: Option<Value>,
    #[serde(default)]
    pub citation: Option<RawCitation>,
}

impl GatewayAnswer {
    /// An answer with no source, confidence, or citation.
    pub fn text(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            ..Default::default()
        }
    }

    /// Numeric confidence, accepting numbers and numeric strings.
    pub fn confidence_value(&self) -> Option<f64> {
        match self.confidence.as_ref()? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// The generative answer backend.
#[async_trait]
pub trait AnswerGateway: Send + Sync {
    /// Short identifier used in logs and `GET /health`.
    fn name(&self) -> &str;

    /// Produce an answer for `request`.
    ///
    /// Errors are recovered by the session into an apology turn; they are
    /// never shown to the user verbatim.
    async fn generate(&self, request: &AnswerRequest) -> Result<GatewayAnswer>;
}

// ═══════════════════════════════════════════════════════════════════════
// Content extraction
// ═══════════════════════════════════════════════════════════════════════

/// Readable text pulled out of a fetched page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedContent {
    pub title: String,
    pub content: String,
}

/// Turns raw page markup into a title and body text.
#[async_trait]
pub trait ContentExtractor: Send + Sync {
    /// `url` is the address the markup was fetched from.
    async fn extract(&self, url: &str, markup: &str) -> Result<ExtractedContent>;
}
