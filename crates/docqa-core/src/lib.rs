//! # DocQA Core
//!
//! Pure logic for grounded document Q&A: the document and answer model,
//! the citation resolver, conversation history, page joining, and input
//! validation.
//!
//! This crate performs no I/O. It has no tokio, HTTP, or filesystem
//! dependencies. The resolver, page joining, and validation functions are
//! deterministic; only message constructors read the clock.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | Documents, citations, answers, messages |
//! | [`citation`] | Claimed-span verification and repair |
//! | [`history`] | Append-only conversation log |
//! | [`pages`] | Page-ordered text joining |
//! | [`validate`] | Question and confidence checks |
//! | [`error`] | Error kinds |

pub mod citation;
pub mod error;
pub mod history;
pub mod models;
pub mod pages;
pub mod validate;

pub use citation::{normalize_citation, resolve, resolve_with_outcome, Highlight, RawCitation, ResolveOutcome};
pub use error::{GenerationError, IngestionError, MalformedCitationError, ValidationError};
pub use history::History;
pub use models::{
    AnswerResult, AnswerStyle, CanonicalDocument, CitationSpan, Domain, DocumentSource, Message,
};
