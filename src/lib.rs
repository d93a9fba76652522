//! # docqa
//!
//! Grounded question answering over a single document.
//!
//! A document (uploaded file, fetched web page, or pasted text) is reduced
//! to one canonical text buffer. Questions about it go to a generative
//! answer gateway, which returns an answer plus a claimed supporting
//! excerpt. The excerpt's offsets are checked against the buffer and, when
//! wrong, repaired by a case-insensitive search, so a UI can always
//! highlight exactly the text the answer rests on, or nothing.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌────────────┐   ┌─────────────────┐
//! │ File/URL/Text│──▶│ Normalizer │──▶│ CanonicalDocument│
//! └──────────────┘   └────────────┘   └───────┬─────────┘
//!                                             │ context
//!                ┌────────────────┐   ┌───────▼───────┐
//!   question ───▶│    Session     │──▶│ AnswerGateway │
//!                └──────┬─────────┘   └───────┬───────┘
//!                       │    ◀── resolve ─────┘
//!                ┌──────▼──┐        ┌──────────┐
//!                │   CLI   │        │   HTTP   │
//!                └─────────┘        └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`extract`] | PDF / DOCX / PPTX / plain-text extraction |
//! | [`html`] | Built-in web page extractor |
//! | [`normalize`] | Document sources → canonical documents |
//! | [`gateway`] | Answer gateway implementations |
//! | [`session`] | Per-user turn orchestration |
//! | [`server`] | HTTP server |
//! | [`traits`] | Extension traits for gateways and extractors |
//!
//! The pure pieces (data model, citation resolver, history, validation)
//! live in [`docqa_core`], re-exported here.

pub mod config;
pub mod extract;
pub mod gateway;
pub mod html;
pub mod normalize;
pub mod server;
pub mod session;
pub mod traits;

pub use docqa_core;
