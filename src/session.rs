//! Session controller: one user's document, conversation, and highlight.
//!
//! A turn is split into two halves so a caller holding the session behind
//! a lock can release it while the gateway is working:
//!
//! 1. [`Session::begin_turn`] validates the question, records the user
//!    message, and snapshots the request.
//! 2. [`Session::complete_turn`] resolves the answer's citation against
//!    whatever document is current *at completion* and records the
//!    assistant message.
//!
//! [`Session::ask`] runs both halves back to back. The highlight is never
//! stored; it is recomputed from the last assistant message and the
//! current document on every read, so swapping documents cannot leave a
//! stale span behind.
//!
//! Loads are split the same way. [`Session::begin_load`] hands out a
//! ticket and [`Session::finish_load`] installs the normalized document
//! only if no later load or swap has happened since, so a slow fetch can
//! never overwrite a newer document.

use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use docqa_core::validate::{sanitize_confidence, validate_question, DEFAULT_MAX_QUESTION_CHARS};
use docqa_core::{
    normalize_citation, resolve_with_outcome, AnswerResult, AnswerStyle, CanonicalDocument,
    CitationSpan, DocumentSource, Domain, GenerationError, Highlight, History, Message,
    ResolveOutcome, ValidationError,
};

use crate::normalize::Normalizer;
use crate::traits::{AnswerGateway, AnswerRequest, GatewayAnswer};

pub const FILE_ERROR_TEXT: &str = "Could not read or process the file.";

/// A turn that has been validated and recorded but not yet answered.
#[derive(Debug, Clone)]
pub struct PendingTurn {
    pub request: AnswerRequest,
    /// Document generation the request was built against.
    pub generation: u64,
}

pub struct Session {
    id: Uuid,
    document: CanonicalDocument,
    generation: u64,
    load_seq: u64,
    history: History,
    style: AnswerStyle,
    domain: Domain,
    max_question_chars: usize,
    gateway: Arc<dyn AnswerGateway>,
    normalizer: Arc<Normalizer>,
}

impl Session {
    pub fn new(gateway: Arc<dyn AnswerGateway>, normalizer: Arc<Normalizer>) -> Self {
        Self {
            id: Uuid::new_v4(),
            document: CanonicalDocument::empty(),
            generation: 0,
            load_seq: 0,
            history: History::new(),
            style: AnswerStyle::default(),
            domain: Domain::default(),
            max_question_chars: DEFAULT_MAX_QUESTION_CHARS,
            gateway,
            normalizer,
        }
    }

    pub fn with_max_question_chars(mut self, max_chars: usize) -> Self {
        self.max_question_chars = max_chars;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn document(&self) -> &CanonicalDocument {
        &self.document
    }

    /// Bumped on every document swap.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn style(&self) -> AnswerStyle {
        self.style
    }

    pub fn domain(&self) -> Domain {
        self.domain
    }

    pub fn gateway(&self) -> &Arc<dyn AnswerGateway> {
        &self.gateway
    }

    pub fn normalizer(&self) -> &Arc<Normalizer> {
        &self.normalizer
    }

    pub fn set_style(&mut self, style: AnswerStyle) {
        self.style = style;
    }

    pub fn set_domain(&mut self, domain: Domain) {
        self.domain = domain;
    }

    /// Normalize `source` and make it the current document.
    ///
    /// Never fails: URL problems already degrade inside the normalizer, and
    /// file problems become a placeholder titled with the file name.
    pub async fn load_document(&mut self, source: DocumentSource) -> &CanonicalDocument {
        let ticket = self.begin_load();
        let document = load_source(&self.normalizer, source).await;
        self.finish_load(ticket, document);
        &self.document
    }

    /// Reserve a load ticket. Any earlier ticket becomes stale.
    pub fn begin_load(&mut self) -> u64 {
        self.load_seq += 1;
        self.load_seq
    }

    /// Install `document` if `ticket` is still the newest load.
    ///
    /// Returns `false` and drops the document when a later load or
    /// [`Session::replace_document`] has superseded it.
    pub fn finish_load(&mut self, ticket: u64, document: CanonicalDocument) -> bool {
        if ticket != self.load_seq {
            info!(
                session = %self.id,
                ticket,
                newest = self.load_seq,
                title = %document.title,
                "superseded document load discarded"
            );
            return false;
        }
        self.install(document);
        true
    }

    /// Swap in an already-normalized document, superseding in-flight loads.
    pub fn replace_document(&mut self, document: CanonicalDocument) {
        self.load_seq += 1;
        self.install(document);
    }

    fn install(&mut self, document: CanonicalDocument) {
        self.generation += 1;
        info!(
            session = %self.id,
            generation = self.generation,
            title = %document.title,
            fingerprint = %document.fingerprint(),
            "document loaded"
        );
        self.document = document;
    }

    /// Validate `question`, record it, and build the gateway request.
    pub fn begin_turn(&mut self, question: &str) -> Result<PendingTurn, ValidationError> {
        let question = validate_question(question, self.max_question_chars)?.to_string();
        self.history.append(Message::user(question.clone()));
        debug!(session = %self.id, generation = self.generation, "turn started");

        Ok(PendingTurn {
            request: AnswerRequest {
                question,
                context: self.document.text.clone(),
                style: self.style,
                domain: self.domain,
            },
            generation: self.generation,
        })
    }

    /// Turn the gateway's outcome into a recorded [`AnswerResult`].
    pub fn complete_turn(
        &mut self,
        pending: PendingTurn,
        outcome: anyhow::Result<GatewayAnswer>,
    ) -> AnswerResult {
        let result = match check_output(outcome) {
            Ok(answer) => self.ground(answer),
            Err(e) => {
                warn!(session = %self.id, gateway = self.gateway.name(), error = %e, "answer generation failed");
                AnswerResult::apology()
            }
        };

        if pending.generation != self.generation {
            info!(
                session = %self.id,
                requested = pending.generation,
                current = self.generation,
                "document changed while answering; citation resolved against current document"
            );
        }

        self.history.append(Message::assistant(result.clone()));
        result
    }

    /// Ask one question end to end.
    pub async fn ask(&mut self, question: &str) -> Result<AnswerResult, ValidationError> {
        let pending = self.begin_turn(question)?;
        let outcome = self.gateway.generate(&pending.request).await;
        Ok(self.complete_turn(pending, outcome))
    }

    /// The last answer's citation, re-resolved against the current document.
    pub fn highlight(&self) -> Option<CitationSpan> {
        let last = self.history.last_assistant_message()?;
        let (span, _) = resolve_with_outcome(&self.document.text, &last.citation);
        (!span.is_sentinel()).then_some(span)
    }

    /// The current document split around [`Session::highlight`].
    pub fn highlight_view(&self) -> Option<Highlight<'_>> {
        let span = self.highlight()?;
        Highlight::split(&self.document.text, &span)
    }

    fn ground(&self, answer: GatewayAnswer) -> AnswerResult {
        let (claimed, malformed) = normalize_citation(answer.citation.as_ref());
        if let Some(err) = malformed {
            debug!(session = %self.id, error = %err, "gateway citation malformed");
        }

        let (citation, outcome) = resolve_with_outcome(&self.document.text, &claimed);
        if outcome == ResolveOutcome::NotFound {
            debug!(session = %self.id, cited = %claimed.text, "cited text not found in document");
        }

        let confidence = sanitize_confidence(answer.confidence_value());
        let source = answer
            .source
            .filter(|s| !s.trim().is_empty())
            .or_else(|| (!self.document.is_empty()).then(|| self.document.title.clone()));

        AnswerResult {
            answer: answer.answer,
            source,
            confidence,
            citation,
        }
    }
}

/// Normalize `source`, recovering file failures into a placeholder.
///
/// Usable without holding a session, so servers can fetch outside a lock.
pub async fn load_source(normalizer: &Normalizer, source: DocumentSource) -> CanonicalDocument {
    let fallback_title = match &source {
        DocumentSource::File { name, .. } => Some(name.clone()),
        _ => None,
    };
    match normalizer.normalize(source).await {
        Ok(document) => document,
        Err(e) => {
            let title = fallback_title
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| docqa_core::models::UNTITLED.to_string());
            warn!(file = %title, error = %e, "file ingestion failed; using placeholder document");
            CanonicalDocument::new(title, FILE_ERROR_TEXT)
        }
    }
}

fn check_output(outcome: anyhow::Result<GatewayAnswer>) -> Result<GatewayAnswer, GenerationError> {
    let answer = outcome.map_err(|e| GenerationError::Gateway(format!("{:#}", e)))?;
    if answer.answer.trim().is_empty() {
        return Err(GenerationError::EmptyOutput);
    }
    Ok(answer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use anyhow::bail;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use docqa_core::RawCitation;

    /// Replays canned answers and records every request it sees.
    struct ScriptedGateway {
        replies: Mutex<VecDeque<anyhow::Result<GatewayAnswer>>>,
        seen: Mutex<Vec<AnswerRequest>>,
    }

    impl ScriptedGateway {
        fn new(replies: Vec<anyhow::Result<GatewayAnswer>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl AnswerGateway for ScriptedGateway {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, request: &AnswerRequest) -> anyhow::Result<GatewayAnswer> {
            self.seen.lock().unwrap().push(request.clone());
            match self.replies.lock().unwrap().pop_front() {
                Some(reply) => reply,
                None => bail!("script exhausted"),
            }
        }
    }

    fn session(gateway: Arc<ScriptedGateway>) -> Session {
        let normalizer = Arc::new(Normalizer::from_config(&Config::default()).unwrap());
        Session::new(gateway, normalizer)
    }

    fn cited(answer: &str, text: &str, start: i64, end: i64) -> anyhow::Result<GatewayAnswer> {
        Ok(GatewayAnswer {
            answer: answer.to_string(),
            source: None,
            confidence: Some(json!(0.9)),
            citation: Some(RawCitation::new(text, start, end)),
        })
    }

    const PHOTO: &str = "Photosynthesis converts light into chemical energy.";

    #[tokio::test]
    async fn new_session_is_empty() {
        let s = session(ScriptedGateway::new(vec![]));
        assert_eq!(s.document(), &CanonicalDocument::empty());
        assert!(s.history().is_empty());
        assert_eq!(s.style(), AnswerStyle::Brief);
        assert_eq!(s.domain(), Domain::General);
        assert_eq!(s.highlight(), None);
    }

    #[tokio::test]
    async fn grounded_answer_is_resolved_and_recorded() {
        let gateway = ScriptedGateway::new(vec![cited("It makes energy.", "light into chemical", 24, 43)]);
        let mut s = session(gateway.clone());
        s.replace_document(CanonicalDocument::new("bio.txt", PHOTO));

        let result = s.ask("What does it do?").await.unwrap();
        assert_eq!(result.citation, CitationSpan::new("light into chemical", 24, 43));
        assert_eq!(result.source.as_deref(), Some("bio.txt"));
        assert_eq!(result.confidence, Some(0.9));
        assert_eq!(s.history().len(), 2);
        assert_eq!(s.highlight(), Some(result.citation.clone()));

        let view = s.highlight_view().unwrap();
        assert_eq!(view.excerpt, "light into chemical");
        assert_eq!(format!("{}{}{}", view.prefix, view.excerpt, view.suffix), PHOTO);

        let seen = gateway.seen.lock().unwrap();
        assert_eq!(seen[0].context, PHOTO);
        assert_eq!(seen[0].question, "What does it do?");
    }

    #[tokio::test]
    async fn wrong_offsets_are_relocated() {
        let gateway = ScriptedGateway::new(vec![cited("a", "LIGHT INTO", 0, 3)]);
        let mut s = session(gateway);
        s.replace_document(CanonicalDocument::new("bio.txt", PHOTO));

        let result = s.ask("q").await.unwrap();
        assert_eq!(result.citation, CitationSpan::new("light into", 24, 34));
    }

    #[tokio::test]
    async fn empty_question_is_rejected_without_a_turn() {
        let gateway = ScriptedGateway::new(vec![]);
        let mut s = session(gateway.clone());
        assert_eq!(s.ask("   ").await.unwrap_err(), ValidationError::EmptyQuestion);
        assert!(s.history().is_empty());
        assert!(gateway.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn long_question_is_rejected() {
        let mut s = session(ScriptedGateway::new(vec![])).with_max_question_chars(5);
        assert_eq!(
            s.ask("toolong").await.unwrap_err(),
            ValidationError::QuestionTooLong { max: 5 }
        );
    }

    #[tokio::test]
    async fn gateway_failure_becomes_apology() {
        let mut s = session(ScriptedGateway::new(vec![Err(anyhow::anyhow!("boom"))]));
        s.replace_document(CanonicalDocument::new("bio.txt", PHOTO));

        let result = s.ask("q").await.unwrap();
        assert_eq!(result, AnswerResult::apology());
        assert_eq!(s.history().len(), 2);
        assert_eq!(s.highlight(), None);
    }

    #[tokio::test]
    async fn blank_answer_becomes_apology() {
        let mut s = session(ScriptedGateway::new(vec![Ok(GatewayAnswer::text("  "))]));
        assert_eq!(s.ask("q").await.unwrap(), AnswerResult::apology());
    }

    #[tokio::test]
    async fn style_and_domain_pass_through() {
        let gateway = ScriptedGateway::new(vec![Ok(GatewayAnswer::text("ok"))]);
        let mut s = session(gateway.clone());
        s.set_style(AnswerStyle::Technical);
        s.set_domain(Domain::Law);
        s.ask("q").await.unwrap();

        let seen = gateway.seen.lock().unwrap();
        assert_eq!(seen[0].style, AnswerStyle::Technical);
        assert_eq!(seen[0].domain, Domain::Law);
    }

    #[tokio::test]
    async fn conversational_turn_keeps_gateway_source() {
        let gateway = ScriptedGateway::new(vec![Ok(GatewayAnswer {
            answer: "Upload a document to get started.".into(),
            source: Some("General knowledge".into()),
            confidence: Some(json!(0)),
            citation: None,
        })]);
        let mut s = session(gateway.clone());
        let result = s.ask("hi").await.unwrap();
        assert!(result.citation.is_sentinel());
        assert_eq!(result.source.as_deref(), Some("General knowledge"));
        assert_eq!(result.confidence, Some(0.0));
        assert_eq!(gateway.seen.lock().unwrap()[0].context, "");
    }

    #[tokio::test]
    async fn out_of_range_confidence_is_clamped() {
        let gateway = ScriptedGateway::new(vec![Ok(GatewayAnswer {
            answer: "x".into(),
            confidence: Some(json!(7)),
            ..Default::default()
        })]);
        let mut s = session(gateway);
        assert_eq!(s.ask("q").await.unwrap().confidence, Some(1.0));
    }

    #[tokio::test]
    async fn document_switch_mid_turn_degrades_to_no_highlight() {
        let gateway = ScriptedGateway::new(vec![]);
        let mut s = session(gateway);
        s.replace_document(CanonicalDocument::new("bio.txt", PHOTO));

        let pending = s.begin_turn("q").unwrap();
        s.replace_document(CanonicalDocument::new("other.txt", "Nothing relevant here."));
        let result = s.complete_turn(pending, cited("a", "light into chemical", 24, 43));

        assert!(result.citation.is_sentinel());
        assert_eq!(s.highlight(), None);
    }

    #[tokio::test]
    async fn highlight_follows_document_swaps() {
        let gateway = ScriptedGateway::new(vec![cited("a", "chemical energy", 35, 50)]);
        let mut s = session(gateway);
        s.replace_document(CanonicalDocument::new("bio.txt", PHOTO));
        s.ask("q").await.unwrap();
        assert!(s.highlight().is_some());

        s.replace_document(CanonicalDocument::new("x", "unrelated"));
        assert_eq!(s.highlight(), None);

        let moved = format!("Intro. {}", PHOTO);
        s.replace_document(CanonicalDocument::new("y", moved.clone()));
        let span = s.highlight().unwrap();
        assert_eq!(&moved[span.start_index as usize..span.end_index as usize], "chemical energy");
    }

    #[tokio::test]
    async fn unreadable_file_becomes_named_placeholder() {
        let mut s = session(ScriptedGateway::new(vec![]));
        let before = s.generation();
        let doc = s
            .load_document(DocumentSource::File {
                name: "broken.pdf".into(),
                mime_hint: Some("application/pdf".into()),
                raw_bytes: b"garbage".to_vec(),
            })
            .await
            .clone();
        assert_eq!(doc, CanonicalDocument::new("broken.pdf", FILE_ERROR_TEXT));
        assert_eq!(s.generation(), before + 1);
    }

    #[tokio::test]
    async fn raw_text_load_replaces_document() {
        let mut s = session(ScriptedGateway::new(vec![]));
        s.load_document(DocumentSource::RawText { text: PHOTO.into() })
            .await;
        assert_eq!(s.document(), &CanonicalDocument::new("Untitled", PHOTO));
    }

    #[tokio::test]
    async fn slow_load_does_not_overwrite_newer_document() {
        let mut s = session(ScriptedGateway::new(vec![]));
        let slow = s.begin_load();
        let fast = s.begin_load();

        assert!(s.finish_load(fast, CanonicalDocument::new("new", "newer document")));
        let generation = s.generation();
        assert!(!s.finish_load(slow, CanonicalDocument::new("old", "old content")));

        assert_eq!(s.document().text, "newer document");
        assert_eq!(s.generation(), generation);
    }

    #[tokio::test]
    async fn replace_supersedes_pending_load() {
        let mut s = session(ScriptedGateway::new(vec![]));
        let ticket = s.begin_load();
        s.replace_document(CanonicalDocument::new("pasted", PHOTO));
        assert!(!s.finish_load(ticket, CanonicalDocument::new("late", "late page")));
        assert_eq!(s.document().text, PHOTO);
    }
}
