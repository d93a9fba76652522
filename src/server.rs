//! HTTP server for a single grounded-answer session.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (version and gateway name) |
//! | `POST` | `/document` | Load a document from text, a URL, or a base64 file |
//! | `GET`  | `/document` | Current document title and text |
//! | `POST` | `/ask` | Ask a question about the current document |
//! | `GET`  | `/history` | Conversation so far |
//! | `GET`  | `/highlight` | Current citation split out of the document |
//! | `PUT`  | `/settings` | Change answer style and/or domain |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "Please enter a question." } }
//! ```
//!
//! Error codes: `bad_request` (400). Ingestion and generation failures are
//! not errors here; they come back as placeholder documents and apology
//! answers.
//!
//! # Locking
//!
//! The session sits behind a `tokio::sync::Mutex`. URL fetches and answer
//! generation run with the lock released, so a document can be swapped
//! while an answer is in flight; the answer's citation is then resolved
//! against the new document.
//! Each `POST /document` takes a load ticket before fetching; when loads
//! overlap, the last one to start wins regardless of which finishes first.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use docqa_core::{AnswerResult, AnswerStyle, CitationSpan, DocumentSource, Domain, Message};

use crate::config::Config;
use crate::gateway::create_gateway;
use crate::normalize::Normalizer;
use crate::session::{load_source, Session};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    session: Arc<Mutex<Session>>,
}

/// Starts the HTTP server with the gateway and normalizer from `config`.
///
/// Binds to `[server].bind` and runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let gateway = create_gateway(&config.gateway)?;
    let normalizer = Arc::new(Normalizer::from_config(config)?);
    let session =
        Session::new(gateway, normalizer).with_max_question_chars(config.questions.max_chars);
    run_server_with_session(config, session).await
}

/// Starts the HTTP server around an already-built session.
///
/// Use this to serve a custom [`AnswerGateway`](crate::traits::AnswerGateway)
/// or [`ContentExtractor`](crate::traits::ContentExtractor).
pub async fn run_server_with_session(config: &Config, session: Session) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let gateway_name = session.gateway().name().to_string();
    let app = router(session);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(bind = %bind_addr, gateway = %gateway_name, "server started");
    println!("docqa server listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}

/// Build the router without binding a socket.
pub fn router(session: Session) -> Router {
    let state = AppState {
        session: Arc::new(Mutex::new(session)),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/document", post(handle_load_document).get(handle_get_document))
        .route("/ask", post(handle_ask))
        .route("/history", get(handle_history))
        .route("/highlight", get(handle_highlight))
        .route("/settings", put(handle_settings))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    gateway: String,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let gateway = state.session.lock().await.gateway().name().to_string();
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        gateway,
    })
}

// ============ POST /document, GET /document ============

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum DocumentRequest {
    Text {
        text: String,
    },
    Url {
        url: String,
    },
    File {
        name: String,
        #[serde(default)]
        mime_type: Option<String>,
        /// Base64-encoded file bytes.
        data: String,
    },
}

impl DocumentRequest {
    fn into_source(self) -> Result<DocumentSource, AppError> {
        Ok(match self {
            DocumentRequest::Text { text } => DocumentSource::RawText { text },
            DocumentRequest::Url { url } => DocumentSource::Url { address: url },
            DocumentRequest::File {
                name,
                mime_type,
                data,
            } => {
                let raw_bytes = STANDARD
                    .decode(data.trim())
                    .map_err(|e| bad_request(format!("file data is not valid base64: {}", e)))?;
                DocumentSource::File {
                    name,
                    mime_hint: mime_type,
                    raw_bytes,
                }
            }
        })
    }
}

#[derive(Serialize)]
struct DocumentResponse {
    title: String,
    text: String,
    generation: u64,
}

async fn handle_load_document(
    State(state): State<AppState>,
    Json(req): Json<DocumentRequest>,
) -> Result<Json<DocumentResponse>, AppError> {
    let source = req.into_source()?;

    let (ticket, normalizer) = {
        let mut session = state.session.lock().await;
        (session.begin_load(), session.normalizer().clone())
    };
    let document = load_source(&normalizer, source).await;

    // A superseded load reports whatever document is current.
    let mut session = state.session.lock().await;
    session.finish_load(ticket, document);
    Ok(Json(document_response(&session)))
}

async fn handle_get_document(State(state): State<AppState>) -> Json<DocumentResponse> {
    let session = state.session.lock().await;
    Json(document_response(&session))
}

fn document_response(session: &Session) -> DocumentResponse {
    DocumentResponse {
        title: session.document().title.clone(),
        text: session.document().text.clone(),
        generation: session.generation(),
    }
}

// ============ POST /ask ============

#[derive(Deserialize)]
struct AskRequest {
    question: String,
}

async fn handle_ask(
    State(state): State<AppState>,
    Json(req): Json<AskRequest>,
) -> Result<Json<AnswerResult>, AppError> {
    let (pending, gateway) = {
        let mut session = state.session.lock().await;
        let pending = session
            .begin_turn(&req.question)
            .map_err(|e| bad_request(e.to_string()))?;
        (pending, session.gateway().clone())
    };

    let outcome = gateway.generate(&pending.request).await;

    let mut session = state.session.lock().await;
    Ok(Json(session.complete_turn(pending, outcome)))
}

// ============ GET /history ============

#[derive(Serialize)]
struct HistoryResponse {
    messages: Vec<Message>,
}

async fn handle_history(State(state): State<AppState>) -> Json<HistoryResponse> {
    let session = state.session.lock().await;
    Json(HistoryResponse {
        messages: session.history().messages().to_vec(),
    })
}

// ============ GET /highlight ============

#[derive(Serialize)]
struct HighlightResponse {
    highlight: Option<HighlightBody>,
}

#[derive(Serialize)]
struct HighlightBody {
    citation: CitationSpan,
    prefix: String,
    excerpt: String,
    suffix: String,
}

async fn handle_highlight(State(state): State<AppState>) -> Json<HighlightResponse> {
    let session = state.session.lock().await;
    let highlight = session.highlight().and_then(|citation| {
        session.highlight_view().map(|view| HighlightBody {
            prefix: view.prefix.to_string(),
            excerpt: view.excerpt.to_string(),
            suffix: view.suffix.to_string(),
            citation,
        })
    });
    Json(HighlightResponse { highlight })
}

// ============ PUT /settings ============

#[derive(Deserialize)]
struct SettingsRequest {
    #[serde(default)]
    style: Option<String>,
    #[serde(default)]
    domain: Option<String>,
}

#[derive(Serialize)]
struct SettingsResponse {
    style: AnswerStyle,
    domain: Domain,
}

async fn handle_settings(
    State(state): State<AppState>,
    Json(req): Json<SettingsRequest>,
) -> Result<Json<SettingsResponse>, AppError> {
    let style = req
        .style
        .map(|s| s.parse::<AnswerStyle>())
        .transpose()
        .map_err(|e| bad_request(e.to_string()))?;
    let domain = req
        .domain
        .map(|d| d.parse::<Domain>())
        .transpose()
        .map_err(|e| bad_request(e.to_string()))?;

    let mut session = state.session.lock().await;
    if let Some(style) = style {
        session.set_style(style);
    }
    if let Some(domain) = domain {
        session.set_domain(domain);
    }
    Ok(Json(SettingsResponse {
        style: session.style(),
        domain: session.domain(),
    }))
}
