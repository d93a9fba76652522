//! Answer gateway implementations.
//!
//! - **[`DisabledGateway`]**: always fails; every turn becomes the apology
//!   answer. Used when `gateway.provider = "disabled"`.
//! - **[`OpenAiGateway`]**: calls an OpenAI-compatible
//!   `POST {base_url}/chat/completions` endpoint in JSON mode, with retry
//!   and backoff.
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use docqa_core::{AnswerStyle, Domain};

use crate::config::GatewayConfig;
use crate::traits::{AnswerGateway, AnswerRequest, GatewayAnswer};

/// Build the configured gateway.
///
/// # Errors
///
/// Unknown provider names, or an `openai` provider without a model or
/// without `OPENAI_API_KEY` in the environment.
pub fn create_gateway(config: &GatewayConfig) -> Result<Arc<dyn AnswerGateway>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledGateway)),
        "openai" => Ok(Arc::new(OpenAiGateway::new(config)?)),
        other => bail!("Unknown gateway provider: {}", other),
    }
}

// ============ Disabled ============

pub struct DisabledGateway;

#[async_trait]
impl AnswerGateway for DisabledGateway {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn generate(&self, _request: &AnswerRequest) -> Result<GatewayAnswer> {
        bail!("Answer gateway is disabled; set gateway.provider in the config")
    }
}

// ============ OpenAI-compatible ============

pub struct OpenAiGateway {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_retries: u32,
}

impl OpenAiGateway {
    /// Create a gateway reading the API key from `OPENAI_API_KEY`.
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        Self::with_api_key(config, api_key)
    }

    /// Create a gateway with an explicit API key.
    pub fn with_api_key(config: &GatewayConfig, api_key: impl Into<String>) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("gateway.model required for OpenAI provider"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: api_key.into(),
            model,
            temperature: config.temperature,
            max_retries: config.max_retries,
        })
    }

    fn request_body(&self, request: &AnswerRequest) -> Value {
        json!({
            "model": self.model,
            "temperature": self.temperature,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": system_prompt(request) },
                { "role": "user", "content": user_prompt(request) },
            ],
        })
    }
}

#[async_trait]
impl AnswerGateway for OpenAiGateway {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &AnswerRequest) -> Result<GatewayAnswer> {
        let body = self.request_body(request);
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                debug!(attempt, ?delay, "retrying answer gateway");
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: Value = response.json().await?;
                        return parse_chat_response(&json);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        warn!(%status, attempt, "answer gateway returned a retryable error");
                        last_err = Some(anyhow::anyhow!(
                            "Answer gateway error {}: {}",
                            status,
                            body_text
                        ));
                        continue;
                    }

                    bail!("Answer gateway error {}: {}", status, body_text);
                }
                Err(e) => {
                    warn!(error = %e, attempt, "answer gateway request failed");
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Answer generation failed after retries")))
    }
}

/// Pull `choices[0].message.content` out of a chat-completions response and
/// parse it as a [`GatewayAnswer`].
pub fn parse_chat_response(json: &Value) -> Result<GatewayAnswer> {
    let content = json
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow::anyhow!("Invalid chat response: missing choices[0].message.content"))?;

    let payload = strip_code_fence(content);
    if payload.is_empty() {
        bail!("Answer gateway returned no output");
    }

    serde_json::from_str(payload).with_context(|| "Answer gateway output is not a JSON answer object")
}

/// Some models wrap JSON mode output in a Markdown fence anyway.
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

// ============ Prompts ============

const OUTPUT_CONTRACT: &str = r#"Respond with a single JSON object and nothing else:
{"answer": string, "source": string, "confidence": number, "citation": {"text": string, "startIndex": integer, "endIndex": integer}}
- "confidence" is between 0 and 1.
- "citation.text" is the shortest passage of the context that supports the answer, copied exactly: same characters, same case, same whitespace and line breaks.
- "startIndex" and "endIndex" are the 0-based offsets of that passage in the context, end exclusive."#;

const NO_CONTEXT_CONTRACT: &str = r#"Respond with a single JSON object and nothing else:
{"answer": string, "source": "General conversation", "confidence": 0, "citation": {"text": "", "startIndex": -1, "endIndex": -1}}"#;

/// System prompt: role, style and domain guidance, output contract.
pub fn system_prompt(request: &AnswerRequest) -> String {
    let mut prompt = String::from(
        "You are a friendly and helpful assistant for a document Q&A application.\n",
    );

    if request.context.is_empty() {
        prompt.push_str(
            "No document has been provided. Be conversational and helpful. If the user asks \
             about a document, tell them they need to upload one (a file, pasted text, or a URL) \
             before you can answer questions about it.\n",
        );
    } else {
        prompt.push_str(
            "You are an expert at answering questions based on the provided context. Answer \
             using only the context. If the context does not contain the answer, say so and use \
             an empty citation with startIndex and endIndex set to -1.\n",
        );
    }

    prompt.push_str(style_guidance(request.style));
    prompt.push('\n');
    prompt.push_str(domain_guidance(request.domain));
    prompt.push_str("\n\n");
    prompt.push_str(if request.context.is_empty() {
        NO_CONTEXT_CONTRACT
    } else {
        OUTPUT_CONTRACT
    });
    prompt
}

/// User prompt: the context (when present) followed by the question.
pub fn user_prompt(request: &AnswerRequest) -> String {
    if request.context.is_empty() {
        format!("Question:\n{}", request.question)
    } else {
        format!(
            "Context:\n{}\n\nQuestion:\n{}",
            request.context, request.question
        )
    }
}

fn style_guidance(style: AnswerStyle) -> &'static str {
    match style {
        AnswerStyle::Brief => "Answer in one to three sentences.",
        AnswerStyle::Classic => "Answer in a clear, well-organized paragraph.",
        AnswerStyle::Educational => {
            "Explain the answer step by step, as a patient teacher would, defining key terms."
        }
        AnswerStyle::Technical => {
            "Answer precisely, using the exact terminology, figures, and identifiers from the source."
        }
        AnswerStyle::Creative => {
            "Answer in an engaging, vivid way while staying faithful to the source."
        }
    }
}

fn domain_guidance(domain: Domain) -> &'static str {
    match domain {
        Domain::General => "The reader is a general audience.",
        Domain::Education => "The reader is a student studying this material.",
        Domain::Job => {
            "The reader is evaluating this document for work, such as a job posting, resume, or policy."
        }
        Domain::Law => {
            "The document is legal in nature; quote clauses precisely and do not give legal advice."
        }
        Domain::Research => {
            "The document is research material; distinguish findings, methods, and limitations."
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(context: &str) -> AnswerRequest {
        AnswerRequest {
            question: "What is it?".to_string(),
            context: context.to_string(),
            style: AnswerStyle::Technical,
            domain: Domain::Law,
        }
    }

    #[test]
    fn prompts_include_context_and_hints() {
        let req = request("Clause 4: the tenant pays rent.");
        let system = system_prompt(&req);
        assert!(system.contains("based on the provided context"));
        assert!(system.contains("exact terminology"));
        assert!(system.contains("legal in nature"));
        assert!(system.contains("startIndex"));

        let user = user_prompt(&req);
        assert!(user.starts_with("Context:\nClause 4"));
        assert!(user.ends_with("Question:\nWhat is it?"));
    }

    #[test]
    fn empty_context_uses_conversational_prompt() {
        let req = request("");
        let system = system_prompt(&req);
        assert!(system.contains("No document has been provided"));
        assert!(system.contains("\"startIndex\": -1"));
        assert_eq!(user_prompt(&req), "Question:\nWhat is it?");
    }

    #[test]
    fn parse_chat_response_reads_json_content() {
        let json = json!({
            "choices": [{ "message": { "content": "{\"answer\":\"Rent.\",\"source\":\"Lease\",\"confidence\":0.9,\"citation\":{\"text\":\"pays rent\",\"startIndex\":21,\"endIndex\":30}}" } }]
        });
        let answer = parse_chat_response(&json).unwrap();
        assert_eq!(answer.answer, "Rent.");
        assert_eq!(answer.source.as_deref(), Some("Lease"));
        assert_eq!(answer.confidence_value(), Some(0.9));
        let citation = answer.citation.unwrap();
        assert_eq!(citation.text.as_deref(), Some("pays rent"));
    }

    #[test]
    fn parse_chat_response_strips_fences() {
        let json = json!({
            "choices": [{ "message": { "content": "```json\n{\"answer\":\"ok\"}\n```" } }]
        });
        let answer = parse_chat_response(&json).unwrap();
        assert_eq!(answer.answer, "ok");
        assert!(answer.citation.is_none());
    }

    #[test]
    fn parse_chat_response_rejects_empty_and_malformed() {
        let empty = json!({ "choices": [{ "message": { "content": "  " } }] });
        assert!(parse_chat_response(&empty)
            .unwrap_err()
            .to_string()
            .contains("no output"));

        let missing = json!({ "choices": [] });
        assert!(parse_chat_response(&missing).is_err());

        let prose = json!({ "choices": [{ "message": { "content": "Sure! The answer is 4." } }] });
        assert!(parse_chat_response(&prose).is_err());
    }

    #[test]
    fn create_gateway_by_provider() {
        let config = GatewayConfig::default();
        assert_eq!(create_gateway(&config).unwrap().name(), "disabled");

        let bad = GatewayConfig {
            provider: "other".to_string(),
            ..GatewayConfig::default()
        };
        assert!(create_gateway(&bad).is_err());
    }

    #[tokio::test]
    async fn disabled_gateway_always_fails() {
        assert!(DisabledGateway.generate(&request("x")).await.is_err());
    }
}
