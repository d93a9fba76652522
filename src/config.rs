//! TOML configuration.
//!
//! Every section has defaults, so an empty file (or no file at all) is a
//! valid configuration with the answer gateway disabled.
//!
//! ```toml
//! [gateway]
//! provider = "openai"
//! model = "gpt-4o-mini"
//! base_url = "https://api.openai.com/v1"
//!
//! [fetch]
//! timeout_secs = 15
//!
//! [questions]
//! max_chars = 500
//!
//! [server]
//! bind = "127.0.0.1:7340"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;

use docqa_core::validate::DEFAULT_MAX_QUESTION_CHARS;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub questions: QuestionsConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_gateway_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            base_url: default_base_url(),
            timeout_secs: default_gateway_timeout_secs(),
            max_retries: default_max_retries(),
            temperature: default_temperature(),
        }
    }
}

impl GatewayConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_gateway_timeout_secs() -> u64 {
    60
}
fn default_max_retries() -> u32 {
    3
}
fn default_temperature() -> f32 {
    0.2
}

#[derive(Debug, Deserialize, Clone)]
pub struct FetchConfig {
    #[serde(default = "default_fetch_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Responses larger than this are treated as a failed fetch.
    #[serde(default = "default_fetch_max_bytes")]
    pub max_bytes: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_fetch_timeout_secs(),
            user_agent: default_user_agent(),
            max_bytes: default_fetch_max_bytes(),
        }
    }
}

fn default_fetch_timeout_secs() -> u64 {
    15
}
fn default_user_agent() -> String {
    format!("docqa/{}", env!("CARGO_PKG_VERSION"))
}
fn default_fetch_max_bytes() -> usize {
    10 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: usize,
    /// Bound on a single decompressed OOXML part (zip-bomb protection).
    #[serde(default = "default_max_xml_entry_bytes")]
    pub max_xml_entry_bytes: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: default_max_file_bytes(),
            max_xml_entry_bytes: default_max_xml_entry_bytes(),
        }
    }
}

fn default_max_file_bytes() -> usize {
    50 * 1024 * 1024
}
fn default_max_xml_entry_bytes() -> u64 {
    50 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct QuestionsConfig {
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
}

impl Default for QuestionsConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
        }
    }
}

fn default_max_chars() -> usize {
    DEFAULT_MAX_QUESTION_CHARS
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7340".to_string()
}

/// Parse and validate a config from TOML text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Read, parse, and validate the config file at `path`.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

fn validate(config: &Config) -> Result<()> {
    match config.gateway.provider.as_str() {
        "disabled" | "openai" => {}
        other => bail!(
            "Unknown gateway provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    if config.gateway.is_enabled() && config.gateway.model.is_none() {
        bail!(
            "gateway.model must be specified when provider is '{}'",
            config.gateway.provider
        );
    }

    if !(0.0..=2.0).contains(&config.gateway.temperature) {
        bail!("gateway.temperature must be in [0.0, 2.0]");
    }

    if config.gateway.timeout_secs == 0 || config.fetch.timeout_secs == 0 {
        bail!("timeouts must be > 0");
    }

    if config.questions.max_chars == 0 {
        bail!("questions.max_chars must be > 0");
    }

    if config.ingest.max_file_bytes == 0
        || config.ingest.max_xml_entry_bytes == 0
        || config.fetch.max_bytes == 0
    {
        bail!("size limits must be > 0");
    }

    Ok(())
}
