//! # docqa CLI
//!
//! Ask questions about a document and get answers whose supporting excerpt
//! is located in the document text.
//!
//! ## Usage
//!
//! ```bash
//! docqa --config ./config/docqa.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docqa ask "<question>"` | One-shot question about a file, URL, or text |
//! | `docqa chat` | Interactive session (`:doc`, `:url`, `:style`, `:domain`, `:history`, `:quit`) |
//! | `docqa serve` | Start the HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! docqa ask "What does chlorophyll absorb?" --file notes/biology.pdf
//! docqa ask "Summarize the article" --url https://example.com/post --style educational
//! docqa chat --file contract.docx --domain law
//! docqa serve
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use docqa::config::{self, Config};
use docqa::gateway::create_gateway;
use docqa::normalize::Normalizer;
use docqa::server;
use docqa::session::Session;
use docqa_core::{AnswerResult, AnswerStyle, DocumentSource, Domain, Message};

/// docqa — grounded question answering over a single document.
#[derive(Parser)]
#[command(
    name = "docqa",
    about = "Ask questions about a document and see the passage each answer is grounded in",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/docqa.toml`. A missing file means built-in
    /// defaults (answer gateway disabled).
    #[arg(long, global = true, default_value = "./config/docqa.toml")]
    config: PathBuf,

    /// Log at debug level (overridden by `RUST_LOG`).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a single question and print the grounded answer.
    Ask {
        /// The question.
        question: String,

        #[command(flatten)]
        document: DocumentArgs,

        #[command(flatten)]
        hints: HintArgs,
    },

    /// Start an interactive question-and-answer session.
    Chat {
        #[command(flatten)]
        document: DocumentArgs,

        #[command(flatten)]
        hints: HintArgs,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

/// Where the document comes from. At most one may be given.
#[derive(clap::Args)]
struct DocumentArgs {
    /// Local file (plain text, PDF, DOCX, PPTX).
    #[arg(long, conflicts_with_all = ["url", "text"])]
    file: Option<PathBuf>,

    /// Web page to fetch.
    #[arg(long, conflicts_with = "text")]
    url: Option<String>,

    /// Literal document text.
    #[arg(long)]
    text: Option<String>,
}

#[derive(clap::Args)]
struct HintArgs {
    /// Answer style: brief, classic, educational, technical, creative.
    #[arg(long)]
    style: Option<AnswerStyle>,

    /// Domain: general, education, job, law, research.
    #[arg(long)]
    domain: Option<Domain>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = load_or_default(&cli.config)?;

    match cli.command {
        Commands::Ask {
            question,
            document,
            hints,
        } => {
            let mut session = build_session(&cfg, &document, &hints).await?;
            match session.ask(&question).await {
                Ok(result) => print_answer(&session, &result),
                Err(e) => {
                    eprintln!("{}", e);
                    std::process::exit(2);
                }
            }
        }
        Commands::Chat { document, hints } => {
            let session = build_session(&cfg, &document, &hints).await?;
            run_chat(session).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        config::load_config(path)
    } else {
        warn!(path = %path.display(), "config file not found; using defaults");
        Ok(Config::default())
    }
}

async fn build_session(cfg: &Config, document: &DocumentArgs, hints: &HintArgs) -> Result<Session> {
    let gateway = create_gateway(&cfg.gateway)?;
    let normalizer = Arc::new(Normalizer::from_config(cfg)?);
    let mut session =
        Session::new(gateway, normalizer).with_max_question_chars(cfg.questions.max_chars);

    if let Some(style) = hints.style {
        session.set_style(style);
    }
    if let Some(domain) = hints.domain {
        session.set_domain(domain);
    }
    if let Some(source) = document_source(document)? {
        let doc = session.load_document(source).await;
        println!("Loaded \"{}\" ({} bytes)", doc.title, doc.text.len());
    }
    Ok(session)
}

fn document_source(args: &DocumentArgs) -> Result<Option<DocumentSource>> {
    if let Some(path) = &args.file {
        return file_source(path).map(Some);
    }
    if let Some(url) = &args.url {
        return Ok(Some(DocumentSource::Url {
            address: url.clone(),
        }));
    }
    Ok(args
        .text
        .as_ref()
        .map(|text| DocumentSource::RawText { text: text.clone() }))
}

fn file_source(path: &Path) -> Result<DocumentSource> {
    let raw_bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(DocumentSource::File {
        name,
        mime_hint: None,
        raw_bytes,
    })
}

fn print_answer(session: &Session, result: &AnswerResult) {
    println!("{}", result.answer);
    println!();
    if let Some(source) = &result.source {
        println!("Source:     {}", source);
    }
    if let Some(confidence) = result.confidence {
        println!("Confidence: {:.2}", confidence);
    }
    match session.highlight_view() {
        Some(view) => println!(
            "Excerpt:    \"{}\" (bytes {}..{})",
            view.excerpt,
            view.prefix.len(),
            view.prefix.len() + view.excerpt.len()
        ),
        None => println!("Excerpt:    (none)"),
    }
}

const CHAT_HELP: &str = "Commands: :doc <path>, :url <address>, :style <name>, :domain <name>, :history, :quit";

async fn run_chat(mut session: Session) -> Result<()> {
    println!("{}", CHAT_HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (command, arg) = match line.split_once(char::is_whitespace) {
            Some((c, a)) => (c, a.trim()),
            None => (line, ""),
        };

        match command {
            ":quit" | ":q" => break,
            ":help" => println!("{}", CHAT_HELP),
            ":doc" => match file_source(Path::new(arg)) {
                Ok(source) => {
                    let doc = session.load_document(source).await;
                    println!("Loaded \"{}\" ({} bytes)", doc.title, doc.text.len());
                }
                Err(e) => println!("{:#}", e),
            },
            ":url" => {
                let doc = session
                    .load_document(DocumentSource::Url {
                        address: arg.to_string(),
                    })
                    .await;
                println!("Loaded \"{}\" ({} bytes)", doc.title, doc.text.len());
            }
            ":style" => match arg.parse::<AnswerStyle>() {
                Ok(style) => {
                    session.set_style(style);
                    println!("Style: {}", style);
                }
                Err(e) => println!("{}", e),
            },
            ":domain" => match arg.parse::<Domain>() {
                Ok(domain) => {
                    session.set_domain(domain);
                    println!("Domain: {}", domain);
                }
                Err(e) => println!("{}", e),
            },
            ":history" => print_history(&session),
            _ => match session.ask(line).await {
                Ok(result) => print_answer(&session, &result),
                Err(e) => println!("{}", e),
            },
        }
    }

    Ok(())
}

fn print_history(session: &Session) {
    if session.history().is_empty() {
        println!("(no messages yet)");
        return;
    }
    for message in session.history() {
        let at = message.at().format("%H:%M:%S");
        match message {
            Message::User { text, .. } => println!("[{}] you: {}", at, text),
            Message::Assistant { result, .. } => println!("[{}] assistant: {}", at, result.answer),
        }
    }
}
