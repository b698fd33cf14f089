//! # Chat Harness CLI (`chat`)
//!
//! The `chat` binary is the primary interface for Chat Harness. It provides
//! commands for database initialization, intent classification, sending
//! messages, an interactive session, file registration, and starting the
//! HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! chat --config ./config/chat.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `chat init` | Create the SQLite database and run schema migrations |
//! | `chat classify "<message>"` | Print the intent a message routes to |
//! | `chat send "<message>"` | Run one turn, optionally continuing a chat |
//! | `chat repl` | Interactive session with `/clear`, `/new`, `/edit` |
//! | `chat history <chat-id>` | Print a stored chat |
//! | `chat files add\|list` | Register or list files for file retrieval |
//! | `chat serve` | Start the HTTP server |
//!
//! ## Logging
//!
//! Logs go to stderr. `RUST_LOG` sets the filter (default
//! `chat_harness=info`); `LOG_FORMAT=json` switches to JSON lines.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chat_harness::config::{self, Config};
use chat_harness::db;
use chat_harness::intent::{ClassifyContext, Classifier, KeywordClassifier};
use chat_harness::llm::OpenAiChatModel;
use chat_harness::models::FileRecord;
use chat_harness::notify::TracingNotifier;
use chat_harness::orchestrator::{ChatSession, Services, SessionOptions, TurnOutcome};
use chat_harness::server;
use chat_harness::store::ChatStore;

/// Chat Harness CLI: intent routing and retrieval orchestration for
/// document-grounded chat.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. `classify` falls back to built-in defaults when the file is missing.
#[derive(Parser)]
#[command(
    name = "chat",
    about = "Chat Harness: intent routing and retrieval orchestration for document chat",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/chat.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Classify a message and print the intent it routes to.
    Classify {
        message: String,

        /// Summary of the previous search, enabling follow-up detection.
        #[arg(long)]
        summary: Option<String>,
    },

    /// Send one message and print the answer.
    Send {
        message: String,

        /// Continue an existing chat instead of starting a new one.
        #[arg(long)]
        chat: Option<String>,

        /// File ids to attach as retrieval context.
        #[arg(long = "file")]
        files: Vec<String>,
    },

    /// Start an interactive session.
    ///
    /// Ctrl-C stops a running generation. Commands: `/clear`, `/new`,
    /// `/edit <seq> <text>`, `/history`, `/quit`.
    Repl {
        /// Continue an existing chat.
        #[arg(long)]
        chat: Option<String>,
    },

    /// Print the messages of a stored chat.
    History { chat_id: String },

    /// Manage the files available to file retrieval.
    Files {
        #[command(subcommand)]
        action: FilesAction,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum FilesAction {
    /// Register a file.
    Add {
        name: String,

        #[arg(long, default_value = "")]
        description: String,

        #[arg(long)]
        collection: Option<String>,

        /// File id; a new UUID when omitted.
        #[arg(long)]
        id: Option<String>,
    },
    /// List the configured user's files.
    List,
}

fn init_tracing() {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "chat_harness=info".into());
    let registry = tracing_subscriber::registry().with(env_filter);

    if log_format == "json" {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    // Classification works without a config file
    if let Commands::Classify { message, summary } = &cli.command {
        let cfg = config::load_config(&cli.config).unwrap_or_else(|_| Config::minimal());
        return run_classify(&cfg, message, summary.clone()).await;
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            db::open_store(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Classify { .. } => unreachable!(),
        Commands::Send {
            message,
            chat,
            files,
        } => {
            let session = open_session(&cfg, chat.as_deref()).await?;
            if !files.is_empty() {
                session.attach_files(files);
            }
            let outcome = run_turn(&session, &message).await?;
            if let Some(id) = session.chat_id() {
                eprintln!("chat: {}", id);
            }
            if let TurnOutcome::Failed { .. } | TurnOutcome::CommandFailed { .. } = outcome {
                std::process::exit(1);
            }
        }
        Commands::Repl { chat } => {
            let session = open_session(&cfg, chat.as_deref()).await?;
            run_repl(&session).await?;
        }
        Commands::History { chat_id } => {
            let store = db::open_store(&cfg).await?;
            print_history(&store, &chat_id).await?;
        }
        Commands::Files { action } => {
            let store = db::open_store(&cfg).await?;
            let user_id = cfg.chat.user_id.clone();
            match action {
                FilesAction::Add {
                    name,
                    description,
                    collection,
                    id,
                } => {
                    let file = FileRecord {
                        id: id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
                        user_id,
                        name,
                        description,
                        collection,
                    };
                    store.upsert_file(&file).await?;
                    println!("Added {} ({})", file.name, file.id);
                }
                FilesAction::List => {
                    let files = store.list_files(&user_id).await?;
                    if files.is_empty() {
                        println!("No files registered.");
                    }
                    for f in files {
                        match &f.collection {
                            Some(c) => println!("{}  {} ({})", f.id, f.name, c),
                            None => println!("{}  {}", f.id, f.name),
                        }
                    }
                }
            }
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}

async fn run_classify(cfg: &Config, message: &str, summary: Option<String>) -> anyhow::Result<()> {
    let ctx = ClassifyContext {
        has_prior_chunks: summary.is_some(),
        last_summary: summary,
    };
    let intent = if cfg.classifier.strategy == "deterministic" {
        KeywordClassifier.classify(message, &ctx)
    } else {
        let model = Arc::new(OpenAiChatModel::new(&cfg.llm)?);
        Classifier::from_config(cfg, model)?
            .classify(message, &ctx)
            .await
    };
    println!("{}", intent);
    Ok(())
}

async fn open_session(cfg: &Config, chat_id: Option<&str>) -> anyhow::Result<ChatSession> {
    let services = Services::from_config(cfg, Arc::new(TracingNotifier)).await?;
    let options = SessionOptions::from_config(cfg);
    let settings = cfg.chat_settings();
    match chat_id {
        Some(id) => ChatSession::resume(services, options, settings, id)
            .await
            .with_context(|| format!("Failed to open chat {}", id)),
        None => Ok(ChatSession::new(services, options, settings)),
    }
}

/// Run one turn, streaming generated text to stdout. Ctrl-C stops generation.
async fn run_turn(session: &ChatSession, input: &str) -> anyhow::Result<TurnOutcome> {
    let mut streamed = false;
    let result = {
        let mut on_delta = |delta: &str| {
            streamed = true;
            print!("{}", delta);
            let _ = std::io::stdout().flush();
        };
        let turn = session.submit_streaming(input, &mut on_delta);
        tokio::pin!(turn);
        loop {
            tokio::select! {
                r = &mut turn => break r,
                _ = tokio::signal::ctrl_c() => {
                    session.stop();
                }
            }
        }
    };
    let outcome = result?;

    match &outcome {
        TurnOutcome::Stopped { .. } => println!("\n[stopped]"),
        TurnOutcome::Failed { restored_input, .. } => {
            if streamed {
                println!();
            }
            eprintln!("error: {}", outcome.display_text());
            if !restored_input.is_empty() {
                eprintln!("input kept: {}", restored_input);
            }
        }
        _ if streamed => println!(),
        _ => println!("{}", outcome.display_text()),
    }
    Ok(outcome)
}

async fn run_repl(session: &ChatSession) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("Type a message, or /clear, /new, /edit <seq> <text>, /history, /quit.");

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

        match line.split_once(' ').map_or((line, ""), |(c, r)| (c, r)) {
            ("/quit", _) | ("/exit", _) => break,
            ("/clear", _) => {
                session.clear_context();
                println!("Search context cleared.");
            }
            ("/new", _) => {
                session.new_chat();
                println!("Started a new chat.");
            }
            ("/history", _) => {
                for m in session.snapshot().messages {
                    println!("[{}] {}: {}", m.sequence_number, m.role.as_str(), m.content);
                }
            }
            ("/edit", rest) => {
                let Some((seq, text)) = rest.trim().split_once(' ') else {
                    println!("usage: /edit <seq> <text>");
                    continue;
                };
                let Ok(seq) = seq.parse::<i64>() else {
                    println!("invalid sequence number: {}", seq);
                    continue;
                };
                match session.edit_and_resend(seq, text).await {
                    Ok(outcome) => println!("{}", outcome.display_text()),
                    Err(e) => eprintln!("error: {}", e),
                }
            }
            _ => {
                if let Err(e) = run_turn(session, line).await {
                    eprintln!("error: {:#}", e);
                }
            }
        }
    }
    Ok(())
}

async fn print_history(store: &dyn ChatStore, chat_id: &str) -> anyhow::Result<()> {
    if store.get_chat(chat_id).await?.is_none() {
        bail!("chat not found: {}", chat_id);
    }
    let messages = store.list_messages(chat_id).await?;
    if messages.is_empty() {
        println!("No messages.");
    }
    for m in messages {
        println!("[{}] {}: {}", m.sequence_number, m.role.as_str(), m.content);
    }
    Ok(())
}
