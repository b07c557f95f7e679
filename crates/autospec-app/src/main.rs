//! AutoSpec application binary - composition root.
//!
//! 1. Load configuration from TOML
//! 2. Build the embedding backend and language model client
//! 3. Create the session and index any documents named on the command line
//! 4. Answer questions read from stdin until `:quit` or end of input

mod cli;
mod shell;

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use autospec_chat::{OpenAiCompatibleClient, RagSession};
use autospec_core::config::{AutoSpecConfig, EmbeddingBackend};
use autospec_core::error::{AutoSpecError, Result};
use autospec_vector::{DynEmbeddingService, MockEmbedding, OnnxEmbeddingService};

use cli::{expand_home, CliArgs};
use shell::{Command, Outcome, Shell};

/// Select the embedding backend named in `[embedding]`.
fn build_embedder(config: &AutoSpecConfig) -> Result<Arc<dyn DynEmbeddingService>> {
    match config.embedding.backend {
        EmbeddingBackend::Mock => {
            tracing::warn!("Using mock embeddings; retrieval quality will be arbitrary");
            Ok(Arc::new(MockEmbedding::new()))
        }
        EmbeddingBackend::Onnx => {
            let model_dir = expand_home(&config.embedding.model_dir);
            let service = OnnxEmbeddingService::from_config(&config.embedding, &model_dir)
                .map_err(|e| {
                    AutoSpecError::Config(format!(
                        "{e} (set [embedding] backend = \"mock\" to run without a model)"
                    ))
                })?;
            tracing::info!(model_dir = %model_dir.display(), "ONNX embedding model loaded");
            Ok(Arc::new(service))
        }
    }
}

/// Load the config file if present; report problems once tracing is up.
fn load_config(path: &Path) -> (AutoSpecConfig, Option<String>) {
    if !path.exists() {
        return (
            AutoSpecConfig::default(),
            Some(format!("No config at {}, using defaults", path.display())),
        );
    }
    match AutoSpecConfig::load(path) {
        Ok(config) => (config, None),
        Err(e) => (
            AutoSpecConfig::default(),
            Some(format!("Ignoring {}: {e}", path.display())),
        ),
    }
}

fn print_prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let (config, config_note) = load_config(&config_file);

    // Tracing.
    let log_level = args.resolve_log_level(&config.general.log_level);
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .init();

    tracing::info!("Starting AutoSpec v{}", env!("CARGO_PKG_VERSION"));
    match config_note {
        Some(note) => tracing::warn!("{note}"),
        None => tracing::info!(path = %config_file.display(), "Configuration loaded"),
    }

    // Session.
    let embedder = build_embedder(&config)?;
    let model = Arc::new(OpenAiCompatibleClient::from_config(&config.llm)?);
    tracing::info!(model = %config.llm.model, endpoint = %model.endpoint(), "Language model configured");
    let session = RagSession::new(&config, embedder, model)?;
    let mut shell = Shell::new(session);

    for path in &args.documents {
        println!("{}", shell.load(path).await);
    }
    if !shell.session().is_ready() {
        println!("Load a manual with :load PATH, then ask a question. Type :help for commands.");
    }

    // Question loop.
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print_prompt();
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            println!();
            break;
        };
        match shell.execute(Command::parse(&line)).await {
            Outcome::Continue(text) if text.is_empty() => {}
            Outcome::Continue(text) => println!("{text}\n"),
            Outcome::Quit => break,
        }
    }

    tracing::info!("AutoSpec exiting");
    Ok(())
}
