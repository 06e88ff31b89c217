//! # AnthroMux
//!
//! A protocol-translating reverse proxy exposing the Anthropic Messages API,
//! backed by an OpenAI Responses API upstream or the OAuth-authenticated
//! Codex/ChatGPT backend.
//!
//! ## Quick start
//!
//! ```bash
//! export OPENAI_API_KEY=sk-...
//! anthromux
//! ```
//!
//! Configuration is environment-variable only (optionally loaded from a
//! `.env` file); see [`anthromux::Config`] for the full variable table.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

use anthromux::{Config, ValidationSeverity, create_app};

#[tokio::main]
async fn main() {
    if let Err(e) = dotenvy::dotenv() {
        if std::path::Path::new(".env").exists() {
            eprintln!("warning: could not load .env file: {e}");
        }
    }

    init_logging();

    if let Err(e) = run().await {
        eprintln!("fatal: {e}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    let issues = config.validate();
    let errors: Vec<_> = issues.iter().filter(|i| i.severity == ValidationSeverity::Error).collect();
    if !errors.is_empty() {
        eprintln!("configuration is invalid:");
        for (index, issue) in errors.iter().enumerate() {
            eprintln!("  {}. {}: {}", index + 1, issue.field, issue.message);
            if let Some(suggestion) = &issue.suggestion {
                eprintln!("     fix: {suggestion}");
            }
        }
        std::process::exit(1);
    }
    for issue in issues.iter().filter(|i| i.severity == ValidationSeverity::Warning) {
        tracing::warn!(field = %issue.field, "{}", issue.message);
    }

    let port = config.port;
    let app = create_app(config).await?;

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "anthromux listening");
    axum::serve(listener, app).await?;

    Ok(())
}

fn init_logging() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}
