//! # AnthroMux
//!
//! A protocol-translating reverse proxy that exposes the Anthropic Messages
//! API and drives an OpenAI Responses API upstream: either a generic
//! OpenAI-compatible endpoint authenticated with a static API key, or the
//! Codex/ChatGPT backend authenticated through an OAuth token pair.
//!
//! ## Library usage
//!
//! ```rust,no_run
//! use anthromux::{Config, create_app};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let app = create_app(config).await?;
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: environment-variable configuration, no TOML/CLI layer
//! - [`auth`]: Codex/ChatGPT OAuth credential store and refresh
//! - [`transport`]: upstream HTTP transport (direct and OAuth modes)
//! - [`converter`]: Anthropic <-> OpenAI request/response mapping
//! - [`stream`]: OpenAI Responses SSE to Anthropic Messages SSE translation
//! - [`model_resolver`]: Anthropic model name to OpenAI model name resolution
//! - [`token_counter`]: OpenAI chat-completions token counting
//! - [`server`]: HTTP route handlers
//! - [`error`]: error taxonomy and the Anthropic wire error envelope

pub mod auth;
pub mod config;
pub mod converter;
pub mod error;
pub mod logging;
pub mod model_resolver;
pub mod server;
pub mod stream;
pub mod token_counter;
pub mod transport;
pub mod types;

pub use config::{Config, ValidationIssue, ValidationSeverity};
pub use error::ProxyError;

/* --- start of code -------------------------------------------------------------------------- */

/// Builds the full Axum router: the four Anthropic-facing routes, CORS, and
/// request tracing, wired onto one shared [`server::AppState`].
///
/// # Errors
///
/// Returns a [`ProxyError`] if application state fails to initialize.
pub async fn create_app(config: Config) -> Result<axum::Router, ProxyError> {
    use axum::Router;
    use axum::routing::{get, post};
    use std::sync::Arc;
    use tower_http::cors::CorsLayer;
    use tower_http::trace::TraceLayer;

    let app_state = Arc::new(server::AppState::new(config).await?);

    Ok(Router::new()
        .route("/v1/messages", post(server::messages))
        .route("/v1/messages/stream", post(server::messages_stream))
        .route("/v1/messages/count_tokens", post(server::count_tokens))
        .route("/v1/messages/token_count", post(server::count_tokens))
        .route("/health", get(server::health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state))
}
