//!
//! Configuration for the Anthropic-to-OpenAI translating proxy.
//!
//! Everything is driven by environment variables (optionally loaded from a
//! `.env` file), with no TOML file and no interactive CLI layer: the
//! external configuration surface of this proxy is deliberately small.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use std::collections::HashMap;
use std::env;

use serde::Deserialize;

use crate::error::{ProxyError, Result};
use crate::model_resolver::ModelMap;

/* --- types ----------------------------------------------------------------------------------- */

/// Which upstream the proxy talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamMode {
    /// A generic OpenAI-compatible endpoint, authenticated with a static
    /// API key (`OPENAI_API_KEY`).
    Openai,
    /// The ChatGPT/Codex backend, authenticated with an OAuth token pair
    /// refreshed from an on-disk credential file.
    Codex,
}

impl UpstreamMode {
    fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(UpstreamMode::Openai),
            "codex" => Ok(UpstreamMode::Codex),
            other => Err(ProxyError::Config(format!(
                "invalid OPENAI_UPSTREAM_MODE '{other}': expected 'openai' or 'codex'\n  \
                 fix: set OPENAI_UPSTREAM_MODE=openai (static API key) or \
                 OPENAI_UPSTREAM_MODE=codex (OAuth-backed ChatGPT backend)"
            ))),
        }
    }
}

/// Top-level application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port the HTTP server binds to.
    pub port: u16,
    /// Which upstream backend requests are translated into.
    pub upstream_mode: UpstreamMode,
    /// Static API key for `UpstreamMode::Openai`. Required in that mode.
    pub openai_api_key: Option<String>,
    /// Base URL for the OpenAI-compatible upstream (direct mode).
    pub openai_base_url: String,
    /// Base URL for the Codex/ChatGPT backend (OAuth mode).
    pub codex_base_url: String,
    /// Path to the on-disk OAuth credential file (OAuth mode).
    pub codex_auth_path: String,
    /// Instructions injected when the caller's system prompt is empty
    /// (OAuth mode requires non-empty instructions).
    pub codex_default_instructions: String,
    /// Default OpenAI model used when model resolution misses.
    pub default_model: String,
    /// Anthropic-name -> OpenAI-name model aliasing table.
    pub model_map: ModelMap,
    /// Override for the Codex OAuth refresh token endpoint.
    pub codex_refresh_token_url_override: Option<String>,
    /// Whether structured request/response logging is enabled.
    pub log_all: bool,
}

/// A single configuration problem, collected (not failed-fast on) so a user
/// sees every issue in one run.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    pub field: String,
    pub severity: ValidationSeverity,
    pub message: String,
    pub suggestion: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationSeverity {
    Error,
    Warning,
}

/* --- constants ------------------------------------------------------------------------------ */

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_CODEX_BASE_URL: &str = "https://chatgpt.com/backend-api/codex";
const DEFAULT_CODEX_AUTH_PATH: &str = "~/.codex/auth.json";
const DEFAULT_CODEX_INSTRUCTIONS: &str = "You are a helpful assistant.";
const DEFAULT_MODEL: &str = "gpt-5.2";

/* --- start of code -------------------------------------------------------------------------- */

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError::Config` if `OPENAI_UPSTREAM_MODE` is set to an
    /// unrecognized value, if `MODEL_MAP_JSON` fails to parse, or if the
    /// model map contains ambiguous prefix ties (see
    /// [`crate::model_resolver::ModelMap::parse`]).
    pub fn from_env() -> Result<Self> {
        let upstream_mode = match env::var("OPENAI_UPSTREAM_MODE") {
            Ok(raw) => UpstreamMode::parse(&raw)?,
            Err(_) => UpstreamMode::Openai,
        };

        let model_map_json = env::var("MODEL_MAP_JSON").unwrap_or_default();
        let model_map = ModelMap::parse(&model_map_json).map_err(|e| {
            ProxyError::Config(format!(
                "invalid MODEL_MAP_JSON: {e}\n  \
                 fix: MODEL_MAP_JSON must be a JSON object mapping Anthropic model \
                 names (or prefixes) to OpenAI model names, optionally nested under \
                 a \"models\" key. Each key must be unique after trimming and \
                 case-folding, and no two keys may tie as the longest prefix match \
                 for the same request."
            ))
        })?;

        Ok(Self {
            port: parse_env_or("PORT", DEFAULT_PORT)?,
            upstream_mode,
            openai_api_key: env::var("OPENAI_API_KEY").ok().filter(|s| !s.is_empty()),
            openai_base_url: env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_OPENAI_BASE_URL.to_string()),
            codex_base_url: env::var("CODEX_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_CODEX_BASE_URL.to_string()),
            codex_auth_path: env::var("CODEX_AUTH_PATH")
                .unwrap_or_else(|_| DEFAULT_CODEX_AUTH_PATH.to_string()),
            codex_default_instructions: env::var("CODEX_DEFAULT_INSTRUCTIONS")
                .unwrap_or_else(|_| DEFAULT_CODEX_INSTRUCTIONS.to_string()),
            default_model: env::var("OPENAI_DEFAULT_MODEL")
                .unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            model_map,
            codex_refresh_token_url_override: env::var("CODEX_REFRESH_TOKEN_URL_OVERRIDE")
                .ok()
                .filter(|s| !s.is_empty()),
            log_all: env::var("OBS_LOG_ALL")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        })
    }

    /// Expands `~` at the start of [`Self::codex_auth_path`] to the user's
    /// home directory, mirroring the original's `Path.expanduser()`.
    pub fn expanded_codex_auth_path(&self) -> String {
        shellexpand::tilde(&self.codex_auth_path).into_owned()
    }

    /// Validates cross-field invariants that can't be checked while parsing
    /// a single variable in isolation, collecting every problem rather than
    /// failing on the first one.
    pub fn validate(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        if self.upstream_mode == UpstreamMode::Openai && self.openai_api_key.is_none() {
            issues.push(ValidationIssue {
                field: "OPENAI_API_KEY".to_string(),
                severity: ValidationSeverity::Error,
                message: "OPENAI_UPSTREAM_MODE=openai requires an API key".to_string(),
                suggestion: Some(
                    "set OPENAI_API_KEY, or switch OPENAI_UPSTREAM_MODE=codex to use \
                     OAuth credentials instead"
                        .to_string(),
                ),
            });
        }

        if let Some(url) = &self.codex_refresh_token_url_override {
            if let Err(message) = validate_refresh_url(url) {
                issues.push(ValidationIssue {
                    field: "CODEX_REFRESH_TOKEN_URL_OVERRIDE".to_string(),
                    severity: ValidationSeverity::Error,
                    message,
                    suggestion: Some(
                        "use an https:// URL (http is only allowed for localhost)".to_string(),
                    ),
                });
            }
        }

        issues
    }
}

/// Rejects non-https refresh-token URLs unless the host is a loopback
/// address, matching the spec's "https required off-localhost" rule.
fn validate_refresh_url(raw: &str) -> std::result::Result<(), String> {
    let url = reqwest::Url::parse(raw).map_err(|e| format!("not a valid URL: {e}"))?;
    let is_loopback =
        matches!(url.host_str(), Some("localhost") | Some("127.0.0.1") | Some("::1"));
    if url.scheme() != "https" && !is_loopback {
        return Err(format!(
            "refresh token URL '{raw}' must use https:// unless the host is localhost"
        ));
    }
    Ok(())
}

fn parse_env_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) => raw.parse::<T>().map_err(|_| {
            ProxyError::Config(format!("{key} is set but is not a valid value: '{raw}'"))
        }),
        Err(_) => Ok(default),
    }
}

/// The model-map JSON may be given flat (`{"claude-x": "gpt-y"}`) or nested
/// under a `models` key; this type captures both shapes for deserialization.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ModelMapJson {
    Nested { models: HashMap<String, String> },
    Flat(HashMap<String, String>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_mode_defaults_to_openai() {
        temp_env::with_vars_unset(["OPENAI_UPSTREAM_MODE"], || {
            assert_eq!(UpstreamMode::parse("openai").unwrap(), UpstreamMode::Openai);
        });
    }

    #[test]
    fn upstream_mode_rejects_unknown_values() {
        assert!(UpstreamMode::parse("bogus").is_err());
    }

    #[test]
    fn validate_refresh_url_allows_localhost_http() {
        assert!(validate_refresh_url("http://localhost:1234/oauth/token").is_ok());
    }

    #[test]
    fn validate_refresh_url_rejects_non_https_remote_host() {
        assert!(validate_refresh_url("http://auth.openai.com/oauth/token").is_err());
    }
}
