//!
//! Codex/ChatGPT OAuth credential store.
//!
//! Manages the on-disk OAuth token pair used to authenticate against the
//! Codex backend, refreshing it when it grows stale or when the upstream
//! rejects a request with 401. Follows Single Responsibility Principle -
//! only handles authentication.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::fs;
use tokio::sync::Mutex;

use crate::error::{ProxyError, Result};

/* --- types ----------------------------------------------------------------------------------- */

/// The OAuth token pair (plus optional account id / id token) needed to
/// authenticate against the Codex backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CodexTokens {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
}

/// A [`CodexTokens`] value paired with the timestamp it was last refreshed.
#[derive(Debug, Clone)]
pub struct CodexCredentials {
    pub tokens: CodexTokens,
    pub last_refresh: Option<DateTime<Utc>>,
}

/// Reads and atomically rewrites the on-disk credential file.
///
/// The file holds `{"tokens": {...}, "last_refresh": "<RFC3339>"}`. Writes
/// are performed by writing a temp file in the same directory and renaming
/// it over the target, so a crash mid-write can never leave a truncated or
/// partially-written credential file on disk.
pub struct CodexAuthStore {
    path: PathBuf,
}

/// Coordinates reading, refreshing, and persisting Codex OAuth credentials.
///
/// Wraps the store behind a mutex the same way the legacy GCP provider
/// wrapped its authenticator, so concurrent requests never interleave a
/// refresh-and-persist cycle.
pub struct CodexAuthManager {
    store: Arc<Mutex<CodexAuthStore>>,
    http: reqwest::Client,
    refresh_url: String,
}

/* --- constants ------------------------------------------------------------------------------ */

/// Tokens older than this are refreshed proactively before use.
const TOKEN_REFRESH_INTERVAL_DAYS: i64 = 8;

const CLIENT_ID: &str = "app_EMoamEEZ73f0CkXaXp7hrann";
const DEFAULT_REFRESH_TOKEN_URL: &str = "https://auth.openai.com/oauth/token";

/* --- start of code -------------------------------------------------------------------------- */

impl CodexAuthStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Loads the raw JSON document from disk.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError::Authentication` if the file is missing, is not
    /// readable, or does not contain a JSON object.
    pub async fn load_raw(&self) -> Result<Value> {
        let bytes = fs::read(&self.path).await.map_err(|e| {
            ProxyError::Authentication(format!(
                "could not read Codex credential file '{}': {e}",
                self.path.display()
            ))
        })?;
        let value: Value = serde_json::from_slice(&bytes).map_err(|e| {
            ProxyError::Authentication(format!("Codex credential file is not valid JSON: {e}"))
        })?;
        if !value.is_object() {
            return Err(ProxyError::Authentication(
                "Codex credential file must contain a JSON object".to_string(),
            ));
        }
        Ok(value)
    }

    /// Parses the raw document into tokens plus last-refresh timestamp.
    pub fn parse_credentials(raw: &Value) -> Result<CodexCredentials> {
        let tokens_value = raw.get("tokens").ok_or_else(|| {
            ProxyError::Authentication("Codex credential file is missing a 'tokens' object".to_string())
        })?;
        let tokens: CodexTokens = serde_json::from_value(tokens_value.clone()).map_err(|e| {
            ProxyError::Authentication(format!("Codex credential file has malformed tokens: {e}"))
        })?;
        if tokens.access_token.is_empty() || tokens.refresh_token.is_empty() {
            return Err(ProxyError::Authentication(
                "Codex credential file's access_token/refresh_token must be non-empty".to_string(),
            ));
        }

        let last_refresh = match raw.get("last_refresh").and_then(|v| v.as_str()) {
            Some(s) => Some(parse_last_refresh(s)?),
            None => None,
        };

        Ok(CodexCredentials { tokens, last_refresh })
    }

    pub async fn get_tokens_and_last_refresh(&self) -> Result<CodexCredentials> {
        let raw = self.load_raw().await?;
        Self::parse_credentials(&raw)
    }

    /// Atomically writes `raw` back to the credential file: write a temp
    /// file in the same parent directory, then rename it over the target.
    pub async fn save_raw(&self, raw: &Value) -> Result<()> {
        let parent = self.path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent).await.map_err(|e| {
            ProxyError::Authentication(format!("could not create credential directory: {e}"))
        })?;

        let mut tmp_path = parent.to_path_buf();
        let tmp_name = format!(
            ".{}.tmp-{}",
            self.path.file_name().and_then(|n| n.to_str()).unwrap_or("auth.json"),
            uuid::Uuid::new_v4()
        );
        tmp_path.push(tmp_name);

        let body = serde_json::to_string_pretty(raw)?;
        let write_result = fs::write(&tmp_path, format!("{body}\n")).await;
        if let Err(e) = write_result {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(ProxyError::Authentication(format!(
                "could not write Codex credential temp file: {e}"
            )));
        }

        fs::rename(&tmp_path, &self.path).await.map_err(|e| {
            ProxyError::Authentication(format!("could not atomically replace credential file: {e}"))
        })
    }
}

fn parse_last_refresh(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(seconds) = raw.parse::<i64>() {
        return DateTime::from_timestamp(seconds, 0)
            .ok_or_else(|| ProxyError::Authentication("invalid last_refresh timestamp".to_string()));
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ProxyError::Authentication(format!("invalid last_refresh value '{raw}': {e}")))
}

fn format_last_refresh(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

impl CodexAuthManager {
    pub fn new(path: impl Into<PathBuf>, refresh_url_override: Option<String>) -> Self {
        Self {
            store: Arc::new(Mutex::new(CodexAuthStore::new(path))),
            http: reqwest::Client::new(),
            refresh_url: refresh_url_override.unwrap_or_else(|| DEFAULT_REFRESH_TOKEN_URL.to_string()),
        }
    }

    fn needs_periodic_refresh(last_refresh: Option<DateTime<Utc>>) -> bool {
        match last_refresh {
            None => true,
            Some(ts) => Utc::now() - ts >= Duration::days(TOKEN_REFRESH_INTERVAL_DAYS),
        }
    }

    /// Loads the current tokens, refreshing and persisting them first if
    /// they are older than [`TOKEN_REFRESH_INTERVAL_DAYS`].
    pub async fn ensure_fresh(&self) -> Result<CodexTokens> {
        let store = self.store.lock().await;
        let creds = store.get_tokens_and_last_refresh().await?;
        if Self::needs_periodic_refresh(creds.last_refresh) {
            return self.refresh_and_persist(&store).await;
        }
        Ok(creds.tokens)
    }

    /// Forces a refresh regardless of age, used after an upstream 401.
    pub async fn refresh_on_unauthorized(&self) -> Result<CodexTokens> {
        let store = self.store.lock().await;
        self.refresh_and_persist(&store).await
    }

    async fn refresh_and_persist(&self, store: &CodexAuthStore) -> Result<CodexTokens> {
        let raw = store.load_raw().await?;
        let creds = CodexAuthStore::parse_credentials(&raw)?;

        let response = self
            .http
            .post(&self.refresh_url)
            .json(&json!({
                "client_id": CLIENT_ID,
                "grant_type": "refresh_token",
                "refresh_token": creds.tokens.refresh_token,
                "scope": "openid profile email",
            }))
            .timeout(std::time::Duration::from_secs(30))
            .send()
            .await
            .map_err(|e| ProxyError::Authentication(format!("Codex token refresh request failed: {e}")))?;

        if response.status().as_u16() >= 400 {
            let body = response.text().await.unwrap_or_default();
            return Err(ProxyError::Authentication(format!(
                "Codex token refresh was rejected: {body}"
            )));
        }

        let refreshed: Value = response
            .json()
            .await
            .map_err(|e| ProxyError::Authentication(format!("Codex token refresh response was not JSON: {e}")))?;

        let mut raw = raw;
        let tokens_obj = raw
            .get_mut("tokens")
            .and_then(|v| v.as_object_mut())
            .ok_or_else(|| ProxyError::Authentication("credential file lost its tokens object".to_string()))?;

        for field in ["access_token", "refresh_token", "id_token"] {
            if let Some(value) = refreshed.get(field).and_then(|v| v.as_str()) {
                if !value.is_empty() {
                    tokens_obj.insert(field.to_string(), json!(value));
                }
            }
        }

        raw.as_object_mut()
            .unwrap()
            .insert("last_refresh".to_string(), json!(format_last_refresh(Utc::now())));

        store.save_raw(&raw).await?;
        store.get_tokens_and_last_refresh().await.map(|c| c.tokens)
    }
}
