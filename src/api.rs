//! Hosted backend client.
//!
//! Talks to the PostgREST endpoint of the hosted database (`/rest/v1/...`)
//! with the project's anon key, and maps transport and HTTP failures into
//! short operator-facing messages.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};
use serde_json::Value;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::config::BackofficeConfig;
use crate::error::{Error, Result};
use crate::remote::{Query, RemoteStore};

// ---------------------------------------------------------------------------
// URL normalisation
// ---------------------------------------------------------------------------

/// Normalise a backend project URL:
/// - ensure a scheme is present (https, or http for localhost)
/// - strip trailing slashes
/// - strip a trailing `/rest/v1` segment
pub fn normalize_backend_url(url: &str) -> String {
    let mut url = url.trim().to_string();
    if url.is_empty() {
        return url;
    }

    if !url.starts_with("http://") && !url.starts_with("https://") {
        if url.starts_with("localhost") || url.starts_with("127.0.0.1") {
            url = format!("http://{url}");
        } else {
            url = format!("https://{url}");
        }
    }

    while url.ends_with('/') {
        url.pop();
    }
    if let Some(stripped) = url.strip_suffix("/rest/v1") {
        url = stripped.to_string();
    }
    while url.ends_with('/') {
        url.pop();
    }

    url
}

// ---------------------------------------------------------------------------
// Connection strings
// ---------------------------------------------------------------------------

/// Decode a connection string: either raw JSON or base64/base64url JSON,
/// possibly wrapped across lines.
fn decode_connection_string(raw: &str) -> Option<Value> {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.starts_with('{') {
        return serde_json::from_str::<Value>(&compact).ok();
    }
    if compact.len() < 16 {
        return None;
    }

    let standard = compact.replace('-', "+").replace('_', "/");
    let pad = (4 - standard.len() % 4) % 4;
    let padded = format!("{standard}{}", "=".repeat(pad));
    let decoded = BASE64_STANDARD.decode(padded).ok()?;
    serde_json::from_slice::<Value>(&decoded).ok()
}

/// `(url, key)` extracted from a connection string, either part optional.
pub fn parse_connection_string(raw: &str) -> (Option<String>, Option<String>) {
    let Some(doc) = decode_connection_string(raw) else {
        return (None, None);
    };
    let pick = |keys: &[&str]| {
        keys.iter()
            .find_map(|k| doc.get(*k).and_then(Value::as_str))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    };
    let url = pick(&["url", "supabaseUrl", "supabase_url"]).map(|u| normalize_backend_url(&u));
    let key = pick(&["key", "anonKey", "anon_key"]);
    (url, key)
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// Convert a `reqwest::Error` into a user-friendly message.
fn friendly_error(base: &str, err: &reqwest::Error) -> String {
    if err.is_connect() {
        return format!("Cannot reach backend at {base}");
    }
    if err.is_timeout() {
        return format!("Connection to {base} timed out");
    }
    if err.is_builder() {
        return format!("Invalid backend URL: {base}");
    }
    format!("Network error communicating with {base}: {err}")
}

fn status_error(status: StatusCode) -> String {
    match status.as_u16() {
        401 => "Backend key is invalid or expired".to_string(),
        403 => "Not allowed by row-level security policy".to_string(),
        404 => "Backend relation not found".to_string(),
        409 => "Conflicting record already exists".to_string(),
        s if s >= 500 => "Backend server error".to_string(),
        _ => "Unexpected response from backend".to_string(),
    }
}

/// Build the message for a non-success response, keeping PostgREST's
/// `message`/`details` when the body carries them.
fn error_detail(status: StatusCode, body_text: &str) -> String {
    let body = body_text.trim();
    if let Ok(json) = serde_json::from_str::<Value>(body) {
        let message = json
            .get("message")
            .or_else(|| json.get("error"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| status_error(status));
        return match json.get("details").or_else(|| json.get("hint")) {
            Some(Value::String(details)) if !details.is_empty() => {
                format!("{message} (HTTP {}): {details}", status.as_u16())
            }
            _ => format!("{message} (HTTP {})", status.as_u16()),
        };
    }
    if body.is_empty() {
        format!("{} (HTTP {})", status_error(status), status.as_u16())
    } else {
        format!("{} (HTTP {}): {body}", status_error(status), status.as_u16())
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct SupabaseClient {
    http: Client,
    base_url: String,
    anon_key: Zeroizing<String>,
}

impl SupabaseClient {
    pub fn new(base_url: &str, anon_key: &str, timeout: Duration) -> Result<Self> {
        let base_url = normalize_backend_url(base_url);
        if base_url.is_empty() {
            return Err(Error::Config("backend URL is empty".into()));
        }
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url,
            anon_key: Zeroizing::new(anon_key.trim().to_string()),
        })
    }

    pub fn from_config(config: &BackofficeConfig) -> Result<Self> {
        Self::new(
            &config.supabase_url,
            config.anon_key.as_str(),
            config.request_timeout,
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Full request URL for `table` with the query rendered as parameters.
    pub fn table_url(&self, table: &str, query: &Query) -> Result<Url> {
        let mut url = Url::parse(&format!("{}/rest/v1/{table}", self.base_url))
            .map_err(|e| Error::Config(format!("Invalid backend URL: {e}")))?;
        let params = query.to_params();
        if !params.is_empty() {
            let mut qp = url.query_pairs_mut();
            for (k, v) in &params {
                qp.append_pair(k, v);
            }
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let key = self.anon_key.as_str();
        self.http
            .request(method, url)
            .header("apikey", key)
            .header("Authorization", format!("Bearer {key}"))
            .header("Content-Type", "application/json")
    }

    async fn send_rows(&self, req: RequestBuilder) -> Result<Vec<Value>> {
        let resp = req
            .send()
            .await
            .map_err(|e| Error::Remote(friendly_error(&self.base_url, &e)))?;
        let status = resp.status();
        let body_text = resp.text().await.unwrap_or_default();

        if !status.is_success() {
            let detail = error_detail(status, &body_text);
            warn!(status = status.as_u16(), error = %detail, "backend request failed");
            return Err(Error::Remote(detail));
        }
        if body_text.trim().is_empty() {
            return Ok(Vec::new());
        }
        match serde_json::from_str::<Value>(&body_text)? {
            Value::Array(rows) => Ok(rows),
            Value::Null => Ok(Vec::new()),
            single => Ok(vec![single]),
        }
    }
}

#[async_trait]
impl RemoteStore for SupabaseClient {
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>> {
        let url = self.table_url(table, query)?;
        debug!(%table, query = ?url.query(), "select");
        self.send_rows(self.request(Method::GET, url)).await
    }

    async fn insert(&self, table: &str, row: Value) -> Result<Vec<Value>> {
        let url = self.table_url(table, &Query::new())?;
        debug!(%table, "insert");
        let req = self
            .request(Method::POST, url)
            .header("Prefer", "return=representation")
            .json(&row);
        self.send_rows(req).await
    }

    async fn update(&self, table: &str, query: &Query, patch: Value) -> Result<Vec<Value>> {
        if query.filters.is_empty() {
            // PostgREST would happily patch every row in the relation.
            return Err(Error::Validation(format!(
                "refusing unfiltered update on {table}"
            )));
        }
        let url = self.table_url(table, query)?;
        debug!(%table, query = ?url.query(), "update");
        let req = self
            .request(Method::PATCH, url)
            .header("Prefer", "return=representation")
            .json(&patch);
        self.send_rows(req).await
    }
}
