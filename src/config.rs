//! Runtime configuration.
//!
//! Each setting is resolved from the environment first, then from the OS
//! credential store (backend URL and key only), then from a connection
//! string. Missing backend URL or key is a configuration error.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use zeroize::Zeroizing;

use crate::api;
use crate::error::{Error, Result};
use crate::format::CurrencyFormat;
use crate::storage;

pub const ENV_SUPABASE_URL: &str = "BACKOFFICE_SUPABASE_URL";
pub const ENV_SUPABASE_ANON_KEY: &str = "BACKOFFICE_SUPABASE_ANON_KEY";
pub const ENV_CONNECTION_STRING: &str = "BACKOFFICE_CONNECTION_STRING";
pub const ENV_TIMEOUT_SECS: &str = "BACKOFFICE_TIMEOUT_SECS";
pub const ENV_DATA_DIR: &str = "BACKOFFICE_DATA_DIR";
pub const ENV_CURRENCY: &str = "BACKOFFICE_CURRENCY";

/// Default timeout for backend requests (20 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

pub struct BackofficeConfig {
    pub supabase_url: String,
    pub anon_key: Zeroizing<String>,
    pub request_timeout: Duration,
    pub data_dir: PathBuf,
    pub currency: CurrencyFormat,
}

impl fmt::Debug for BackofficeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackofficeConfig")
            .field("supabase_url", &self.supabase_url)
            .field("anon_key", &storage::mask_secret(&self.anon_key))
            .field("request_timeout", &self.request_timeout)
            .field("data_dir", &self.data_dir)
            .field("currency", &self.currency.code)
            .finish()
    }
}

impl BackofficeConfig {
    /// Resolve from environment, OS credential store and connection string.
    pub fn resolve() -> Result<Self> {
        Self::resolve_with(storage::get_credential)
    }

    /// Same as [`resolve`](Self::resolve) with an explicit credential lookup.
    pub fn resolve_with<F>(credential: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let (conn_url, conn_key) = env_value(ENV_CONNECTION_STRING)
            .map(|raw| api::parse_connection_string(&raw))
            .unwrap_or((None, None));

        let supabase_url = env_value(ENV_SUPABASE_URL)
            .or_else(|| credential(storage::KEY_SUPABASE_URL))
            .or(conn_url)
            .map(|u| api::normalize_backend_url(&u))
            .filter(|u| !u.is_empty())
            .ok_or_else(|| {
                Error::Config(format!(
                    "backend URL not configured (set {ENV_SUPABASE_URL} or run `backoffice config set`)"
                ))
            })?;

        let anon_key = env_value(ENV_SUPABASE_ANON_KEY)
            .or_else(|| credential(storage::KEY_SUPABASE_ANON_KEY))
            .or(conn_key)
            .ok_or_else(|| {
                Error::Config(format!(
                    "backend anon key not configured (set {ENV_SUPABASE_ANON_KEY} or run `backoffice config set`)"
                ))
            })?;

        let request_timeout = match env_value(ENV_TIMEOUT_SECS) {
            Some(raw) => {
                let secs: u64 = raw
                    .parse()
                    .map_err(|_| Error::Config(format!("{ENV_TIMEOUT_SECS} must be a number of seconds")))?;
                if secs == 0 {
                    return Err(Error::Config(format!("{ENV_TIMEOUT_SECS} must be positive")));
                }
                Duration::from_secs(secs)
            }
            None => DEFAULT_TIMEOUT,
        };

        Ok(Self {
            supabase_url,
            anon_key: Zeroizing::new(anon_key),
            request_timeout,
            data_dir: resolve_data_dir(),
            currency: resolve_currency(),
        })
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// `BACKOFFICE_DATA_DIR`, else the per-user default.
pub fn resolve_data_dir() -> PathBuf {
    env_value(ENV_DATA_DIR)
        .map(PathBuf::from)
        .unwrap_or_else(default_data_dir)
}

pub fn resolve_currency() -> CurrencyFormat {
    env_value(ENV_CURRENCY)
        .map(|c| CurrencyFormat::for_code(&c))
        .unwrap_or_default()
}

/// Per-user data directory holding the local database and logs.
pub fn default_data_dir() -> PathBuf {
    let base = std::env::var("LOCALAPPDATA")
        .or_else(|_| std::env::var("XDG_DATA_HOME"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            #[cfg(target_os = "windows")]
            {
                PathBuf::from(std::env::var("USERPROFILE").unwrap_or_else(|_| ".".into()))
                    .join("AppData")
                    .join("Local")
            }
            #[cfg(not(target_os = "windows"))]
            {
                PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()))
                    .join(".local")
                    .join("share")
            }
        });
    base.join("storefront-backoffice")
}
