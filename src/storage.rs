//! Backend credentials in the OS credential store.
//!
//! Windows Credential Manager, macOS Keychain, or the Secret Service API on
//! Linux, via the `keyring` crate. Only the backend URL and anon key live
//! here; everything else is configured through the environment.

use keyring::Entry;
use serde_json::Value;
use tracing::{info, warn};

use crate::api;
use crate::error::{Error, Result};

const SERVICE_NAME: &str = "storefront-backoffice";

pub const KEY_SUPABASE_URL: &str = "supabase_url";
pub const KEY_SUPABASE_ANON_KEY: &str = "supabase_anon_key";

const ALL_KEYS: &[&str] = &[KEY_SUPABASE_URL, KEY_SUPABASE_ANON_KEY];

/// Retrieve a single credential. Returns `None` when the entry does not
/// exist or the platform store is unavailable.
pub fn get_credential(key: &str) -> Option<String> {
    let entry = match Entry::new(SERVICE_NAME, key) {
        Ok(e) => e,
        Err(e) => {
            warn!(key, error = %e, "keyring: failed to create entry");
            return None;
        }
    };
    match entry.get_password() {
        Ok(pw) => Some(pw),
        Err(keyring::Error::NoEntry) => None,
        Err(e) => {
            warn!(key, error = %e, "keyring: failed to read credential");
            None
        }
    }
}

pub fn set_credential(key: &str, value: &str) -> Result<()> {
    let entry = Entry::new(SERVICE_NAME, key).map_err(|e| Error::Config(e.to_string()))?;
    entry
        .set_password(value)
        .map_err(|e| Error::Config(e.to_string()))
}

/// Delete a credential. Succeeds if the entry does not exist.
pub fn delete_credential(key: &str) -> Result<()> {
    let entry = Entry::new(SERVICE_NAME, key).map_err(|e| Error::Config(e.to_string()))?;
    match entry.delete_credential() {
        Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(Error::Config(e.to_string())),
    }
}

/// Persist backend credentials. `key_or_connection` may be a bare anon key
/// or a connection string carrying both URL and key; an explicit `url`
/// wins over one decoded from the connection string.
pub fn save_credentials(url: Option<&str>, key_or_connection: &str) -> Result<()> {
    let (decoded_url, decoded_key) = api::parse_connection_string(key_or_connection);
    let key = decoded_key.unwrap_or_else(|| key_or_connection.trim().to_string());
    if key.is_empty() {
        return Err(Error::Config("Missing anon key".into()));
    }
    let url = url
        .map(api::normalize_backend_url)
        .filter(|u| !u.is_empty())
        .or(decoded_url)
        .ok_or_else(|| Error::Config("Missing backend URL".into()))?;

    set_credential(KEY_SUPABASE_URL, &url)?;
    set_credential(KEY_SUPABASE_ANON_KEY, &key)?;
    info!(url = %url, "backend credentials saved");
    Ok(())
}

pub fn clear_credentials() -> Result<()> {
    info!("deleting stored backend credentials");
    for key in ALL_KEYS {
        delete_credential(key)?;
    }
    Ok(())
}

/// Stored configuration with the key masked, for `config show`.
pub fn describe_credentials() -> Value {
    serde_json::json!({
        "supabase_url": get_credential(KEY_SUPABASE_URL),
        "supabase_anon_key": get_credential(KEY_SUPABASE_ANON_KEY).map(|k| mask_secret(&k)),
    })
}

/// Keep the first and last four characters of a secret.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}…{tail}")
}
