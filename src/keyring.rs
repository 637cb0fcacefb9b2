//! Keychain storage for the generation service credentials
//!
//! Credentials live in a single keychain entry as JSON so new fields can be
//! added without extra keychain prompts.

use keyring::Entry;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock};

const KEYRING_SERVICE: &str = "acoustic-planner";
const KEYRING_USERNAME: &str = "default";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoredCredentials {
    #[serde(skip_serializing_if = "Option::is_none")]
    service_api_key: Option<String>,
}

type KeyringResult<T> = Result<T, String>;

static CREDENTIALS_CACHE: OnceLock<Mutex<Option<StoredCredentials>>> = OnceLock::new();
static KEYRING_ERROR_WARNED: AtomicBool = AtomicBool::new(false);

fn credentials_cache() -> &'static Mutex<Option<StoredCredentials>> {
    CREDENTIALS_CACHE.get_or_init(|| Mutex::new(None))
}

fn keyring_disabled() -> bool {
    if cfg!(test) {
        return true;
    }
    matches!(
        std::env::var("ACOUSTIC_DISABLE_KEYRING")
            .unwrap_or_default()
            .to_lowercase()
            .as_str(),
        "1" | "true" | "yes"
    )
}

fn keyring_entry() -> Result<Entry, keyring::Error> {
    Entry::new(KEYRING_SERVICE, KEYRING_USERNAME)
}

/// Warn about keychain errors only once per process
pub fn warn_keychain_error_once(err: &str) {
    if KEYRING_ERROR_WARNED.swap(true, Ordering::Relaxed) {
        return;
    }
    tracing::warn!(error = err, "couldn't access system keychain");
    tracing::warn!("set ACOUSTIC_API_KEY to bypass the keychain");
}

fn read_credentials() -> KeyringResult<StoredCredentials> {
    let cache = credentials_cache();
    let mut guard = match cache.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    if let Some(creds) = guard.as_ref() {
        return Ok(creds.clone());
    }
    if keyring_disabled() {
        return Ok(StoredCredentials::default());
    }

    let entry = keyring_entry().map_err(|e| e.to_string())?;
    let creds = match entry.get_password() {
        Ok(json) => serde_json::from_str(&json)
            .map_err(|e| format!("Failed to parse credentials: {}", e))?,
        Err(keyring::Error::NoEntry) => StoredCredentials::default(),
        Err(err) => return Err(err.to_string()),
    };
    *guard = Some(creds.clone());
    Ok(creds)
}

fn write_credentials(creds: &StoredCredentials) -> KeyringResult<()> {
    if keyring_disabled() {
        return Err("keychain access is disabled".to_string());
    }
    let json = serde_json::to_string(creds).map_err(|e| e.to_string())?;
    keyring_entry()
        .and_then(|entry| entry.set_password(&json))
        .map_err(|e| e.to_string())?;

    let mut guard = match credentials_cache().lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    *guard = Some(creds.clone());
    Ok(())
}

/// Get the generation service API key from the keychain
pub fn get_api_key() -> KeyringResult<Option<String>> {
    Ok(read_credentials()?.service_api_key)
}

/// Store the generation service API key in the keychain
pub fn set_api_key(key: &str) -> KeyringResult<()> {
    let mut creds = read_credentials().unwrap_or_default();
    creds.service_api_key = Some(key.to_string());
    write_credentials(&creds)
}
