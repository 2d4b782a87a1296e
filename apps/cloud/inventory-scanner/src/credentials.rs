//! Account credential source.
//!
//! The scanner consumes resolved account entries, one per named account:
//! name, provider, and an opaque user/key pair. The on-disk carrier is a
//! JSON document; its format is an input detail and nothing downstream of
//! this module sees the raw file.

use std::fmt;
use std::path::Path;

use core_config::ConfigError;
use domain_inventory::CloudProvider;
use serde::Deserialize;

/// Resolved credentials for one account. The key is opaque and must never
/// be logged; `Debug` redacts it.
#[derive(Clone, Deserialize)]
pub struct AccountCredentials {
    /// Provider-side account identifier; defaults to the entry name.
    #[serde(default)]
    pub account_id: String,
    pub name: String,
    pub provider: CloudProvider,
    pub user: String,
    pub key: String,
}

impl AccountCredentials {
    pub fn account_id(&self) -> &str {
        if self.account_id.is_empty() {
            &self.name
        } else {
            &self.account_id
        }
    }
}

impl fmt::Debug for AccountCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountCredentials")
            .field("account_id", &self.account_id)
            .field("name", &self.name)
            .field("provider", &self.provider)
            .field("user", &self.user)
            .field("key", &"<redacted>")
            .finish()
    }
}

#[derive(Deserialize)]
struct CredentialsFile {
    accounts: Vec<AccountCredentials>,
}

/// Load account entries from the credentials file.
pub fn load_credentials(path: &Path) -> Result<Vec<AccountCredentials>, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::FileError {
        path: path.display().to_string(),
        details: e.to_string(),
    })?;

    let file: CredentialsFile =
        serde_json::from_str(&raw).map_err(|e| ConfigError::FileError {
            path: path.display().to_string(),
            details: e.to_string(),
        })?;

    Ok(file.accounts)
}
