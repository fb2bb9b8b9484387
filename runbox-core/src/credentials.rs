//! Credential storage for the sandbox service.
//!
//! The host keeps every provider's credentials in a single `auth-profiles.json`
//! inside its agent directory:
//!
//! ```json
//! { "profiles": { "runbox:dev@example.com": { "type": "oauth", "provider": "runbox", ... } } }
//! ```
//!
//! Entries are kept as raw JSON so that profiles owned by other providers survive a
//! read-modify-write untouched; only the profile this crate reads is deserialized
//! into a typed [`CredentialRecord`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::StoreError;

/// File name of the credential store inside the agent directory.
pub const AUTH_PROFILES_FILENAME: &str = "auth-profiles.json";

/// Kind of credential held by a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
    #[serde(rename = "oauth")]
    OAuth,
    ApiKey,
    Token,
}

/// A stored credential for one profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    #[serde(rename = "type")]
    pub kind: CredentialKind,
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh: Option<String>,
    /// Expiry of `access`, epoch milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<i64>,
    /// Permanent API key; always preferred over `access`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl CredentialRecord {
    /// Non-empty permanent key, if any.
    pub fn api_key(&self) -> Option<&str> {
        non_empty(self.key.as_deref())
    }

    pub fn access_token(&self) -> Option<&str> {
        non_empty(self.access.as_deref())
    }

    pub fn refresh_token(&self) -> Option<&str> {
        non_empty(self.refresh.as_deref())
    }

    /// Whether `access` is still valid at `now_ms` with the given safety buffer.
    pub fn access_valid_at(&self, now_ms: i64, buffer_ms: i64) -> bool {
        match (self.access_token(), self.expires) {
            (Some(_), Some(expires)) => now_ms < expires.saturating_sub(buffer_ms),
            _ => false,
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// The whole `auth-profiles.json` document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthProfileStore {
    #[serde(default)]
    profiles: BTreeMap<String, Value>,
    /// Top-level keys written by the host that this crate does not interpret.
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl AuthProfileStore {
    /// Path of the store inside an agent directory.
    pub fn path_in(agent_dir: &Path) -> PathBuf {
        agent_dir.join(AUTH_PROFILES_FILENAME)
    }

    /// Load the store; a missing file yields an empty store.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            debug!(path = %path.display(), "Credential store not found, starting empty");
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|source| StoreError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(&contents).map_err(|source| StoreError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write the whole store back, creating the parent directory if needed.
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let write_err = |source| StoreError::Write {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| StoreError::Write {
            path: path.to_path_buf(),
            source: std::io::Error::other(e),
        })?;
        std::fs::write(path, json).map_err(write_err)?;
        restrict_permissions(path);

        debug!(path = %path.display(), profiles = self.profiles.len(), "Credential store saved");
        Ok(())
    }

    /// Typed record for a profile, or `None` if the profile is absent.
    pub fn get(&self, profile_id: &str) -> Result<Option<CredentialRecord>, StoreError> {
        let Some(raw) = self.profiles.get(profile_id) else {
            return Ok(None);
        };
        serde_json::from_value(raw.clone())
            .map(Some)
            .map_err(|e| StoreError::InvalidRecord {
                profile_id: profile_id.to_string(),
                reason: e.to_string(),
            })
    }

    /// Insert or overwrite a profile's record.
    pub fn set(&mut self, profile_id: &str, record: &CredentialRecord) -> Result<(), StoreError> {
        let value = serde_json::to_value(record).map_err(|e| StoreError::InvalidRecord {
            profile_id: profile_id.to_string(),
            reason: e.to_string(),
        })?;
        self.profiles.insert(profile_id.to_string(), value);
        Ok(())
    }

}

#[cfg(unix)]
fn restrict_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)) {
        tracing::warn!(path = %path.display(), error = %e, "Failed to restrict credential store permissions");
    }
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) {}

/// Profile id for a freshly authorized account: `"<provider>:<email-or-default>"`.
pub fn profile_id_for(provider: &str, email: Option<&str>) -> String {
    let account = non_empty(email).unwrap_or("default");
    format!("{provider}:{account}")
}
