//! Configuration system for Runbox.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment.
//! Configuration is loaded from `~/.config/runbox/config.toml` and/or `.runbox/config.toml`
//! in the workspace directory.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

/// Provider id under which the sandbox service registers its auth profiles.
pub const DEFAULT_PROVIDER_ID: &str = "runbox";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunboxConfig {
    /// Directory holding `auth-profiles.json`. Filled from the platform data
    /// directory when left unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_dir: Option<PathBuf>,
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Remote sandbox service and OAuth client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Provider id matched against `auth.profiles.*.provider`.
    pub provider_id: String,
    /// Base URL of the sandbox API and its OAuth endpoints.
    pub base_url: String,
    /// Public OAuth client id (PKCE, no secret).
    pub client_id: String,
    /// Space-separated OAuth scopes requested at login.
    pub scope: String,
    /// Fixed local port for the OAuth redirect listener.
    pub callback_port: u16,
    /// Path component of the local redirect URI.
    pub callback_path: String,
    /// How long the local listener waits for the browser redirect.
    pub callback_timeout_secs: u64,
    /// Environment variable that overrides every stored credential.
    pub token_env: String,
    /// Command printed when the user needs to sign in again.
    pub login_command: String,
    /// Per-request HTTP timeout.
    pub request_timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            provider_id: DEFAULT_PROVIDER_ID.to_string(),
            base_url: "https://api.runbox.dev".to_string(),
            client_id: "runbox-cli".to_string(),
            scope: "sandbox:execute sandbox:files offline_access".to_string(),
            callback_port: 8844,
            callback_path: "/oauth/callback".to_string(),
            callback_timeout_secs: 120,
            token_env: "RUNBOX_TOKEN".to_string(),
            login_command: "runbox auth login".to_string(),
            request_timeout_secs: 60,
        }
    }
}

/// Loopback address for the OAuth callback listener.
pub const CALLBACK_HOST: &str = "127.0.0.1";

impl ServiceConfig {
    /// The redirect URI registered for the public client. Uses the same IPv4
    /// loopback literal the callback listener binds.
    pub fn redirect_uri(&self) -> String {
        format!(
            "http://{}:{}{}",
            CALLBACK_HOST,
            self.callback_port, self.callback_path
        )
    }

    pub fn authorize_url(&self) -> String {
        format!("{}/oauth/authorize", self.base_url.trim_end_matches('/'))
    }

    pub fn token_url(&self) -> String {
        format!("{}/oauth/token", self.base_url.trim_end_matches('/'))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Backoff settings for delete-like operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
        }
    }
}

/// Host-side auth profile configuration: `{ auth: { profiles: { [id]: { provider } } } }`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub profiles: BTreeMap<String, AuthProfileRef>,
}

/// One entry in the host's profile configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthProfileRef {
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl AuthConfig {
    /// First profile id whose provider matches `provider_id`.
    ///
    /// Profiles are scanned in key order, not file order: figment merges tables
    /// into sorted maps, so the source order is gone by the time this runs.
    /// There is no disambiguation between several profiles of the same provider.
    pub fn profile_for_provider(&self, provider_id: &str) -> Option<&str> {
        self.profiles
            .iter()
            .find(|(_, profile)| profile.provider == provider_id)
            .map(|(id, _)| id.as_str())
    }
}

impl RunboxConfig {
    /// Agent directory, falling back to the platform data directory.
    pub fn resolved_agent_dir(&self) -> Option<PathBuf> {
        self.agent_dir.clone().or_else(|| {
            directories::ProjectDirs::from("dev", "runbox", "runbox")
                .map(|dirs| dirs.data_dir().join("agent"))
        })
    }
}

/// Load configuration with layered merging.
pub fn load_config(workspace: Option<&Path>) -> Result<RunboxConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(RunboxConfig::default()));

    // User-level config
    if let Some(config_dir) = directories::ProjectDirs::from("dev", "runbox", "runbox") {
        let user_config = config_dir.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    // Workspace-level config
    if let Some(ws) = workspace {
        let ws_config = workspace_config_path(ws);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // Environment variables (RUNBOX_SERVICE__BASE_URL, RUNBOX_RETRY__MAX_ATTEMPTS, etc.)
    figment = figment.merge(Env::prefixed("RUNBOX_").split("__"));

    let config: RunboxConfig = figment.extract().map_err(|e| ConfigError::ParseError {
        message: e.to_string(),
    })?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &RunboxConfig) -> Result<(), ConfigError> {
    if config.retry.max_attempts == 0 {
        return Err(ConfigError::Invalid {
            message: "retry.max_attempts must be at least 1".into(),
        });
    }
    url::Url::parse(&config.service.base_url).map_err(|e| ConfigError::Invalid {
        message: format!("service.base_url '{}': {}", config.service.base_url, e),
    })?;
    if !config.service.callback_path.starts_with('/') {
        return Err(ConfigError::Invalid {
            message: "service.callback_path must start with '/'".into(),
        });
    }
    Ok(())
}

/// Path of the workspace-level config file.
pub fn workspace_config_path(workspace: &Path) -> PathBuf {
    workspace.join(".runbox").join("config.toml")
}

/// Insert or replace an auth profile entry in the workspace config file.
///
/// Loads the existing `.runbox/config.toml`, sets `auth.profiles.<profile_id>`,
/// preserves every other setting, and writes back. Returns the path written.
pub fn upsert_profile_config(
    workspace: &Path,
    profile_id: &str,
    profile: AuthProfileRef,
) -> Result<PathBuf, ConfigError> {
    let config_path = workspace_config_path(workspace);
    let write_err = |message: String| ConfigError::WriteFailed {
        path: config_path.clone(),
        message,
    };

    let mut table: toml::Table = if config_path.exists() {
        let content = std::fs::read_to_string(&config_path).map_err(|e| write_err(e.to_string()))?;
        content.parse().map_err(|e: toml::de::Error| ConfigError::ParseError {
            message: e.to_string(),
        })?
    } else {
        toml::Table::new()
    };

    let auth = table
        .entry("auth")
        .or_insert_with(|| toml::Value::Table(toml::Table::new()))
        .as_table_mut()
        .ok_or_else(|| ConfigError::Invalid {
            message: "[auth] is not a table".into(),
        })?;
    let profiles = auth
        .entry("profiles")
        .or_insert_with(|| toml::Value::Table(toml::Table::new()))
        .as_table_mut()
        .ok_or_else(|| ConfigError::Invalid {
            message: "[auth.profiles] is not a table".into(),
        })?;
    let entry = toml::Value::try_from(&profile).map_err(|e| write_err(e.to_string()))?;
    profiles.insert(profile_id.to_string(), entry);

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| write_err(e.to_string()))?;
    }
    let toml_str = toml::to_string_pretty(&table).map_err(|e| write_err(e.to_string()))?;
    std::fs::write(&config_path, toml_str).map_err(|e| write_err(e.to_string()))?;

    Ok(config_path)
}
