//! Bearer token resolution for sandbox tool calls.
//!
//! Resolution order, first hit wins:
//!
//! 1. The service's token environment variable (trimmed, non-empty)
//! 2. The profile's permanent API key
//! 3. The profile's access token, while `now < expires - 5 minutes`
//! 4. A refresh through the token endpoint; the rotated tokens are written back
//!    to the credential store before the new access token is returned
//! 5. [`AuthError::AllTokensExpired`], pointing at the login command
//!
//! Tool calls never start an interactive login. That lives in
//! [`OAuthClient::run_flow`] and is driven by the CLI only.

use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::RunboxConfig;
use crate::credentials::{AuthProfileStore, CredentialKind, CredentialRecord, profile_id_for};
use crate::error::{AuthError, StoreError};
use crate::oauth::{OAuthClient, OAuthCredentials};

/// Access tokens are treated as expired this long before their recorded expiry.
pub const EXPIRY_BUFFER_MS: i64 = 5 * 60 * 1000;

/// Which profile to resolve and where its credential store lives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileContext {
    pub profile_id: Option<String>,
    pub agent_dir: Option<PathBuf>,
}

impl ProfileContext {
    pub fn new(profile_id: impl Into<String>, agent_dir: impl Into<PathBuf>) -> Self {
        Self {
            profile_id: Some(profile_id.into()),
            agent_dir: Some(agent_dir.into()),
        }
    }

    /// Pick the first configured profile for the sandbox provider.
    pub fn from_config(config: &RunboxConfig) -> Self {
        Self {
            profile_id: config
                .auth
                .profile_for_provider(&config.service.provider_id)
                .map(str::to_string),
            agent_dir: config.resolved_agent_dir(),
        }
    }
}

/// Where a resolved token came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    Environment,
    ApiKey,
    AccessToken,
    Refreshed,
}

impl std::fmt::Display for TokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenSource::Environment => write!(f, "environment"),
            TokenSource::ApiKey => write!(f, "api key"),
            TokenSource::AccessToken => write!(f, "access token"),
            TokenSource::Refreshed => write!(f, "refreshed access token"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedToken {
    pub token: String,
    pub source: TokenSource,
}

/// Credential state as seen without touching the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialStatus {
    Environment {
        var: String,
    },
    ApiKey {
        profile_id: String,
    },
    Valid {
        profile_id: String,
        expires_at: i64,
    },
    /// The access token is unusable but a refresh token is on file.
    NeedsRefresh {
        profile_id: String,
        expires_at: Option<i64>,
    },
    Expired {
        profile_id: String,
    },
}

/// Resolves bearer tokens for the sandbox API.
#[derive(Clone)]
pub struct TokenResolver {
    oauth: OAuthClient,
    token_env: String,
    provider_id: String,
    login_command: String,
}

impl TokenResolver {
    pub fn new(oauth: OAuthClient) -> Self {
        let service = oauth.service();
        Self {
            token_env: service.token_env.clone(),
            provider_id: service.provider_id.clone(),
            login_command: service.login_command.clone(),
            oauth,
        }
    }

    pub fn oauth(&self) -> &OAuthClient {
        &self.oauth
    }

    /// Produce a bearer token, refreshing and persisting when needed.
    pub async fn resolve(&self, ctx: &ProfileContext) -> Result<String, AuthError> {
        self.resolve_with_source(ctx).await.map(|resolved| resolved.token)
    }

    pub async fn resolve_with_source(
        &self,
        ctx: &ProfileContext,
    ) -> Result<ResolvedToken, AuthError> {
        if let Some(token) = self.env_token() {
            debug!(var = %self.token_env, "Using sandbox token from environment");
            return Ok(ResolvedToken {
                token,
                source: TokenSource::Environment,
            });
        }

        let (profile_id, path) = self.locate(ctx)?;
        let (store, record) = self.load_record(&profile_id, &path)?;

        if let Some(key) = record.api_key() {
            return Ok(ResolvedToken {
                token: key.to_string(),
                source: TokenSource::ApiKey,
            });
        }

        if record.access_valid_at(Utc::now().timestamp_millis(), EXPIRY_BUFFER_MS) {
            if let Some(access) = record.access_token() {
                return Ok(ResolvedToken {
                    token: access.to_string(),
                    source: TokenSource::AccessToken,
                });
            }
        }

        if record.refresh_token().is_some() {
            return self
                .refresh_and_persist(&profile_id, &path, store, record)
                .await;
        }

        Err(AuthError::AllTokensExpired {
            profile_id,
            login_command: self.login_command.clone(),
        })
    }

    /// Refresh the profile's tokens now, even if the access token is still valid.
    pub async fn force_refresh(&self, ctx: &ProfileContext) -> Result<ResolvedToken, AuthError> {
        let (profile_id, path) = self.locate(ctx)?;
        let (store, record) = self.load_record(&profile_id, &path)?;
        if record.refresh_token().is_none() {
            return Err(AuthError::AllTokensExpired {
                profile_id,
                login_command: self.login_command.clone(),
            });
        }
        self.refresh_and_persist(&profile_id, &path, store, record)
            .await
    }

    /// Report which credential `resolve` would use, without refreshing.
    pub fn inspect(&self, ctx: &ProfileContext) -> Result<CredentialStatus, AuthError> {
        if self.env_token().is_some() {
            return Ok(CredentialStatus::Environment {
                var: self.token_env.clone(),
            });
        }

        let (profile_id, path) = self.locate(ctx)?;
        let (_, record) = self.load_record(&profile_id, &path)?;

        let status = if record.api_key().is_some() {
            CredentialStatus::ApiKey { profile_id }
        } else if record.access_valid_at(Utc::now().timestamp_millis(), EXPIRY_BUFFER_MS) {
            CredentialStatus::Valid {
                profile_id,
                expires_at: record.expires.unwrap_or_default(),
            }
        } else if record.refresh_token().is_some() {
            CredentialStatus::NeedsRefresh {
                profile_id,
                expires_at: record.expires,
            }
        } else {
            CredentialStatus::Expired { profile_id }
        };
        Ok(status)
    }

    fn env_token(&self) -> Option<String> {
        std::env::var(&self.token_env)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn locate(&self, ctx: &ProfileContext) -> Result<(String, PathBuf), AuthError> {
        let profile_id = ctx
            .profile_id
            .clone()
            .ok_or_else(|| AuthError::NoProfileFound {
                provider: self.provider_id.clone(),
                login_command: self.login_command.clone(),
            })?;
        let agent_dir = ctx
            .agent_dir
            .as_deref()
            .ok_or_else(|| AuthError::MissingAgentContext {
                profile_id: profile_id.clone(),
            })?;
        Ok((profile_id, AuthProfileStore::path_in(agent_dir)))
    }

    fn load_record(
        &self,
        profile_id: &str,
        path: &Path,
    ) -> Result<(AuthProfileStore, CredentialRecord), AuthError> {
        let store = AuthProfileStore::load(path)?;
        match store.get(profile_id)? {
            Some(record) => Ok((store, record)),
            None => Err(AuthError::MissingCredential {
                profile_id: profile_id.to_string(),
                path: path.to_path_buf(),
                login_command: self.login_command.clone(),
            }),
        }
    }

    async fn refresh_and_persist(
        &self,
        profile_id: &str,
        path: &Path,
        mut store: AuthProfileStore,
        mut record: CredentialRecord,
    ) -> Result<ResolvedToken, AuthError> {
        let refresh_token = record.refresh_token().unwrap_or_default().to_string();
        info!(profile = %profile_id, "Access token expired, refreshing");

        let refreshed =
            self.oauth
                .refresh(&refresh_token)
                .await
                .map_err(|source| AuthError::RefreshFailed {
                    profile_id: profile_id.to_string(),
                    source,
                })?;

        record.access = Some(refreshed.access_token.clone());
        record.refresh = Some(refreshed.refresh_token);
        record.expires = Some(refreshed.expires_at);
        store.set(profile_id, &record)?;
        store.save(path)?;

        debug!(profile = %profile_id, expires_at = refreshed.expires_at, "Refreshed tokens persisted");
        Ok(ResolvedToken {
            token: refreshed.access_token,
            source: TokenSource::Refreshed,
        })
    }
}

/// Write a freshly minted login into the credential store.
///
/// The record lands under `"<provider>:<email-or-default>"`. When the login did
/// not yield an API key, a key already stored for that profile is carried over;
/// a record that cannot be read is simply replaced. Returns the profile id.
pub fn store_login(
    agent_dir: &Path,
    provider_id: &str,
    credentials: &OAuthCredentials,
) -> Result<String, StoreError> {
    let path = AuthProfileStore::path_in(agent_dir);
    let mut store = AuthProfileStore::load(&path)?;
    let profile_id = profile_id_for(provider_id, credentials.email.as_deref());

    let previous_key = match store.get(&profile_id) {
        Ok(existing) => existing.and_then(|r| r.api_key().map(str::to_string)),
        Err(e) => {
            warn!(profile = %profile_id, error = %e, "Ignoring unreadable previous credential");
            None
        }
    };

    let record = CredentialRecord {
        kind: CredentialKind::OAuth,
        provider: provider_id.to_string(),
        access: Some(credentials.access_token.clone()),
        refresh: credentials.refresh_token.clone(),
        expires: Some(credentials.expires_at),
        key: credentials
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or(previous_key),
        email: credentials.email.clone(),
    };
    store.set(&profile_id, &record)?;
    store.save(&path)?;

    info!(profile = %profile_id, path = %path.display(), "Stored sandbox credentials");
    Ok(profile_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AuthProfileRef, ServiceConfig};
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};
    use tempfile::TempDir;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PROFILE: &str = "runbox:dev@example.com";

    fn resolver(base_url: &str, token_env: &str) -> TokenResolver {
        TokenResolver::new(
            OAuthClient::new(ServiceConfig {
                base_url: base_url.to_string(),
                token_env: token_env.to_string(),
                ..ServiceConfig::default()
            })
            .unwrap(),
        )
    }

    fn now_ms() -> i64 {
        Utc::now().timestamp_millis()
    }

    fn write_record(dir: &Path, record: Value) {
        let doc = json!({ "profiles": { PROFILE: record } });
        std::fs::write(
            AuthProfileStore::path_in(dir),
            serde_json::to_string_pretty(&doc).unwrap(),
        )
        .unwrap();
    }

    fn read_record(dir: &Path) -> CredentialRecord {
        AuthProfileStore::load(&AuthProfileStore::path_in(dir))
            .unwrap()
            .get(PROFILE)
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_env_token_wins() {
        unsafe { std::env::set_var("RUNBOX_TEST_TOKEN_ENV_WINS", "  env-token  ") };
        let resolved = resolver("http://127.0.0.1:9", "RUNBOX_TEST_TOKEN_ENV_WINS")
            .resolve_with_source(&ProfileContext::default())
            .await
            .unwrap();
        unsafe { std::env::remove_var("RUNBOX_TEST_TOKEN_ENV_WINS") };

        assert_eq!(resolved.token, "env-token");
        assert_eq!(resolved.source, TokenSource::Environment);
    }

    #[tokio::test]
    async fn test_blank_env_token_is_ignored() {
        unsafe { std::env::set_var("RUNBOX_TEST_TOKEN_ENV_BLANK", "   ") };
        let err = resolver("http://127.0.0.1:9", "RUNBOX_TEST_TOKEN_ENV_BLANK")
            .resolve(&ProfileContext::default())
            .await
            .unwrap_err();
        unsafe { std::env::remove_var("RUNBOX_TEST_TOKEN_ENV_BLANK") };

        assert!(matches!(err, AuthError::NoProfileFound { .. }));
    }

    #[tokio::test]
    async fn test_three_distinct_precondition_errors() {
        let dir = TempDir::new().unwrap();
        let r = resolver("http://127.0.0.1:9", "RUNBOX_TEST_TOKEN_PRECONDITIONS");

        let no_profile = r.resolve(&ProfileContext::default()).await.unwrap_err();
        assert!(matches!(no_profile, AuthError::NoProfileFound { .. }));

        let no_dir = r
            .resolve(&ProfileContext {
                profile_id: Some(PROFILE.into()),
                agent_dir: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(no_dir, AuthError::MissingAgentContext { .. }));

        let no_record = r
            .resolve(&ProfileContext::new(PROFILE, dir.path()))
            .await
            .unwrap_err();
        assert!(matches!(no_record, AuthError::MissingCredential { .. }));
    }

    #[tokio::test]
    async fn test_key_beats_expired_access() {
        let dir = TempDir::new().unwrap();
        write_record(
            dir.path(),
            json!({
                "type": "oauth", "provider": "runbox",
                "access": "stale", "refresh": "rt", "expires": 1,
                "key": "rbx-permanent"
            }),
        );

        let resolved = resolver("http://127.0.0.1:9", "RUNBOX_TEST_TOKEN_KEY")
            .resolve_with_source(&ProfileContext::new(PROFILE, dir.path()))
            .await
            .unwrap();
        assert_eq!(resolved.token, "rbx-permanent");
        assert_eq!(resolved.source, TokenSource::ApiKey);
    }

    #[tokio::test]
    async fn test_valid_access_used_without_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        write_record(
            dir.path(),
            json!({
                "type": "oauth", "provider": "runbox",
                "access": "at-live", "refresh": "rt", "expires": now_ms() + 60 * 60 * 1000
            }),
        );

        let token = resolver(&server.uri(), "RUNBOX_TEST_TOKEN_VALID")
            .resolve(&ProfileContext::new(PROFILE, dir.path()))
            .await
            .unwrap();
        assert_eq!(token, "at-live");
    }

    #[tokio::test]
    async fn test_access_within_buffer_refreshes_once_and_persists() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=rt-old"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "at-new",
                "refresh_token": "rt-new",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        std::fs::write(
            AuthProfileStore::path_in(dir.path()),
            serde_json::to_string(&json!({
                "profiles": {
                    PROFILE: {
                        "type": "oauth", "provider": "runbox",
                        "access": "at-old", "refresh": "rt-old",
                        "expires": now_ms() + 60_000
                    },
                    "other:default": { "type": "api_key", "provider": "other", "key": "k" }
                }
            }))
            .unwrap(),
        )
        .unwrap();

        let resolved = resolver(&server.uri(), "RUNBOX_TEST_TOKEN_REFRESH")
            .resolve_with_source(&ProfileContext::new(PROFILE, dir.path()))
            .await
            .unwrap();
        assert_eq!(resolved.token, "at-new");
        assert_eq!(resolved.source, TokenSource::Refreshed);

        let stored = read_record(dir.path());
        assert_eq!(stored.access.as_deref(), Some("at-new"));
        assert_eq!(stored.refresh.as_deref(), Some("rt-new"));
        assert!(stored.expires.unwrap() > now_ms() + 50 * 60 * 1000);

        let store = AuthProfileStore::load(&AuthProfileStore::path_in(dir.path())).unwrap();
        let other = store.get("other:default").unwrap().unwrap();
        assert_eq!(other.key.as_deref(), Some("k"));
    }

    #[tokio::test]
    async fn test_no_usable_credential_is_all_tokens_expired() {
        let dir = TempDir::new().unwrap();
        write_record(
            dir.path(),
            json!({ "type": "oauth", "provider": "runbox", "access": "old", "expires": 1 }),
        );

        let err = resolver("http://127.0.0.1:9", "RUNBOX_TEST_TOKEN_EXPIRED")
            .resolve(&ProfileContext::new(PROFILE, dir.path()))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::AllTokensExpired { .. }));
        assert!(err.to_string().contains("runbox auth login"));
    }

    #[tokio::test]
    async fn test_refresh_failure_leaves_store_untouched() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        write_record(
            dir.path(),
            json!({ "type": "oauth", "provider": "runbox", "access": "old", "refresh": "rt", "expires": 1 }),
        );

        let err = resolver(&server.uri(), "RUNBOX_TEST_TOKEN_REFRESH_FAIL")
            .resolve(&ProfileContext::new(PROFILE, dir.path()))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::RefreshFailed { .. }));
        assert_eq!(read_record(dir.path()).access.as_deref(), Some("old"));
    }

    #[tokio::test]
    async fn test_force_refresh_ignores_valid_access() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "at-forced",
                "expires_in": 600
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        write_record(
            dir.path(),
            json!({
                "type": "oauth", "provider": "runbox",
                "access": "at-live", "refresh": "rt-keep", "expires": now_ms() + 60 * 60 * 1000
            }),
        );

        let resolved = resolver(&server.uri(), "RUNBOX_TEST_TOKEN_FORCE")
            .force_refresh(&ProfileContext::new(PROFILE, dir.path()))
            .await
            .unwrap();
        assert_eq!(resolved.token, "at-forced");
        assert_eq!(read_record(dir.path()).refresh.as_deref(), Some("rt-keep"));
    }

    #[test]
    fn test_inspect_reports_without_refreshing() {
        let dir = TempDir::new().unwrap();
        let r = resolver("http://127.0.0.1:9", "RUNBOX_TEST_TOKEN_INSPECT");
        let ctx = ProfileContext::new(PROFILE, dir.path());

        write_record(
            dir.path(),
            json!({ "type": "oauth", "provider": "runbox", "access": "old", "refresh": "rt", "expires": 5 }),
        );
        assert_eq!(
            r.inspect(&ctx).unwrap(),
            CredentialStatus::NeedsRefresh {
                profile_id: PROFILE.into(),
                expires_at: Some(5)
            }
        );

        write_record(
            dir.path(),
            json!({ "type": "api_key", "provider": "runbox", "key": "k" }),
        );
        assert_eq!(
            r.inspect(&ctx).unwrap(),
            CredentialStatus::ApiKey {
                profile_id: PROFILE.into()
            }
        );
    }

    #[test]
    fn test_context_from_config_picks_first_matching_profile() {
        let mut config = RunboxConfig {
            agent_dir: Some(PathBuf::from("/agent")),
            ..RunboxConfig::default()
        };
        config.auth.profiles.insert(
            "anthropic:default".into(),
            AuthProfileRef {
                provider: "anthropic".into(),
                email: None,
            },
        );
        config.auth.profiles.insert(
            "runbox:dev@example.com".into(),
            AuthProfileRef {
                provider: "runbox".into(),
                email: Some("dev@example.com".into()),
            },
        );

        let ctx = ProfileContext::from_config(&config);
        assert_eq!(ctx.profile_id.as_deref(), Some("runbox:dev@example.com"));
        assert_eq!(ctx.agent_dir, Some(PathBuf::from("/agent")));
    }

    #[test]
    fn test_store_login_preserves_existing_key() {
        let dir = TempDir::new().unwrap();
        write_record(
            dir.path(),
            json!({ "type": "oauth", "provider": "runbox", "key": "rbx-keep", "access": "old", "expires": 1 }),
        );

        let profile_id = store_login(
            dir.path(),
            "runbox",
            &OAuthCredentials {
                access_token: "at-1".into(),
                refresh_token: Some("rt-1".into()),
                expires_at: 42,
                email: Some("dev@example.com".into()),
                api_key: None,
            },
        )
        .unwrap();

        assert_eq!(profile_id, PROFILE);
        let stored = read_record(dir.path());
        assert_eq!(stored.key.as_deref(), Some("rbx-keep"));
        assert_eq!(stored.access.as_deref(), Some("at-1"));
        assert_eq!(stored.expires, Some(42));
    }

    #[test]
    fn test_store_login_replaces_unreadable_record() {
        let dir = TempDir::new().unwrap();
        write_record(dir.path(), json!({ "type": "mystery" }));

        store_login(
            dir.path(),
            "runbox",
            &OAuthCredentials {
                access_token: "at-1".into(),
                refresh_token: None,
                expires_at: 42,
                email: Some("dev@example.com".into()),
                api_key: Some("rbx-new".into()),
            },
        )
        .unwrap();

        assert_eq!(read_record(dir.path()).key.as_deref(), Some("rbx-new"));
    }
}
