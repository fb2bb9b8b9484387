//! End-to-end credential lifecycle: headless login, storage, resolution and
//! refresh-with-rotation against a mocked token endpoint.

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use runbox_core::auth::{ProfileContext, TokenResolver, TokenSource, store_login};
use runbox_core::config::{AuthProfileRef, RunboxConfig, ServiceConfig, upsert_profile_config};
use runbox_core::credentials::AuthProfileStore;
use runbox_core::error::OAuthError;
use runbox_core::oauth::{LoginPrompt, OAuthClient};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Plays the user: reads the authorization URL from the prompt and answers
/// with the redirect the provider would have produced.
struct RedirectingUser;

#[async_trait]
impl LoginPrompt for RedirectingUser {
    async fn prompt(&self, message: &str) -> Result<String, OAuthError> {
        let auth_url = message
            .lines()
            .find(|line| line.starts_with("http"))
            .and_then(|line| url::Url::parse(line.trim()).ok())
            .ok_or(OAuthError::MissingCode)?;
        let state = auth_url
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .ok_or(OAuthError::MissingCode)?;
        Ok(format!(
            "http://127.0.0.1:8844/oauth/callback?code=auth-code-1&state={state}"
        ))
    }
}

fn never_open(_url: &str) -> std::io::Result<()> {
    Err(std::io::Error::other("no browser in tests"))
}

#[tokio::test]
async fn test_login_then_resolve_then_refresh() {
    let server = MockServer::start().await;
    let agent = TempDir::new().unwrap();
    let workspace = TempDir::new().unwrap();

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=auth-code-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "at-login",
            "refresh_token": "rt-login",
            "expires_in": 60,
            "email": "dev@example.com"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=rt-login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "at-refreshed",
            "refresh_token": "rt-rotated",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;

    let service = ServiceConfig {
        base_url: server.uri(),
        token_env: "RUNBOX_IT_LIFECYCLE_TOKEN_UNSET".into(),
        ..ServiceConfig::default()
    };
    let client = OAuthClient::new(service.clone()).unwrap();

    // Headless login
    let credentials = client
        .run_flow(true, &never_open, &RedirectingUser)
        .await
        .unwrap();
    assert_eq!(credentials.access_token, "at-login");

    let profile_id = store_login(agent.path(), "runbox", &credentials).unwrap();
    assert_eq!(profile_id, "runbox:dev@example.com");
    upsert_profile_config(
        workspace.path(),
        &profile_id,
        AuthProfileRef {
            provider: "runbox".into(),
            email: credentials.email.clone(),
        },
    )
    .unwrap();

    // The workspace config now routes the provider to the new profile.
    let mut config = runbox_core::config::load_config(Some(workspace.path())).unwrap();
    config.agent_dir = Some(agent.path().to_path_buf());
    config.service = service;
    let ctx = ProfileContext::from_config(&config);
    assert_eq!(ctx.profile_id.as_deref(), Some("runbox:dev@example.com"));

    // A 60s token is already inside the 5-minute buffer, so the first
    // resolution refreshes and rotates.
    let resolver = TokenResolver::new(OAuthClient::new(config.service.clone()).unwrap());
    let resolved = resolver.resolve_with_source(&ctx).await.unwrap();
    assert_eq!(resolved.token, "at-refreshed");
    assert_eq!(resolved.source, TokenSource::Refreshed);

    // The rotated pair was persisted, so the next call needs no network.
    let again = resolver.resolve_with_source(&ctx).await.unwrap();
    assert_eq!(again.token, "at-refreshed");
    assert_eq!(again.source, TokenSource::AccessToken);

    let stored = AuthProfileStore::load(&AuthProfileStore::path_in(agent.path()))
        .unwrap()
        .get(&profile_id)
        .unwrap()
        .unwrap();
    assert_eq!(stored.refresh.as_deref(), Some("rt-rotated"));
}

#[tokio::test]
async fn test_state_mismatch_sends_no_exchange() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    struct WrongState;

    #[async_trait]
    impl LoginPrompt for WrongState {
        async fn prompt(&self, _message: &str) -> Result<String, OAuthError> {
            Ok("code=stolen&state=not-ours".into())
        }
    }

    let client = OAuthClient::new(ServiceConfig {
        base_url: server.uri(),
        ..ServiceConfig::default()
    })
    .unwrap();
    let err = client
        .run_flow(true, &never_open, &WrongState)
        .await
        .unwrap_err();
    assert!(matches!(err, OAuthError::StateMismatch));
}

#[test]
fn test_default_config_has_no_profile() {
    let ctx = ProfileContext::from_config(&RunboxConfig::default());
    assert_eq!(ctx.profile_id, None);
}
