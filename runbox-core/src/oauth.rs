//! OAuth 2.0 + PKCE login for the sandbox service.
//!
//! Mints the initial token pair with an authorization-code exchange and refreshes it
//! later with rotation. Two interaction modes share one exchange implementation:
//!
//! | Mode | How the code arrives |
//! |------|----------------------|
//! | Local | Browser redirect to a one-shot listener on `127.0.0.1:<callback_port>` |
//! | Remote | User pastes the redirect URL (or the bare code) into a prompt |
//!
//! When the local listener cannot bind or times out, the flow falls back to the
//! prompt so that headless machines and blocked ports still get a working login.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use rand::Rng;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, oneshot};
use tracing::{debug, info, warn};

use crate::config::{CALLBACK_HOST, ServiceConfig};
use crate::error::OAuthError;

// ── Types ───────────────────────────────────────────────────────────────────

/// Tokens minted by a successful authorization-code exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthCredentials {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Absolute expiry of `access_token`, epoch milliseconds.
    pub expires_at: i64,
    pub email: Option<String>,
    /// Permanent API key, when the service issues one alongside the tokens.
    pub api_key: Option<String>,
}

/// Tokens returned by a refresh. The refresh token may have been rotated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshedTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: i64,
}

/// Per-attempt PKCE verifier, challenge and CSRF state.
pub struct PkceState {
    pub verifier: String,
    pub challenge: String,
    pub state: String,
}

/// Code and state extracted from a redirect or pasted input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationInput {
    pub code: String,
    pub state: Option<String>,
}

/// Source of pasted authorization input for the remote flow.
#[async_trait]
pub trait LoginPrompt: Send + Sync {
    /// Show `message` and return the user's answer.
    async fn prompt(&self, message: &str) -> Result<String, OAuthError>;
}

/// Opens a URL in the user's browser.
pub type OpenUrlFn<'a> = &'a (dyn Fn(&str) -> std::io::Result<()> + Send + Sync);

/// Open a URL with the platform's default browser.
pub fn open_in_browser(url: &str) -> std::io::Result<()> {
    open::that(url)
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    expires_in: i64,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    api_key: Option<String>,
}

// ── PKCE ────────────────────────────────────────────────────────────────────

impl PkceState {
    /// Generate a fresh verifier (32 random bytes, base64url), its S256 challenge,
    /// and a 16-byte hex state token.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let verifier_bytes: [u8; 32] = rng.r#gen();
        let state_bytes: [u8; 16] = rng.r#gen();

        let verifier = URL_SAFE_NO_PAD.encode(verifier_bytes);
        let challenge = pkce_challenge(&verifier);

        Self {
            verifier,
            challenge,
            state: hex::encode(state_bytes),
        }
    }
}

/// `base64url(sha256(verifier))` without padding.
pub fn pkce_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

// ── Input parsing ───────────────────────────────────────────────────────────

/// Parse a pasted redirect URL, a bare query string, or a bare code.
pub fn parse_authorization_input(input: &str) -> Result<AuthorizationInput, OAuthError> {
    let value = input.trim();
    if value.is_empty() {
        return Err(OAuthError::MissingCode);
    }

    let query_pairs: Option<HashMap<String, String>> =
        if value.starts_with("http://") || value.starts_with("https://") {
            let url = url::Url::parse(value).map_err(|e| OAuthError::InvalidUrl {
                message: e.to_string(),
            })?;
            Some(url.query_pairs().into_owned().collect())
        } else if value.contains("code=") {
            let query = value.trim_start_matches('?');
            Some(url::form_urlencoded::parse(query.as_bytes()).into_owned().collect())
        } else {
            None
        };

    match query_pairs {
        Some(pairs) => {
            let code = pairs
                .get("code")
                .map(|c| c.trim())
                .filter(|c| !c.is_empty())
                .ok_or(OAuthError::MissingCode)?;
            Ok(AuthorizationInput {
                code: code.to_string(),
                state: pairs.get("state").cloned(),
            })
        }
        None => Ok(AuthorizationInput {
            code: value.to_string(),
            state: None,
        }),
    }
}

/// A returned state must match the generated one; a missing state is tolerated.
pub fn verify_state(input: &AuthorizationInput, expected: &str) -> Result<(), OAuthError> {
    match input.state.as_deref() {
        Some(returned) if returned != expected => Err(OAuthError::StateMismatch),
        _ => Ok(()),
    }
}

// ── Callback Server ─────────────────────────────────────────────────────────

/// Query parameters delivered to the local redirect listener.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackData {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

impl CallbackData {
    fn into_input(self) -> Result<AuthorizationInput, OAuthError> {
        if let Some(error) = self.error {
            return Err(OAuthError::AuthorizationDenied { error });
        }
        let code = self
            .code
            .filter(|c| !c.trim().is_empty())
            .ok_or(OAuthError::MissingCode)?;
        Ok(AuthorizationInput {
            code: code.trim().to_string(),
            state: self.state,
        })
    }
}

const CALLBACK_SUCCESS_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Runbox</title></head>
<body style="font-family: system-ui; text-align: center; padding-top: 80px;">
<h2>Authentication complete</h2>
<p>You can close this tab and return to the terminal.</p>
</body>
</html>"#;

type CallbackSender = Arc<Mutex<Option<oneshot::Sender<CallbackData>>>>;

/// Build the axum router used by the OAuth callback server.
pub fn build_callback_router(path: &str, tx: CallbackSender) -> axum::Router {
    axum::Router::new().route(
        path,
        axum::routing::get(
            move |query: axum::extract::Query<HashMap<String, String>>| {
                let tx = tx.clone();
                async move {
                    let data = CallbackData {
                        code: query.get("code").cloned(),
                        state: query.get("state").cloned(),
                        error: query.get("error").cloned(),
                    };
                    if let Some(sender) = tx.lock().await.take() {
                        let _ = sender.send(data);
                    }
                    axum::response::Html(CALLBACK_SUCCESS_PAGE)
                }
            },
        ),
    )
}

/// One-shot redirect listener bound to the fixed callback port.
struct CallbackServer {
    rx: oneshot::Receiver<CallbackData>,
    shutdown: oneshot::Sender<()>,
    handle: tokio::task::JoinHandle<()>,
}

impl CallbackServer {
    async fn start(service: &ServiceConfig) -> Result<Self, OAuthError> {
        let listener = tokio::net::TcpListener::bind((CALLBACK_HOST, service.callback_port))
            .await
            .map_err(|e| OAuthError::CallbackServer {
                message: format!(
                    "Failed to bind callback server on port {}: {}",
                    service.callback_port, e
                ),
            })?;

        let (tx, rx) = oneshot::channel::<CallbackData>();
        let (shutdown, shutdown_rx) = oneshot::channel::<()>();
        let app = build_callback_router(&service.callback_path, Arc::new(Mutex::new(Some(tx))));

        debug!(port = service.callback_port, "OAuth callback server starting");
        let handle = tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            if let Err(e) = server.await {
                warn!(error = %e, "OAuth callback server stopped with an error");
            }
        });

        Ok(Self {
            rx,
            shutdown,
            handle,
        })
    }

    /// Wait for the first redirect, then tear the listener down.
    async fn wait(self, timeout: Duration) -> Result<CallbackData, OAuthError> {
        let Self {
            rx,
            shutdown,
            mut handle,
        } = self;

        let outcome = tokio::time::timeout(timeout, rx).await;

        let _ = shutdown.send(());
        if tokio::time::timeout(Duration::from_secs(2), &mut handle)
            .await
            .is_err()
        {
            handle.abort();
            let _ = handle.await;
        }
        debug!("OAuth callback server stopped");

        match outcome {
            Ok(Ok(data)) => Ok(data),
            Ok(Err(_)) => Err(OAuthError::CallbackServer {
                message: "OAuth callback channel closed unexpectedly".to_string(),
            }),
            Err(_) => Err(OAuthError::CallbackTimeout {
                timeout_secs: timeout.as_secs(),
            }),
        }
    }

    async fn abandon(self) {
        let _ = self.shutdown.send(());
        self.handle.abort();
        let _ = self.handle.await;
    }
}

// ── Client ──────────────────────────────────────────────────────────────────

/// OAuth client for the sandbox service's authorize and token endpoints.
#[derive(Clone)]
pub struct OAuthClient {
    service: ServiceConfig,
    http: reqwest::Client,
}

impl OAuthClient {
    pub fn new(service: ServiceConfig) -> Result<Self, OAuthError> {
        let http = reqwest::Client::builder()
            .timeout(service.request_timeout())
            .build()
            .map_err(|e| OAuthError::Request {
                message: format!("Failed to create HTTP client: {}", e),
            })?;
        Ok(Self { service, http })
    }

    pub fn service(&self) -> &ServiceConfig {
        &self.service
    }

    /// Build the authorization URL for one attempt.
    pub fn authorization_url(&self, pkce: &PkceState) -> Result<url::Url, OAuthError> {
        let mut auth_url =
            url::Url::parse(&self.service.authorize_url()).map_err(|e| OAuthError::InvalidUrl {
                message: e.to_string(),
            })?;

        auth_url
            .query_pairs_mut()
            .append_pair("client_id", &self.service.client_id)
            .append_pair("redirect_uri", &self.service.redirect_uri())
            .append_pair("response_type", "code")
            .append_pair("code_challenge", &pkce.challenge)
            .append_pair("code_challenge_method", "S256")
            .append_pair("state", &pkce.state)
            .append_pair("scope", &self.service.scope);

        Ok(auth_url)
    }

    /// Run the full authorization-code flow with PKCE.
    ///
    /// 1. Generate verifier, challenge and state
    /// 2. Obtain the code: local redirect listener, or the prompt when `is_remote`
    ///    (the local path falls back to the prompt if the listener fails)
    /// 3. Reject a returned state that differs from ours
    /// 4. Exchange the code for tokens
    pub async fn run_flow(
        &self,
        is_remote: bool,
        open_url: OpenUrlFn<'_>,
        prompt: &dyn LoginPrompt,
    ) -> Result<OAuthCredentials, OAuthError> {
        let pkce = PkceState::generate();
        let auth_url = self.authorization_url(&pkce)?;

        let input = if is_remote {
            self.prompt_for_input(&auth_url, prompt).await?
        } else {
            match self.wait_for_redirect(&auth_url, open_url).await {
                Ok(callback) => callback.into_input()?,
                Err(e) => {
                    warn!(error = %e, "Local OAuth callback unavailable, falling back to manual entry");
                    self.prompt_for_input(&auth_url, prompt).await?
                }
            }
        };

        verify_state(&input, &pkce.state)?;
        self.exchange_code(&input.code, &pkce.verifier).await
    }

    async fn prompt_for_input(
        &self,
        auth_url: &url::Url,
        prompt: &dyn LoginPrompt,
    ) -> Result<AuthorizationInput, OAuthError> {
        let message = format!(
            "Open this URL in a browser to sign in:\n\n{auth_url}\n\n\
             Then paste the full redirect URL (or just the authorization code)"
        );
        let answer = prompt.prompt(&message).await?;
        parse_authorization_input(&answer)
    }

    async fn wait_for_redirect(
        &self,
        auth_url: &url::Url,
        open_url: OpenUrlFn<'_>,
    ) -> Result<CallbackData, OAuthError> {
        let server = CallbackServer::start(&self.service).await?;

        info!("Opening browser for OAuth authorization...");
        if let Err(e) = open_url(auth_url.as_str()) {
            server.abandon().await;
            return Err(OAuthError::CallbackServer {
                message: format!("Failed to open browser: {e}"),
            });
        }

        server
            .wait(Duration::from_secs(self.service.callback_timeout_secs))
            .await
    }

    /// Exchange an authorization code for tokens.
    pub async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<OAuthCredentials, OAuthError> {
        let redirect_uri = self.service.redirect_uri();
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri.as_str()),
            ("client_id", self.service.client_id.as_str()),
            ("code_verifier", code_verifier),
        ];

        debug!("Exchanging authorization code for token");
        let (status, body) = self.post_token_form(&params).await?;
        if !(200..300).contains(&status) {
            return Err(OAuthError::TokenExchangeFailed { status, body });
        }

        let token = parse_token_response(&body)?;
        info!("OAuth authorization code exchanged");
        Ok(OAuthCredentials {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at: expires_at_ms(token.expires_in),
            email: token.email,
            api_key: token.api_key,
        })
    }

    /// Refresh an access token. The returned refresh token replaces the old one.
    pub async fn refresh(&self, refresh_token: &str) -> Result<RefreshedTokens, OAuthError> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.service.client_id.as_str()),
        ];

        debug!("Refreshing OAuth token");
        let (status, body) = self.post_token_form(&params).await?;
        if !(200..300).contains(&status) {
            return Err(OAuthError::TokenRefreshFailed { status, body });
        }

        let token = parse_token_response(&body)?;
        Ok(RefreshedTokens {
            access_token: token.access_token,
            // Servers that do not rotate omit the field; keep the old token then.
            refresh_token: token
                .refresh_token
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| refresh_token.to_string()),
            expires_at: expires_at_ms(token.expires_in),
        })
    }

    async fn post_token_form(&self, params: &[(&str, &str)]) -> Result<(u16, String), OAuthError> {
        let response = self
            .http
            .post(self.service.token_url())
            .form(params)
            .send()
            .await
            .map_err(|e| OAuthError::Request {
                message: e.to_string(),
            })?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| OAuthError::Request {
            message: format!("Failed to read token response: {e}"),
        })?;
        Ok((status, body))
    }
}

fn parse_token_response(body: &str) -> Result<TokenResponse, OAuthError> {
    serde_json::from_str(body).map_err(|e| OAuthError::InvalidTokenResponse {
        message: e.to_string(),
    })
}

fn expires_at_ms(expires_in_secs: i64) -> i64 {
    Utc::now()
        .timestamp_millis()
        .saturating_add(expires_in_secs.saturating_mul(1000))
}

// ── Tests ───────────────────────────────────────────────────────────────────
