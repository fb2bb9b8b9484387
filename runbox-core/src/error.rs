//! Error types for the Runbox core library.
//!
//! Uses `thiserror` for public API error types with one enum per domain:
//! token resolution, OAuth login, the sandbox REST API, the credential store,
//! tool execution, and configuration.

use std::path::PathBuf;

/// Errors from resolving a bearer token for a tool call.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error(
        "No auth profile configured for provider '{provider}'. Run `{login_command}` to sign in"
    )]
    NoProfileFound {
        provider: String,
        login_command: String,
    },

    #[error(
        "No agent directory available for profile '{profile_id}'; cannot locate the credential store"
    )]
    MissingAgentContext { profile_id: String },

    #[error(
        "No stored credential for profile '{profile_id}' in {}. Run `{login_command}` to sign in",
        .path.display()
    )]
    MissingCredential {
        profile_id: String,
        path: PathBuf,
        login_command: String,
    },

    #[error(
        "All tokens for profile '{profile_id}' have expired. Run `{login_command}` to sign in again"
    )]
    AllTokensExpired {
        profile_id: String,
        login_command: String,
    },

    #[error("Token refresh for profile '{profile_id}' failed: {source}")]
    RefreshFailed {
        profile_id: String,
        #[source]
        source: OAuthError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors from the OAuth PKCE login flow and the token endpoint.
#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    #[error("OAuth state parameter mismatch (possible CSRF attack)")]
    StateMismatch,

    #[error("No authorization code found in the provided input")]
    MissingCode,

    #[error("Authorization was denied by the provider: {error}")]
    AuthorizationDenied { error: String },

    #[error("Token exchange failed (HTTP {status}): {body}")]
    TokenExchangeFailed { status: u16, body: String },

    #[error("Token refresh failed (HTTP {status}): {body}")]
    TokenRefreshFailed { status: u16, body: String },

    #[error("Invalid token response: {message}")]
    InvalidTokenResponse { message: String },

    #[error("Token endpoint request failed: {message}")]
    Request { message: String },

    #[error("OAuth callback server failed: {message}")]
    CallbackServer { message: String },

    #[error("Timed out after {timeout_secs}s waiting for the OAuth redirect")]
    CallbackTimeout { timeout_secs: u64 },

    #[error("Failed to read authorization input: {message}")]
    Prompt { message: String },

    #[error("Invalid OAuth URL: {message}")]
    InvalidUrl { message: String },
}

/// Errors from the sandbox REST API.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{method} {path} failed with status {status}: {body}")]
    RequestFailed {
        method: String,
        path: String,
        status: u16,
        body: String,
    },

    #[error("{method} {path} request failed: {message}")]
    Transport {
        method: String,
        path: String,
        message: String,
    },

    #[error("{method} {path} returned an unreadable body: {message}")]
    Decode {
        method: String,
        path: String,
        message: String,
    },

    #[error("Failed to create HTTP client: {message}")]
    ClientBuild { message: String },
}

impl ApiError {
    /// HTTP status of the failed response, if the server produced one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::RequestFailed { status, .. } => Some(*status),
            ApiError::Transport { .. } | ApiError::Decode { .. } | ApiError::ClientBuild { .. } => {
                None
            }
        }
    }
}

/// Errors from the on-disk credential store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to read credential store {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write credential store {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse credential store {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid credential record for profile '{profile_id}': {reason}")]
    InvalidRecord { profile_id: String, reason: String },
}

/// Errors from tool registration and execution.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Tool not found: {name}")]
    NotFound { name: String },

    #[error("Tool already registered: {name}")]
    AlreadyRegistered { name: String },

    #[error("Invalid arguments for tool '{name}': {reason}")]
    InvalidArguments { name: String, reason: String },

    #[error("Invalid encoding for '{field}' in tool '{name}': {reason}")]
    InvalidEncoding {
        name: String,
        field: String,
        reason: String,
    },

    #[error("Tool '{name}' timed out after {timeout_secs}s")]
    Timeout { name: String, timeout_secs: u64 },

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    OAuth(#[from] OAuthError),
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },

    #[error("Failed to write configuration {}: {message}", .path.display())]
    WriteFailed { path: PathBuf, message: String },
}
