//! # Runbox Core
//!
//! Core library for Runbox, the sandboxed code-execution integration.
//! Provides configuration, the credential store, bearer token resolution,
//! the OAuth PKCE login flow, the sandbox REST client and its retry policy.

pub mod api;
pub mod auth;
pub mod config;
pub mod credentials;
pub mod error;
pub mod oauth;
pub mod retry;
pub mod types;

// Re-export commonly used types at the crate root.
pub use api::{ApiClient, ApiResponse};
pub use auth::{
    CredentialStatus, EXPIRY_BUFFER_MS, ProfileContext, ResolvedToken, TokenResolver,
    TokenSource, store_login,
};
pub use config::{RetryConfig, RunboxConfig, ServiceConfig, load_config};
pub use credentials::{AuthProfileStore, CredentialKind, CredentialRecord, profile_id_for};
pub use error::{ApiError, AuthError, ConfigError, OAuthError, StoreError, ToolError};
pub use oauth::{LoginPrompt, OAuthClient, OAuthCredentials, RefreshedTokens, open_in_browser};
pub use retry::{RetryOutcome, RetryPolicy};
pub use types::{RiskLevel, ToolContent, ToolDefinition, ToolOutput};
