//! Sandbox tools — remote Python/Bash execution with sessions and files.
//!
//! Every tool shares one [`SandboxContext`]: it resolves a bearer token for the
//! configured profile, issues the REST call, and wraps deletes in the retry
//! policy so that removing something already gone still reports `{ok: true}`.

pub mod encoding;
pub mod execute;
pub mod executions;
pub mod files;
pub mod sessions;

use runbox_core::api::{ApiClient, Method};
use runbox_core::auth::{ProfileContext, TokenResolver};
use runbox_core::config::RunboxConfig;
use runbox_core::error::ToolError;
use runbox_core::oauth::OAuthClient;
use runbox_core::retry::{RetryOutcome, RetryPolicy};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

/// Shared state for all sandbox tools.
#[derive(Clone)]
pub struct SandboxContext {
    pub api: ApiClient,
    pub resolver: TokenResolver,
    pub profile: ProfileContext,
    pub retry: RetryPolicy,
}

impl SandboxContext {
    pub fn new(
        api: ApiClient,
        resolver: TokenResolver,
        profile: ProfileContext,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            api,
            resolver,
            profile,
            retry,
        }
    }

    pub fn from_config(config: &RunboxConfig) -> Result<Self, ToolError> {
        Ok(Self {
            api: ApiClient::new(&config.service)?,
            resolver: TokenResolver::new(OAuthClient::new(config.service.clone())?),
            profile: ProfileContext::from_config(config),
            retry: RetryPolicy::from_config(&config.retry),
        })
    }

    pub async fn token(&self) -> Result<String, ToolError> {
        Ok(self.resolver.resolve(&self.profile).await?)
    }

    pub async fn get(&self, path: &str) -> Result<Value, ToolError> {
        let token = self.token().await?;
        Ok(self.api.get(path, &token).await?.into_json())
    }

    pub async fn post(&self, path: &str, body: &Value) -> Result<Value, ToolError> {
        let token = self.token().await?;
        Ok(self.api.post(path, &token, body).await?.into_json())
    }

    /// POST with its own deadline instead of the configured request timeout.
    pub async fn post_with_deadline(
        &self,
        path: &str,
        body: &Value,
        deadline: Duration,
    ) -> Result<Value, ToolError> {
        let token = self.token().await?;
        let response = self
            .api
            .request(Method::POST, path, &token, Some(body), Some(deadline))
            .await?;
        Ok(response.into_json())
    }

    /// DELETE under the retry policy. A 404 counts as already deleted.
    pub async fn delete(&self, path: &str) -> Result<Value, ToolError> {
        let token = self.token().await?;
        let outcome = self
            .retry
            .run(|| self.api.delete(path, &token))
            .await?;
        if let RetryOutcome::AlreadyAbsent = outcome {
            debug!(path, "Delete target already absent");
        }
        Ok(json!({ "ok": true }))
    }
}

/// A required, non-blank string argument.
pub(crate) fn required_str<'a>(
    tool: &str,
    args: &'a Value,
    field: &str,
) -> Result<&'a str, ToolError> {
    args.get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ToolError::InvalidArguments {
            name: tool.to_string(),
            reason: format!("missing '{field}' parameter"),
        })
}

/// An optional string argument; blank counts as absent.
pub(crate) fn optional_str<'a>(args: &'a Value, field: &str) -> Option<&'a str> {
    args.get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// `{prefix}/{id}` with the id percent-encoded as a single path segment.
pub(crate) fn id_path(prefix: &str, id: &str) -> String {
    format!("{prefix}/{}", urlencoding::encode(id))
}
