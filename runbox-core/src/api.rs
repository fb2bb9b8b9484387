//! Authenticated REST client for the sandbox API.
//!
//! Every request carries `Authorization: Bearer <token>`. Responses are
//! classified by status and content type into an [`ApiResponse`]; failures keep
//! the method, path, status and raw body together in [`ApiError::RequestFailed`].

pub use reqwest::Method;
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::config::ServiceConfig;
use crate::error::ApiError;

/// A successfully classified response body.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiResponse {
    /// 204, or any response the server sent without content.
    Empty,
    Json(Value),
    Text(String),
}

impl ApiResponse {
    /// The body as JSON: text becomes a JSON string, empty becomes `{}`.
    pub fn into_json(self) -> Value {
        match self {
            ApiResponse::Empty => Value::Object(serde_json::Map::new()),
            ApiResponse::Json(value) => value,
            ApiResponse::Text(text) => Value::String(text),
        }
    }
}

const USER_AGENT: &str = concat!("runbox/", env!("CARGO_PKG_VERSION"));

/// Thin wrapper over `reqwest` bound to the sandbox base URL.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(service: &ServiceConfig) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(service.request_timeout())
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ApiError::ClientBuild {
                message: e.to_string(),
            })?;
        Ok(Self {
            http,
            base_url: service.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Issue an authenticated request and classify the response.
    ///
    /// `deadline` replaces the client-wide request timeout for this call only.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        token: &str,
        body: Option<&Value>,
        deadline: Option<Duration>,
    ) -> Result<ApiResponse, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(method = %method, path, ?deadline, "Sandbox API request");

        let mut builder = self.http.request(method.clone(), &url).bearer_auth(token);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        if let Some(deadline) = deadline {
            builder = builder.timeout(deadline);
        }

        let response = builder.send().await.map_err(|e| ApiError::Transport {
            method: method.to_string(),
            path: path.to_string(),
            message: e.to_string(),
        })?;

        let status = response.status();
        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.to_ascii_lowercase().contains("json"));

        let text = response.text().await.map_err(|e| ApiError::Decode {
            method: method.to_string(),
            path: path.to_string(),
            message: e.to_string(),
        })?;

        if !status.is_success() {
            return Err(ApiError::RequestFailed {
                method: method.to_string(),
                path: path.to_string(),
                status: status.as_u16(),
                body: text,
            });
        }

        if status == reqwest::StatusCode::NO_CONTENT {
            return Ok(ApiResponse::Empty);
        }
        if !is_json {
            return Ok(ApiResponse::Text(text));
        }
        if text.trim().is_empty() {
            return Ok(ApiResponse::Json(Value::Object(serde_json::Map::new())));
        }
        serde_json::from_str(&text)
            .map(ApiResponse::Json)
            .map_err(|e| ApiError::Decode {
                method: method.to_string(),
                path: path.to_string(),
                message: e.to_string(),
            })
    }

    pub async fn get(&self, path: &str, token: &str) -> Result<ApiResponse, ApiError> {
        self.request(Method::GET, path, token, None, None).await
    }

    pub async fn post(
        &self,
        path: &str,
        token: &str,
        body: &Value,
    ) -> Result<ApiResponse, ApiError> {
        self.request(Method::POST, path, token, Some(body), None).await
    }

    pub async fn delete(&self, path: &str, token: &str) -> Result<ApiResponse, ApiError> {
        self.request(Method::DELETE, path, token, None, None).await
    }
}
