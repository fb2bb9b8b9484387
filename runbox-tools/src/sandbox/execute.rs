//! `sandbox_execute` — run Python or Bash code in the remote sandbox.

use async_trait::async_trait;
use runbox_core::error::ToolError;
use runbox_core::types::{RiskLevel, ToolOutput};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

use super::{SandboxContext, optional_str, required_str};
use crate::registry::Tool;

const TOOL_NAME: &str = "sandbox_execute";
const DEFAULT_EXEC_TIMEOUT_SECS: u64 = 60;
const MAX_EXEC_TIMEOUT_SECS: u64 = 600;
/// Added on top of the requested run time for network and queueing.
const HTTP_MARGIN_SECS: u64 = 10;
/// The registry deadline also covers token resolution before the request.
const TOOL_MARGIN_SECS: u64 = 15;
const LANGUAGES: [&str; 2] = ["python", "bash"];

pub struct ExecuteTool {
    ctx: Arc<SandboxContext>,
}

impl ExecuteTool {
    pub fn new(ctx: Arc<SandboxContext>) -> Self {
        Self { ctx }
    }
}

fn requested_timeout(args: &Value) -> u64 {
    args.get("timeout_secs")
        .and_then(Value::as_u64)
        .unwrap_or(DEFAULT_EXEC_TIMEOUT_SECS)
        .clamp(1, MAX_EXEC_TIMEOUT_SECS)
}

#[async_trait]
impl Tool for ExecuteTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "Execute Python or Bash code in an isolated remote sandbox. Returns stdout, stderr, \
         exit code and any produced files. Pass session_id to reuse state between calls."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "language": {
                    "type": "string",
                    "enum": LANGUAGES,
                    "description": "Interpreter to run the code with"
                },
                "code": { "type": "string", "description": "Source code to execute" },
                "session_id": {
                    "type": "string",
                    "description": "Existing session to run in (keeps variables and files)"
                },
                "timeout_secs": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": MAX_EXEC_TIMEOUT_SECS,
                    "description": "Maximum run time in seconds (default 60)"
                }
            },
            "required": ["language", "code"]
        })
    }

    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Execute
    }

    fn timeout(&self, args: &Value) -> Duration {
        Duration::from_secs(requested_timeout(args) + TOOL_MARGIN_SECS)
    }

    async fn execute(&self, _call_id: &str, args: Value) -> Result<ToolOutput, ToolError> {
        let language = required_str(TOOL_NAME, &args, "language")?.to_ascii_lowercase();
        if !LANGUAGES.contains(&language.as_str()) {
            return Err(ToolError::InvalidArguments {
                name: TOOL_NAME.into(),
                reason: format!("unsupported language '{language}', expected python or bash"),
            });
        }
        // Code is sent as given; leading whitespace matters for Python.
        let code = args
            .get("code")
            .and_then(Value::as_str)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ToolError::InvalidArguments {
                name: TOOL_NAME.into(),
                reason: "missing 'code' parameter".into(),
            })?;

        let timeout_secs = requested_timeout(&args);
        let mut body = json!({
            "language": language,
            "code": code,
            "timeout_secs": timeout_secs,
        });
        if let Some(session_id) = optional_str(&args, "session_id") {
            body["session_id"] = json!(session_id);
        }

        // The run may legitimately outlast the client-wide request timeout.
        let deadline = Duration::from_secs(timeout_secs + HTTP_MARGIN_SECS);
        let result = self
            .ctx
            .post_with_deadline("/v1/execute", &body, deadline)
            .await?;
        Ok(ToolOutput::json(result))
    }
}
