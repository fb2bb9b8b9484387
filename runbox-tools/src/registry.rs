//! Tool registry for the sandbox catalog.
//!
//! The host asks the registry for tool definitions once, then routes each call
//! by name together with its own call id. Every call runs under the deadline
//! the tool derives from that call's arguments.

use async_trait::async_trait;
use runbox_core::error::ToolError;
use runbox_core::types::{RiskLevel, ToolDefinition, ToolOutput};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Deadline for tools that do not derive one from their arguments.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// A tool the host can call.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name the host calls the tool by; unique within a registry.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema of the arguments object.
    fn parameters_schema(&self) -> Value;

    fn risk_level(&self) -> RiskLevel;

    /// Run one call. `call_id` is the host's identifier for this invocation.
    async fn execute(&self, call_id: &str, args: Value) -> Result<ToolOutput, ToolError>;

    /// Deadline for one call with these arguments.
    fn timeout(&self, _args: &Value) -> Duration {
        DEFAULT_TOOL_TIMEOUT
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
            risk_level: self.risk_level(),
        }
    }
}

/// Tools keyed by name. Listing order is the name order.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool; a second tool with the same name is rejected.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), ToolError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(ToolError::AlreadyRegistered { name });
        }
        debug!(tool = %name, risk = %tool.risk_level(), "Registering tool");
        self.tools.insert(name, tool);
        Ok(())
    }

    pub fn list_definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|tool| tool.definition()).collect()
    }

    pub fn list_names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    /// Route one call to the named tool under the tool's deadline.
    pub async fn execute(
        &self,
        name: &str,
        call_id: &str,
        args: Value,
    ) -> Result<ToolOutput, ToolError> {
        let tool = self.tools.get(name).ok_or_else(|| ToolError::NotFound {
            name: name.to_string(),
        })?;

        let deadline = tool.timeout(&args);
        info!(tool = %name, call_id, deadline_secs = deadline.as_secs(), "Tool call");

        let started = Instant::now();
        let outcome = tokio::time::timeout(deadline, tool.execute(call_id, args)).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(Ok(output)) => {
                debug!(tool = %name, call_id, elapsed_ms, "Tool call finished");
                Ok(output)
            }
            Ok(Err(e)) => {
                debug!(tool = %name, call_id, elapsed_ms, error = %e, "Tool call failed");
                Err(e)
            }
            Err(_) => {
                warn!(tool = %name, call_id, elapsed_ms, "Tool call hit its deadline");
                Err(ToolError::Timeout {
                    name: name.to_string(),
                    timeout_secs: deadline.as_secs(),
                })
            }
        }
    }
}
