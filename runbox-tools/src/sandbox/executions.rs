//! Execution tools: inspect or cancel a previous run.

use runbox_core::types::ToolOutput;
use serde_json::json;

use super::{id_path, required_str};

sandbox_tool!(
    ExecutionGetTool,
    "sandbox_execution_get",
    "Fetch the status and output of a previous sandbox execution.",
    ReadOnly,
    json!({
        "type": "object",
        "properties": {
            "execution_id": { "type": "string", "description": "Execution id" }
        },
        "required": ["execution_id"]
    }),
    |ctx, _call_id, args| {
        let id = required_str("sandbox_execution_get", &args, "execution_id")?;
        ctx.get(&id_path("/v1/executions", id))
            .await
            .map(ToolOutput::json)
    }
);

sandbox_tool!(
    ExecutionCancelTool,
    "sandbox_execution_cancel",
    "Cancel a running sandbox execution. Cancelling one that already finished \
     or no longer exists succeeds.",
    Destructive,
    json!({
        "type": "object",
        "properties": {
            "execution_id": { "type": "string", "description": "Execution id" }
        },
        "required": ["execution_id"]
    }),
    |ctx, _call_id, args| {
        let id = required_str("sandbox_execution_cancel", &args, "execution_id")?;
        ctx.delete(&id_path("/v1/executions", id))
            .await
            .map(ToolOutput::json)
    }
);
