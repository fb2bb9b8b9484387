//! Session tools: create, list, get and delete persistent sandbox sessions.

use runbox_core::types::ToolOutput;
use serde_json::json;

use super::{id_path, optional_str, required_str};

sandbox_tool!(
    SessionCreateTool,
    "sandbox_session_create",
    "Create a persistent sandbox session. Variables and files survive between \
     sandbox_execute calls that pass the returned session id.",
    Write,
    json!({
        "type": "object",
        "properties": {
            "language": {
                "type": "string",
                "enum": ["python", "bash"],
                "description": "Default interpreter for the session"
            },
            "name": { "type": "string", "description": "Human-readable label" }
        }
    }),
    |ctx, _call_id, args| {
        let mut body = json!({});
        for field in ["language", "name"] {
            if let Some(value) = optional_str(&args, field) {
                body[field] = json!(value);
            }
        }
        ctx.post("/v1/sessions", &body).await.map(ToolOutput::json)
    }
);

sandbox_tool!(
    SessionListTool,
    "sandbox_session_list",
    "List the sandbox sessions owned by the current account.",
    ReadOnly,
    json!({ "type": "object", "properties": {} }),
    |ctx, _call_id, _args| ctx.get("/v1/sessions").await.map(ToolOutput::json)
);

sandbox_tool!(
    SessionGetTool,
    "sandbox_session_get",
    "Fetch the status and metadata of one sandbox session.",
    ReadOnly,
    json!({
        "type": "object",
        "properties": {
            "session_id": { "type": "string", "description": "Session id" }
        },
        "required": ["session_id"]
    }),
    |ctx, _call_id, args| {
        let id = required_str("sandbox_session_get", &args, "session_id")?;
        ctx.get(&id_path("/v1/sessions", id))
            .await
            .map(ToolOutput::json)
    }
);

sandbox_tool!(
    SessionDeleteTool,
    "sandbox_session_delete",
    "Delete a sandbox session and everything in it. Deleting a session that no \
     longer exists succeeds.",
    Destructive,
    json!({
        "type": "object",
        "properties": {
            "session_id": { "type": "string", "description": "Session id" }
        },
        "required": ["session_id"]
    }),
    |ctx, _call_id, args| {
        let id = required_str("sandbox_session_delete", &args, "session_id")?;
        ctx.delete(&id_path("/v1/sessions", id))
            .await
            .map(ToolOutput::json)
    }
);
