//! File tools: upload, list, fetch and delete files in the sandbox.

use runbox_core::error::ToolError;
use runbox_core::types::ToolOutput;
use serde_json::json;

use super::encoding::{ContentEncoding, to_wire_base64};
use super::{id_path, optional_str, required_str};

sandbox_tool!(
    FileUploadTool,
    "sandbox_file_upload",
    "Upload a file into the sandbox. Content is base64 by default; set encoding \
     to utf8 to send plain text.",
    Write,
    json!({
        "type": "object",
        "properties": {
            "path": { "type": "string", "description": "Destination path inside the sandbox" },
            "content": { "type": "string", "description": "File content" },
            "encoding": {
                "type": "string",
                "enum": ["base64", "utf8"],
                "description": "Encoding of content (default base64)"
            },
            "session_id": { "type": "string", "description": "Session to place the file in" }
        },
        "required": ["path", "content"]
    }),
    |ctx, _call_id, args| {
        const NAME: &str = "sandbox_file_upload";
        let path = required_str(NAME, &args, "path")?;
        let content = args
            .get("content")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments {
                name: NAME.into(),
                reason: "missing 'content' parameter".into(),
            })?;
        let encoding = ContentEncoding::parse(optional_str(&args, "encoding")).ok_or_else(|| {
            ToolError::InvalidArguments {
                name: NAME.into(),
                reason: "encoding must be 'base64' or 'utf8'".into(),
            }
        })?;
        let wire = to_wire_base64(content, encoding).map_err(|reason| {
            ToolError::InvalidEncoding {
                name: NAME.into(),
                field: "content".into(),
                reason,
            }
        })?;

        let mut body = json!({
            "path": path,
            "content": wire,
            "encoding": "base64",
        });
        if let Some(session_id) = optional_str(&args, "session_id") {
            body["session_id"] = json!(session_id);
        }
        ctx.post("/v1/files", &body).await.map(ToolOutput::json)
    }
);

sandbox_tool!(
    FileListTool,
    "sandbox_file_list",
    "List files in the sandbox, optionally limited to one session.",
    ReadOnly,
    json!({
        "type": "object",
        "properties": {
            "session_id": { "type": "string", "description": "Only list files in this session" }
        }
    }),
    |ctx, _call_id, args| {
        let path = match optional_str(&args, "session_id") {
            Some(session_id) => format!("/v1/files?session_id={}", urlencoding::encode(session_id)),
            None => "/v1/files".to_string(),
        };
        ctx.get(&path).await.map(ToolOutput::json)
    }
);

sandbox_tool!(
    FileGetTool,
    "sandbox_file_get",
    "Fetch a sandbox file's metadata and content.",
    ReadOnly,
    json!({
        "type": "object",
        "properties": {
            "file_id": { "type": "string", "description": "File id" }
        },
        "required": ["file_id"]
    }),
    |ctx, _call_id, args| {
        let id = required_str("sandbox_file_get", &args, "file_id")?;
        ctx.get(&id_path("/v1/files", id)).await.map(ToolOutput::json)
    }
);

sandbox_tool!(
    FileDeleteTool,
    "sandbox_file_delete",
    "Delete a sandbox file. Deleting a file that no longer exists succeeds.",
    Destructive,
    json!({
        "type": "object",
        "properties": {
            "file_id": { "type": "string", "description": "File id" }
        },
        "required": ["file_id"]
    }),
    |ctx, _call_id, args| {
        let id = required_str("sandbox_file_delete", &args, "file_id")?;
        ctx.delete(&id_path("/v1/files", id))
            .await
            .map(ToolOutput::json)
    }
);
