//! # Runbox Tools
//!
//! The sandbox tool catalog for Runbox: code execution plus session, file and
//! execution management against the remote sandbox API.

#[macro_use]
mod macros;

pub mod registry;
pub mod sandbox;

use registry::{Tool, ToolRegistry};
use runbox_core::config::RunboxConfig;
use runbox_core::error::ToolError;
use sandbox::SandboxContext;
use std::sync::Arc;

/// Register every sandbox tool against one shared context.
pub fn register_sandbox_tools(registry: &mut ToolRegistry, ctx: Arc<SandboxContext>) {
    let tools: Vec<Arc<dyn Tool>> = vec![
        Arc::new(sandbox::execute::ExecuteTool::new(ctx.clone())),
        // Sessions
        Arc::new(sandbox::sessions::SessionCreateTool::new(ctx.clone())),
        Arc::new(sandbox::sessions::SessionListTool::new(ctx.clone())),
        Arc::new(sandbox::sessions::SessionGetTool::new(ctx.clone())),
        Arc::new(sandbox::sessions::SessionDeleteTool::new(ctx.clone())),
        // Files
        Arc::new(sandbox::files::FileUploadTool::new(ctx.clone())),
        Arc::new(sandbox::files::FileListTool::new(ctx.clone())),
        Arc::new(sandbox::files::FileGetTool::new(ctx.clone())),
        Arc::new(sandbox::files::FileDeleteTool::new(ctx.clone())),
        // Executions
        Arc::new(sandbox::executions::ExecutionGetTool::new(ctx.clone())),
        Arc::new(sandbox::executions::ExecutionCancelTool::new(ctx)),
    ];

    for tool in tools {
        if let Err(e) = registry.register(tool) {
            tracing::warn!("Failed to register tool: {}", e);
        }
    }
}

/// Build a registry holding the sandbox catalog for the given configuration.
pub fn sandbox_registry(config: &RunboxConfig) -> Result<ToolRegistry, ToolError> {
    let mut registry = ToolRegistry::new();
    register_sandbox_tools(&mut registry, Arc::new(SandboxContext::from_config(config)?));
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_sandbox_tools() {
        let registry = sandbox_registry(&RunboxConfig::default()).unwrap();
        assert_eq!(registry.list_names().len(), 11);
        assert_eq!(
            registry.list_names(),
            vec![
                "sandbox_execute",
                "sandbox_execution_cancel",
                "sandbox_execution_get",
                "sandbox_file_delete",
                "sandbox_file_get",
                "sandbox_file_list",
                "sandbox_file_upload",
                "sandbox_session_create",
                "sandbox_session_delete",
                "sandbox_session_get",
                "sandbox_session_list",
            ]
        );
    }

    #[test]
    fn test_schemas_are_objects() {
        let registry = sandbox_registry(&RunboxConfig::default()).unwrap();
        for def in registry.list_definitions() {
            assert_eq!(def.parameters["type"], "object", "{}", def.name);
            assert!(!def.description.is_empty());
        }
    }
}
