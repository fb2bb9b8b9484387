//! Tool definition macro for the sandbox catalog.
//!
//! # Usage
//!
//! ```rust,ignore
//! sandbox_tool!(
//!     SessionGetTool,
//!     "sandbox_session_get",
//!     "Fetch one sandbox session.",
//!     ReadOnly,
//!     serde_json::json!({
//!         "type": "object",
//!         "properties": { "session_id": { "type": "string" } },
//!         "required": ["session_id"]
//!     }),
//!     |ctx, _call_id, args| {
//!         let id = required_str("sandbox_session_get", &args, "session_id")?;
//!         ctx.get(&id_path("/v1/sessions", id)).await.map(ToolOutput::json)
//!     }
//! );
//! ```

/// Define a tool backed by a shared [`SandboxContext`](crate::sandbox::SandboxContext).
///
/// Generates:
/// - `pub struct $name { ctx: Arc<SandboxContext> }` with a `new(ctx)` constructor
/// - `#[async_trait]` impl of `crate::registry::Tool`
///
/// The body runs inside the async `execute` with `$ctx: &SandboxContext`,
/// `$call_id: &str` and `$args: serde_json::Value` in scope, and must return
/// `Result<ToolOutput, ToolError>`.
#[macro_export]
macro_rules! sandbox_tool {
    (
        $name:ident,
        $tool_name:expr,
        $desc:expr,
        $risk:ident,
        $schema:expr,
        |$ctx:ident, $call_id:ident, $args:ident| $body:expr
    ) => {
        pub struct $name {
            ctx: std::sync::Arc<$crate::sandbox::SandboxContext>,
        }

        impl $name {
            pub fn new(ctx: std::sync::Arc<$crate::sandbox::SandboxContext>) -> Self {
                Self { ctx }
            }
        }

        #[async_trait::async_trait]
        impl $crate::registry::Tool for $name {
            fn name(&self) -> &str {
                $tool_name
            }

            fn description(&self) -> &str {
                $desc
            }

            fn parameters_schema(&self) -> serde_json::Value {
                $schema
            }

            fn risk_level(&self) -> runbox_core::types::RiskLevel {
                runbox_core::types::RiskLevel::$risk
            }

            async fn execute(
                &self,
                $call_id: &str,
                $args: serde_json::Value,
            ) -> Result<runbox_core::types::ToolOutput, runbox_core::error::ToolError> {
                let $ctx: &$crate::sandbox::SandboxContext = &self.ctx;
                $body
            }
        }
    };
}
