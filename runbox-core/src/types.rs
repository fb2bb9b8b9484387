//! Tool-facing types shared by the core and tools crates.

use serde::{Deserialize, Serialize};

/// A content block returned to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolContent {
    Text { text: String },
}

/// Output produced by a tool execution: `{ content, details }`.
///
/// `content` is what the host shows the model; `details` keeps the raw API result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub content: Vec<ToolContent>,
    #[serde(default)]
    pub details: serde_json::Value,
}

impl ToolOutput {
    /// Create a simple text output with no details.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            details: serde_json::Value::Null,
        }
    }

    /// Wrap a JSON result: pretty-printed as text, kept verbatim in `details`.
    pub fn json(details: serde_json::Value) -> Self {
        let text = match &details {
            serde_json::Value::String(s) => s.clone(),
            other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
        };
        Self {
            content: vec![ToolContent::Text { text }],
            details,
        }
    }

    /// All text blocks joined by newlines.
    pub fn text_content(&self) -> String {
        self.content
            .iter()
            .map(|block| match block {
                ToolContent::Text { text } => text.as_str(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Definition of a tool as advertised to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
    pub risk_level: RiskLevel,
}

/// The risk level of a tool operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// Read-only operations (level 0).
    ReadOnly = 0,
    /// Reversible write operations (level 1).
    Write = 1,
    /// Remote code execution (level 2).
    Execute = 2,
    /// Deletes remote state (level 3).
    Destructive = 3,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::ReadOnly => write!(f, "read-only"),
            RiskLevel::Write => write!(f, "write"),
            RiskLevel::Execute => write!(f, "execute"),
            RiskLevel::Destructive => write!(f, "destructive"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_output_serializes_as_content_and_details() {
        let output = ToolOutput::json(json!({"ok": true}));
        let value = serde_json::to_value(&output).unwrap();
        assert_eq!(value["content"][0]["type"], "text");
        assert_eq!(value["details"], json!({"ok": true}));
        assert!(output.text_content().contains("\"ok\": true"));
    }

    #[test]
    fn test_string_result_is_not_quoted() {
        let output = ToolOutput::json(json!("plain body"));
        assert_eq!(output.text_content(), "plain body");
    }

    #[test]
    fn test_risk_level_ordering() {
        assert!(RiskLevel::ReadOnly < RiskLevel::Write);
        assert!(RiskLevel::Execute < RiskLevel::Destructive);
        assert_eq!(RiskLevel::Destructive.to_string(), "destructive");
    }

    #[test]
    fn test_definition_serializes_risk_level() {
        let def = ToolDefinition {
            name: "sandbox_file_list".into(),
            description: "List files".into(),
            parameters: json!({ "type": "object" }),
            risk_level: RiskLevel::ReadOnly,
        };
        let value = serde_json::to_value(&def).unwrap();
        assert_eq!(value["risk_level"], "read_only");
    }
}
