//! `editor.applyEdit` — search-and-replace edit of a workspace file.
//!
//! The search text must occur exactly once unless `replaceAll` is set, so
//! an ambiguous edit fails instead of touching the wrong spot.

use std::sync::Arc;

use async_trait::async_trait;
use rustedcode_core::error::ToolError;
use rustedcode_core::tool::Tool;
use serde_json::{Value, json};

use crate::sandbox::Workspace;

pub const NAME: &str = "editor.applyEdit";

pub struct ApplyEditTool {
    workspace: Arc<Workspace>,
}

impl ApplyEditTool {
    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Tool for ApplyEditTool {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Replace an exact text fragment in a workspace file. The fragment must be unique unless replaceAll is true."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "minLength": 1 },
                "search": { "type": "string", "minLength": 1 },
                "replace": { "type": "string" },
                "replaceAll": { "type": "boolean", "default": false }
            },
            "required": ["path", "search", "replace"],
            "additionalProperties": false
        })
    }

    fn output_schema(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "path": { "type": "string" },
                "replacements": { "type": "integer", "minimum": 1 }
            },
            "required": ["path", "replacements"]
        }))
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let path = input["path"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'path' argument".into()))?;
        let search = input["search"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'search' argument".into()))?;
        let replace = input["replace"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'replace' argument".into()))?;
        let replace_all = input["replaceAll"].as_bool().unwrap_or(false);

        let resolved = self
            .workspace
            .resolve(path)
            .map_err(|e| e.into_tool_error(NAME))?;
        let original = tokio::fs::read_to_string(&resolved)
            .await
            .map_err(|e| failed(format!("Failed to read '{path}': {e}")))?;

        let occurrences = original.matches(search).count();
        if occurrences == 0 {
            return Err(failed(format!("Search text not found in '{path}'")));
        }
        if occurrences > 1 && !replace_all {
            return Err(failed(format!(
                "Search text occurs {occurrences} times in '{path}'; make it unique or set replaceAll"
            )));
        }

        let (updated, replacements) = if replace_all {
            (original.replace(search, replace), occurrences)
        } else {
            (original.replacen(search, replace, 1), 1)
        };
        tokio::fs::write(&resolved, updated)
            .await
            .map_err(|e| failed(format!("Failed to write '{path}': {e}")))?;

        tracing::debug!(path = %path, replacements, "Edit applied");
        Ok(json!({
            "path": self.workspace.relative(&resolved),
            "replacements": replacements,
        }))
    }
}

fn failed(reason: String) -> ToolError {
    ToolError::ExecutionFailed {
        tool_name: NAME.into(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup(content: &str) -> (tempfile::TempDir, ApplyEditTool) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("main.rs"), content).unwrap();
        let tool = ApplyEditTool::new(Arc::new(Workspace::new(dir.path())));
        (dir, tool)
    }

    #[tokio::test]
    async fn unique_replacement() {
        let (dir, tool) = setup("fn main() {\n    println!(\"hi\");\n}\n");
        let result = tool
            .execute(json!({"path": "main.rs", "search": "\"hi\"", "replace": "\"hello\""}))
            .await
            .unwrap();
        assert_eq!(result["replacements"], 1);
        let content = std::fs::read_to_string(dir.path().join("main.rs")).unwrap();
        assert!(content.contains("\"hello\""));
    }

    #[tokio::test]
    async fn ambiguous_edit_rejected() {
        let (dir, tool) = setup("a a a");
        let err = tool
            .execute(json!({"path": "main.rs", "search": "a", "replace": "b"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("3 times"));
        assert_eq!(std::fs::read_to_string(dir.path().join("main.rs")).unwrap(), "a a a");
    }

    #[tokio::test]
    async fn replace_all() {
        let (dir, tool) = setup("a a a");
        let result = tool
            .execute(json!({"path": "main.rs", "search": "a", "replace": "b", "replaceAll": true}))
            .await
            .unwrap();
        assert_eq!(result["replacements"], 3);
        assert_eq!(std::fs::read_to_string(dir.path().join("main.rs")).unwrap(), "b b b");
    }

    #[tokio::test]
    async fn missing_search_text() {
        let (_dir, tool) = setup("abc");
        let err = tool
            .execute(json!({"path": "main.rs", "search": "xyz", "replace": ""}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
