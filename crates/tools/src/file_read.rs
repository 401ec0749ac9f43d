//! `filesystem.getFileContents` — read a workspace file as UTF-8 text.

use std::sync::Arc;

use async_trait::async_trait;
use rustedcode_core::error::ToolError;
use rustedcode_core::tool::Tool;
use serde_json::{Value, json};

use crate::sandbox::Workspace;

pub const NAME: &str = "filesystem.getFileContents";

pub struct GetFileContentsTool {
    workspace: Arc<Workspace>,
}

impl GetFileContentsTool {
    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Tool for GetFileContentsTool {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Read the full text contents of a file in the workspace."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "minLength": 1,
                    "description": "File path relative to the workspace root"
                }
            },
            "required": ["path"],
            "additionalProperties": false
        })
    }

    fn output_schema(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "path": { "type": "string" },
                "content": { "type": "string" },
                "bytes": { "type": "integer", "minimum": 0 }
            },
            "required": ["path", "content", "bytes"]
        }))
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let path = input["path"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'path' argument".into()))?;

        let resolved = self
            .workspace
            .resolve(path)
            .map_err(|e| e.into_tool_error(NAME))?;

        let metadata = tokio::fs::metadata(&resolved)
            .await
            .map_err(|e| failed(format!("Failed to read '{path}': {e}")))?;
        if !metadata.is_file() {
            return Err(failed(format!("'{path}' is not a file")));
        }
        if metadata.len() > self.workspace.max_file_bytes() {
            return Err(failed(format!(
                "'{path}' is {} bytes, over the {} byte limit",
                metadata.len(),
                self.workspace.max_file_bytes()
            )));
        }

        let content = tokio::fs::read_to_string(&resolved)
            .await
            .map_err(|e| failed(format!("Failed to read '{path}': {e}")))?;

        Ok(json!({
            "path": self.workspace.relative(&resolved),
            "bytes": content.len(),
            "content": content,
        }))
    }
}

fn failed(reason: String) -> ToolError {
    ToolError::ExecutionFailed {
        tool_name: NAME.into(),
        reason,
    }
}
