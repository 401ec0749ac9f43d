//! `filesystem.writeFile` — create or overwrite a workspace file.

use std::sync::Arc;

use async_trait::async_trait;
use rustedcode_core::error::ToolError;
use rustedcode_core::tool::Tool;
use serde_json::{Value, json};

use crate::sandbox::Workspace;

pub const NAME: &str = "filesystem.writeFile";

pub struct WriteFileTool {
    workspace: Arc<Workspace>,
}

impl WriteFileTool {
    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Write content to a workspace file. Creates the file if it doesn't exist, overwrites if it does."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "minLength": 1,
                    "description": "File path relative to the workspace root"
                },
                "content": {
                    "type": "string",
                    "description": "The full new contents of the file"
                },
                "createDirs": {
                    "type": "boolean",
                    "default": false,
                    "description": "Create missing parent directories"
                }
            },
            "required": ["path", "content"],
            "additionalProperties": false
        })
    }

    fn output_schema(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "path": { "type": "string" },
                "bytesWritten": { "type": "integer", "minimum": 0 }
            },
            "required": ["path", "bytesWritten"]
        }))
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let path = input["path"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'path' argument".into()))?;
        let content = input["content"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'content' argument".into()))?;
        let create_dirs = input["createDirs"].as_bool().unwrap_or(false);

        let resolved = self
            .workspace
            .resolve(path)
            .map_err(|e| e.into_tool_error(NAME))?;

        if let Some(parent) = resolved.parent()
            && !parent.exists()
        {
            if !create_dirs {
                return Err(failed(format!(
                    "Parent directory of '{path}' does not exist (set createDirs to create it)"
                )));
            }
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| failed(format!("Failed to create directories for '{path}': {e}")))?;
        }

        // The directories now exist; check the real location again before writing
        let resolved = self
            .workspace
            .resolve(path)
            .map_err(|e| e.into_tool_error(NAME))?;

        tokio::fs::write(&resolved, content)
            .await
            .map_err(|e| failed(format!("Failed to write '{path}': {e}")))?;

        tracing::debug!(path = %path, bytes = content.len(), "File written");
        Ok(json!({
            "path": self.workspace.relative(&resolved),
            "bytesWritten": content.len(),
        }))
    }
}

fn failed(reason: String) -> ToolError {
    ToolError::ExecutionFailed {
        tool_name: NAME.into(),
        reason,
    }
}
