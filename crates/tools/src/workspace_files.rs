//! `filesystem.getWorkspaceFiles` — list files under the workspace root.

use std::sync::Arc;

use async_trait::async_trait;
use rustedcode_core::error::ToolError;
use rustedcode_core::tool::Tool;
use serde_json::{Value, json};

use crate::sandbox::Workspace;

pub const NAME: &str = "filesystem.getWorkspaceFiles";

/// Upper bound on listed files.
const MAX_FILES: usize = 2_000;

pub struct GetWorkspaceFilesTool {
    workspace: Arc<Workspace>,
}

impl GetWorkspaceFilesTool {
    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Tool for GetWorkspaceFilesTool {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "List the files in the workspace (or a subdirectory), skipping VCS and build directories."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "subdirectory": {
                    "type": "string",
                    "description": "Only list files under this workspace-relative directory"
                },
                "maxDepth": {
                    "type": "integer",
                    "minimum": 0,
                    "maximum": 64,
                    "default": 8
                }
            },
            "additionalProperties": false
        })
    }

    fn output_schema(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "root": { "type": "string" },
                "files": { "type": "array", "items": { "type": "string" } },
                "truncated": { "type": "boolean" }
            },
            "required": ["root", "files", "truncated"]
        }))
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let start = match input["subdirectory"].as_str() {
            Some(sub) => self
                .workspace
                .resolve(sub)
                .map_err(|e| e.into_tool_error(NAME))?,
            None => self.workspace.root().to_path_buf(),
        };
        if !start.is_dir() {
            return Err(ToolError::ExecutionFailed {
                tool_name: NAME.into(),
                reason: format!("'{}' is not a directory", self.workspace.relative(&start)),
            });
        }
        let max_depth = input["maxDepth"].as_u64().unwrap_or(8) as usize;

        let workspace = self.workspace.clone();
        let (files, truncated) = tokio::task::spawn_blocking(move || {
            let (paths, truncated) = workspace.walk_files(&start, max_depth, MAX_FILES);
            let files: Vec<String> = paths.iter().map(|p| workspace.relative(p)).collect();
            (files, truncated)
        })
        .await
        .map_err(|e| ToolError::ExecutionFailed {
            tool_name: NAME.into(),
            reason: format!("Workspace walk aborted: {e}"),
        })?;

        Ok(json!({
            "root": self.workspace.root().to_string_lossy(),
            "files": files,
            "truncated": truncated,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (tempfile::TempDir, GetWorkspaceFilesTool) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src/bin")).unwrap();
        std::fs::write(dir.path().join("Cargo.toml"), "[package]\nname = \"demo\"\n").unwrap();
        std::fs::write(dir.path().join("src/lib.rs"), "").unwrap();
        std::fs::write(dir.path().join("src/bin/cli.rs"), "").unwrap();
        let tool = GetWorkspaceFilesTool::new(Arc::new(Workspace::new(dir.path())));
        (dir, tool)
    }

    #[tokio::test]
    async fn lists_all_files_sorted() {
        let (_dir, tool) = setup();
        let result = tool.execute(json!({})).await.unwrap();
        assert_eq!(
            result["files"],
            json!(["Cargo.toml", "src/bin/cli.rs", "src/lib.rs"])
        );
        assert_eq!(result["truncated"], false);
    }

    #[tokio::test]
    async fn subdirectory_and_depth() {
        let (_dir, tool) = setup();
        let result = tool
            .execute(json!({"subdirectory": "src", "maxDepth": 0}))
            .await
            .unwrap();
        assert_eq!(result["files"], json!(["src/lib.rs"]));
    }

    #[tokio::test]
    async fn subdirectory_must_exist() {
        let (_dir, tool) = setup();
        let err = tool
            .execute(json!({"subdirectory": "nope"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not a directory"));
    }
}
