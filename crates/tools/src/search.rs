//! `search.findText` — plain-text search across workspace files.

use std::sync::Arc;

use async_trait::async_trait;
use rustedcode_core::error::ToolError;
use rustedcode_core::tool::Tool;
use serde_json::{Value, json};

use crate::sandbox::Workspace;

pub const NAME: &str = "search.findText";

const MAX_DEPTH: usize = 16;
const MAX_FILES_SCANNED: usize = 5_000;
/// Matched lines longer than this are cut.
const MAX_LINE_CHARS: usize = 240;

pub struct FindTextTool {
    workspace: Arc<Workspace>,
}

impl FindTextTool {
    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Tool for FindTextTool {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Find lines containing a text query in workspace files. Returns path, 1-based line number and line text."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "minLength": 1 },
                "subdirectory": { "type": "string" },
                "caseSensitive": { "type": "boolean", "default": false }
            },
            "required": ["query"],
            "additionalProperties": false
        })
    }

    fn output_schema(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "matches": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "path": { "type": "string" },
                            "line": { "type": "integer", "minimum": 1 },
                            "text": { "type": "string" }
                        },
                        "required": ["path", "line", "text"]
                    }
                },
                "truncated": { "type": "boolean" }
            },
            "required": ["matches", "truncated"]
        }))
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let query = input["query"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'query' argument".into()))?
            .to_string();
        let case_sensitive = input["caseSensitive"].as_bool().unwrap_or(false);
        let start = match input["subdirectory"].as_str() {
            Some(sub) => self
                .workspace
                .resolve(sub)
                .map_err(|e| e.into_tool_error(NAME))?,
            None => self.workspace.root().to_path_buf(),
        };

        let workspace = self.workspace.clone();
        let (matches, truncated) = tokio::task::spawn_blocking(move || {
            search(&workspace, &start, &query, case_sensitive)
        })
        .await
        .map_err(|e| ToolError::ExecutionFailed {
            tool_name: NAME.into(),
            reason: format!("Search aborted: {e}"),
        })?;

        Ok(json!({ "matches": matches, "truncated": truncated }))
    }
}

fn search(
    workspace: &Workspace,
    start: &std::path::Path,
    query: &str,
    case_sensitive: bool,
) -> (Vec<Value>, bool) {
    let needle = if case_sensitive {
        query.to_string()
    } else {
        query.to_lowercase()
    };
    let limit = workspace.max_search_results();
    let (files, mut truncated) = workspace.walk_files(start, MAX_DEPTH, MAX_FILES_SCANNED);
    let mut matches = Vec::new();

    'files: for file in files {
        let too_big = std::fs::metadata(&file)
            .map(|m| m.len() > workspace.max_file_bytes())
            .unwrap_or(true);
        if too_big {
            continue;
        }
        // Binary and non-UTF-8 files are skipped
        let Ok(content) = std::fs::read_to_string(&file) else {
            continue;
        };
        for (idx, line) in content.lines().enumerate() {
            let hit = if case_sensitive {
                line.contains(&needle)
            } else {
                line.to_lowercase().contains(&needle)
            };
            if !hit {
                continue;
            }
            if matches.len() >= limit {
                truncated = true;
                break 'files;
            }
            matches.push(json!({
                "path": workspace.relative(&file),
                "line": idx + 1,
                "text": line.trim_end().chars().take(MAX_LINE_CHARS).collect::<String>(),
            }));
        }
    }
    (matches, truncated)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup(max_results: usize) -> (tempfile::TempDir, FindTextTool) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(
            dir.path().join("src/lib.rs"),
            "pub fn answer() -> u32 {\n    42\n}\n// TODO: Answer better\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("README.md"), "The answer is 42.\n").unwrap();
        let ws = Workspace::new(dir.path()).with_max_search_results(max_results);
        (dir, FindTextTool::new(Arc::new(ws)))
    }

    #[tokio::test]
    async fn case_insensitive_by_default() {
        let (_dir, tool) = setup(100);
        let result = tool.execute(json!({"query": "answer"})).await.unwrap();
        let matches = result["matches"].as_array().unwrap();
        assert_eq!(matches.len(), 3);
        assert_eq!(matches[0]["path"], "README.md");
        assert_eq!(matches[1]["line"], 1);
        assert_eq!(matches[2]["line"], 4);
    }

    #[tokio::test]
    async fn case_sensitive_search() {
        let (_dir, tool) = setup(100);
        let result = tool
            .execute(json!({"query": "Answer", "caseSensitive": true}))
            .await
            .unwrap();
        let matches = result["matches"].as_array().unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0]["path"], "src/lib.rs");
    }

    #[tokio::test]
    async fn results_are_capped() {
        let (_dir, tool) = setup(1);
        let result = tool.execute(json!({"query": "42"})).await.unwrap();
        assert_eq!(result["matches"].as_array().unwrap().len(), 1);
        assert_eq!(result["truncated"], true);
    }

    #[tokio::test]
    async fn subdirectory_scopes_search() {
        let (_dir, tool) = setup(100);
        let result = tool
            .execute(json!({"query": "42", "subdirectory": "src"}))
            .await
            .unwrap();
        let matches = result["matches"].as_array().unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0]["text"], "    42");
    }
}
