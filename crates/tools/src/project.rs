//! `project.getMetadata` — detect the project kind from its manifests.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use rustedcode_core::error::ToolError;
use rustedcode_core::tool::Tool;
use serde_json::{Value, json};

use crate::sandbox::Workspace;

pub const NAME: &str = "project.getMetadata";

/// Known manifests and the project kind they indicate, in priority order.
const MANIFESTS: &[(&str, &str)] = &[
    ("Cargo.toml", "rust"),
    ("package.json", "node"),
    ("pyproject.toml", "python"),
    ("setup.py", "python"),
    ("go.mod", "go"),
    ("pom.xml", "java"),
    ("build.gradle", "java"),
    ("build.gradle.kts", "kotlin"),
];

pub struct ProjectMetadataTool {
    workspace: Arc<Workspace>,
}

impl ProjectMetadataTool {
    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Tool for ProjectMetadataTool {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Describe the workspace project: its kind (rust, node, python, ...), name and manifest files."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {},
            "additionalProperties": false
        })
    }

    fn output_schema(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "root": { "type": "string" },
                "name": { "type": ["string", "null"] },
                "kind": { "type": "string" },
                "manifests": { "type": "array", "items": { "type": "string" } }
            },
            "required": ["root", "kind", "manifests"]
        }))
    }

    async fn execute(&self, _input: Value) -> Result<Value, ToolError> {
        let root = self.workspace.root();
        let manifests: Vec<&str> = MANIFESTS
            .iter()
            .map(|(file, _)| *file)
            .filter(|file| root.join(file).is_file())
            .collect();

        let kind = MANIFESTS
            .iter()
            .find(|(file, _)| manifests.contains(file))
            .map(|(_, kind)| *kind)
            .unwrap_or("unknown");

        let name = project_name(root, kind).await.or_else(|| {
            root.file_name()
                .map(|n| n.to_string_lossy().into_owned())
        });

        Ok(json!({
            "root": root.to_string_lossy(),
            "name": name,
            "kind": kind,
            "manifests": manifests,
        }))
    }
}

async fn project_name(root: &Path, kind: &str) -> Option<String> {
    match kind {
        "rust" => {
            let text = tokio::fs::read_to_string(root.join("Cargo.toml")).await.ok()?;
            let manifest: toml::Value = toml::from_str(&text).ok()?;
            manifest
                .get("package")
                .and_then(|p| p.get("name"))
                .and_then(|n| n.as_str())
                .map(String::from)
        }
        "node" => {
            let text = tokio::fs::read_to_string(root.join("package.json")).await.ok()?;
            let manifest: Value = serde_json::from_str(&text).ok()?;
            manifest["name"].as_str().map(String::from)
        }
        "python" => {
            let text = tokio::fs::read_to_string(root.join("pyproject.toml")).await.ok()?;
            let manifest: toml::Value = toml::from_str(&text).ok()?;
            manifest
                .get("project")
                .and_then(|p| p.get("name"))
                .and_then(|n| n.as_str())
                .map(String::from)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn detects_rust_project() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("Cargo.toml"),
            "[package]\nname = \"demo-crate\"\nversion = \"0.1.0\"\n",
        )
        .unwrap();
        let tool = ProjectMetadataTool::new(Arc::new(Workspace::new(dir.path())));
        let result = tool.execute(json!({})).await.unwrap();
        assert_eq!(result["kind"], "rust");
        assert_eq!(result["name"], "demo-crate");
        assert_eq!(result["manifests"], json!(["Cargo.toml"]));
    }

    #[tokio::test]
    async fn detects_node_project() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("package.json"), r#"{"name": "web-app"}"#).unwrap();
        let tool = ProjectMetadataTool::new(Arc::new(Workspace::new(dir.path())));
        let result = tool.execute(json!({})).await.unwrap();
        assert_eq!(result["kind"], "node");
        assert_eq!(result["name"], "web-app");
    }

    #[tokio::test]
    async fn unknown_project_falls_back_to_dir_name() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ProjectMetadataTool::new(Arc::new(Workspace::new(dir.path())));
        let result = tool.execute(json!({})).await.unwrap();
        assert_eq!(result["kind"], "unknown");
        assert!(result["name"].is_string());
        assert_eq!(result["manifests"], json!([]));
    }
}
