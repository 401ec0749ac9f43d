//! Built-in tool implementations for RustedCode.
//!
//! Tools give the agent the ability to work on a codebase: read and write
//! files, list the workspace, search text, apply edits and inspect the
//! project. Every path goes through the [`Workspace`] sandbox.

pub mod edit;
pub mod file_read;
pub mod file_write;
pub mod project;
pub mod sandbox;
pub mod search;
pub mod workspace_files;

use std::sync::Arc;

use rustedcode_config::ToolsConfig;
use rustedcode_core::tool::ToolRegistry;

pub use sandbox::{PathValidationError, Workspace};

/// Create a tool registry with all built-in tools rooted at the configured
/// workspace.
pub fn default_registry(config: &ToolsConfig) -> ToolRegistry {
    registry_for(Arc::new(Workspace::from_config(config)))
}

/// Create a tool registry with all built-in tools sharing `workspace`.
pub fn registry_for(workspace: Arc<Workspace>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(file_read::GetFileContentsTool::new(workspace.clone())));
    registry.register(Arc::new(file_write::WriteFileTool::new(workspace.clone())));
    registry.register(Arc::new(workspace_files::GetWorkspaceFilesTool::new(
        workspace.clone(),
    )));
    registry.register(Arc::new(search::FindTextTool::new(workspace.clone())));
    registry.register(Arc::new(edit::ApplyEditTool::new(workspace.clone())));
    registry.register(Arc::new(project::ProjectMetadataTool::new(workspace)));
    tracing::debug!(tools = registry.len(), "Built-in tools registered");
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_has_all_tools() {
        let dir = tempfile::tempdir().unwrap();
        let config = ToolsConfig {
            workspace_root: dir.path().to_string_lossy().into_owned(),
            ..ToolsConfig::default()
        };
        let registry = default_registry(&config);
        assert_eq!(
            registry.names(),
            vec![
                "editor.applyEdit",
                "filesystem.getFileContents",
                "filesystem.getWorkspaceFiles",
                "filesystem.writeFile",
                "project.getMetadata",
                "search.findText",
            ]
        );
    }

    #[test]
    fn every_tool_declares_an_object_input_schema() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_for(Arc::new(Workspace::new(dir.path())));
        for def in registry.definitions() {
            assert_eq!(def.input_schema["type"], "object", "{}", def.name);
            assert!(!def.description.is_empty());
        }
    }
}
