//! Workspace sandbox — every filesystem tool resolves paths through here.
//!
//! Paths are taken relative to the workspace root. Traversal (`..`) is
//! rejected outright, the resolved path must stay under the root after
//! symlinks are followed, and forbidden prefixes (e.g. `~/.ssh`) are blocked
//! even when they sit inside the root.

use std::path::{Component, Path, PathBuf};

use rustedcode_config::ToolsConfig;
use rustedcode_core::error::ToolError;

/// Directory names never descended into when walking the workspace.
const SKIPPED_DIRS: &[&str] = &[".git", "target", "node_modules", ".hg", ".svn", "__pycache__"];

/// Error returned when path validation fails.
#[derive(Debug, thiserror::Error)]
pub enum PathValidationError {
    #[error("Path '{path}' is outside the workspace root")]
    OutsideWorkspace { path: String },

    #[error("Path '{path}' matches forbidden pattern '{pattern}'")]
    ForbiddenPath { path: String, pattern: String },

    #[error("Path traversal detected in '{path}'")]
    PathTraversal { path: String },

    #[error("Failed to canonicalize path '{path}': {reason}")]
    CanonicalizeFailed { path: String, reason: String },
}

impl PathValidationError {
    pub fn into_tool_error(self, tool_name: &str) -> ToolError {
        ToolError::PermissionDenied {
            tool_name: tool_name.to_string(),
            reason: self.to_string(),
        }
    }
}

/// The sandboxed workspace shared by the built-in tools.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    forbidden_paths: Vec<String>,
    max_file_bytes: u64,
    max_search_results: usize,
}

impl Workspace {
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            root: root.canonicalize().unwrap_or_else(|_| root.to_path_buf()),
            forbidden_paths: Vec::new(),
            max_file_bytes: 1024 * 1024,
            max_search_results: 200,
        }
    }

    pub fn from_config(config: &ToolsConfig) -> Self {
        let mut workspace = Self::new(config.resolved_workspace_root());
        workspace.forbidden_paths = config.forbidden_paths.clone();
        workspace.max_file_bytes = config.max_file_bytes;
        workspace.max_search_results = config.max_search_results;
        workspace
    }

    pub fn with_forbidden_paths(mut self, forbidden: Vec<String>) -> Self {
        self.forbidden_paths = forbidden;
        self
    }

    pub fn with_max_file_bytes(mut self, max: u64) -> Self {
        self.max_file_bytes = max;
        self
    }

    pub fn with_max_search_results(mut self, max: usize) -> Self {
        self.max_search_results = max;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn max_file_bytes(&self) -> u64 {
        self.max_file_bytes
    }

    pub fn max_search_results(&self) -> usize {
        self.max_search_results
    }

    /// Resolve a workspace-relative (or absolute, in-root) path.
    ///
    /// The deepest existing ancestor is canonicalized and the missing tail
    /// re-appended, so symlinks anywhere along the path are followed before
    /// the root check.
    pub fn resolve(&self, path: &str) -> Result<PathBuf, PathValidationError> {
        let raw = Path::new(path);
        if raw.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(PathValidationError::PathTraversal { path: path.into() });
        }

        let joined = if raw.is_absolute() {
            raw.to_path_buf()
        } else {
            self.root.join(raw)
        };

        let mut existing = joined.as_path();
        let mut missing = Vec::new();
        while !existing.exists() {
            // A dangling symlink points somewhere we cannot check
            if existing.symlink_metadata().is_ok() {
                return Err(PathValidationError::OutsideWorkspace { path: path.into() });
            }
            match (existing.parent(), existing.file_name()) {
                (Some(parent), Some(name)) => {
                    missing.push(name.to_os_string());
                    existing = parent;
                }
                _ => return Err(PathValidationError::OutsideWorkspace { path: path.into() }),
            }
        }
        let mut canonical =
            existing
                .canonicalize()
                .map_err(|e| PathValidationError::CanonicalizeFailed {
                    path: path.into(),
                    reason: e.to_string(),
                })?;
        for name in missing.iter().rev() {
            canonical.push(name);
        }

        if !canonical.starts_with(&self.root) {
            return Err(PathValidationError::OutsideWorkspace { path: path.into() });
        }

        let canonical_str = normalize(&canonical.to_string_lossy());
        for forbidden in &self.forbidden_paths {
            let pattern = normalize(&expand_tilde(forbidden));
            if canonical_str.starts_with(&pattern) {
                return Err(PathValidationError::ForbiddenPath {
                    path: path.into(),
                    pattern: forbidden.clone(),
                });
            }
        }

        Ok(canonical)
    }

    /// Display form of an in-workspace path: relative, forward slashes.
    pub fn relative(&self, path: &Path) -> String {
        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        rel.to_string_lossy().replace('\\', "/")
    }

    /// Collect regular files under `start`, depth-first and sorted.
    ///
    /// Returns the files and whether `limit` cut the walk short.
    pub fn walk_files(&self, start: &Path, max_depth: usize, limit: usize) -> (Vec<PathBuf>, bool) {
        let mut files = Vec::new();
        let truncated = walk(start, 0, max_depth, limit, &mut files);
        (files, truncated)
    }
}

fn walk(dir: &Path, depth: usize, max_depth: usize, limit: usize, out: &mut Vec<PathBuf>) -> bool {
    let Ok(entries) = std::fs::read_dir(dir) else {
        tracing::debug!(dir = %dir.display(), "Skipping unreadable directory");
        return false;
    };
    let mut entries: Vec<_> = entries.filter_map(|e| e.ok()).collect();
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        let path = entry.path();
        if file_type.is_dir() {
            let name = entry.file_name();
            if SKIPPED_DIRS.iter().any(|s| name == *s) || depth + 1 > max_depth {
                continue;
            }
            if walk(&path, depth + 1, max_depth, limit, out) {
                return true;
            }
        } else if file_type.is_file() {
            if out.len() >= limit {
                return true;
            }
            out.push(path);
        }
    }
    false
}

fn normalize(path: &str) -> String {
    path.replace('\\', "/").to_lowercase()
}

/// Expand ~ to the user's home directory.
fn expand_tilde(path: &str) -> String {
    if (path.starts_with("~/") || path == "~")
        && let Some(home) = home_dir()
    {
        return path.replacen('~', &home, 1);
    }
    path.to_string()
}

fn home_dir() -> Option<String> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE").ok()
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME").ok()
    }
}
