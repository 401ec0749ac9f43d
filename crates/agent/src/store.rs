//! Conversation state stores.
//!
//! - `InMemoryStateStore` — process-local, the default
//! - `FileStateStore` — one pretty JSON file per conversation

use std::collections::HashMap;
use std::fmt::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rustedcode_core::error::StoreError;
use rustedcode_core::state::AgentState;
use rustedcode_core::store::StateStore;
use tokio::sync::RwLock;
use tracing::{debug, warn};

#[derive(Default)]
pub struct InMemoryStateStore {
    states: RwLock<HashMap<String, AgentState>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.states.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.states.read().await.is_empty()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn load(&self, conversation_id: &str) -> Result<Option<AgentState>, StoreError> {
        Ok(self.states.read().await.get(conversation_id).cloned())
    }

    async fn save(&self, state: &AgentState) -> Result<(), StoreError> {
        self.states
            .write()
            .await
            .insert(state.conversation_id().to_string(), state.clone());
        Ok(())
    }

    async fn delete(&self, conversation_id: &str) -> Result<bool, StoreError> {
        Ok(self.states.write().await.remove(conversation_id).is_some())
    }

    async fn list(&self) -> Result<Vec<String>, StoreError> {
        let mut ids: Vec<String> = self.states.read().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

/// Stores each conversation as `<dir>/<id>.json`.
///
/// Writes go to a temp file first and are renamed into place, so a crash
/// never leaves a half-written state behind.
pub struct FileStateStore {
    dir: PathBuf,
}

impl FileStateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, conversation_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(conversation_id)))
    }

    async fn read_state(&self, path: &Path, conversation_id: &str) -> Result<Option<AgentState>, StoreError> {
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::Storage(format!("{}: {e}", path.display()))),
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| StoreError::Corrupted {
                conversation_id: conversation_id.to_string(),
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn load(&self, conversation_id: &str) -> Result<Option<AgentState>, StoreError> {
        let state = self
            .read_state(&self.path_for(conversation_id), conversation_id)
            .await?;
        match state {
            Some(state) if state.conversation_id() != conversation_id => {
                Err(StoreError::Corrupted {
                    conversation_id: conversation_id.to_string(),
                    reason: format!("file holds conversation '{}'", state.conversation_id()),
                })
            }
            other => Ok(other),
        }
    }

    async fn save(&self, state: &AgentState) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| StoreError::Storage(format!("{}: {e}", self.dir.display())))?;

        let json = serde_json::to_string_pretty(state)
            .map_err(|e| StoreError::Storage(format!("serialize: {e}")))?;
        let path = self.path_for(state.conversation_id());
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| StoreError::Storage(format!("{}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| StoreError::Storage(format!("{}: {e}", path.display())))?;

        debug!(conversation_id = %state.conversation_id(), path = %path.display(), "State saved");
        Ok(())
    }

    async fn delete(&self, conversation_id: &str) -> Result<bool, StoreError> {
        match tokio::fs::remove_file(self.path_for(conversation_id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::Storage(e.to_string())),
        }
    }

    async fn list(&self) -> Result<Vec<String>, StoreError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::Storage(e.to_string())),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::Storage(e.to_string()))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            match self.read_state(&path, &stem).await {
                Ok(Some(state)) => ids.push(state.conversation_id().to_string()),
                Ok(None) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable state file"),
            }
        }
        ids.sort();
        Ok(ids)
    }
}

/// Conversation ids come from users; keep file names tame.
///
/// ASCII letters, digits and `-` pass through; every other byte becomes
/// `_xx` (hex). `_` only ever starts an escape, so distinct ids never share
/// a file.
fn file_stem(conversation_id: &str) -> String {
    let mut stem = String::with_capacity(conversation_id.len());
    for byte in conversation_id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            stem.push(byte as char);
        } else {
            let _ = write!(stem, "_{byte:02x}");
        }
    }
    stem
}
