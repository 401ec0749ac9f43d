//! StateStore trait — persistence of per-conversation agent state.
//!
//! The orchestrator loads a conversation's state at the start of a turn and
//! saves the final snapshot at the end. Implementations: in-memory (default,
//! and for testing) and JSON files on disk.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::state::AgentState;

#[async_trait]
pub trait StateStore: Send + Sync {
    /// The backend name (e.g., "memory", "file").
    fn name(&self) -> &str;

    /// Load a conversation's last saved state.
    async fn load(&self, conversation_id: &str) -> std::result::Result<Option<AgentState>, StoreError>;

    /// Persist a snapshot, replacing any previous one.
    async fn save(&self, state: &AgentState) -> std::result::Result<(), StoreError>;

    /// Delete a conversation. Returns whether anything was removed.
    async fn delete(&self, conversation_id: &str) -> std::result::Result<bool, StoreError>;

    /// List stored conversation ids, sorted.
    async fn list(&self) -> std::result::Result<Vec<String>, StoreError>;
}
