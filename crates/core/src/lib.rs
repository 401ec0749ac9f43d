//! # RustedCode Core
//!
//! Domain types, traits, and error definitions for the RustedCode
//! coding-assistant agent. This crate has **no runtime dependencies beyond
//! tokio's sync primitives** — it defines the domain model that all other
//! crates implement against.
//!
//! ## Design Philosophy
//!
//! Every collaborator of the agent loop is defined as a trait or a plain
//! component here. Implementations live in their respective crates. This enables:
//! - Swapping implementations via configuration (model-backed or scripted decisions)
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)
//!
//! Nothing in this crate is a process-wide singleton: the event bus, schema
//! validator and tool registry are values that the host constructs once and
//! hands to the orchestrator.

pub mod decision;
pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod schema;
pub mod state;
pub mod store;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use decision::{
    AnalysisDecision, CorrectionDecision, Decision, DecisionProvider, PlannedAction,
    ReasoningDecision, ReflectionDecision,
};
pub use error::{
    DecisionError, Error, ErrorCategory, ExecutionError, ExecutionFailure, ProviderError, Result,
    SchemaError, StoreError, ToolError,
};
pub use event::{AgentEvent, EventBus, EventKind, EventSubscription};
pub use message::{Message, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, Usage};
pub use schema::{FieldViolation, SchemaValidator, ValidationError};
pub use state::{
    ActionOutcome, AgentState, CompletionStatus, ConversationTurn, HistoryEntry, Phase,
    ToolExecutionRecord, TurnContext,
};
pub use store::StateStore;
pub use tool::{Tool, ToolDefinition, ToolRegistry};
