//! The agent loop for RustedCode.
//!
//! A turn follows an **Analyze → Reason → Act → Reflect (→ Correct)** cycle:
//!
//! 1. **Analyze** the user message once (intent, objective, entities)
//! 2. **Reason** about the single next action
//! 3. **Act**: run a tool through the [`ToolExecutor`], or note/respond
//! 4. **Reflect** on the outcome; optionally **Correct** the plan
//! 5. Loop until a successful `respond` or the iteration ceiling
//!
//! Every phase is traced, validated and published on the event bus.

pub mod executor;
pub mod model_decider;
pub mod orchestrator;
pub mod prompts;
pub mod response;
pub mod scripted;
pub mod store;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use executor::ToolExecutor;
pub use model_decider::ModelDecisionProvider;
pub use orchestrator::{
    Orchestrator, OrchestratorConfig, OrchestratorDeps, TurnOutcome, TurnRequest,
};
pub use response::compose_response;
pub use scripted::ScriptedDecisionProvider;
pub use store::{FileStateStore, InMemoryStateStore};
