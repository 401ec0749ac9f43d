//! A Decision Provider that replays queued decisions.
//!
//! Used for tests and demos: each phase has its own queue, consumed in
//! order, with an optional repeating fallback once the queue is empty.
//! The helper functions build raw decisions in the same camelCase shape a
//! model would return.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use rustedcode_core::decision::DecisionProvider;
use rustedcode_core::error::DecisionError;
use rustedcode_core::state::{AgentState, Phase};
use serde_json::{Value, json};

type Scripted = Result<Value, DecisionError>;

#[derive(Default)]
pub struct ScriptedDecisionProvider {
    queues: Mutex<HashMap<Phase, VecDeque<Scripted>>>,
    fallbacks: HashMap<Phase, Value>,
    calls: Mutex<Vec<Phase>>,
    delay: Option<Duration>,
}

impl ScriptedDecisionProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a decision for `phase`.
    pub fn with(self, phase: Phase, decision: Value) -> Self {
        self.push(phase, decision);
        self
    }

    /// Queue a failure for `phase`.
    pub fn with_failure(self, phase: Phase, error: DecisionError) -> Self {
        lock(&self.queues)
            .entry(phase)
            .or_default()
            .push_back(Err(error));
        self
    }

    /// Returned for `phase` whenever its queue is empty.
    pub fn with_fallback(mut self, phase: Phase, decision: Value) -> Self {
        self.fallbacks.insert(phase, decision);
        self
    }

    /// Wait this long before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push(&self, phase: Phase, decision: Value) {
        lock(&self.queues)
            .entry(phase)
            .or_default()
            .push_back(Ok(decision));
    }

    /// Every phase asked so far, in order.
    pub fn calls(&self) -> Vec<Phase> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self, phase: Phase) -> usize {
        lock(&self.calls).iter().filter(|p| **p == phase).count()
    }
}

#[async_trait]
impl DecisionProvider for ScriptedDecisionProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn decide(&self, phase: Phase, _state: &AgentState) -> Result<Value, DecisionError> {
        lock(&self.calls).push(phase);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = lock(&self.queues)
            .get_mut(&phase)
            .and_then(VecDeque::pop_front);
        match next {
            Some(scripted) => scripted,
            None => self.fallbacks.get(&phase).cloned().ok_or_else(|| {
                DecisionError::Malformed(format!("no scripted decision left for {phase}"))
            }),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Raw decision builders ────────────────────────────────────────────────

pub fn analysis(intent: &str, objective: &str) -> Value {
    json!({ "intent": intent, "objective": objective, "entities": [] })
}

pub fn use_tool(tool_name: &str, params: Value) -> Value {
    json!({
        "action": "tool",
        "toolName": tool_name,
        "params": params,
        "reasoning": format!("calling {tool_name}"),
    })
}

pub fn note(content: &str) -> Value {
    json!({ "action": "prompt", "content": content, "reasoning": "thinking it through" })
}

pub fn respond(response: &str) -> Value {
    json!({ "action": "respond", "response": response, "reasoning": "ready to answer" })
}

pub fn reflection(is_successful: bool, needs_correction: bool) -> Value {
    json!({
        "isSuccessful": is_successful,
        "needsCorrection": needs_correction,
        "insights": [],
    })
}

pub fn correction(revised_plan: &str, next_action: Value) -> Value {
    json!({ "revisedPlan": revised_plan, "nextAction": next_action })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn queues_are_per_phase_and_ordered() {
        let provider = ScriptedDecisionProvider::new()
            .with(Phase::Reasoning, note("first"))
            .with(Phase::Reasoning, respond("second"))
            .with(Phase::Reflection, reflection(true, false));
        let state = AgentState::new("c", 3);

        let first = provider.decide(Phase::Reasoning, &state).await.unwrap();
        assert_eq!(first["content"], "first");
        let reflection = provider.decide(Phase::Reflection, &state).await.unwrap();
        assert_eq!(reflection["isSuccessful"], true);
        let second = provider.decide(Phase::Reasoning, &state).await.unwrap();
        assert_eq!(second["response"], "second");

        assert_eq!(provider.call_count(Phase::Reasoning), 2);
        assert_eq!(
            provider.calls(),
            vec![Phase::Reasoning, Phase::Reflection, Phase::Reasoning]
        );
    }

    #[tokio::test]
    async fn fallback_repeats_and_exhaustion_errors() {
        let provider =
            ScriptedDecisionProvider::new().with_fallback(Phase::Reflection, reflection(true, false));
        let state = AgentState::new("c", 3);
        for _ in 0..3 {
            assert!(provider.decide(Phase::Reflection, &state).await.is_ok());
        }
        assert!(matches!(
            provider.decide(Phase::Analysis, &state).await,
            Err(DecisionError::Malformed(_))
        ));
    }
}
