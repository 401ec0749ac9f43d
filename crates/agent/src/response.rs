//! Final response composition.
//!
//! The answer is derived from the turn's history log and terminal status
//! only. Raw error payloads never reach the user; the trace keeps those.

use rustedcode_core::state::{AgentState, CompletionStatus, HistoryEntry, Phase};

/// Compose the user-facing reply for a finished turn.
pub fn compose_response(state: &AgentState) -> String {
    let history = state.history();
    match state.completion_status() {
        CompletionStatus::Cancelled => cancelled(history),
        CompletionStatus::Failed => failed(history),
        CompletionStatus::Completed if state.iteration_exhausted() => {
            exhausted(history, state.max_iterations())
        }
        CompletionStatus::Completed => last_response(history)
            .map(str::to_string)
            .unwrap_or_else(|| "Done.".to_string()),
        CompletionStatus::InProgress => {
            "I'm still working on this request.".to_string()
        }
    }
}

/// Text of the most recent successful `respond` action.
fn last_response(history: &[HistoryEntry]) -> Option<&str> {
    history
        .iter()
        .rev()
        .filter(|e| e.phase == Phase::Action && e.success && e.data["kind"] == "respond")
        .find_map(|e| e.data["response"].as_str())
        .filter(|text| !text.trim().is_empty())
}

fn cancelled(history: &[HistoryEntry]) -> String {
    let mut text = String::from("The request was cancelled before it finished.");
    let done = tool_summary(history);
    if !done.is_empty() {
        text.push_str(" Steps completed before cancelling:\n");
        text.push_str(&done.join("\n"));
        text.push_str("\nChanges already made by these steps were not rolled back.");
    }
    text
}

fn failed(history: &[HistoryEntry]) -> String {
    let stage = history
        .iter()
        .rev()
        .find(|e| !e.success && e.phase != Phase::Action)
        .map(|e| phase_words(e.phase))
        .unwrap_or("processing your request");
    format!(
        "Sorry, something went wrong while {stage}, so I couldn't finish this request. \
         Please try again or rephrase it."
    )
}

fn exhausted(history: &[HistoryEntry], max_iterations: u32) -> String {
    let mut text = format!(
        "I reached the limit of {max_iterations} reasoning steps before fully finishing, \
         so this answer is best-effort."
    );
    if let Some(answer) = history
        .iter()
        .rev()
        .filter(|e| e.phase == Phase::Action && e.data["kind"] == "respond")
        .find_map(|e| e.data["response"].as_str())
    {
        text.push_str("\n\n");
        text.push_str(answer);
    }
    let done = tool_summary(history);
    if !done.is_empty() {
        text.push_str("\n\nWhat I did:\n");
        text.push_str(&done.join("\n"));
    }
    text
}

/// One line per tool call, in order.
fn tool_summary(history: &[HistoryEntry]) -> Vec<String> {
    history
        .iter()
        .filter(|e| e.phase == Phase::Action && e.data["kind"] == "tool")
        .map(|e| {
            let name = e.data["tool_name"].as_str().unwrap_or("tool");
            let outcome = if e.success { "succeeded" } else { "failed" };
            format!("- {name} ({outcome})")
        })
        .collect()
}

fn phase_words(phase: Phase) -> &'static str {
    match phase {
        Phase::Analysis => "understanding your request",
        Phase::Reasoning => "planning the next step",
        Phase::Action => "carrying out an action",
        Phase::Reflection => "checking the result",
        Phase::Correction => "revising the plan",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustedcode_core::state::{ActionOutcome, ToolExecutionRecord, TurnContext};
    use serde_json::json;

    fn base() -> AgentState {
        AgentState::new("c", 3).begin_turn("hello", TurnContext::default(), 3)
    }

    fn tool_entry(state: AgentState, name: &str, ok: bool) -> AgentState {
        let record = if ok {
            ToolExecutionRecord::succeeded(name, json!({}), json!({}), 1)
        } else {
            ToolExecutionRecord::failed(
                name,
                json!({}),
                "boom",
                rustedcode_core::ErrorCategory::Execution,
                1,
            )
        };
        let outcome = ActionOutcome::Tool(record);
        let data = serde_json::to_value(&outcome).unwrap();
        state.record(Phase::Action, data, ok)
    }

    #[test]
    fn completed_uses_last_respond() {
        let state = base()
            .record(Phase::Action, json!({ "kind": "respond", "response": "first" }), true)
            .record(Phase::Action, json!({ "kind": "respond", "response": "final" }), true)
            .finish(CompletionStatus::Completed, false);
        assert_eq!(compose_response(&state), "final");
    }

    #[test]
    fn exhausted_summarizes_tools() {
        let state = tool_entry(base(), "filesystem.getWorkspaceFiles", true);
        let state = tool_entry(state, "search.findText", false)
            .finish(CompletionStatus::Completed, true);
        let text = compose_response(&state);
        assert!(text.contains("limit of 3"));
        assert!(text.contains("- filesystem.getWorkspaceFiles (succeeded)"));
        assert!(text.contains("- search.findText (failed)"));
    }

    #[test]
    fn failure_names_phase_without_raw_error() {
        let state = base()
            .record(
                Phase::Reasoning,
                json!({ "error": "reasoning decision violates its schema: /action: is required" }),
                false,
            )
            .finish(CompletionStatus::Failed, false);
        let text = compose_response(&state);
        assert!(text.contains("planning the next step"));
        assert!(!text.contains("schema"));
    }

    #[test]
    fn cancelled_mentions_completed_steps() {
        let state = tool_entry(base(), "filesystem.writeFile", true)
            .finish(CompletionStatus::Cancelled, false);
        let text = compose_response(&state);
        assert!(text.starts_with("The request was cancelled"));
        assert!(text.contains("filesystem.writeFile"));
    }
}
