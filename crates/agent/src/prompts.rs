//! Phase prompts for the model-backed Decision Provider.

use std::fmt::Write;

use rustedcode_core::state::{AgentState, HistoryEntry, Phase};
use rustedcode_core::tool::ToolDefinition;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are RustedCode, a careful coding assistant working \
inside the user's project. You plan, use tools to inspect and change files, check the results, \
and answer precisely. Never invent file contents you have not read.";

/// Previous exchanges shown to the model.
const TRANSCRIPT_WINDOW: usize = 5;
/// Longest rendering of a single history entry.
const ENTRY_CHARS: usize = 600;

/// Build the system prompt for `phase`.
pub fn system_prompt(base: &str, phase: Phase, tools: &[ToolDefinition], state: &AgentState) -> String {
    let mut prompt = String::from(base);
    prompt.push_str("\n\n## Current phase: ");
    prompt.push_str(phase.as_str());
    prompt.push('\n');
    prompt.push_str(phase_instructions(phase));

    if matches!(phase, Phase::Reasoning | Phase::Correction) && !tools.is_empty() {
        prompt.push_str("\n\n## Available tools\n");
        for tool in tools {
            let _ = writeln!(
                prompt,
                "- {}: {}\n  input schema: {}",
                tool.name, tool.description, tool.input_schema
            );
        }
    }

    let context = state.context();
    if let Some(project) = &context.project {
        let _ = write!(prompt, "\n\n## Project\n{project}");
    }
    if let Some(editor) = &context.editor {
        let _ = write!(prompt, "\n\n## Editor\n{editor}");
    }

    prompt.push_str("\n\nReply with a single JSON object and nothing else.");
    prompt
}

fn phase_instructions(phase: Phase) -> &'static str {
    match phase {
        Phase::Analysis => {
            "Work out what the user wants. Reply as:\n\
             {\"intent\": \"<short label>\", \"objective\": \"<one-sentence goal>\", \
             \"entities\": [\"<files, symbols or names mentioned>\"]}"
        }
        Phase::Reasoning => {
            "Decide the single next step toward the objective. Reply as one of:\n\
             {\"action\": \"tool\", \"toolName\": \"<tool>\", \"params\": {...}, \"reasoning\": \"...\"}\n\
             {\"action\": \"prompt\", \"content\": \"<note to yourself>\", \"reasoning\": \"...\"}\n\
             {\"action\": \"respond\", \"response\": \"<final answer for the user>\", \"reasoning\": \"...\"}\n\
             Only respond once you can answer from what the tools returned."
        }
        Phase::Reflection => {
            "Judge whether the last action achieved what it was meant to. Reply as:\n\
             {\"isSuccessful\": true|false, \"needsCorrection\": true|false, \"insights\": [\"...\"]}\n\
             Ask for correction only when the plan itself has to change."
        }
        Phase::Correction => {
            "The last action went wrong. Revise the plan and give the very next step. Reply as:\n\
             {\"revisedPlan\": \"...\", \"nextAction\": {<same shape as a reasoning decision>}}"
        }
        Phase::Action => "",
    }
}

/// Build the user prompt: objective, message, earlier turns and this turn's history.
pub fn user_prompt(state: &AgentState) -> String {
    let mut prompt = String::new();

    let transcript = state.transcript();
    if !transcript.is_empty() {
        prompt.push_str("## Earlier in this conversation\n");
        let skip = transcript.len().saturating_sub(TRANSCRIPT_WINDOW);
        for turn in &transcript[skip..] {
            let _ = writeln!(prompt, "User: {}", turn.user);
            let _ = writeln!(prompt, "Assistant: {}", truncate(&turn.assistant, ENTRY_CHARS));
        }
        prompt.push('\n');
    }

    let _ = writeln!(prompt, "## User message\n{}", state.user_message());
    if let Some(objective) = state.objective() {
        let _ = writeln!(prompt, "\n## Objective\n{objective}");
    }
    let _ = writeln!(
        prompt,
        "\nIteration {} of {}",
        state.iteration_count(),
        state.max_iterations()
    );

    if !state.history().is_empty() {
        prompt.push_str("\n## What happened so far\n");
        for entry in state.history() {
            prompt.push_str(&digest(entry));
            prompt.push('\n');
        }
    }
    prompt
}

fn digest(entry: &HistoryEntry) -> String {
    let status = if entry.success { "ok" } else { "failed" };
    format!(
        "[{}] {} ({status}): {}",
        entry.iteration,
        entry.phase,
        truncate(&entry.data.to_string(), ENTRY_CHARS)
    )
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max).collect();
    format!("{cut}…")
}
