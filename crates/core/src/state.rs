//! Per-conversation agent state.
//!
//! `AgentState` is a value: every transition consumes the old snapshot and
//! returns a new one, so a reader holding a clone never observes a
//! half-applied update. History is append-only and only exposed as a slice.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::decision::{
    AnalysisDecision, CorrectionDecision, PlannedAction, ReasoningDecision, ReflectionDecision,
};
use crate::error::ErrorCategory;

/// Default ceiling on REASONING iterations per turn.
pub const DEFAULT_MAX_ITERATIONS: u32 = 15;

/// The phases of the turn loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Analysis,
    Reasoning,
    Action,
    Reflection,
    Correction,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Analysis => "analysis",
            Self::Reasoning => "reasoning",
            Self::Action => "action",
            Self::Reflection => "reflection",
            Self::Correction => "correction",
        }
    }

    /// Name of the decision schema this phase is validated against.
    /// ACTION has none: it executes, it does not decide.
    pub fn schema_name(&self) -> Option<&'static str> {
        match self {
            Self::Analysis => Some(crate::decision::ANALYSIS_SCHEMA),
            Self::Reasoning => Some(crate::decision::REASONING_SCHEMA),
            Self::Reflection => Some(crate::decision::REFLECTION_SCHEMA),
            Self::Correction => Some(crate::decision::CORRECTION_SCHEMA),
            Self::Action => None,
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl CompletionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

impl std::fmt::Display for CompletionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// One immutable record of a phase outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub phase: Phase,
    pub timestamp: DateTime<Utc>,
    pub data: Value,
    pub iteration: u32,
    pub success: bool,
}

/// Outcome of a single tool invocation during ACTION.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolExecutionRecord {
    pub tool_name: String,
    pub input: Value,
    pub output: Option<Value>,
    pub error: Option<String>,
    pub error_category: Option<ErrorCategory>,
    pub success: bool,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

impl ToolExecutionRecord {
    pub fn succeeded(tool_name: impl Into<String>, input: Value, output: Value, duration_ms: u64) -> Self {
        Self {
            tool_name: tool_name.into(),
            input,
            output: Some(output),
            error: None,
            error_category: None,
            success: true,
            duration_ms,
            timestamp: Utc::now(),
        }
    }

    pub fn failed(
        tool_name: impl Into<String>,
        input: Value,
        error: impl Into<String>,
        category: ErrorCategory,
        duration_ms: u64,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            input,
            output: None,
            error: Some(error.into()),
            error_category: Some(category),
            success: false,
            duration_ms,
            timestamp: Utc::now(),
        }
    }
}

/// What ACTION produced for the current iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionOutcome {
    Tool(ToolExecutionRecord),
    Prompt { content: String },
    Respond { response: String },
}

impl ActionOutcome {
    pub fn is_success(&self) -> bool {
        match self {
            Self::Tool(record) => record.success,
            Self::Prompt { .. } | Self::Respond { .. } => true,
        }
    }

    /// The user-facing answer, for a `respond` action.
    pub fn response(&self) -> Option<&str> {
        match self {
            Self::Respond { response } => Some(response),
            _ => None,
        }
    }
}

/// Read-only snapshots supplied by the host with each turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnContext {
    /// Project metadata (language, manifest, root).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<Value>,
    /// Editor state (open file, selection, cursor).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub editor: Option<Value>,
}

/// A completed user/assistant exchange kept across turns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub user: String,
    pub assistant: String,
    pub status: CompletionStatus,
    pub timestamp: DateTime<Utc>,
}

/// The complete state of one conversation's current turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    conversation_id: String,
    turn: u32,
    user_message: String,
    objective: Option<String>,
    iteration_count: u32,
    max_iterations: u32,
    completion_status: CompletionStatus,
    iteration_exhausted: bool,
    history: Vec<HistoryEntry>,
    tool_executions: Vec<ToolExecutionRecord>,
    analysis_result: Option<AnalysisDecision>,
    reasoning_result: Option<ReasoningDecision>,
    action_result: Option<ActionOutcome>,
    reflection_result: Option<ReflectionDecision>,
    correction_result: Option<CorrectionDecision>,
    context: TurnContext,
    transcript: Vec<ConversationTurn>,
    started_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl AgentState {
    /// Fresh state for a brand-new conversation.
    pub fn new(conversation_id: impl Into<String>, max_iterations: u32) -> Self {
        let now = Utc::now();
        Self {
            conversation_id: conversation_id.into(),
            turn: 0,
            user_message: String::new(),
            objective: None,
            iteration_count: 0,
            max_iterations: max_iterations.max(1),
            completion_status: CompletionStatus::InProgress,
            iteration_exhausted: false,
            history: Vec::new(),
            tool_executions: Vec::new(),
            analysis_result: None,
            reasoning_result: None,
            action_result: None,
            reflection_result: None,
            correction_result: None,
            context: TurnContext::default(),
            transcript: Vec::new(),
            started_at: now,
            updated_at: now,
        }
    }

    /// Reset per-turn fields for a new user message, keeping the transcript.
    pub fn begin_turn(
        self,
        user_message: impl Into<String>,
        context: TurnContext,
        max_iterations: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            turn: self.turn + 1,
            user_message: user_message.into(),
            objective: None,
            iteration_count: 0,
            max_iterations: max_iterations.max(1),
            completion_status: CompletionStatus::InProgress,
            iteration_exhausted: false,
            history: Vec::new(),
            tool_executions: Vec::new(),
            analysis_result: None,
            reasoning_result: None,
            action_result: None,
            reflection_result: None,
            correction_result: None,
            context,
            started_at: now,
            updated_at: now,
            ..self
        }
    }

    // --- Accessors ---

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn turn(&self) -> u32 {
        self.turn
    }

    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    pub fn objective(&self) -> Option<&str> {
        self.objective.as_deref()
    }

    pub fn iteration_count(&self) -> u32 {
        self.iteration_count
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    pub fn completion_status(&self) -> CompletionStatus {
        self.completion_status
    }

    pub fn iteration_exhausted(&self) -> bool {
        self.iteration_exhausted
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn tool_executions(&self) -> &[ToolExecutionRecord] {
        &self.tool_executions
    }

    pub fn analysis_result(&self) -> Option<&AnalysisDecision> {
        self.analysis_result.as_ref()
    }

    pub fn reasoning_result(&self) -> Option<&ReasoningDecision> {
        self.reasoning_result.as_ref()
    }

    pub fn action_result(&self) -> Option<&ActionOutcome> {
        self.action_result.as_ref()
    }

    pub fn reflection_result(&self) -> Option<&ReflectionDecision> {
        self.reflection_result.as_ref()
    }

    pub fn correction_result(&self) -> Option<&CorrectionDecision> {
        self.correction_result.as_ref()
    }

    pub fn context(&self) -> &TurnContext {
        &self.context
    }

    pub fn transcript(&self) -> &[ConversationTurn] {
        &self.transcript
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Whether another REASONING pass is allowed.
    pub fn can_iterate(&self) -> bool {
        self.iteration_count < self.max_iterations
    }

    /// The most recent history entry for `phase`, if any.
    pub fn last_entry(&self, phase: Phase) -> Option<&HistoryEntry> {
        self.history.iter().rev().find(|e| e.phase == phase)
    }

    // --- Transitions ---

    /// Append a history entry stamped with the current iteration.
    pub fn record(mut self, phase: Phase, data: Value, success: bool) -> Self {
        self.history.push(HistoryEntry {
            phase,
            timestamp: Utc::now(),
            data,
            iteration: self.iteration_count,
            success,
        });
        self.touch()
    }

    /// Enter the next REASONING iteration. Never exceeds the ceiling.
    pub fn next_iteration(mut self) -> Self {
        self.iteration_count = (self.iteration_count + 1).min(self.max_iterations);
        self.action_result = None;
        self.reflection_result = None;
        self.touch()
    }

    pub fn with_analysis(mut self, analysis: AnalysisDecision) -> Self {
        self.objective = Some(analysis.objective.clone());
        self.analysis_result = Some(analysis);
        self.touch()
    }

    pub fn with_reasoning(mut self, reasoning: ReasoningDecision) -> Self {
        self.reasoning_result = Some(reasoning);
        self.touch()
    }

    pub fn with_action(mut self, outcome: ActionOutcome) -> Self {
        if let ActionOutcome::Tool(record) = &outcome {
            self.tool_executions.push(record.clone());
        }
        self.action_result = Some(outcome);
        self.touch()
    }

    pub fn with_reflection(mut self, reflection: ReflectionDecision) -> Self {
        self.reflection_result = Some(reflection);
        self.touch()
    }

    /// Store the correction and adopt its `next_action` as the plan for
    /// the following iteration.
    pub fn with_correction(mut self, correction: CorrectionDecision) -> Self {
        self.reasoning_result = Some(correction.next_action.clone());
        self.correction_result = Some(correction);
        self.touch()
    }

    /// Mark the turn terminal.
    pub fn finish(mut self, status: CompletionStatus, iteration_exhausted: bool) -> Self {
        self.completion_status = status;
        self.iteration_exhausted = iteration_exhausted;
        self.touch()
    }

    /// Append the finished exchange to the cross-turn transcript.
    pub fn with_transcript_entry(mut self, assistant: impl Into<String>) -> Self {
        self.transcript.push(ConversationTurn {
            user: self.user_message.clone(),
            assistant: assistant.into(),
            status: self.completion_status,
            timestamp: Utc::now(),
        });
        self.touch()
    }

    fn touch(mut self) -> Self {
        self.updated_at = Utc::now();
        self
    }
}

/// The action a reasoning result plans, if any.
pub fn planned_action(state: &AgentState) -> Option<&PlannedAction> {
    state.reasoning_result().map(|r| &r.action)
}
