//! The agent loop — the heart of RustedCode.
//!
//! Each turn runs a bounded state machine:
//!
//! ```text
//! INITIAL_ANALYSIS → REASONING → ACTION → REFLECTION ─┬→ DONE
//!                        ↑                            ├→ REASONING (next iteration)
//!                        └──── ACTION ← CORRECTION ←──┘
//! ```
//!
//! Every phase opens a trace step, makes exactly one Decision Provider or
//! Tool Executor call, appends one history entry, publishes events, and
//! closes its step before the next phase starts. Failures are converted to
//! state at the phase boundary: `process_turn` always returns a response.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use chrono::Utc;
use rustedcode_config::AgentConfig;
use rustedcode_core::decision::{
    AnalysisDecision, CorrectionDecision, Decision, DecisionProvider, PlannedAction,
    ReasoningDecision, ReflectionDecision,
};
use rustedcode_core::error::{DecisionError, ErrorCategory, ExecutionFailure};
use rustedcode_core::event::{AgentEvent, EventBus};
use rustedcode_core::schema::SchemaValidator;
use rustedcode_core::state::{
    ActionOutcome, AgentState, CompletionStatus, DEFAULT_MAX_ITERATIONS, Phase,
    ToolExecutionRecord, TurnContext, planned_action,
};
use rustedcode_core::store::StateStore;
use rustedcode_telemetry::TraceRecorder;
use serde::Serialize;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::executor::ToolExecutor;
use crate::response::compose_response;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Hard ceiling on REASONING iterations per turn.
    pub max_iterations: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

impl From<&AgentConfig> for OrchestratorConfig {
    fn from(config: &AgentConfig) -> Self {
        Self {
            max_iterations: config.max_iterations.max(1),
        }
    }
}

/// The components a turn needs. Constructed once by the host and shared.
#[derive(Clone)]
pub struct OrchestratorDeps {
    pub executor: Arc<ToolExecutor>,
    pub decider: Arc<dyn DecisionProvider>,
    pub recorder: Arc<TraceRecorder>,
    pub bus: Arc<EventBus>,
    pub validator: Arc<SchemaValidator>,
    pub store: Arc<dyn StateStore>,
}

/// One user message to process.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub conversation_id: String,
    pub user_message: String,
    pub context: TurnContext,
    pub cancel: Option<CancellationToken>,
    /// Overrides the configured ceiling for this turn.
    pub max_iterations: Option<u32>,
}

impl TurnRequest {
    pub fn new(conversation_id: impl Into<String>, user_message: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            user_message: user_message.into(),
            context: TurnContext::default(),
            cancel: None,
            max_iterations: None,
        }
    }

    pub fn with_context(mut self, context: TurnContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = Some(max);
        self
    }
}

/// Everything a host may want to know about a finished turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub response: String,
    pub state: AgentState,
    pub trace_id: String,
    pub status: CompletionStatus,
    /// The iteration ceiling forced the turn to end; the response is best-effort.
    pub iteration_exhausted: bool,
}

/// How a turn stopped before reaching a normal end.
enum Halt {
    Failed { phase: Phase },
    Cancelled,
}

/// Per-turn handles threaded through the phases.
struct TurnRun {
    trace_id: String,
    conversation_id: String,
    cancel: CancellationToken,
    trace_guard: TraceGuard,
}

/// Fails the turn's trace if the turn is dropped before `finish` closes it.
struct TraceGuard {
    recorder: Arc<TraceRecorder>,
    trace_id: String,
    armed: bool,
}

impl TraceGuard {
    fn new(recorder: Arc<TraceRecorder>, trace_id: String) -> Self {
        Self {
            recorder,
            trace_id,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for TraceGuard {
    fn drop(&mut self) {
        if self.armed {
            warn!(trace_id = %self.trace_id, "Turn dropped before finishing, failing its trace");
            self.recorder.fail(&self.trace_id, "turn abandoned");
        }
    }
}

type PhaseResult<T> = Result<(AgentState, T), (AgentState, Halt)>;

pub struct Orchestrator {
    deps: OrchestratorDeps,
    config: OrchestratorConfig,
    /// One lock per conversation id; turns for the same id queue on it.
    conversations: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl Orchestrator {
    pub fn new(deps: OrchestratorDeps) -> Self {
        Self {
            deps,
            config: OrchestratorConfig::default(),
            conversations: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.config.max_iterations = max.max(1);
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Process one user message and return the reply.
    pub async fn process_turn(
        &self,
        conversation_id: &str,
        user_message: &str,
        context: TurnContext,
    ) -> String {
        self.run_turn(TurnRequest::new(conversation_id, user_message).with_context(context))
            .await
            .response
    }

    /// Process one user message, returning the full outcome.
    pub async fn run_turn(&self, request: TurnRequest) -> TurnOutcome {
        let conversation = self.conversation_lock(&request.conversation_id);
        let guard = conversation.lock().await;
        let outcome = self.run_exclusive(request).await;
        drop(guard);
        drop(conversation);
        self.release_idle_locks();
        outcome
    }

    async fn run_exclusive(&self, request: TurnRequest) -> TurnOutcome {
        let started = Instant::now();
        let max_iterations = request
            .max_iterations
            .unwrap_or(self.config.max_iterations)
            .max(1);
        let previous = match self.deps.store.load(&request.conversation_id).await {
            Ok(Some(state)) if state.conversation_id() == request.conversation_id => state,
            Ok(Some(state)) => {
                warn!(
                    conversation_id = %request.conversation_id,
                    stored_id = %state.conversation_id(),
                    "Stored state belongs to another conversation, starting fresh"
                );
                AgentState::new(&request.conversation_id, max_iterations)
            }
            Ok(None) => AgentState::new(&request.conversation_id, max_iterations),
            Err(e) => {
                warn!(
                    conversation_id = %request.conversation_id,
                    error = %e,
                    "Could not load conversation state, starting fresh"
                );
                AgentState::new(&request.conversation_id, max_iterations)
            }
        };
        let state = previous.begin_turn(&request.user_message, request.context, max_iterations);

        let trace_id = self.deps.recorder.start(
            format!("turn:{}", request.conversation_id),
            json!({
                "conversationId": request.conversation_id,
                "turn": state.turn(),
                "userMessage": request.user_message,
            }),
        );
        let run = TurnRun {
            trace_guard: TraceGuard::new(self.deps.recorder.clone(), trace_id.clone()),
            trace_id,
            conversation_id: request.conversation_id,
            cancel: request.cancel.unwrap_or_else(CancellationToken::new),
        };

        info!(
            conversation_id = %run.conversation_id,
            trace_id = %run.trace_id,
            turn = state.turn(),
            max_iterations,
            "Processing turn"
        );
        self.deps.bus.publish(AgentEvent::ConversationStarted {
            conversation_id: run.conversation_id.clone(),
            trace_id: run.trace_id.clone(),
            timestamp: Utc::now(),
        });

        let (state, halt, exhausted) = match self.drive(&run, state).await {
            Ok((state, exhausted)) => (state, None, exhausted),
            Err((state, halt)) => (state, Some(halt), false),
        };
        self.finish(run, state, halt, exhausted, started).await
    }

    /// Run the state machine until a terminal transition.
    ///
    /// `Ok` carries whether the iteration ceiling forced the end.
    async fn drive(&self, run: &TurnRun, state: AgentState) -> PhaseResult<bool> {
        let (state, analysis) = self.decide::<AnalysisDecision>(run, state, Phase::Analysis).await?;
        let mut state = state.with_analysis(analysis).next_iteration();
        let mut corrected = false;

        loop {
            // A correction already supplied this iteration's plan
            if !corrected {
                let (next, reasoning) =
                    self.decide::<ReasoningDecision>(run, state, Phase::Reasoning).await?;
                state = next.with_reasoning(reasoning);
            }

            let (next, outcome) = self.act(run, state).await?;
            let responded = outcome.response().is_some();
            state = next.with_action(outcome);

            let (next, reflection) =
                self.decide::<ReflectionDecision>(run, state, Phase::Reflection).await?;
            let needs_correction = reflection.needs_correction;
            let successful = reflection.is_successful;
            state = next.with_reflection(reflection);

            if needs_correction {
                if !state.can_iterate() {
                    info!(
                        conversation_id = %run.conversation_id,
                        iterations = state.iteration_count(),
                        "Correction requested at the iteration limit, ending turn"
                    );
                    return Ok((state, true));
                }
                let (next, correction) =
                    self.decide::<CorrectionDecision>(run, state, Phase::Correction).await?;
                state = next.with_correction(correction).next_iteration();
                corrected = true;
                continue;
            }

            if responded && successful {
                return Ok((state, false));
            }

            if !state.can_iterate() {
                warn!(
                    conversation_id = %run.conversation_id,
                    iterations = state.iteration_count(),
                    "Max iterations reached, forcing a response"
                );
                return Ok((state, true));
            }

            state = state.next_iteration();
            corrected = false;
        }
    }

    /// Ask the Decision Provider for `phase`, validate, and convert.
    async fn decide<D: PhaseDecision>(
        &self,
        run: &TurnRun,
        state: AgentState,
        phase: Phase,
    ) -> PhaseResult<D> {
        if run.cancel.is_cancelled() {
            return Err((state, Halt::Cancelled));
        }

        let step_id = format!("{phase}-{}", state.iteration_count());
        self.deps.recorder.add_step(
            &run.trace_id,
            &step_id,
            phase.as_str(),
            format!("{phase} (iteration {})", state.iteration_count()),
            json!({ "iteration": state.iteration_count() }),
        );
        debug!(
            conversation_id = %run.conversation_id,
            phase = %phase,
            iteration = state.iteration_count(),
            "Phase started"
        );

        let raw = tokio::select! {
            _ = run.cancel.cancelled() => {
                self.deps.recorder.skip_step(&run.trace_id, "cancelled");
                return Err((state, Halt::Cancelled));
            }
            raw = self.deps.decider.decide(phase, &state) => raw,
        };

        match raw.and_then(|raw| self.validate(run, phase, &raw)) {
            Ok(decision) => match D::from_decision(decision) {
                Some(typed) => {
                    let data = to_data(&typed);
                    let state = state.record(phase, data.clone(), true);
                    self.deps.recorder.end_step(&run.trace_id, data);
                    Ok((state, typed))
                }
                None => {
                    let err = DecisionError::UnsupportedPhase(phase.to_string());
                    Err(self.phase_failed(run, state, phase, &err))
                }
            },
            Err(err) => Err(self.phase_failed(run, state, phase, &err)),
        }
    }

    fn validate(&self, run: &TurnRun, phase: Phase, raw: &Value) -> Result<Decision, DecisionError> {
        let schema = phase
            .schema_name()
            .ok_or_else(|| DecisionError::UnsupportedPhase(phase.to_string()))?;
        let violations = match self.deps.validator.validate(schema, raw)? {
            Ok(validated) => match Decision::from_validated(phase, &validated) {
                Ok(decision) => return Ok(decision),
                Err(DecisionError::ContractViolation { violations, .. }) => violations,
                Err(other) => return Err(other),
            },
            Err(violations) => violations,
        };

        error!(
            conversation_id = %run.conversation_id,
            phase = %phase,
            %violations,
            "Collaborator returned data violating its declared schema"
        );
        self.deps.bus.publish(AgentEvent::ValidationFailed {
            trace_id: run.trace_id.clone(),
            subject: schema.to_string(),
            category: ErrorCategory::ContractViolation,
            violations: violations.violations.clone(),
            timestamp: Utc::now(),
        });
        Err(DecisionError::ContractViolation {
            phase: phase.to_string(),
            violations,
        })
    }

    /// Record a failed phase and close its step.
    fn phase_failed(
        &self,
        run: &TurnRun,
        state: AgentState,
        phase: Phase,
        err: &DecisionError,
    ) -> (AgentState, Halt) {
        warn!(
            conversation_id = %run.conversation_id,
            phase = %phase,
            error = %err,
            "Phase failed"
        );
        let state = state.record(
            phase,
            json!({ "error": err.to_string(), "category": err.category() }),
            false,
        );
        self.deps.recorder.fail_step(&run.trace_id, err.to_string());
        self.deps.bus.publish(AgentEvent::ErrorOccurred {
            conversation_id: run.conversation_id.clone(),
            trace_id: run.trace_id.clone(),
            context: phase.to_string(),
            category: err.category(),
            error_message: err.to_string(),
            timestamp: Utc::now(),
        });
        (state, Halt::Failed { phase })
    }

    /// ACTION: carry out the planned action.
    async fn act(&self, run: &TurnRun, state: AgentState) -> PhaseResult<ActionOutcome> {
        if run.cancel.is_cancelled() {
            return Err((state, Halt::Cancelled));
        }
        let Some(planned) = planned_action(&state).cloned() else {
            let err = DecisionError::Malformed("no planned action to execute".into());
            return Err(self.phase_failed(run, state, Phase::Action, &err));
        };

        let outcome = match planned {
            PlannedAction::Tool { tool_name, params } => {
                // The executor's `tool` step is this phase's step
                let started = Instant::now();
                let result = self
                    .deps
                    .executor
                    .execute_cancellable(&tool_name, params.clone(), Some(&run.trace_id), &run.cancel)
                    .await;
                let duration_ms = started.elapsed().as_millis() as u64;
                match result {
                    Ok(output) => ActionOutcome::Tool(ToolExecutionRecord::succeeded(
                        tool_name,
                        params,
                        output,
                        duration_ms,
                    )),
                    Err(err) => {
                        let cancelled = matches!(err.failure, ExecutionFailure::Cancelled);
                        let outcome = ActionOutcome::Tool(ToolExecutionRecord::failed(
                            tool_name,
                            params,
                            err.to_string(),
                            err.category(),
                            duration_ms,
                        ));
                        if cancelled {
                            let state = state
                                .record(Phase::Action, to_data(&outcome), false)
                                .with_action(outcome);
                            return Err((state, Halt::Cancelled));
                        }
                        outcome
                    }
                }
            }
            PlannedAction::Prompt { content } => {
                self.open_action_step(run, &state, "prompt");
                ActionOutcome::Prompt { content }
            }
            PlannedAction::Respond { response } => {
                self.open_action_step(run, &state, "respond");
                ActionOutcome::Respond { response }
            }
        };

        let data = to_data(&outcome);
        let state = state.record(Phase::Action, data.clone(), outcome.is_success());
        if !matches!(outcome, ActionOutcome::Tool(_)) {
            self.deps.recorder.end_step(&run.trace_id, data);
        }
        Ok((state, outcome))
    }

    fn open_action_step(&self, run: &TurnRun, state: &AgentState, kind: &str) {
        self.deps.recorder.add_step(
            &run.trace_id,
            format!("action-{}", state.iteration_count()),
            "action",
            kind,
            json!({ "iteration": state.iteration_count() }),
        );
    }

    /// Close out the turn: status, response, trace, persistence, events.
    async fn finish(
        &self,
        run: TurnRun,
        state: AgentState,
        halt: Option<Halt>,
        exhausted: bool,
        started: Instant,
    ) -> TurnOutcome {
        let status = match &halt {
            None => CompletionStatus::Completed,
            Some(Halt::Failed { .. }) => CompletionStatus::Failed,
            Some(Halt::Cancelled) => CompletionStatus::Cancelled,
        };
        let state = state.finish(status, exhausted);
        let response = compose_response(&state);
        let state = state.with_transcript_entry(&response);

        let summary = json!({
            "status": status,
            "iterations": state.iteration_count(),
            "iterationExhausted": exhausted,
        });
        match &halt {
            None => {
                self.deps.recorder.end(&run.trace_id, summary);
            }
            Some(Halt::Failed { phase }) => {
                self.deps
                    .recorder
                    .fail(&run.trace_id, format!("{phase} phase failed"));
            }
            Some(Halt::Cancelled) => {
                self.deps.recorder.fail(&run.trace_id, "cancelled");
            }
        }
        run.trace_guard.disarm();

        if let Err(e) = self.deps.store.save(&state).await {
            warn!(
                conversation_id = %run.conversation_id,
                error = %e,
                "Could not persist conversation state"
            );
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        info!(
            conversation_id = %run.conversation_id,
            trace_id = %run.trace_id,
            status = %status,
            iterations = state.iteration_count(),
            iteration_exhausted = exhausted,
            duration_ms,
            "Turn finished"
        );
        self.deps.bus.publish(AgentEvent::ConversationEnded {
            conversation_id: run.conversation_id,
            trace_id: run.trace_id.clone(),
            status,
            iterations: state.iteration_count(),
            iteration_exhausted: exhausted,
            duration_ms,
            timestamp: Utc::now(),
        });

        TurnOutcome {
            response,
            state,
            trace_id: run.trace_id,
            status,
            iteration_exhausted: exhausted,
        }
    }

    fn conversation_lock(&self, conversation_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        lock(&self.conversations)
            .entry(conversation_id.to_string())
            .or_default()
            .clone()
    }

    /// Forget locks nobody is holding or waiting on.
    fn release_idle_locks(&self) {
        lock(&self.conversations).retain(|_, l| Arc::strong_count(l) > 1);
    }
}

/// A typed decision that can be pulled out of a validated [`Decision`].
trait PhaseDecision: Serialize + Sized {
    fn from_decision(decision: Decision) -> Option<Self>;
}

impl PhaseDecision for AnalysisDecision {
    fn from_decision(decision: Decision) -> Option<Self> {
        match decision {
            Decision::Analysis(d) => Some(d),
            _ => None,
        }
    }
}

impl PhaseDecision for ReasoningDecision {
    fn from_decision(decision: Decision) -> Option<Self> {
        match decision {
            Decision::Reasoning(d) => Some(d),
            _ => None,
        }
    }
}

impl PhaseDecision for ReflectionDecision {
    fn from_decision(decision: Decision) -> Option<Self> {
        match decision {
            Decision::Reflection(d) => Some(d),
            _ => None,
        }
    }
}

impl PhaseDecision for CorrectionDecision {
    fn from_decision(decision: Decision) -> Option<Self> {
        match decision {
            Decision::Correction(d) => Some(d),
            _ => None,
        }
    }
}

fn to_data<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_default()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
