//! End-to-end integration tests for the RustedCode agent runtime.
//!
//! These tests drive whole turns through the orchestrator with the real
//! built-in tools over a temporary workspace, scripted or model-backed
//! decisions, and the real trace recorder and event bus.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rustedcode_agent::scripted::{self, ScriptedDecisionProvider};
use rustedcode_agent::{
    FileStateStore, InMemoryStateStore, ModelDecisionProvider, Orchestrator, OrchestratorDeps,
    ToolExecutor, TurnRequest,
};
use rustedcode_core::decision::DecisionProvider;
use rustedcode_core::error::{ErrorCategory, ExecutionFailure, ProviderError, ToolError};
use rustedcode_core::event::{AgentEvent, EventBus, EventKind};
use rustedcode_core::message::Message;
use rustedcode_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use rustedcode_core::schema::SchemaValidator;
use rustedcode_core::state::{AgentState, CompletionStatus, Phase, TurnContext};
use rustedcode_core::store::StateStore;
use rustedcode_core::tool::{Tool, ToolRegistry};
use rustedcode_telemetry::{StepStatus, TraceRecorder, TraceStatus};
use rustedcode_tools::{Workspace, registry_for};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

// ── Fixtures ─────────────────────────────────────────────────────────────

/// A small Rust project on disk.
fn project() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("Cargo.toml"),
        "[package]\nname = \"demo\"\nversion = \"0.1.0\"\n",
    )
    .unwrap();
    std::fs::create_dir(dir.path().join("src")).unwrap();
    std::fs::write(
        dir.path().join("src/main.rs"),
        "fn main() {\n    println!(\"hi\");\n}\n",
    )
    .unwrap();
    std::fs::write(dir.path().join("README.md"), "# demo\n").unwrap();
    dir
}

/// Sleeps far longer than any test waits.
struct SlowTool;

#[async_trait]
impl Tool for SlowTool {
    fn name(&self) -> &str {
        "test.slow"
    }

    fn description(&self) -> &str {
        "Never finishes in time"
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _input: Value) -> Result<Value, ToolError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(json!({}))
    }
}

struct Runtime {
    orchestrator: Orchestrator,
    executor: Arc<ToolExecutor>,
    recorder: Arc<TraceRecorder>,
    bus: Arc<EventBus>,
}

fn runtime_with(
    registry: ToolRegistry,
    decider: Arc<dyn DecisionProvider>,
    store: Arc<dyn StateStore>,
    max_iterations: u32,
) -> Runtime {
    let bus = Arc::new(EventBus::default());
    let recorder = Arc::new(TraceRecorder::new(bus.clone()));
    let executor = Arc::new(
        ToolExecutor::new(Arc::new(registry), recorder.clone(), bus.clone())
            .with_timeout(Duration::from_secs(10)),
    );
    let orchestrator = Orchestrator::new(OrchestratorDeps {
        executor: executor.clone(),
        decider,
        recorder: recorder.clone(),
        bus: bus.clone(),
        validator: Arc::new(SchemaValidator::with_decision_schemas()),
        store,
    })
    .with_max_iterations(max_iterations);
    Runtime {
        orchestrator,
        executor,
        recorder,
        bus,
    }
}

fn runtime(dir: &tempfile::TempDir, decider: Arc<dyn DecisionProvider>, max: u32) -> Runtime {
    let registry = registry_for(Arc::new(Workspace::new(dir.path())));
    runtime_with(registry, decider, Arc::new(InMemoryStateStore::new()), max)
}

fn phases(state: &AgentState) -> Vec<Phase> {
    state.history().iter().map(|e| e.phase).collect()
}

// ── Scenario A: list files, then respond ─────────────────────────────────

#[tokio::test]
async fn scenario_a_list_files_then_respond() {
    let dir = project();
    let decider = Arc::new(
        ScriptedDecisionProvider::new()
            .with(Phase::Analysis, scripted::analysis("explore", "list the project files"))
            .with(
                Phase::Reasoning,
                scripted::use_tool("filesystem.getWorkspaceFiles", json!({})),
            )
            .with(
                Phase::Reasoning,
                scripted::respond("The project has Cargo.toml, README.md and src/main.rs."),
            )
            .with_fallback(Phase::Reflection, scripted::reflection(true, false)),
    );
    let rt = runtime(&dir, decider.clone(), 15);
    let mut events = rt.bus.subscribe();

    let outcome = rt
        .orchestrator
        .run_turn(TurnRequest::new("conv-a", "What files are in this project?"))
        .await;

    assert_eq!(outcome.status, CompletionStatus::Completed);
    assert!(!outcome.iteration_exhausted);
    assert_eq!(outcome.state.iteration_count(), 2);
    assert!(outcome.response.contains("src/main.rs"));
    assert_eq!(
        phases(&outcome.state),
        vec![
            Phase::Analysis,
            Phase::Reasoning,
            Phase::Action,
            Phase::Reflection,
            Phase::Reasoning,
            Phase::Action,
            Phase::Reflection,
        ]
    );

    let records = outcome.state.tool_executions();
    assert_eq!(records.len(), 1);
    assert!(records[0].success);
    let files = records[0].output.as_ref().unwrap()["files"].clone();
    assert_eq!(files, json!(["Cargo.toml", "README.md", "src/main.rs"]));

    let trace = rt.recorder.closed_trace(&outcome.trace_id).unwrap();
    assert_eq!(trace.status, TraceStatus::Completed);
    assert_eq!(trace.open_step_count(), 0);
    assert!(trace.steps.iter().all(|s| s.status == StepStatus::Completed));
    assert_eq!(trace.steps[2].step_type, "tool");
    assert_eq!(trace.steps[2].name, "filesystem.getWorkspaceFiles");

    let kinds: Vec<EventKind> = events.drain().iter().map(|e| e.kind()).collect();
    assert_eq!(kinds.first(), Some(&EventKind::TraceStarted));
    assert_eq!(kinds.last(), Some(&EventKind::ConversationEnded));
    assert!(kinds.contains(&EventKind::ToolCalled));
    assert!(kinds.contains(&EventKind::ToolCompleted));
    assert!(!kinds.contains(&EventKind::ToolFailed));
}

// ── Scenario B: missing required parameter ───────────────────────────────

#[tokio::test]
async fn scenario_b_missing_required_param_is_rejected_before_execution() {
    let dir = project();
    let rt = runtime(&dir, Arc::new(ScriptedDecisionProvider::new()), 15);
    let mut failures = rt.bus.subscribe_to(&[EventKind::ToolFailed]);

    let trace_id = rt.recorder.start("direct", json!({}));
    let err = rt
        .executor
        .execute("filesystem.getFileContents", json!({}), Some(&trace_id))
        .await
        .unwrap_err();

    assert_eq!(err.category(), ErrorCategory::Validation);
    assert!(matches!(err.failure, ExecutionFailure::InvalidInput(_)));
    let violations = err.violations().unwrap();
    assert!(violations.violations.iter().any(|v| v.path.contains("path")));

    // Nothing ran, so nothing was traced
    assert!(rt.recorder.get(&trace_id).unwrap().steps.is_empty());

    let events = failures.drain();
    assert_eq!(events.len(), 1);
    match events[0].as_ref() {
        AgentEvent::ToolFailed {
            tool_name,
            category,
            violations,
            ..
        } => {
            assert_eq!(tool_name, "filesystem.getFileContents");
            assert_eq!(*category, ErrorCategory::Validation);
            assert!(!violations.is_empty());
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn scenario_b_missing_param_inside_a_turn_is_recorded_as_failed_action() {
    let dir = project();
    let decider = Arc::new(
        ScriptedDecisionProvider::new()
            .with(Phase::Analysis, scripted::analysis("read", "read a file"))
            .with(
                Phase::Reasoning,
                scripted::use_tool("filesystem.getFileContents", json!({})),
            )
            .with(Phase::Reasoning, scripted::respond("I could not read the file."))
            .with(Phase::Reflection, scripted::reflection(false, false))
            .with(Phase::Reflection, scripted::reflection(true, false)),
    );
    let rt = runtime(&dir, decider, 15);

    let outcome = rt
        .orchestrator
        .run_turn(TurnRequest::new("conv-b", "Read the file"))
        .await;

    assert_eq!(outcome.status, CompletionStatus::Completed);
    let record = &outcome.state.tool_executions()[0];
    assert!(!record.success);
    assert_eq!(record.error_category, Some(ErrorCategory::Validation));

    let trace = rt.recorder.closed_trace(&outcome.trace_id).unwrap();
    assert!(trace.steps.iter().all(|s| s.step_type != "tool"));
    assert_eq!(trace.open_step_count(), 0);
}

// ── Scenario C: iteration ceiling ────────────────────────────────────────

#[tokio::test]
async fn scenario_c_iteration_limit_forces_completion() {
    let dir = project();
    let decider = Arc::new(
        ScriptedDecisionProvider::new()
            .with(Phase::Analysis, scripted::analysis("explore", "keep looking"))
            .with_fallback(
                Phase::Reasoning,
                scripted::use_tool("filesystem.getWorkspaceFiles", json!({})),
            )
            .with_fallback(Phase::Reflection, scripted::reflection(true, false)),
    );
    let rt = runtime(&dir, decider.clone(), 3);
    let mut ended = rt.bus.subscribe_to(&[EventKind::ConversationEnded]);

    let outcome = rt
        .orchestrator
        .run_turn(TurnRequest::new("conv-c", "Explore forever"))
        .await;

    assert_eq!(outcome.status, CompletionStatus::Completed);
    assert!(outcome.iteration_exhausted);
    assert_eq!(outcome.state.iteration_count(), 3);
    assert_eq!(decider.call_count(Phase::Reasoning), 3);
    assert_eq!(outcome.state.tool_executions().len(), 3);
    assert!(outcome.response.contains("limit of 3"));
    assert!(outcome.response.contains("- filesystem.getWorkspaceFiles (succeeded)"));

    let events = ended.drain();
    assert!(matches!(
        events[0].as_ref(),
        AgentEvent::ConversationEnded {
            iteration_exhausted: true,
            iterations: 3,
            ..
        }
    ));
}

// ── Scenario D: reflection asks for a correction ─────────────────────────

#[tokio::test]
async fn scenario_d_correction_replaces_failed_plan() {
    let dir = project();
    let decider = Arc::new(
        ScriptedDecisionProvider::new()
            .with(Phase::Analysis, scripted::analysis("read", "show the readme"))
            .with(
                Phase::Reasoning,
                scripted::use_tool("filesystem.getFileContents", json!({ "path": "README.txt" })),
            )
            .with(Phase::Reflection, scripted::reflection(false, true))
            .with(
                Phase::Correction,
                scripted::correction(
                    "There is no README.txt; point the user at README.md",
                    scripted::respond("There is no README.txt here. The readme is README.md."),
                ),
            )
            .with(Phase::Reflection, scripted::reflection(true, false)),
    );
    let rt = runtime(&dir, decider.clone(), 15);

    let outcome = rt
        .orchestrator
        .run_turn(TurnRequest::new("conv-d", "Show me README.txt"))
        .await;

    assert_eq!(outcome.status, CompletionStatus::Completed);
    assert_eq!(
        outcome.response,
        "There is no README.txt here. The readme is README.md."
    );
    assert_eq!(outcome.state.iteration_count(), 2);

    let corrections = outcome
        .state
        .history()
        .iter()
        .filter(|e| e.phase == Phase::Correction)
        .count();
    assert_eq!(corrections, 1);
    // The corrected action ran without another reasoning step
    assert_eq!(decider.call_count(Phase::Reasoning), 1);
    assert_eq!(
        phases(&outcome.state),
        vec![
            Phase::Analysis,
            Phase::Reasoning,
            Phase::Action,
            Phase::Reflection,
            Phase::Correction,
            Phase::Action,
            Phase::Reflection,
        ]
    );

    let records = outcome.state.tool_executions();
    assert_eq!(records.len(), 1);
    assert!(!records[0].success);
    assert_eq!(records[0].error_category, Some(ErrorCategory::Execution));

    let trace = rt.recorder.closed_trace(&outcome.trace_id).unwrap();
    assert_eq!(trace.status, TraceStatus::Completed);
    assert_eq!(trace.steps[2].status, StepStatus::Failed);
    assert_eq!(trace.open_step_count(), 0);
}

// ── Scenario E: cancellation during a tool call ──────────────────────────

#[tokio::test]
async fn scenario_e_cancellation_during_action() {
    let dir = project();
    let mut registry = registry_for(Arc::new(Workspace::new(dir.path())));
    registry.register(Arc::new(SlowTool));
    let decider = Arc::new(
        ScriptedDecisionProvider::new()
            .with(Phase::Analysis, scripted::analysis("wait", "run the slow tool"))
            .with(Phase::Reasoning, scripted::use_tool("test.slow", json!({})))
            .with_fallback(Phase::Reflection, scripted::reflection(true, false)),
    );
    let rt = runtime_with(
        registry,
        decider.clone(),
        Arc::new(InMemoryStateStore::new()),
        15,
    );

    let cancel = CancellationToken::new();
    let mut called = rt.bus.subscribe_to(&[EventKind::ToolCalled]);
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if called.recv().await.is_some() {
            trigger.cancel();
        }
    });

    let outcome = tokio::time::timeout(
        Duration::from_secs(5),
        rt.orchestrator
            .run_turn(TurnRequest::new("conv-e", "Run it").with_cancellation(cancel)),
    )
    .await
    .expect("cancelled turn should end promptly");

    assert_eq!(outcome.status, CompletionStatus::Cancelled);
    assert!(outcome.response.starts_with("The request was cancelled"));
    assert_eq!(decider.call_count(Phase::Reflection), 0);

    let last = outcome.state.history().last().unwrap();
    assert_eq!(last.phase, Phase::Action);
    assert!(!last.success);

    let trace = rt.recorder.closed_trace(&outcome.trace_id).unwrap();
    assert_eq!(trace.status, TraceStatus::Failed);
    assert_eq!(trace.open_step_count(), 0);
    assert_eq!(trace.steps.last().unwrap().status, StepStatus::Skipped);
}

// ── Model-backed decisions ───────────────────────────────────────────────

/// A provider that returns scripted replies in sequence.
struct SequenceProvider {
    replies: Mutex<Vec<String>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl SequenceProvider {
    fn new(replies: &[&str]) -> Self {
        let mut replies: Vec<String> = replies.iter().map(|r| r.to_string()).collect();
        replies.reverse();
        Self {
            replies: Mutex::new(replies),
            requests: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Provider for SequenceProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop()
            .ok_or_else(|| ProviderError::ApiError {
                status_code: 500,
                message: "no reply left".into(),
            })?;
        Ok(ProviderResponse {
            message: Message::assistant(&reply),
            usage: Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            }),
            model: "mock-model".into(),
        })
    }
}

#[tokio::test]
async fn model_backed_turn_reads_and_edits_a_file() {
    let dir = project();
    let provider = Arc::new(SequenceProvider::new(&[
        r#"{"intent": "edit", "objective": "greet with hello", "entities": ["src/main.rs"]}"#,
        r#"```json
{"action": "tool", "toolName": "editor.applyEdit", "params": {"path": "src/main.rs", "search": "\"hi\"", "replace": "\"hello\""}, "reasoning": "swap the greeting"}
```"#,
        r#"{"isSuccessful": true, "needsCorrection": false, "insights": ["one replacement"]}"#,
        r#"{"action": "respond", "response": "Updated the greeting in src/main.rs.", "reasoning": "done"}"#,
        r#"{"isSuccessful": true, "needsCorrection": false}"#,
    ]));
    let registry = registry_for(Arc::new(Workspace::new(dir.path())));
    let decider = Arc::new(
        ModelDecisionProvider::new(provider.clone(), "mock-model").with_tools(registry.definitions()),
    );
    let rt = runtime_with(registry, decider, Arc::new(InMemoryStateStore::new()), 15);

    let context = TurnContext {
        project: Some(json!({ "name": "demo", "language": "rust" })),
        editor: None,
    };
    let outcome = rt
        .orchestrator
        .run_turn(
            TurnRequest::new("conv-model", "Make main print hello instead of hi")
                .with_context(context),
        )
        .await;

    assert_eq!(outcome.status, CompletionStatus::Completed);
    assert_eq!(outcome.response, "Updated the greeting in src/main.rs.");
    let content = std::fs::read_to_string(dir.path().join("src/main.rs")).unwrap();
    assert!(content.contains("\"hello\""));
    assert_eq!(outcome.state.tool_executions()[0].output.as_ref().unwrap()["replacements"], 1);

    let requests = provider.requests.lock().unwrap();
    assert_eq!(requests.len(), 5);
    assert!(requests.iter().all(|r| r.json_mode));
    // Reasoning prompts list tools and carry the project context
    assert!(requests[1].messages[0].content.contains("editor.applyEdit"));
    assert!(requests[1].messages[0].content.contains("\"demo\""));
}

#[tokio::test]
async fn model_prose_reply_fails_turn_with_apology() {
    let dir = project();
    let provider = Arc::new(SequenceProvider::new(&["Sure! I'd be happy to help."]));
    let decider = Arc::new(ModelDecisionProvider::new(provider, "mock-model"));
    let rt = runtime(&dir, decider, 15);
    let mut errors = rt.bus.subscribe_to(&[EventKind::ErrorOccurred]);

    let outcome = rt
        .orchestrator
        .run_turn(TurnRequest::new("conv-prose", "hello"))
        .await;

    assert_eq!(outcome.status, CompletionStatus::Failed);
    assert!(outcome.response.starts_with("Sorry"));
    assert!(!outcome.response.contains("JSON"));
    assert_eq!(errors.drain().len(), 1);
    assert_eq!(
        rt.recorder.closed_trace(&outcome.trace_id).unwrap().status,
        TraceStatus::Failed
    );
}

// ── Persistence ──────────────────────────────────────────────────────────

#[tokio::test]
async fn file_store_carries_conversation_across_runtimes() {
    let dir = project();
    let state_dir = tempfile::tempdir().unwrap();
    let decider = || -> Arc<dyn DecisionProvider> {
        Arc::new(
            ScriptedDecisionProvider::new()
                .with_fallback(Phase::Analysis, scripted::analysis("chat", "answer"))
                .with_fallback(Phase::Reasoning, scripted::respond("Noted."))
                .with_fallback(Phase::Reflection, scripted::reflection(true, false)),
        )
    };

    let first = runtime_with(
        registry_for(Arc::new(Workspace::new(dir.path()))),
        decider(),
        Arc::new(FileStateStore::new(state_dir.path())),
        15,
    );
    first
        .orchestrator
        .process_turn("conv-file", "Remember the crate is called demo", TurnContext::default())
        .await;
    drop(first);

    let store = Arc::new(FileStateStore::new(state_dir.path()));
    let second = runtime_with(
        registry_for(Arc::new(Workspace::new(dir.path()))),
        decider(),
        store.clone(),
        15,
    );
    let outcome = second
        .orchestrator
        .run_turn(TurnRequest::new("conv-file", "What is it called?"))
        .await;

    assert_eq!(outcome.state.turn(), 2);
    assert_eq!(outcome.state.transcript().len(), 2);
    assert_eq!(
        outcome.state.transcript()[0].user,
        "Remember the crate is called demo"
    );
    assert_eq!(store.list().await.unwrap(), vec!["conv-file"]);
    let saved = store.load("conv-file").await.unwrap().unwrap();
    assert_eq!(saved.completion_status(), CompletionStatus::Completed);
}
