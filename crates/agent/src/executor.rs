//! Tool Executor — the only path by which a tool runs.
//!
//! Resolves the tool, validates its input, records a `tool` trace step with
//! the validated parameters, runs it under a timeout, checks its output
//! against the declared schema, and publishes the outcome on the event bus.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use rustedcode_core::error::{ErrorCategory, ExecutionError, ExecutionFailure, ToolError};
use rustedcode_core::event::{AgentEvent, EventBus};
use rustedcode_core::schema::{FieldViolation, validate_against};
use rustedcode_core::tool::{Tool, ToolRegistry};
use rustedcode_telemetry::TraceRecorder;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Default per-call timeout.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(60);

pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    recorder: Arc<TraceRecorder>,
    bus: Arc<EventBus>,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(
        registry: Arc<ToolRegistry>,
        recorder: Arc<TraceRecorder>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            registry,
            recorder,
            bus,
            timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Run `tool_name` with `params`.
    ///
    /// With a `trace_id` the caller owns the trace and only one `tool` step is
    /// added and closed. Without one, an ad-hoc trace wraps the single call.
    pub async fn execute(
        &self,
        tool_name: &str,
        params: Value,
        trace_id: Option<&str>,
    ) -> Result<Value, ExecutionError> {
        self.execute_cancellable(tool_name, params, trace_id, &CancellationToken::new())
            .await
    }

    /// Like [`execute`](Self::execute), but abandons the tool call as soon as
    /// `cancel` fires. The open step is then marked skipped.
    pub async fn execute_cancellable(
        &self,
        tool_name: &str,
        params: Value,
        trace_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Value, ExecutionError> {
        if let Some(trace_id) = trace_id {
            return self.run(tool_name, params, trace_id, cancel).await;
        }

        let trace_id = self
            .recorder
            .start(format!("tool:{tool_name}"), json!({ "toolName": tool_name }));
        let result = self.run(tool_name, params, &trace_id, cancel).await;
        match &result {
            Ok(output) => {
                self.recorder.end(&trace_id, output.clone());
            }
            Err(e) => {
                self.recorder.fail(&trace_id, e.to_string());
            }
        }
        result
    }

    async fn run(
        &self,
        tool_name: &str,
        params: Value,
        trace_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Value, ExecutionError> {
        let Some(tool) = self.registry.get(tool_name) else {
            let err = ExecutionError::new(tool_name, ExecutionFailure::ToolNotRegistered);
            warn!(tool = %tool_name, trace_id, "Tool is not registered");
            self.publish_failure(trace_id, &err, 0);
            return Err(err);
        };

        // Nothing runs and no step opens until the input is valid
        let validated = match validate_against(&tool.input_schema(), &params) {
            Ok(validated) => validated,
            Err(violations) => {
                warn!(tool = %tool_name, trace_id, %violations, "Tool input rejected");
                self.publish_validation_failure(
                    trace_id,
                    tool_name,
                    ErrorCategory::Validation,
                    &violations.violations,
                );
                let err =
                    ExecutionError::new(tool_name, ExecutionFailure::InvalidInput(violations));
                self.publish_failure(trace_id, &err, 0);
                return Err(err);
            }
        };

        let step_id = format!("tool-{}", uuid::Uuid::new_v4().simple());
        self.recorder
            .add_step(trace_id, &step_id, "tool", tool_name, validated.clone());
        self.bus.publish(AgentEvent::ToolCalled {
            trace_id: trace_id.to_string(),
            tool_name: tool_name.to_string(),
            params: validated.clone(),
            timestamp: Utc::now(),
        });
        debug!(tool = %tool_name, trace_id, "Executing tool");

        let start = Instant::now();
        let outcome = tokio::select! {
            _ = cancel.cancelled() => None,
            result = self.invoke(tool.as_ref(), validated) => Some(result),
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        let Some(result) = outcome else {
            let err = ExecutionError::new(tool_name, ExecutionFailure::Cancelled);
            warn!(tool = %tool_name, trace_id, "Tool call cancelled");
            self.publish_failure(trace_id, &err, duration_ms);
            self.recorder.skip_step(trace_id, "cancelled");
            return Err(err);
        };

        let checked = result.map_err(ExecutionFailure::Runtime).and_then(|output| {
            match tool.output_schema() {
                Some(schema) => validate_against(&schema, &output).map_err(|violations| {
                    error!(
                        tool = %tool_name,
                        trace_id,
                        %violations,
                        "Collaborator returned data violating its declared schema"
                    );
                    self.publish_validation_failure(
                        trace_id,
                        tool_name,
                        ErrorCategory::ContractViolation,
                        &violations.violations,
                    );
                    ExecutionFailure::ContractViolation(violations)
                }),
                None => Ok(output),
            }
        });

        match checked {
            Ok(output) => {
                self.bus.publish(AgentEvent::ToolCompleted {
                    trace_id: trace_id.to_string(),
                    tool_name: tool_name.to_string(),
                    duration_ms,
                    timestamp: Utc::now(),
                });
                self.recorder.end_step(trace_id, output.clone());
                debug!(tool = %tool_name, duration_ms, "Tool completed");
                Ok(output)
            }
            Err(failure) => {
                let err = ExecutionError::new(tool_name, failure);
                if err.category() == ErrorCategory::Execution {
                    warn!(tool = %tool_name, trace_id, error = %err, "Tool execution failed");
                }
                self.publish_failure(trace_id, &err, duration_ms);
                self.recorder.fail_step(trace_id, err.to_string());
                Err(err)
            }
        }
    }

    async fn invoke(&self, tool: &dyn Tool, input: Value) -> Result<Value, ToolError> {
        match tokio::time::timeout(self.timeout, tool.execute(input)).await {
            Ok(result) => result,
            Err(_) => Err(ToolError::Timeout {
                tool_name: tool.name().to_string(),
                timeout_secs: self.timeout.as_secs(),
            }),
        }
    }

    fn publish_failure(&self, trace_id: &str, err: &ExecutionError, duration_ms: u64) {
        self.bus.publish(AgentEvent::ToolFailed {
            trace_id: trace_id.to_string(),
            tool_name: err.tool_name.clone(),
            category: err.category(),
            error_message: err.to_string(),
            violations: err
                .violations()
                .map(|v| v.violations.clone())
                .unwrap_or_default(),
            duration_ms,
            timestamp: Utc::now(),
        });
    }

    fn publish_validation_failure(
        &self,
        trace_id: &str,
        subject: &str,
        category: ErrorCategory,
        violations: &[FieldViolation],
    ) {
        self.bus.publish(AgentEvent::ValidationFailed {
            trace_id: trace_id.to_string(),
            subject: subject.to_string(),
            category,
            violations: violations.to_vec(),
            timestamp: Utc::now(),
        });
    }
}
