//! Thread-safe trace recorder — keeps the active traces of in-flight turns,
//! enforces stack discipline on their steps, and publishes every transition
//! on the event bus.
//!
//! Misuse (unknown trace id, closing a step when none is open) is logged and
//! ignored. Tracing must never take business logic down with it.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use rustedcode_core::event::{AgentEvent, EventBus};
use serde_json::Value;

use crate::model::{StepStatus, Trace, TraceStatus, TraceStep};

/// Closed traces kept for inspection by default.
pub const DEFAULT_RETAINED_TRACES: usize = 100;

pub struct TraceRecorder {
    bus: Arc<EventBus>,
    active: RwLock<HashMap<String, Trace>>,
    /// Closed traces, most recent last.
    closed: RwLock<VecDeque<Trace>>,
    retained: usize,
}

impl TraceRecorder {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self::with_retention(bus, DEFAULT_RETAINED_TRACES)
    }

    pub fn with_retention(bus: Arc<EventBus>, retained: usize) -> Self {
        Self {
            bus,
            active: RwLock::new(HashMap::new()),
            closed: RwLock::new(VecDeque::new()),
            retained,
        }
    }

    // ── Trace lifecycle ───────────────────────────────────────────────

    /// Open a new trace and return its id.
    pub fn start(&self, name: impl Into<String>, data: Value) -> String {
        let trace = Trace::new(name, data);
        let id = trace.id.clone();
        let name = trace.name.clone();
        write(&self.active).insert(id.clone(), trace);

        tracing::debug!(trace_id = %id, name = %name, "Trace started");
        self.bus.publish(AgentEvent::TraceStarted {
            trace_id: id.clone(),
            name,
            timestamp: Utc::now(),
        });
        id
    }

    /// Close the trace as completed. Any step still open is marked skipped.
    pub fn end(&self, trace_id: &str, result: Value) -> Option<Trace> {
        self.close_trace(trace_id, TraceStatus::Completed, Some(result), None)
    }

    /// Close the trace as failed. Any step still open is marked skipped.
    pub fn fail(&self, trace_id: &str, error: impl Into<String>) -> Option<Trace> {
        self.close_trace(trace_id, TraceStatus::Failed, None, Some(error.into()))
    }

    fn close_trace(
        &self,
        trace_id: &str,
        status: TraceStatus,
        result: Option<Value>,
        error: Option<String>,
    ) -> Option<Trace> {
        let Some(mut trace) = write(&self.active).remove(trace_id) else {
            tracing::warn!(trace_id, "Ignoring close of unknown or already-closed trace");
            return None;
        };

        let mut events = Vec::new();
        if let Some(step) = trace.current_step_mut() {
            tracing::warn!(
                trace_id,
                step_id = %step.id,
                "Trace closed with a step still open; marking it skipped"
            );
            let reason = "trace closed while step was running".to_string();
            step.close(StepStatus::Skipped, None, Some(reason.clone()));
            events.push(AgentEvent::TraceStepSkipped {
                trace_id: trace_id.to_string(),
                step_id: step.id.clone(),
                reason,
                timestamp: Utc::now(),
            });
        }

        let duration_ms = trace.close(status, result, error.clone());
        events.push(match error {
            Some(error_message) => AgentEvent::TraceFailed {
                trace_id: trace_id.to_string(),
                error_message,
                duration_ms,
                timestamp: Utc::now(),
            },
            None => AgentEvent::TraceCompleted {
                trace_id: trace_id.to_string(),
                duration_ms,
                timestamp: Utc::now(),
            },
        });

        {
            let mut closed = write(&self.closed);
            closed.push_back(trace.clone());
            while closed.len() > self.retained {
                closed.pop_front();
            }
        }

        tracing::debug!(trace_id, status = %status, duration_ms, steps = trace.steps.len(), "Trace closed");
        for event in events {
            self.bus.publish(event);
        }
        Some(trace)
    }

    // ── Steps ─────────────────────────────────────────────────────────

    /// Append a running step. If a step is still open it is skipped first,
    /// so at most one step is ever running.
    pub fn add_step(
        &self,
        trace_id: &str,
        step_id: impl Into<String>,
        step_type: impl Into<String>,
        name: impl Into<String>,
        data: Value,
    ) -> bool {
        let step = TraceStep::new(step_id, step_type, name, data);
        let mut events = Vec::new();
        {
            let mut active = write(&self.active);
            let Some(trace) = active.get_mut(trace_id) else {
                tracing::warn!(trace_id, step_id = %step.id, "Ignoring step for unknown trace");
                return false;
            };
            if let Some(open) = trace.current_step_mut() {
                tracing::warn!(
                    trace_id,
                    open_step = %open.id,
                    new_step = %step.id,
                    "Step added while another is open; skipping the open one"
                );
                let reason = format!("superseded by step {}", step.id);
                open.close(StepStatus::Skipped, None, Some(reason.clone()));
                events.push(AgentEvent::TraceStepSkipped {
                    trace_id: trace_id.to_string(),
                    step_id: open.id.clone(),
                    reason,
                    timestamp: Utc::now(),
                });
            }
            events.push(AgentEvent::TraceStepStarted {
                trace_id: trace_id.to_string(),
                step_id: step.id.clone(),
                step_type: step.step_type.clone(),
                name: step.name.clone(),
                timestamp: Utc::now(),
            });
            trace.steps.push(step);
        }
        for event in events {
            self.bus.publish(event);
        }
        true
    }

    /// Complete the open step with `result`.
    pub fn end_step(&self, trace_id: &str, result: Value) -> bool {
        self.close_step(trace_id, StepStatus::Completed, Some(result), None)
    }

    /// Fail the open step.
    pub fn fail_step(&self, trace_id: &str, error: impl Into<String>) -> bool {
        self.close_step(trace_id, StepStatus::Failed, None, Some(error.into()))
    }

    /// Skip the open step.
    pub fn skip_step(&self, trace_id: &str, reason: impl Into<String>) -> bool {
        self.close_step(trace_id, StepStatus::Skipped, None, Some(reason.into()))
    }

    fn close_step(
        &self,
        trace_id: &str,
        status: StepStatus,
        result: Option<Value>,
        error: Option<String>,
    ) -> bool {
        let event = {
            let mut active = write(&self.active);
            let Some(trace) = active.get_mut(trace_id) else {
                tracing::warn!(trace_id, status = %status, "Ignoring step close for unknown trace");
                return false;
            };
            let Some(step) = trace.current_step_mut() else {
                tracing::warn!(trace_id, status = %status, "Ignoring step close: no step is open");
                return false;
            };
            let duration_ms = step.close(status, result, error.clone());
            let step_id = step.id.clone();
            let timestamp = Utc::now();
            match status {
                StepStatus::Failed => AgentEvent::TraceStepFailed {
                    trace_id: trace_id.to_string(),
                    step_id,
                    error_message: error.unwrap_or_default(),
                    duration_ms,
                    timestamp,
                },
                StepStatus::Skipped => AgentEvent::TraceStepSkipped {
                    trace_id: trace_id.to_string(),
                    step_id,
                    reason: error.unwrap_or_default(),
                    timestamp,
                },
                StepStatus::Completed | StepStatus::Running => AgentEvent::TraceStepCompleted {
                    trace_id: trace_id.to_string(),
                    step_id,
                    duration_ms,
                    timestamp,
                },
            }
        };
        self.bus.publish(event);
        true
    }

    // ── Queries ───────────────────────────────────────────────────────

    /// Snapshot of an active trace. Closed traces are not found here.
    pub fn get(&self, trace_id: &str) -> Option<Trace> {
        read(&self.active).get(trace_id).cloned()
    }

    pub fn is_active(&self, trace_id: &str) -> bool {
        read(&self.active).contains_key(trace_id)
    }

    pub fn active_count(&self) -> usize {
        read(&self.active).len()
    }

    /// A retained closed trace, by id.
    pub fn closed_trace(&self, trace_id: &str) -> Option<Trace> {
        read(&self.closed).iter().find(|t| t.id == trace_id).cloned()
    }

    /// Recently closed traces, most recent first.
    pub fn recent_traces(&self, limit: usize) -> Vec<Trace> {
        read(&self.closed).iter().rev().take(limit).cloned().collect()
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
