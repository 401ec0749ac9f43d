//! Data model for execution traces and their steps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Step ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Running,
    Completed,
    Failed,
    Skipped,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// A single traced unit of work inside a turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceStep {
    pub id: String,
    /// What kind of work this is (e.g. "analysis", "tool", "action").
    pub step_type: String,
    /// Human-readable label (e.g. the tool name).
    pub name: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub status: StepStatus,
    pub data: serde_json::Value,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl TraceStep {
    pub fn new(
        id: impl Into<String>,
        step_type: impl Into<String>,
        name: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            step_type: step_type.into(),
            name: name.into(),
            started_at: Utc::now(),
            ended_at: None,
            status: StepStatus::Running,
            data,
            result: None,
            error: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == StepStatus::Running
    }

    /// Close the step. Returns the duration in milliseconds.
    pub(crate) fn close(
        &mut self,
        status: StepStatus,
        result: Option<serde_json::Value>,
        error: Option<String>,
    ) -> u64 {
        let now = Utc::now().max(self.started_at);
        self.ended_at = Some(now);
        self.status = status;
        self.result = result;
        self.error = error;
        elapsed_ms(self.started_at, now)
    }

    pub fn duration_ms(&self) -> Option<u64> {
        self.ended_at.map(|end| elapsed_ms(self.started_at, end))
    }
}

// ── Trace ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TraceStatus {
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for TraceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// The ordered record of everything that happened during one turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    pub id: String,
    pub name: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub status: TraceStatus,
    pub data: serde_json::Value,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub steps: Vec<TraceStep>,
}

impl Trace {
    pub fn new(name: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            started_at: Utc::now(),
            ended_at: None,
            status: TraceStatus::Running,
            data,
            result: None,
            error: None,
            steps: Vec::new(),
        }
    }

    /// The step currently running, which is always the last one.
    pub fn current_step(&self) -> Option<&TraceStep> {
        self.steps.last().filter(|s| s.is_open())
    }

    pub(crate) fn current_step_mut(&mut self) -> Option<&mut TraceStep> {
        self.steps.last_mut().filter(|s| s.is_open())
    }

    pub fn step(&self, step_id: &str) -> Option<&TraceStep> {
        self.steps.iter().find(|s| s.id == step_id)
    }

    pub fn open_step_count(&self) -> usize {
        self.steps.iter().filter(|s| s.is_open()).count()
    }

    pub fn steps_with_status(&self, status: StepStatus) -> usize {
        self.steps.iter().filter(|s| s.status == status).count()
    }

    pub(crate) fn close(
        &mut self,
        status: TraceStatus,
        result: Option<serde_json::Value>,
        error: Option<String>,
    ) -> u64 {
        let now = Utc::now().max(self.started_at);
        self.ended_at = Some(now);
        self.status = status;
        self.result = result;
        self.error = error;
        elapsed_ms(self.started_at, now)
    }

    pub fn duration_ms(&self) -> Option<u64> {
        self.ended_at.map(|end| elapsed_ms(self.started_at, end))
    }
}

fn elapsed_ms(start: DateTime<Utc>, end: DateTime<Utc>) -> u64 {
    end.signed_duration_since(start).num_milliseconds().max(0) as u64
}
