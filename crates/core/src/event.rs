//! Lifecycle event system — decoupled communication between the agent loop
//! and its observers (UI, loggers, tests).
//!
//! Events are published when something interesting happens during a turn.
//! Subscribers receive them in emission order without the orchestrator
//! knowing who is listening. Delivery is in-memory only and best-effort:
//! a slow subscriber lags and skips events, it never applies back-pressure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};

use crate::error::ErrorCategory;
use crate::schema::FieldViolation;
use crate::state::CompletionStatus;

/// The enumerated kinds of lifecycle event, used for filtered subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    ToolCalled,
    ToolCompleted,
    ToolFailed,
    TraceStarted,
    TraceStepStarted,
    TraceStepCompleted,
    TraceStepFailed,
    TraceStepSkipped,
    TraceCompleted,
    TraceFailed,
    ValidationFailed,
    ConversationStarted,
    ConversationEnded,
    ErrorOccurred,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::ToolCalled => "toolCalled",
            Self::ToolCompleted => "toolCompleted",
            Self::ToolFailed => "toolFailed",
            Self::TraceStarted => "traceStarted",
            Self::TraceStepStarted => "traceStepStarted",
            Self::TraceStepCompleted => "traceStepCompleted",
            Self::TraceStepFailed => "traceStepFailed",
            Self::TraceStepSkipped => "traceStepSkipped",
            Self::TraceCompleted => "traceCompleted",
            Self::TraceFailed => "traceFailed",
            Self::ValidationFailed => "validationFailed",
            Self::ConversationStarted => "conversationStarted",
            Self::ConversationEnded => "conversationEnded",
            Self::ErrorOccurred => "errorOccurred",
        };
        f.write_str(name)
    }
}

/// All lifecycle events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum AgentEvent {
    /// A tool invocation passed input validation and is about to run.
    ToolCalled {
        trace_id: String,
        tool_name: String,
        params: serde_json::Value,
        timestamp: DateTime<Utc>,
    },

    /// A tool returned a result that passed output validation.
    ToolCompleted {
        trace_id: String,
        tool_name: String,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A tool invocation failed at any stage (lookup, validation, runtime, contract).
    ToolFailed {
        trace_id: String,
        tool_name: String,
        category: ErrorCategory,
        error_message: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        violations: Vec<FieldViolation>,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    TraceStarted {
        trace_id: String,
        name: String,
        timestamp: DateTime<Utc>,
    },

    TraceStepStarted {
        trace_id: String,
        step_id: String,
        step_type: String,
        name: String,
        timestamp: DateTime<Utc>,
    },

    TraceStepCompleted {
        trace_id: String,
        step_id: String,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    TraceStepFailed {
        trace_id: String,
        step_id: String,
        error_message: String,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    TraceStepSkipped {
        trace_id: String,
        step_id: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    TraceCompleted {
        trace_id: String,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    TraceFailed {
        trace_id: String,
        error_message: String,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A payload failed schema validation (tool input/output or a decision).
    ValidationFailed {
        trace_id: String,
        /// What was validated: a tool name or a schema name.
        subject: String,
        category: ErrorCategory,
        violations: Vec<FieldViolation>,
        timestamp: DateTime<Utc>,
    },

    ConversationStarted {
        conversation_id: String,
        trace_id: String,
        timestamp: DateTime<Utc>,
    },

    ConversationEnded {
        conversation_id: String,
        trace_id: String,
        status: CompletionStatus,
        iterations: u32,
        iteration_exhausted: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    ErrorOccurred {
        conversation_id: String,
        trace_id: String,
        context: String,
        category: ErrorCategory,
        error_message: String,
        timestamp: DateTime<Utc>,
    },
}

impl AgentEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::ToolCalled { .. } => EventKind::ToolCalled,
            Self::ToolCompleted { .. } => EventKind::ToolCompleted,
            Self::ToolFailed { .. } => EventKind::ToolFailed,
            Self::TraceStarted { .. } => EventKind::TraceStarted,
            Self::TraceStepStarted { .. } => EventKind::TraceStepStarted,
            Self::TraceStepCompleted { .. } => EventKind::TraceStepCompleted,
            Self::TraceStepFailed { .. } => EventKind::TraceStepFailed,
            Self::TraceStepSkipped { .. } => EventKind::TraceStepSkipped,
            Self::TraceCompleted { .. } => EventKind::TraceCompleted,
            Self::TraceFailed { .. } => EventKind::TraceFailed,
            Self::ValidationFailed { .. } => EventKind::ValidationFailed,
            Self::ConversationStarted { .. } => EventKind::ConversationStarted,
            Self::ConversationEnded { .. } => EventKind::ConversationEnded,
            Self::ErrorOccurred { .. } => EventKind::ErrorOccurred,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::ToolCalled { timestamp, .. }
            | Self::ToolCompleted { timestamp, .. }
            | Self::ToolFailed { timestamp, .. }
            | Self::TraceStarted { timestamp, .. }
            | Self::TraceStepStarted { timestamp, .. }
            | Self::TraceStepCompleted { timestamp, .. }
            | Self::TraceStepFailed { timestamp, .. }
            | Self::TraceStepSkipped { timestamp, .. }
            | Self::TraceCompleted { timestamp, .. }
            | Self::TraceFailed { timestamp, .. }
            | Self::ValidationFailed { timestamp, .. }
            | Self::ConversationStarted { timestamp, .. }
            | Self::ConversationEnded { timestamp, .. }
            | Self::ErrorOccurred { timestamp, .. } => *timestamp,
        }
    }

    /// Every event is correlated to a trace.
    pub fn trace_id(&self) -> &str {
        match self {
            Self::ToolCalled { trace_id, .. }
            | Self::ToolCompleted { trace_id, .. }
            | Self::ToolFailed { trace_id, .. }
            | Self::TraceStarted { trace_id, .. }
            | Self::TraceStepStarted { trace_id, .. }
            | Self::TraceStepCompleted { trace_id, .. }
            | Self::TraceStepFailed { trace_id, .. }
            | Self::TraceStepSkipped { trace_id, .. }
            | Self::TraceCompleted { trace_id, .. }
            | Self::TraceFailed { trace_id, .. }
            | Self::ValidationFailed { trace_id, .. }
            | Self::ConversationStarted { trace_id, .. }
            | Self::ConversationEnded { trace_id, .. }
            | Self::ErrorOccurred { trace_id, .. } => trace_id,
        }
    }

    /// The conversation id, for the events that carry one.
    pub fn conversation_id(&self) -> Option<&str> {
        match self {
            Self::ConversationStarted {
                conversation_id, ..
            }
            | Self::ConversationEnded {
                conversation_id, ..
            }
            | Self::ErrorOccurred {
                conversation_id, ..
            } => Some(conversation_id),
            _ => None,
        }
    }
}

/// A broadcast-based event bus for lifecycle events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
/// Construct one per orchestration instance and share it by `Arc`.
pub struct EventBus {
    sender: broadcast::Sender<Arc<AgentEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: AgentEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to every event.
    pub fn subscribe(&self) -> EventSubscription {
        EventSubscription {
            receiver: self.sender.subscribe(),
            filter: None,
        }
    }

    /// Subscribe to the given kinds only.
    pub fn subscribe_to(&self, kinds: &[EventKind]) -> EventSubscription {
        EventSubscription {
            receiver: self.sender.subscribe(),
            filter: Some(kinds.to_vec()),
        }
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

/// A subscriber's end of the bus, optionally filtered by [`EventKind`].
pub struct EventSubscription {
    receiver: broadcast::Receiver<Arc<AgentEvent>>,
    filter: Option<Vec<EventKind>>,
}

impl EventSubscription {
    fn accepts(&self, event: &AgentEvent) -> bool {
        self.filter
            .as_ref()
            .is_none_or(|kinds| kinds.contains(&event.kind()))
    }

    /// Wait for the next matching event. Returns `None` once the bus is dropped.
    pub async fn recv(&mut self) -> Option<Arc<AgentEvent>> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.accepts(&event) => return Some(event),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event subscriber lagged, events dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Take the next matching event if one is already queued.
    pub fn try_recv(&mut self) -> Option<Arc<AgentEvent>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.accepts(&event) => return Some(event),
                Ok(_) => continue,
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event subscriber lagged, events dropped");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    /// Drain every matching event that is already queued.
    pub fn drain(&mut self) -> Vec<Arc<AgentEvent>> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    /// Convert into a `Stream` (lagged gaps are skipped silently).
    pub fn into_stream(self) -> impl Stream<Item = Arc<AgentEvent>> + Send + 'static {
        let filter = self.filter;
        BroadcastStream::new(self.receiver).filter_map(move |item| match item {
            Ok(event)
                if filter
                    .as_ref()
                    .is_none_or(|kinds| kinds.contains(&event.kind())) =>
            {
                Some(event)
            }
            _ => None,
        })
    }
}
