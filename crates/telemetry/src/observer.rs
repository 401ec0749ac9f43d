//! Event-bus observer that forwards lifecycle events to `tracing`.
//!
//! Runs as its own task and knows nothing about the orchestrator; it only
//! sees what is published on the bus.

use rustedcode_core::event::{AgentEvent, EventBus};
use tokio::task::JoinHandle;

pub struct EventLogger;

impl EventLogger {
    /// Subscribe to `bus` and log every event until the bus is dropped.
    pub fn spawn(bus: &EventBus) -> JoinHandle<()> {
        let mut subscription = bus.subscribe();
        tokio::spawn(async move {
            while let Some(event) = subscription.recv().await {
                log_event(&event);
            }
            tracing::debug!("Event bus closed; event logger stopping");
        })
    }
}

/// Log one event at a level chosen by its kind.
pub fn log_event(event: &AgentEvent) {
    let kind = event.kind();
    let trace_id = event.trace_id();
    match event {
        AgentEvent::ToolFailed {
            tool_name,
            category,
            error_message,
            ..
        } => {
            tracing::warn!(%kind, trace_id, tool = %tool_name, %category, error = %error_message, "Tool failed");
        }
        AgentEvent::ValidationFailed {
            subject,
            category,
            violations,
            ..
        } => {
            tracing::warn!(%kind, trace_id, subject = %subject, %category, violations = violations.len(), "Validation failed");
        }
        AgentEvent::ErrorOccurred {
            conversation_id,
            context,
            category,
            error_message,
            ..
        } => {
            tracing::error!(%kind, trace_id, conversation_id = %conversation_id, context = %context, %category, error = %error_message, "Phase error");
        }
        AgentEvent::TraceFailed { error_message, duration_ms, .. } => {
            tracing::warn!(%kind, trace_id, duration_ms, error = %error_message, "Trace failed");
        }
        AgentEvent::ConversationStarted { conversation_id, .. } => {
            tracing::info!(%kind, trace_id, conversation_id = %conversation_id, "Turn started");
        }
        AgentEvent::ConversationEnded {
            conversation_id,
            status,
            iterations,
            iteration_exhausted,
            duration_ms,
            ..
        } => {
            tracing::info!(
                %kind,
                trace_id,
                conversation_id = %conversation_id,
                %status,
                iterations,
                iteration_exhausted,
                duration_ms,
                "Turn ended"
            );
        }
        AgentEvent::ToolCompleted { tool_name, duration_ms, .. } => {
            tracing::debug!(%kind, trace_id, tool = %tool_name, duration_ms, "Tool completed");
        }
        _ => tracing::trace!(%kind, trace_id, "Lifecycle event"),
    }
}
