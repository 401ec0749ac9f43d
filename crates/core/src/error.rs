//! Error types for the RustedCode domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant, and the tool-execution
//! errors carry an [`ErrorCategory`] so callers can tell a misconfigured
//! registry from a buggy collaborator from an ordinary runtime failure.

use thiserror::Error;

use crate::schema::ValidationError;

/// The top-level error type for all RustedCode operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Tool execution error: {0}")]
    Execution(#[from] ExecutionError),

    // --- Decision errors ---
    #[error("Decision error: {0}")]
    Decision(#[from] DecisionError),

    // --- Schema errors ---
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    // --- Persistence ---
    #[error("State store error: {0}")]
    Store(#[from] StoreError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

/// Errors raised by a tool's own logic.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Permission denied: {tool_name}: {reason}")]
    PermissionDenied { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

/// Schema registry errors. An unknown schema name is a configuration error.
#[derive(Debug, Clone, Error)]
pub enum SchemaError {
    #[error("Schema not registered: {0}")]
    UnknownSchema(String),
}

/// Coarse classification used for logging, events and user-facing wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// A referenced tool, schema or phase is not registered.
    Configuration,
    /// The caller supplied input that fails its schema.
    Validation,
    /// A collaborator returned data that disagrees with its own declared schema.
    ContractViolation,
    /// The collaborator's own logic failed.
    Execution,
    /// The turn was cancelled while the call was in flight.
    Cancellation,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Configuration => write!(f, "configuration"),
            Self::Validation => write!(f, "validation"),
            Self::ContractViolation => write!(f, "contract_violation"),
            Self::Execution => write!(f, "execution"),
            Self::Cancellation => write!(f, "cancellation"),
        }
    }
}

/// Why a tool execution failed.
#[derive(Debug, Clone, Error)]
pub enum ExecutionFailure {
    #[error("tool is not registered")]
    ToolNotRegistered,

    #[error("invalid input: {0}")]
    InvalidInput(ValidationError),

    #[error("output violates the tool's declared schema: {0}")]
    ContractViolation(ValidationError),

    #[error("{0}")]
    Runtime(ToolError),

    #[error("cancelled")]
    Cancelled,
}

/// The single normalized error the Tool Executor raises.
///
/// Always carries the tool name and the underlying cause.
#[derive(Debug, Clone, Error)]
#[error("tool '{tool_name}' failed: {failure}")]
pub struct ExecutionError {
    pub tool_name: String,
    pub failure: ExecutionFailure,
}

impl ExecutionError {
    pub fn new(tool_name: impl Into<String>, failure: ExecutionFailure) -> Self {
        Self {
            tool_name: tool_name.into(),
            failure,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match &self.failure {
            ExecutionFailure::ToolNotRegistered => ErrorCategory::Configuration,
            ExecutionFailure::InvalidInput(_) => ErrorCategory::Validation,
            ExecutionFailure::ContractViolation(_) => ErrorCategory::ContractViolation,
            ExecutionFailure::Runtime(_) => ErrorCategory::Execution,
            ExecutionFailure::Cancelled => ErrorCategory::Cancellation,
        }
    }

    /// Field-level violations, when the failure came from schema validation.
    pub fn violations(&self) -> Option<&ValidationError> {
        match &self.failure {
            ExecutionFailure::InvalidInput(v) | ExecutionFailure::ContractViolation(v) => Some(v),
            _ => None,
        }
    }
}

/// Errors from a Decision Provider, or from validating what it returned.
#[derive(Debug, Clone, Error)]
pub enum DecisionError {
    #[error("model call failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("decision could not be parsed: {0}")]
    Malformed(String),

    #[error("{phase} decision violates its schema: {violations}")]
    ContractViolation {
        phase: String,
        violations: ValidationError,
    },

    #[error("phase '{0}' does not take a decision")]
    UnsupportedPhase(String),

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

impl DecisionError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Provider(_) => ErrorCategory::Execution,
            Self::Malformed(_) | Self::ContractViolation { .. } => ErrorCategory::ContractViolation,
            Self::UnsupportedPhase(_) | Self::Schema(_) => ErrorCategory::Configuration,
        }
    }
}

/// Errors from the conversation-state persistence collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Corrupted state for conversation {conversation_id}: {reason}")]
    Corrupted {
        conversation_id: String,
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldViolation;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn execution_error_carries_tool_name_and_cause() {
        let err = ExecutionError::new(
            "filesystem.getFileContents",
            ExecutionFailure::Runtime(ToolError::ExecutionFailed {
                tool_name: "filesystem.getFileContents".into(),
                reason: "disk on fire".into(),
            }),
        );
        let text = err.to_string();
        assert!(text.contains("filesystem.getFileContents"));
        assert!(text.contains("disk on fire"));
        assert_eq!(err.category(), ErrorCategory::Execution);
    }

    #[test]
    fn execution_error_categories() {
        let invalid = ValidationError::new(vec![FieldViolation::new("/path", "is required")]);
        assert_eq!(
            ExecutionError::new("t", ExecutionFailure::ToolNotRegistered).category(),
            ErrorCategory::Configuration
        );
        assert_eq!(
            ExecutionError::new("t", ExecutionFailure::InvalidInput(invalid.clone())).category(),
            ErrorCategory::Validation
        );
        assert_eq!(
            ExecutionError::new("t", ExecutionFailure::ContractViolation(invalid)).category(),
            ErrorCategory::ContractViolation
        );
        assert_eq!(
            ExecutionError::new("t", ExecutionFailure::Cancelled).category(),
            ErrorCategory::Cancellation
        );
    }

    #[test]
    fn decision_error_categories() {
        assert_eq!(
            DecisionError::Malformed("no json".into()).category(),
            ErrorCategory::ContractViolation
        );
        assert_eq!(
            DecisionError::Provider(ProviderError::Network("down".into())).category(),
            ErrorCategory::Execution
        );
        assert_eq!(
            DecisionError::Schema(SchemaError::UnknownSchema("x".into())).category(),
            ErrorCategory::Configuration
        );
    }
}
