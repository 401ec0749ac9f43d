//! Shared test tools for executor and orchestrator tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rustedcode_core::error::ToolError;
use rustedcode_core::tool::{Tool, ToolRegistry};
use serde_json::{Value, json};

/// Echoes `text`, `repeat` times.
pub struct EchoTool {
    pub calls: AtomicUsize,
}

impl EchoTool {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "test.echo"
    }

    fn description(&self) -> &str {
        "Echo text back"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "text": { "type": "string" },
                "repeat": { "type": "integer", "minimum": 1, "default": 1 }
            },
            "required": ["text"]
        })
    }

    fn output_schema(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": { "echo": { "type": "string" } },
            "required": ["echo"]
        }))
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let text = input["text"].as_str().unwrap_or_default();
        let repeat = input["repeat"].as_u64().unwrap_or(1) as usize;
        Ok(json!({ "echo": text.repeat(repeat) }))
    }
}

/// Always fails at runtime.
pub struct FailingTool;

#[async_trait]
impl Tool for FailingTool {
    fn name(&self) -> &str {
        "test.fail"
    }

    fn description(&self) -> &str {
        "Always fails"
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object" })
    }

    async fn execute(&self, _input: Value) -> Result<Value, ToolError> {
        Err(ToolError::ExecutionFailed {
            tool_name: "test.fail".into(),
            reason: "disk on fire".into(),
        })
    }
}

/// Sleeps far longer than any test waits.
pub struct SlowTool;

#[async_trait]
impl Tool for SlowTool {
    fn name(&self) -> &str {
        "test.slow"
    }

    fn description(&self) -> &str {
        "Takes forever"
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object" })
    }

    async fn execute(&self, _input: Value) -> Result<Value, ToolError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(json!({ "done": true }))
    }
}

/// Returns output that contradicts its own output schema.
pub struct BrokenContractTool;

#[async_trait]
impl Tool for BrokenContractTool {
    fn name(&self) -> &str {
        "test.broken"
    }

    fn description(&self) -> &str {
        "Returns malformed output"
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object" })
    }

    fn output_schema(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": { "count": { "type": "integer" } },
            "required": ["count"]
        }))
    }

    async fn execute(&self, _input: Value) -> Result<Value, ToolError> {
        Ok(json!({ "count": "many" }))
    }
}

pub fn test_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(EchoTool::new()));
    registry.register(Arc::new(FailingTool));
    registry.register(Arc::new(SlowTool));
    registry.register(Arc::new(BrokenContractTool));
    registry
}
