//! Phase decisions — what the Decision Provider says to do next.
//!
//! A Decision Provider returns raw JSON. The core validates it against the
//! phase's schema and only then converts it into one of the typed variants
//! below. Nothing downstream ever inspects the raw shape.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::DecisionError;
use crate::schema::ValidationError;
use crate::state::{AgentState, Phase};

pub const ANALYSIS_SCHEMA: &str = "decision.analysis";
pub const REASONING_SCHEMA: &str = "decision.reasoning";
pub const REFLECTION_SCHEMA: &str = "decision.reflection";
pub const CORRECTION_SCHEMA: &str = "decision.correction";

/// The capability that turns a state snapshot into a structured decision.
///
/// Normally backed by a language model, but the core does not care: a rules
/// engine or a scripted fixture works the same way.
#[async_trait]
pub trait DecisionProvider: Send + Sync {
    /// A human-readable name (for logs).
    fn name(&self) -> &str;

    /// Produce the raw decision for `phase`. Only called for
    /// analysis, reasoning, reflection and correction.
    async fn decide(&self, phase: Phase, state: &AgentState) -> Result<Value, DecisionError>;
}

/// INITIAL_ANALYSIS output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisDecision {
    pub intent: String,
    pub objective: String,
    pub entities: Vec<String>,
}

/// The next thing the agent will do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlannedAction {
    /// Invoke a registered tool.
    Tool { tool_name: String, params: Value },
    /// Record an intermediate note and keep going.
    Prompt { content: String },
    /// Answer the user. Terminal when reflection agrees it succeeded.
    Respond { response: String },
}

impl PlannedAction {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Tool { .. } => "tool",
            Self::Prompt { .. } => "prompt",
            Self::Respond { .. } => "respond",
        }
    }

    pub fn is_respond(&self) -> bool {
        matches!(self, Self::Respond { .. })
    }
}

/// REASONING output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningDecision {
    pub reasoning: String,
    pub action: PlannedAction,
}

/// REFLECTION output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReflectionDecision {
    pub is_successful: bool,
    pub needs_correction: bool,
    pub insights: Vec<String>,
}

/// CORRECTION output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionDecision {
    pub revised_plan: String,
    pub next_action: ReasoningDecision,
}

/// A validated decision of any phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "phase", content = "decision", rename_all = "snake_case")]
pub enum Decision {
    Analysis(AnalysisDecision),
    Reasoning(ReasoningDecision),
    Reflection(ReflectionDecision),
    Correction(CorrectionDecision),
}

impl Decision {
    /// Convert an already schema-validated payload into the phase's variant.
    ///
    /// Cross-field rules the schema subset cannot express (a `tool` action
    /// must name its tool) are enforced here.
    pub fn from_validated(phase: Phase, value: &Value) -> Result<Self, DecisionError> {
        let to_contract = |violations: ValidationError| DecisionError::ContractViolation {
            phase: phase.to_string(),
            violations,
        };
        match phase {
            Phase::Analysis => {
                let wire: AnalysisWire = from_wire(value, "").map_err(to_contract)?;
                Ok(Self::Analysis(AnalysisDecision {
                    intent: wire.intent,
                    objective: wire.objective,
                    entities: wire.entities,
                }))
            }
            Phase::Reasoning => from_wire::<ReasoningWire>(value, "")
                .and_then(|wire| wire.into_decision(""))
                .map(Self::Reasoning)
                .map_err(to_contract),
            Phase::Reflection => {
                let wire: ReflectionWire = from_wire(value, "").map_err(to_contract)?;
                Ok(Self::Reflection(ReflectionDecision {
                    is_successful: wire.is_successful,
                    needs_correction: wire.needs_correction,
                    insights: wire.insights,
                }))
            }
            Phase::Correction => {
                let wire: CorrectionWire = from_wire(value, "").map_err(to_contract)?;
                let next_action = wire
                    .next_action
                    .into_decision("/nextAction")
                    .map_err(to_contract)?;
                Ok(Self::Correction(CorrectionDecision {
                    revised_plan: wire.revised_plan,
                    next_action,
                }))
            }
            Phase::Action => Err(DecisionError::UnsupportedPhase(phase.to_string())),
        }
    }
}

// Payload shapes as providers send them (camelCase, `action` tag).

#[derive(Deserialize)]
struct AnalysisWire {
    #[serde(default)]
    intent: String,
    #[serde(default)]
    objective: String,
    #[serde(default)]
    entities: Vec<String>,
}

#[derive(Deserialize)]
struct ReasoningWire {
    #[serde(default)]
    reasoning: String,
    #[serde(flatten)]
    action: ActionWire,
}

#[derive(Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
enum ActionWire {
    #[serde(rename_all = "camelCase")]
    Tool {
        #[serde(default)]
        tool_name: Option<String>,
        #[serde(default)]
        params: Option<Value>,
    },
    Prompt {
        #[serde(default)]
        content: Option<String>,
    },
    Respond {
        #[serde(default)]
        response: Option<String>,
        #[serde(default)]
        content: Option<String>,
    },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReflectionWire {
    is_successful: bool,
    /// Missing or non-boolean means "no correction".
    #[serde(default, deserialize_with = "only_true")]
    needs_correction: bool,
    #[serde(default)]
    insights: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CorrectionWire {
    #[serde(default)]
    revised_plan: String,
    next_action: ReasoningWire,
}

impl ReasoningWire {
    fn into_decision(self, path: &str) -> Result<ReasoningDecision, ValidationError> {
        let action = match self.action {
            ActionWire::Tool { tool_name, params } => {
                let tool_name = tool_name.filter(|n| !n.is_empty()).ok_or_else(|| {
                    ValidationError::single(
                        format!("{path}/toolName"),
                        "is required when action is \"tool\"",
                    )
                })?;
                PlannedAction::Tool {
                    tool_name,
                    params: params.unwrap_or_else(|| json!({})),
                }
            }
            ActionWire::Prompt { content } => PlannedAction::Prompt {
                content: content.unwrap_or_else(|| self.reasoning.clone()),
            },
            ActionWire::Respond { response, content } => PlannedAction::Respond {
                response: response.or(content).unwrap_or_default(),
            },
        };
        Ok(ReasoningDecision {
            reasoning: self.reasoning,
            action,
        })
    }
}

fn from_wire<T: serde::de::DeserializeOwned>(value: &Value, path: &str) -> Result<T, ValidationError> {
    T::deserialize(value).map_err(|e| ValidationError::single(path, e.to_string()))
}

fn only_true<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(matches!(Value::deserialize(deserializer)?, Value::Bool(true)))
}

fn reasoning_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "action": { "type": "string", "enum": ["tool", "prompt", "respond"] },
            "toolName": { "type": "string" },
            "params": { "type": "object", "default": {} },
            "reasoning": { "type": "string" },
            "response": { "type": "string" },
            "content": { "type": "string" }
        },
        "required": ["action", "reasoning"]
    })
}

/// The phase schemas, keyed by registry name.
pub fn decision_schemas() -> Vec<(&'static str, Value)> {
    vec![
        (
            ANALYSIS_SCHEMA,
            json!({
                "type": "object",
                "properties": {
                    "intent": { "type": "string", "minLength": 1 },
                    "objective": { "type": "string", "minLength": 1 },
                    "entities": { "type": "array", "items": { "type": "string" }, "default": [] }
                },
                "required": ["intent", "objective"]
            }),
        ),
        (REASONING_SCHEMA, reasoning_schema()),
        (
            REFLECTION_SCHEMA,
            json!({
                "type": "object",
                "properties": {
                    "isSuccessful": { "type": "boolean" },
                    "needsCorrection": {},
                    "insights": { "type": "array", "items": { "type": "string" }, "default": [] }
                },
                "required": ["isSuccessful"]
            }),
        ),
        (
            CORRECTION_SCHEMA,
            json!({
                "type": "object",
                "properties": {
                    "revisedPlan": { "type": "string" },
                    "nextAction": reasoning_schema()
                },
                "required": ["revisedPlan", "nextAction"]
            }),
        ),
    ]
}
