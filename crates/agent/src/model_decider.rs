//! Decision Provider backed by an LLM chat completion.

use std::sync::Arc;

use async_trait::async_trait;
use rustedcode_config::{AgentConfig, ProviderConfig};
use rustedcode_core::decision::DecisionProvider;
use rustedcode_core::error::DecisionError;
use rustedcode_core::message::Message;
use rustedcode_core::provider::{Provider, ProviderRequest};
use rustedcode_core::state::{AgentState, Phase};
use rustedcode_core::tool::ToolDefinition;
use serde_json::Value;
use tracing::debug;

use crate::prompts;

pub struct ModelDecisionProvider {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    system_prompt: String,
    tools: Vec<ToolDefinition>,
}

impl ModelDecisionProvider {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.2,
            max_tokens: None,
            system_prompt: prompts::DEFAULT_SYSTEM_PROMPT.to_string(),
            tools: Vec::new(),
        }
    }

    /// Build from the `[provider]` and `[agent]` config sections.
    pub fn from_config(
        provider: Arc<dyn Provider>,
        provider_config: &ProviderConfig,
        agent_config: &AgentConfig,
    ) -> Self {
        let decider = Self::new(provider, provider_config.model.clone())
            .with_temperature(provider_config.temperature)
            .with_max_tokens(provider_config.max_tokens);
        match &agent_config.system_prompt {
            Some(prompt) => decider.with_system_prompt(prompt.clone()),
            None => decider,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Tools the model may choose from during reasoning and correction.
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    fn request(&self, phase: Phase, state: &AgentState) -> ProviderRequest {
        let messages = vec![
            Message::system(prompts::system_prompt(
                &self.system_prompt,
                phase,
                &self.tools,
                state,
            )),
            Message::user(prompts::user_prompt(state)),
        ];
        let mut request = ProviderRequest::new(self.model.clone(), messages);
        request.temperature = self.temperature;
        request.max_tokens = self.max_tokens;
        request.json_mode = true;
        request
    }
}

#[async_trait]
impl DecisionProvider for ModelDecisionProvider {
    fn name(&self) -> &str {
        self.provider.name()
    }

    async fn decide(&self, phase: Phase, state: &AgentState) -> Result<Value, DecisionError> {
        if phase == Phase::Action {
            return Err(DecisionError::UnsupportedPhase(phase.to_string()));
        }

        let response = self.provider.complete(self.request(phase, state)).await?;
        if let Some(usage) = &response.usage {
            debug!(
                phase = %phase,
                model = %response.model,
                tokens = usage.total_tokens,
                "Decision received"
            );
        }
        extract_json(&response.message.content)
    }
}

/// Pull the first JSON object out of a model reply.
///
/// Models wrap JSON in Markdown fences or add a sentence around it; both
/// are tolerated. Anything else is `Malformed`.
pub fn extract_json(reply: &str) -> Result<Value, DecisionError> {
    let Some(start) = reply.find('{') else {
        return Err(DecisionError::Malformed(format!(
            "no JSON object in reply: {}",
            preview(reply)
        )));
    };

    // Streaming deserializer stops after the first value, ignoring trailing text
    let mut values = serde_json::Deserializer::from_str(&reply[start..]).into_iter::<Value>();
    match values.next() {
        Some(Ok(value @ Value::Object(_))) => Ok(value),
        Some(Ok(_)) => Err(DecisionError::Malformed("reply is not a JSON object".into())),
        Some(Err(e)) => Err(DecisionError::Malformed(format!(
            "invalid JSON ({e}): {}",
            preview(reply)
        ))),
        None => Err(DecisionError::Malformed("empty reply".into())),
    }
}

fn preview(text: &str) -> String {
    text.chars().take(120).collect()
}
