//! Wires the configured components into one orchestrator.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use rustedcode_agent::{
    FileStateStore, InMemoryStateStore, ModelDecisionProvider, Orchestrator, OrchestratorConfig,
    OrchestratorDeps, ToolExecutor,
};
use rustedcode_config::{AppConfig, StateBackend};
use rustedcode_core::event::EventBus;
use rustedcode_core::schema::SchemaValidator;
use rustedcode_core::store::StateStore;
use rustedcode_core::tool::ToolRegistry;
use rustedcode_providers::OpenAiCompatProvider;
use rustedcode_telemetry::{EventLogger, TraceRecorder};
use tokio::task::JoinHandle;
use tracing::info;

pub struct Runtime {
    pub orchestrator: Orchestrator,
    pub registry: Arc<ToolRegistry>,
    pub store: Arc<dyn StateStore>,
    logger: Option<JoinHandle<()>>,
}

impl Runtime {
    /// Build every component from `config`. Must run inside a tokio runtime.
    pub fn build(config: &AppConfig, max_iterations: Option<u32>) -> anyhow::Result<Self> {
        let bus = Arc::new(EventBus::new(config.telemetry.event_capacity));
        let logger = config
            .telemetry
            .log_events
            .then(|| EventLogger::spawn(&bus));
        let recorder = Arc::new(TraceRecorder::with_retention(
            bus.clone(),
            config.telemetry.retained_traces,
        ));

        let registry = Arc::new(rustedcode_tools::default_registry(&config.tools));
        let executor = Arc::new(
            ToolExecutor::new(registry.clone(), recorder.clone(), bus.clone())
                .with_timeout(Duration::from_secs(config.agent.tool_timeout_secs)),
        );

        let provider = Arc::new(
            OpenAiCompatProvider::from_config(&config.provider)
                .context("Failed to set up the model provider")?,
        );
        let decider = Arc::new(
            ModelDecisionProvider::from_config(provider, &config.provider, &config.agent)
                .with_tools(registry.definitions()),
        );

        let store: Arc<dyn StateStore> = match config.state.backend {
            StateBackend::Memory => Arc::new(InMemoryStateStore::new()),
            StateBackend::File => Arc::new(FileStateStore::new(config.state.resolved_dir())),
        };

        let mut orchestrator_config = OrchestratorConfig::from(&config.agent);
        if let Some(max) = max_iterations {
            orchestrator_config.max_iterations = max.max(1);
        }
        let orchestrator = Orchestrator::new(OrchestratorDeps {
            executor,
            decider,
            recorder,
            bus,
            validator: Arc::new(SchemaValidator::with_decision_schemas()),
            store: store.clone(),
        })
        .with_config(orchestrator_config);

        info!(
            provider = %config.provider.name,
            model = %config.provider.model,
            tools = registry.len(),
            store = store.name(),
            "Runtime ready"
        );

        Ok(Self {
            orchestrator,
            registry,
            store,
            logger,
        })
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        if let Some(logger) = self.logger.take() {
            logger.abort();
        }
    }
}
