//! Lifecycle Coordinator
//!
//! Creates pipelines: checks that they can be started at all, registers
//! them under a fresh identity and schedules their delayed start. Also
//! tears everything down when the engine shuts down.

use chrono::{DateTime, Utc};
use conduit_core::domain::engine::EngineInfo;
use conduit_core::domain::pipeline::{PipelineDefinition, PipelineId, PipelineStatus};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::config::Config;
use crate::pipeline::launcher::Launcher;
use crate::pipeline::{Pipeline, PipelineError};
use crate::repository::Registry;

/// Owns the registry and everything needed to start pipelines
pub struct Coordinator {
    registry: Registry,
    launcher: Arc<Launcher>,
    default_delay: Duration,
    kill_timeout: Duration,
    capabilities: JsonValue,
    instance_id: Uuid,
    started_at: DateTime<Utc>,
}

impl Coordinator {
    /// Creates a coordinator with an empty registry
    ///
    /// # Arguments
    /// * `config` - Engine configuration (executable, delays, timeouts)
    /// * `capabilities` - Descriptor discovered at startup
    pub fn new(config: &Config, capabilities: JsonValue) -> Self {
        Self {
            registry: Registry::new(),
            launcher: Arc::new(Launcher::from_config(config)),
            default_delay: config.default_delay,
            kill_timeout: config.kill_timeout,
            capabilities,
            instance_id: Uuid::new_v4(),
            started_at: Utc::now(),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn capabilities(&self) -> &JsonValue {
        &self.capabilities
    }

    pub fn default_delay(&self) -> Duration {
        self.default_delay
    }

    /// Creates, registers and schedules a new pipeline
    ///
    /// Returns as soon as the pipeline is registered; the process starts
    /// after `delay` (the configured default when `None`) on a background
    /// task. A start that fails at that point leaves the pipeline `Failed`
    /// and is not reported here.
    ///
    /// # Errors
    /// `StartPrecondition` if the executable cannot be resolved, and
    /// `IdentitiesExhausted` if no identity is left. Nothing is registered
    /// in either case.
    pub fn create_pipeline(
        &self,
        script: String,
        delay: Option<Duration>,
        params: Vec<String>,
    ) -> Result<Arc<Pipeline>, PipelineError> {
        self.launcher.check()?;

        let delay = delay.unwrap_or(self.default_delay);
        let definition = PipelineDefinition::new(script, params);
        let kill_timeout = self.kill_timeout;

        let pipeline = self
            .registry
            .register(|id| Pipeline::new(id, definition, delay, kill_timeout))
            .ok_or(PipelineError::IdentitiesExhausted)?;

        pipeline.schedule_start(Arc::clone(&self.launcher));

        info!(
            "Pipeline {} created with {} parameter(s), starting in {:?}",
            pipeline.id(),
            pipeline.definition().params.len(),
            pipeline.delay()
        );

        Ok(pipeline)
    }

    /// Identities of every pipeline, ascending
    pub fn list_all(&self) -> Vec<PipelineId> {
        self.registry.list_identities(|_| true)
    }

    /// Identities of the pipelines currently running, ascending
    pub fn list_running(&self) -> Vec<PipelineId> {
        self.registry
            .list_identities(|pipeline| pipeline.status() == PipelineStatus::Running)
    }

    /// Metadata served by `GET /info`
    pub fn info(&self) -> EngineInfo {
        let pipelines = self.registry.snapshot();
        let running = pipelines
            .iter()
            .filter(|pipeline| pipeline.status() == PipelineStatus::Running)
            .count();
        let uptime = (Utc::now() - self.started_at).num_seconds().max(0);

        EngineInfo {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            instance_id: self.instance_id,
            started_at: self.started_at,
            uptime_seconds: uptime as u64,
            executable: self.launcher.executable().to_string(),
            executable_args: self.launcher.args().to_vec(),
            default_delay_ms: u64::try_from(self.default_delay.as_millis()).unwrap_or(u64::MAX),
            pipelines: pipelines.len(),
            running,
        }
    }

    /// Kills every pipeline that is still pending or running
    ///
    /// Called once the HTTP server stopped accepting requests, so that no
    /// process outlives the engine.
    pub async fn shutdown(&self) {
        let live: Vec<Arc<Pipeline>> = self
            .registry
            .snapshot()
            .into_iter()
            .filter(|pipeline| !pipeline.status().is_terminal())
            .collect();

        if live.is_empty() {
            debug!("No live pipelines to kill on shutdown");
            return;
        }

        info!("Killing {} live pipeline(s) on shutdown", live.len());

        let mut kills = JoinSet::new();
        for pipeline in live {
            kills.spawn(async move {
                let id = pipeline.id();
                (id, pipeline.kill().await)
            });
        }

        while let Some(joined) = kills.join_next().await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((id, Err(e))) => error!("Failed to kill pipeline {} on shutdown: {}", id, e),
                Err(e) => error!("Kill task failed on shutdown: {}", e),
            }
        }
    }
}
