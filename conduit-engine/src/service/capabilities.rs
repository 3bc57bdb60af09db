//! Capabilities service
//!
//! Produces the descriptor served by `GET /capabilities`. It is discovered
//! once at startup: either by asking the pipeline executable itself, or
//! from the engine configuration.

use anyhow::{Context, Result};
use serde_json::{Value as JsonValue, json};
use std::process::Command;
use tracing::info;

use crate::config::Config;

/// Service trait for capability discovery
pub trait CapabilitiesService: Send + Sync {
    /// Discovers the capabilities of the configured pipeline executable
    fn discover(&self) -> Result<JsonValue>;
}

/// Standard implementation of CapabilitiesService
pub struct StandardCapabilitiesService {
    executable: String,
    executable_args: Vec<String>,
    capabilities_args: Vec<String>,
    default_delay_ms: u64,
}

impl StandardCapabilitiesService {
    pub fn new(config: &Config) -> Self {
        Self {
            executable: config.executable.clone(),
            executable_args: config.executable_args.clone(),
            capabilities_args: config.capabilities_args.clone(),
            default_delay_ms: u64::try_from(config.default_delay.as_millis()).unwrap_or(u64::MAX),
        }
    }

    fn static_descriptor(&self) -> JsonValue {
        json!({
            "engine": "subprocess",
            "executable": self.executable,
            "executable_args": self.executable_args,
            "default_delay_ms": self.default_delay_ms,
        })
    }

    fn query_executable(&self) -> Result<JsonValue> {
        let output = Command::new(&self.executable)
            .args(&self.capabilities_args)
            .output()
            .with_context(|| format!("Failed to execute '{}'", self.executable))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "'{}' exited with {} while reporting capabilities: {}",
                self.executable,
                output.status,
                stderr.trim()
            );
        }

        serde_json::from_slice(&output.stdout).with_context(|| {
            format!(
                "'{}' did not print its capabilities as JSON",
                self.executable
            )
        })
    }
}

impl CapabilitiesService for StandardCapabilitiesService {
    fn discover(&self) -> Result<JsonValue> {
        if self.capabilities_args.is_empty() {
            info!("No capabilities arguments configured, serving static descriptor");
            return Ok(self.static_descriptor());
        }

        info!(
            "Querying capabilities: {} {}",
            self.executable,
            self.capabilities_args.join(" ")
        );
        self.query_executable()
    }
}
