//! Engine configuration
//!
//! Every setting can be given as a command-line flag or through the
//! matching `CONDUIT_*` environment variable.

use clap::Parser;
use conduit_core::duration::parse_duration;
use std::time::Duration;

/// Start delay used when a request does not specify one
pub const DEFAULT_DELAY: Duration = Duration::from_millis(200);

/// Engine configuration
#[derive(Debug, Clone, Parser)]
#[command(name = "conduit-engine")]
#[command(about = "Launches and supervises subprocess pipelines over HTTP", long_about = None)]
pub struct Config {
    /// Address the HTTP API listens on
    #[arg(long, env = "CONDUIT_BIND_ADDR", default_value = "0.0.0.0:8080")]
    pub bind_addr: String,

    /// Executable launched for every pipeline
    #[arg(long, env = "CONDUIT_EXECUTABLE", default_value = "sh")]
    pub executable: String,

    /// Arguments placed between the executable and the script
    #[arg(
        long = "executable-arg",
        env = "CONDUIT_EXECUTABLE_ARGS",
        value_delimiter = ',',
        default_value = "-c",
        allow_hyphen_values = true
    )]
    pub executable_args: Vec<String>,

    /// Start delay for pipelines created without a `delay` parameter
    #[arg(long, env = "CONDUIT_DEFAULT_DELAY", default_value = "200ms", value_parser = parse_duration)]
    pub default_delay: Duration,

    /// How long a kill waits for the process to be reaped
    #[arg(long, env = "CONDUIT_KILL_TIMEOUT", default_value = "5s", value_parser = parse_duration)]
    pub kill_timeout: Duration,

    /// Arguments that make the executable print its capabilities as JSON.
    /// Without them a static descriptor is served.
    #[arg(
        long = "capabilities-arg",
        env = "CONDUIT_CAPABILITIES_ARGS",
        value_delimiter = ',',
        allow_hyphen_values = true
    )]
    pub capabilities_args: Vec<String>,
}

impl Config {
    /// Creates a configuration with defaults for everything but the executable
    pub fn new(executable: impl Into<String>, executable_args: Vec<String>) -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            executable: executable.into(),
            executable_args,
            default_delay: DEFAULT_DELAY,
            kill_timeout: Duration::from_secs(5),
            capabilities_args: Vec::new(),
        }
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bind_addr.trim().is_empty() {
            anyhow::bail!("bind_addr cannot be empty");
        }

        if self.executable.trim().is_empty() {
            anyhow::bail!("executable cannot be empty");
        }

        if self.kill_timeout.is_zero() {
            anyhow::bail!("kill_timeout must be greater than 0");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new("sh", vec!["-c".to_string()])
    }
}
