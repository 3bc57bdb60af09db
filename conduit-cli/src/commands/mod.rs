//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod engine;
mod pipeline;

use anyhow::Result;
use clap::Subcommand;
use conduit_client::EngineClient;
use conduit_core::domain::pipeline::PipelineId;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// List pipeline identities
    List {
        /// Only list running pipelines
        #[arg(short, long)]
        running: bool,
    },
    /// Create a pipeline from a script file
    Create {
        /// Path to the script, or `-` to read it from stdin
        script: String,

        /// Start delay, e.g. `500ms` or `1m30s`
        #[arg(short, long)]
        delay: Option<String>,

        /// Extra arguments for the executable, shell-quoted
        #[arg(short, long, allow_hyphen_values = true)]
        params: Option<String>,
    },
    /// Show pipeline details
    Get {
        /// Pipeline ID
        id: PipelineId,
    },
    /// Print the output captured so far
    Output {
        /// Pipeline ID
        id: PipelineId,
    },
    /// Kill a pipeline
    Kill {
        /// Pipeline ID
        id: PipelineId,
    },
    /// Check that the engine is alive
    Ping,
    /// Show engine metadata
    Info,
    /// Show the capabilities of the pipeline executable
    Capabilities,
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    let client = EngineClient::new(&config.engine_url);

    match command {
        Commands::List { running } => pipeline::list_pipelines(&client, running).await,
        Commands::Create {
            script,
            delay,
            params,
        } => pipeline::create_pipeline(&client, &script, delay, params).await,
        Commands::Get { id } => pipeline::get_pipeline(&client, id).await,
        Commands::Output { id } => pipeline::get_output(&client, id).await,
        Commands::Kill { id } => pipeline::kill_pipeline(&client, id).await,
        Commands::Ping => engine::ping(&client).await,
        Commands::Info => engine::info(&client).await,
        Commands::Capabilities => engine::capabilities(&client).await,
    }
}
