//! Pipeline command handlers
//!
//! Handles all pipeline-related CLI commands: creation, listing, viewing,
//! output retrieval and killing.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use colored::*;
use conduit_client::EngineClient;
use conduit_core::domain::pipeline::{PipelineId, PipelineInfo, PipelineStatus};
use conduit_core::duration::parse_duration;
use conduit_core::params::{join_params, split_params};
use std::io::{Read, Write};

/// Reads the script from a file, or from stdin when `path` is `-`
fn read_script(path: &str) -> Result<String> {
    if path == "-" {
        let mut script = String::new();
        std::io::stdin()
            .read_to_string(&mut script)
            .context("Failed to read script from stdin")?;
        return Ok(script);
    }

    std::fs::read_to_string(path).with_context(|| format!("Failed to read script file: {}", path))
}

/// Create a new pipeline
///
/// The delay and parameters are checked locally first so that typos fail
/// before anything reaches the engine.
pub async fn create_pipeline(
    client: &EngineClient,
    script_path: &str,
    delay: Option<String>,
    params: Option<String>,
) -> Result<()> {
    let script = read_script(script_path)?;
    if script.trim().is_empty() {
        anyhow::bail!("Script is empty");
    }

    if let Some(delay) = &delay {
        parse_duration(delay).with_context(|| format!("Invalid delay '{}'", delay))?;
    }

    let params = match &params {
        Some(raw) => split_params(raw)?,
        None => Vec::new(),
    };

    let pipeline = client
        .create_pipeline(&script, delay.as_deref(), &params)
        .await?;

    println!("{}", "✓ Pipeline created successfully!".green().bold());
    println!("  ID:     {}", pipeline.id.to_string().cyan());
    println!("  Status: {}", status_label(pipeline.status));
    println!("  Delay:  {}", format!("{}ms", pipeline.delay_ms).dimmed());

    Ok(())
}

/// List pipeline identities
pub async fn list_pipelines(client: &EngineClient, running: bool) -> Result<()> {
    let ids = if running {
        client.list_running().await?
    } else {
        client.list_pipelines().await?
    };

    if ids.is_empty() {
        println!("{}", "No pipelines found.".yellow());
    } else {
        println!("{}", format!("Found {} pipeline(s):", ids.len()).bold());
        for id in ids {
            println!("  {} {}", "▸".cyan(), id);
        }
    }

    Ok(())
}

/// Get and display a single pipeline
pub async fn get_pipeline(client: &EngineClient, id: PipelineId) -> Result<()> {
    let pipeline = client.get_pipeline(id).await?;

    print_pipeline_details(&pipeline);

    Ok(())
}

/// Write the captured output to stdout unchanged
pub async fn get_output(client: &EngineClient, id: PipelineId) -> Result<()> {
    let output = client.get_output(id).await?;

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&output)?;
    stdout.flush()?;

    Ok(())
}

/// Kill a pipeline
pub async fn kill_pipeline(client: &EngineClient, id: PipelineId) -> Result<()> {
    let pipeline = client.kill_pipeline(id).await?;

    println!(
        "{}",
        format!("✓ Pipeline {} is {}", pipeline.id, pipeline.status)
            .green()
            .bold()
    );

    Ok(())
}

fn status_label(status: PipelineStatus) -> ColoredString {
    let label = status.to_string();
    match status {
        PipelineStatus::Pending => label.yellow(),
        PipelineStatus::Running => label.cyan(),
        PipelineStatus::Finished => label.green(),
        PipelineStatus::Failed => label.red(),
        PipelineStatus::Killed => label.magenta(),
    }
}

/// Print detailed pipeline information
fn print_pipeline_details(pipeline: &PipelineInfo) {
    let format_time =
        |time: &DateTime<Utc>| time.format("%Y-%m-%d %H:%M:%S").to_string();

    println!("{}", "Pipeline Details:".bold());
    println!("  ID:        {}", pipeline.id.to_string().cyan());
    println!("  Status:    {}", status_label(pipeline.status));
    println!("  Delay:     {}ms", pipeline.delay_ms);
    println!("  Created:   {}", format_time(&pipeline.created_at));
    if let Some(started) = &pipeline.started_at {
        println!("  Started:   {}", format_time(started));
    }
    if let Some(finished) = &pipeline.finished_at {
        println!("  Finished:  {}", format_time(finished));
    }
    if let Some(pid) = pipeline.pid {
        println!("  PID:       {}", pid);
    }
    if let Some(code) = pipeline.exit_code {
        println!("  Exit code: {}", code);
    }
    if let Some(error) = &pipeline.error {
        println!("  Error:     {}", error.red());
    }
    if !pipeline.definition.params.is_empty() {
        println!(
            "  Params:    {}",
            join_params(&pipeline.definition.params)
        );
    }

    println!("\n{}", "Script:".bold());
    println!("{}", "─".repeat(80).dimmed());
    println!("{}", pipeline.definition.script);
    println!("{}", "─".repeat(80).dimmed());
}
