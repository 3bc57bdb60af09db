//! Engine command handlers

use anyhow::Result;
use colored::*;
use conduit_client::EngineClient;

/// Check that the engine answers
pub async fn ping(client: &EngineClient) -> Result<()> {
    let reply = client.ping().await?;

    println!(
        "{} {}",
        "✓ Engine is alive:".green().bold(),
        reply.trim().dimmed()
    );

    Ok(())
}

/// Display engine metadata
pub async fn info(client: &EngineClient) -> Result<()> {
    let info = client.info().await?;

    println!("{}", "Engine:".bold());
    println!("  Name:       {} {}", info.name.cyan(), info.version.dimmed());
    println!("  Instance:   {}", info.instance_id.to_string().dimmed());
    println!(
        "  Started:    {} (up {}s)",
        info.started_at.format("%Y-%m-%d %H:%M:%S"),
        info.uptime_seconds
    );
    println!(
        "  Executable: {} {}",
        info.executable.bold(),
        info.executable_args.join(" ")
    );
    println!("  Delay:      {}ms", info.default_delay_ms);
    println!(
        "  Pipelines:  {} ({} running)",
        info.pipelines,
        info.running.to_string().cyan()
    );

    Ok(())
}

/// Print the capability descriptor as pretty JSON
pub async fn capabilities(client: &EngineClient) -> Result<()> {
    let capabilities = client.capabilities().await?;

    println!("{}", serde_json::to_string_pretty(&capabilities)?);

    Ok(())
}
