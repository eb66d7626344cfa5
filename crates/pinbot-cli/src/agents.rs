use std::path::Path;

use anyhow::{Context, Result};

use pinbot_config::PinbotConfig;
use pinbot_types::{AgentProfile, ControlAction};

use crate::app::App;

pub fn read_profile(path: &Path) -> Result<AgentProfile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    json5::from_str(&content).with_context(|| format!("invalid profile in {}", path.display()))
}

pub async fn add(config: PinbotConfig, file: &Path) -> Result<()> {
    let profile = read_profile(file)?;
    let app = App::build(config).await?;
    let agent = app.service.register(profile).await?;
    app.service.request(&agent.id, ControlAction::Schedule).await?;

    println!("Onboarded {} ({})", agent.nickname, agent.id);
    println!("  username: {}", agent.username);
    println!("  functions: {}", agent.functions.join(", "));
    println!("  scheduling queued for `pinbot run`");
    Ok(())
}

pub async fn list(config: PinbotConfig) -> Result<()> {
    let app = App::build(config).await?;
    let agents = app.service.list_agents().await?;
    if agents.is_empty() {
        println!("No agents.");
        return Ok(());
    }
    for agent in agents {
        let windows = agent
            .intervals
            .iter()
            .map(|i| {
                format!(
                    "{}-{}@{}/h",
                    i.start.format("%H:%M"),
                    i.end.format("%H:%M"),
                    i.actions_per_hour
                )
            })
            .collect::<Vec<_>>()
            .join(" ");
        println!(
            "{}  {:<16} {:<8} [{}]  {}",
            agent.id,
            agent.nickname,
            agent.status(),
            agent.functions.join(","),
            windows
        );
    }
    Ok(())
}

/// Queue `action` for the running scheduler. Requests made while no
/// scheduler runs are applied when `pinbot run` next starts.
pub async fn control(config: PinbotConfig, id: &str, action: ControlAction) -> Result<()> {
    let app = App::build(config).await?;
    let request = app.service.request(id, action).await?;
    println!("Queued {} for {id} (request {request})", action.as_str());
    Ok(())
}

pub async fn health(config: PinbotConfig) -> Result<()> {
    println!("pinbot configuration");
    println!("  server: {}", config.platform.server_uri);
    println!("  oracle model: {}", config.oracle.model);
    println!("  oracle key: {}", if config.oracle.api_key.is_some() { "set" } else { "missing" });
    println!("  workers: {}", config.engine.workers);

    let sort = config.engine.browse.sort.clone();
    let app = App::build(config).await?;
    println!("  agents stored: {}", app.service.list_agents().await?.len());
    match app.platform.health(&sort).await {
        Ok(n) => println!("  platform: reachable ({n} item on first page)"),
        Err(e) => println!("  platform: {e}"),
    }
    Ok(())
}
