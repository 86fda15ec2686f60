//! Configuration view and validation commands (`agentgate config`).

use std::path::Path;

use anyhow::{Context, Result};

use agentgate::config::GateConfig;

use super::super::ConfigCommands;

pub fn cmd_config(
    config_path: &Path,
    loaded: Result<GateConfig>,
    command: Option<ConfigCommands>,
) -> Result<()> {
    let source = if config_path.exists() {
        format!("# Config file: {}", config_path.display())
    } else {
        format!(
            "# Config file: {} (not found, using defaults)",
            config_path.display()
        )
    };

    match command {
        None | Some(ConfigCommands::Show) => {
            let config = loaded?;
            let rendered = toml::to_string_pretty(&config.redacted())
                .context("Failed to render configuration")?;
            println!("{}", source);
            println!();
            print!("{}", rendered);
        }
        Some(ConfigCommands::Validate) => {
            let config = loaded?;
            config.validate()?;
            println!("{}", source);
            println!("Configuration is valid.");
            println!("  repositories root: {}", config.repos.root.display());
            println!(
                "  agents: {}",
                config.agents.keys().cloned().collect::<Vec<_>>().join(", ")
            );
            println!(
                "  jira: {}",
                if config.jira.is_configured() {
                    "configured"
                } else {
                    "not configured"
                }
            );
        }
    }
    Ok(())
}
