//! HTTP server command (`agentgate serve`).

use anyhow::{Context, Result};

use agentgate::config::GateConfig;

pub async fn cmd_serve(config: GateConfig) -> Result<()> {
    config.validate().context("Invalid configuration")?;
    if !config.repos.root.is_dir() {
        tracing::warn!(
            root = %config.repos.root.display(),
            "repositories root does not exist yet, every run will fail until it is created"
        );
    }
    agentgate::server::start_server(config).await
}
