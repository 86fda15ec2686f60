//! Offline prompt preview (`agentgate ticket`).

use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;

use agentgate::config::GateConfig;

pub fn cmd_ticket(config: &GateConfig, file: &Path, key: Option<&str>, json: bool) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read issue file: {}", file.display()))?;
    let issue: Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse issue JSON: {}", file.display()))?;

    let ctx = config.ticket_builder().build(key.unwrap_or_default(), &issue);
    if ctx.issue_key.is_empty() {
        anyhow::bail!("Issue has no \"key\"; pass --key");
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&ctx)?);
    } else {
        print!("{}", ctx.prompt());
    }
    if !ctx.has_affected_repositories() {
        eprintln!("note: issue lists no affected repositories");
    }
    Ok(())
}
