//! One-shot agent run (`agentgate run`).

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use agentgate::config::GateConfig;
use agentgate::execution::{ExecutionStatus, Executor};
use agentgate::gate::ExecutionGate;

pub async fn cmd_run(
    config: &GateConfig,
    agent: &str,
    repo: &str,
    query: &str,
    timeout_secs: Option<u64>,
    json: bool,
) -> Result<()> {
    config.validate().context("Invalid configuration")?;
    let gate = Arc::new(ExecutionGate::new(config.lock_stall_warning()));
    let executor = Executor::from_config(config, gate)?;

    let timeout = timeout_secs
        .map(Duration::from_secs)
        .unwrap_or_else(|| config.query_timeout());
    let report = executor.run(agent, repo, query, timeout).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report.output);
        if !report.output.is_empty() && !report.output.ends_with('\n') {
            println!();
        }
        eprintln!(
            "status: {:?} ({}, exit {}, {} ms, {} auto-responses)",
            report.status,
            report.terminal_state,
            report
                .exit_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "-".to_string()),
            report.elapsed_ms,
            report.auto_responses,
        );
    }

    match report.status {
        ExecutionStatus::Success | ExecutionStatus::PartialSuccess => Ok(()),
        _ => anyhow::bail!(
            "Agent run ended with {}{}",
            report.terminal_state,
            report
                .error
                .as_deref()
                .map(|e| format!(": {}", e))
                .unwrap_or_default()
        ),
    }
}
