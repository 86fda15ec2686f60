//! HTTP surface.
//!
//! | Route                     | Purpose                                   |
//! |---------------------------|-------------------------------------------|
//! | `GET /health`             | liveness                                  |
//! | `POST /claude-code`       | run the `claude` profile on a repository  |
//! | `POST /codex`             | run the `codex` profile on a repository   |
//! | `POST /agents/{agent}/run`| run any configured profile                |
//! | `POST /jira/issue`        | fetch and summarize a Jira issue          |
//! | `POST /jira/execute`      | run an agent on a Jira issue              |

pub mod api;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::GateConfig;
use crate::execution::Executor;
use crate::gate::ExecutionGate;
use crate::ticket::{IssueSource, JiraRestSource};

pub use api::{AppState, SharedState};

pub fn build_router(state: SharedState) -> Router {
    api::api_router()
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Wire configuration into the shared handler state.
pub fn build_state(config: &GateConfig) -> Result<AppState> {
    let gate = Arc::new(ExecutionGate::new(config.lock_stall_warning()));
    let executor =
        Executor::from_config(config, gate).context("Invalid agent or prompt configuration")?;

    let issues: Option<Arc<dyn IssueSource>> = if config.jira.is_configured() {
        let source = JiraRestSource::from_config(&config.jira)
            .context("Failed to set up Jira client")?;
        tracing::info!(base_url = source.base_url(), "Jira issue source configured");
        Some(Arc::new(source))
    } else {
        tracing::info!("Jira credentials not configured, /jira routes will return 500");
        None
    };

    Ok(AppState {
        executor,
        issues,
        tickets: config.ticket_builder(),
        query_timeout: config.query_timeout(),
        ticket_timeout: config.ticket_timeout(),
    })
}

pub async fn start_server(config: GateConfig) -> Result<()> {
    let state = Arc::new(build_state(&config)?);
    let mut app = build_router(state);
    if config.server.cors {
        app = app.layer(CorsLayer::permissive());
    }

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    tracing::info!(
        addr = %local_addr,
        repos_root = %config.repos.root.display(),
        agents = ?config.agents.keys().collect::<Vec<_>>(),
        "agentgate listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c, shutdown only by kill");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
