//! Repository-scoped agent execution.
//!
//! [`Executor::prepare`] validates the repository and agent before anything
//! is locked; [`Executor::execute`] takes the repository's gate, runs the
//! agent through the prompt automator and turns the outcome into an
//! [`ExecutionReport`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::{AgentProfile, GateConfig};
use crate::errors::{ConfigError, ExecutionError};
use crate::gate::ExecutionGate;
use crate::process::{ExecutionResult, ProcessRunner, ProcessSpec, TerminalState};
use crate::prompt::PromptAutomator;

/// A validated, ready-to-run agent invocation. Only [`Executor::prepare`]
/// builds one, so `working_dir` is always an existing directory inside the
/// repositories root.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    repo_id: String,
    agent: String,
    working_dir: PathBuf,
    program: String,
    args: Vec<String>,
    env: Vec<(String, String)>,
    input: Option<String>,
    timeout: Duration,
    automator: PromptAutomator,
}

impl ExecutionRequest {
    pub fn repo_id(&self) -> &str {
        &self.repo_id
    }

    pub fn agent(&self) -> &str {
        &self.agent
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self
    }

    fn spec(&self) -> ProcessSpec {
        let mut spec = ProcessSpec::new(&self.program, &self.working_dir, self.timeout)
            .args(self.args.iter().cloned());
        for (key, value) in &self.env {
            spec = spec.env(key, value);
        }
        if let Some(input) = &self.input {
            spec = spec.input(input);
        }
        spec
    }
}

/// Outcome category reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    PartialSuccess,
    Timeout,
    Error,
}

impl ExecutionStatus {
    pub fn from_result(result: &ExecutionResult) -> Self {
        match result.state {
            TerminalState::Completed if result.exit_code == Some(0) => Self::Success,
            TerminalState::Completed if !result.combined.trim().is_empty() => {
                Self::PartialSuccess
            }
            TerminalState::Completed => Self::Error,
            TerminalState::TimedOut => Self::Timeout,
            TerminalState::LaunchFailed | TerminalState::PromptLoopExceeded => Self::Error,
        }
    }
}

/// What a caller gets back for one execution.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    pub execution_id: Uuid,
    pub repo: String,
    pub agent: String,
    pub status: ExecutionStatus,
    pub terminal_state: TerminalState,
    /// Interleaved stdout and stderr.
    pub output: String,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub elapsed_ms: u64,
    pub auto_responses: usize,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionReport {
    fn new(
        execution_id: Uuid,
        request: &ExecutionRequest,
        started_at: DateTime<Utc>,
        result: ExecutionResult,
    ) -> Self {
        let status = ExecutionStatus::from_result(&result);
        let error = match result.state {
            TerminalState::LaunchFailed => Some(format!(
                "Failed to launch '{}': {}",
                request.program,
                result.launch_error.as_deref().unwrap_or("unknown error")
            )),
            TerminalState::TimedOut => Some(format!(
                "Agent timed out after {}s",
                request.timeout.as_secs_f64()
            )),
            TerminalState::PromptLoopExceeded => Some(format!(
                "Agent kept prompting after {} automatic responses",
                result.auto_responses
            )),
            TerminalState::Completed => None,
        };

        Self {
            execution_id,
            repo: request.repo_id.clone(),
            agent: request.agent.clone(),
            status,
            terminal_state: result.state,
            output: result.combined,
            stdout: result.stdout,
            stderr: result.stderr,
            exit_code: result.exit_code,
            elapsed_ms: result.elapsed.as_millis() as u64,
            auto_responses: result.auto_responses,
            started_at,
            error,
        }
    }
}

/// Runs agents against repositories under `repos_root`, one at a time per
/// repository.
#[derive(Debug, Clone)]
pub struct Executor {
    repos_root: PathBuf,
    gate: Arc<ExecutionGate>,
    automator: PromptAutomator,
    agents: BTreeMap<String, AgentProfile>,
}

impl Executor {
    pub fn new(
        repos_root: PathBuf,
        gate: Arc<ExecutionGate>,
        automator: PromptAutomator,
        agents: BTreeMap<String, AgentProfile>,
    ) -> Self {
        Self {
            repos_root,
            gate,
            automator,
            agents,
        }
    }

    pub fn from_config(config: &GateConfig, gate: Arc<ExecutionGate>) -> Result<Self, ConfigError> {
        let automator = PromptAutomator::new(
            ProcessRunner::new(config.drain_grace()),
            config.prompts.clone(),
            config.limits.max_auto_responses,
        )?;
        Ok(Self::new(
            config.repos.root.clone(),
            gate,
            automator,
            config.agents.clone(),
        ))
    }

    pub fn repos_root(&self) -> &Path {
        &self.repos_root
    }

    pub fn gate(&self) -> &Arc<ExecutionGate> {
        &self.gate
    }

    pub fn agent(&self, name: &str) -> Option<&AgentProfile> {
        self.agents.get(name)
    }

    /// Canonical directory of repository `name`.
    pub fn resolve_repo(&self, name: &str) -> Result<PathBuf, ExecutionError> {
        validate_repo_name(name)?;

        let root = self
            .repos_root
            .canonicalize()
            .map_err(|source| ExecutionError::ReposRootUnavailable {
                path: self.repos_root.clone(),
                source,
            })?;

        let not_found = || ExecutionError::RepoNotFound {
            name: name.to_string(),
        };
        let path = root.join(name).canonicalize().map_err(|_| not_found())?;
        if !path.starts_with(&root) || path == root {
            return Err(ExecutionError::InvalidRepoName {
                name: name.to_string(),
                reason: "resolves outside the repositories root",
            });
        }
        if !path.is_dir() {
            return Err(not_found());
        }
        Ok(path)
    }

    /// Validate everything about a run without touching the gate.
    pub fn prepare(
        &self,
        agent: &str,
        repo: &str,
        prompt: &str,
        timeout: Duration,
    ) -> Result<ExecutionRequest, ExecutionError> {
        let profile = self
            .agents
            .get(agent)
            .ok_or_else(|| ExecutionError::UnknownAgent(agent.to_string()))?;
        let working_dir = self.resolve_repo(repo)?;
        let automator = self.automator.with_extra_patterns(&profile.prompts)?;

        Ok(ExecutionRequest {
            repo_id: repo.to_string(),
            agent: agent.to_string(),
            working_dir,
            program: profile.program.clone(),
            args: profile.render_args(prompt),
            env: profile.env(),
            input: None,
            timeout,
            automator,
        })
    }

    /// Wait for the repository, run the agent and report. Never fails: every
    /// outcome of the run itself is a status on the report.
    pub async fn execute(&self, request: ExecutionRequest) -> ExecutionReport {
        let execution_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "execution",
            %execution_id,
            repo = %request.repo_id,
            agent = %request.agent,
        );

        async move {
            let guard = self.gate.acquire(&request.repo_id).await;
            let started_at = Utc::now();
            let spec = request.spec();
            tracing::info!(
                command = %spec.display(),
                timeout_secs = request.timeout.as_secs_f64(),
                "starting agent"
            );

            let result = request.automator.run(&spec).await;
            let lock_held = guard.held_for();
            self.gate.release(guard);

            let report = ExecutionReport::new(execution_id, &request, started_at, result);
            tracing::info!(
                status = ?report.status,
                state = %report.terminal_state,
                exit_code = ?report.exit_code,
                elapsed_ms = report.elapsed_ms,
                auto_responses = report.auto_responses,
                lock_held_ms = lock_held.as_millis() as u64,
                "agent finished"
            );
            report
        }
        .instrument(span)
        .await
    }

    /// `prepare` followed by `execute`.
    pub async fn run(
        &self,
        agent: &str,
        repo: &str,
        prompt: &str,
        timeout: Duration,
    ) -> Result<ExecutionReport, ExecutionError> {
        let request = self.prepare(agent, repo, prompt, timeout)?;
        Ok(self.execute(request).await)
    }
}

fn validate_repo_name(name: &str) -> Result<(), ExecutionError> {
    let reason = if name.trim().is_empty() {
        Some("name is empty")
    } else if name.contains(['/', '\\']) {
        Some("contains a path separator")
    } else if name.contains("..") {
        Some("contains '..'")
    } else if name.starts_with('.') {
        Some("starts with '.'")
    } else if name.contains('\0') {
        Some("contains a NUL byte")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(ExecutionError::InvalidRepoName {
            name: name.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}
