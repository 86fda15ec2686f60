use std::time::Duration;

use serde::Serialize;

/// Final classification of one execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalState {
    /// The process exited on its own (any exit code).
    Completed,
    /// The wall-clock budget ran out and the process group was killed.
    TimedOut,
    /// The process could not be started.
    LaunchFailed,
    /// The auto-response ceiling was hit and the process group was killed.
    PromptLoopExceeded,
}

impl TerminalState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::TimedOut => "timed_out",
            Self::LaunchFailed => "launch_failed",
            Self::PromptLoopExceeded => "prompt_loop_exceeded",
        }
    }
}

impl std::fmt::Display for TerminalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything observed from one agent process.
///
/// Output is always populated with whatever was captured, regardless of
/// `state`. Callers decide what counts as success.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub state: TerminalState,
    /// `None` when the process never started or was killed by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    /// Stdout and stderr interleaved in arrival order.
    pub combined: String,
    pub elapsed: Duration,
    pub auto_responses: usize,
    /// Spawn error message for `LaunchFailed`.
    pub launch_error: Option<String>,
}

impl ExecutionResult {
    pub fn launch_failed(error: &std::io::Error) -> Self {
        Self {
            state: TerminalState::LaunchFailed,
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            combined: String::new(),
            elapsed: Duration::ZERO,
            auto_responses: 0,
            launch_error: Some(error.to_string()),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.state == TerminalState::Completed && self.exit_code == Some(0)
    }
}
