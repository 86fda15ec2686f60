//! Drives an agent past its interactive confirmations.
//!
//! The automator keeps the child's stdin open, watches the interleaved
//! stdout/stderr text for known prompt phrases and answers each occurrence
//! with its canned response followed by a newline.

use super::matcher::{PatternMatcher, PromptPattern};
use crate::errors::ConfigError;
use crate::process::{
    ExecutionResult, ProcessEvent, ProcessRunner, ProcessSpec, StdinMode, TerminalState,
    Transcript,
};

/// Default ceiling on answers per run.
pub const DEFAULT_MAX_AUTO_RESPONSES: usize = 20;

#[derive(Debug, Clone)]
pub struct PromptAutomator {
    runner: ProcessRunner,
    /// Validated template; each run works on a fresh clone.
    matcher: PatternMatcher,
    max_auto_responses: usize,
}

impl PromptAutomator {
    pub fn new(
        runner: ProcessRunner,
        patterns: Vec<PromptPattern>,
        max_auto_responses: usize,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            runner,
            matcher: PatternMatcher::new(patterns)?,
            max_auto_responses,
        })
    }

    pub fn patterns(&self) -> &[PromptPattern] {
        self.matcher.patterns()
    }

    pub fn max_auto_responses(&self) -> usize {
        self.max_auto_responses
    }

    /// Run with additional agent-specific patterns checked after the
    /// automator's own list.
    pub fn with_extra_patterns(&self, extra: &[PromptPattern]) -> Result<Self, ConfigError> {
        let mut patterns = self.patterns().to_vec();
        patterns.extend(extra.iter().cloned());
        Self::new(self.runner.clone(), patterns, self.max_auto_responses)
    }

    pub async fn run(&self, spec: &ProcessSpec) -> ExecutionResult {
        let mut matcher = self.matcher.clone();

        let mut process = match self.runner.start(spec, StdinMode::KeepOpen) {
            Ok(process) => process,
            Err(e) => {
                tracing::warn!(program = %spec.program, error = %e, "failed to launch agent");
                return ExecutionResult::launch_failed(&e);
            }
        };
        let pid = process.pid();

        let mut transcript = Transcript::default();
        let mut responses = 0usize;

        let state = 'run: loop {
            match process.next_event().await {
                ProcessEvent::Output(chunk) => {
                    transcript.push(&chunk);
                    while let Some(hit) = matcher.next_match(transcript.combined()) {
                        responses += 1;
                        if responses > self.max_auto_responses {
                            tracing::warn!(
                                ?pid,
                                limit = self.max_auto_responses,
                                "auto-response limit exceeded, stopping agent"
                            );
                            break 'run TerminalState::PromptLoopExceeded;
                        }
                        tracing::info!(
                            ?pid,
                            prompt = %matcher.patterns()[hit.pattern_index].needle,
                            response = %hit.response,
                            count = responses,
                            "answering agent prompt"
                        );
                        if !process.send_input(format!("{}\n", hit.response)) {
                            tracing::debug!(?pid, "stdin closed, response dropped");
                        }
                    }
                }
                ProcessEvent::Exited(_) => break TerminalState::Completed,
                ProcessEvent::TimedOut => {
                    tracing::warn!(?pid, timeout_secs = spec.timeout.as_secs_f64(), "agent timed out");
                    break TerminalState::TimedOut;
                }
            }
        };

        let answered = responses.min(self.max_auto_responses);
        process.finish(state, transcript, answered).await
    }
}
