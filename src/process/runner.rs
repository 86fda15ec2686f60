use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::group::kill_process_group;
use super::output::{OutputChunk, StreamKind, Transcript};
use super::result::{ExecutionResult, TerminalState};

const READ_BUF_SIZE: usize = 8192;
/// Chunks buffered between the pipe readers and the consumer.
const OUTPUT_CHANNEL_CAPACITY: usize = 64;

/// What to launch and how long it may run.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub env: Vec<(String, String)>,
    /// Written to stdin right after spawn.
    pub input: Option<String>,
    pub timeout: Duration,
}

impl ProcessSpec {
    pub fn new(program: impl Into<String>, working_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: working_dir.into(),
            env: Vec::new(),
            input: None,
            timeout,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn input(mut self, input: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self
    }

    pub fn display(&self) -> String {
        let mut parts = vec![self.program.clone()];
        parts.extend(self.args.iter().map(|a| {
            if a.len() > 40 {
                format!("{}…", a.chars().take(40).collect::<String>())
            } else {
                a.clone()
            }
        }));
        parts.join(" ")
    }
}

/// Whether stdin stays open after the initial input is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdinMode {
    Close,
    KeepOpen,
}

/// Something observed while a process runs.
#[derive(Debug)]
pub enum ProcessEvent {
    Output(OutputChunk),
    /// `None` when waiting on the child failed.
    Exited(Option<ExitStatus>),
    TimedOut,
}

/// Spawns agent processes and runs them to completion under a timeout.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    /// How long to keep reading after exit for output still in the pipes.
    drain_grace: Duration,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

impl ProcessRunner {
    pub fn new(drain_grace: Duration) -> Self {
        Self { drain_grace }
    }

    /// Spawn the process and its I/O tasks. The timeout clock starts here,
    /// after a successful spawn.
    pub fn start(&self, spec: &ProcessSpec, stdin_mode: StdinMode) -> std::io::Result<RunningProcess> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .current_dir(&spec.working_dir)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn()?;
        let started = Instant::now();
        let pid = child.id();

        let (out_tx, out_rx) = mpsc::channel(OUTPUT_CHANNEL_CAPACITY);
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(read_stream(stdout, StreamKind::Stdout, out_tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(read_stream(stderr, StreamKind::Stderr, out_tx));
        }

        let mut input = None;
        if let Some(stdin) = child.stdin.take() {
            let (in_tx, in_rx) = mpsc::unbounded_channel::<String>();
            tokio::spawn(write_input(stdin, in_rx));
            if let Some(text) = &spec.input {
                let _ = in_tx.send(text.clone());
            }
            if stdin_mode == StdinMode::KeepOpen {
                input = Some(in_tx);
            }
        }

        tracing::debug!(pid = ?pid, command = %spec.display(), "process spawned");

        Ok(RunningProcess {
            child,
            pid,
            output: out_rx,
            input,
            started,
            deadline: started + spec.timeout,
            exited: None,
            streams_open: true,
            drain_grace: self.drain_grace,
        })
    }

    /// Run a non-interactive process: write the input, close stdin, collect
    /// output until exit or timeout.
    pub async fn run(&self, spec: &ProcessSpec) -> ExecutionResult {
        let mut process = match self.start(spec, StdinMode::Close) {
            Ok(process) => process,
            Err(e) => {
                tracing::warn!(program = %spec.program, error = %e, "failed to launch process");
                return ExecutionResult::launch_failed(&e);
            }
        };

        let mut transcript = Transcript::default();
        let state = loop {
            match process.next_event().await {
                ProcessEvent::Output(chunk) => transcript.push(&chunk),
                ProcessEvent::Exited(_) => break TerminalState::Completed,
                ProcessEvent::TimedOut => break TerminalState::TimedOut,
            }
        };

        process.finish(state, transcript, 0).await
    }
}

/// A spawned child with its output channel and optional input writer.
pub struct RunningProcess {
    child: Child,
    pid: Option<u32>,
    output: mpsc::Receiver<OutputChunk>,
    input: Option<mpsc::UnboundedSender<String>>,
    started: Instant,
    deadline: Instant,
    exited: Option<ExitStatus>,
    streams_open: bool,
    drain_grace: Duration,
}

impl RunningProcess {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Wait for the next output chunk, the exit, or the deadline.
    ///
    /// The deadline wins over everything, so a child that never stops
    /// printing is still cut off on time. Output is preferred over exit so
    /// chunks already read are never lost. Once the process has exited,
    /// callers should stop and call `finish`.
    pub async fn next_event(&mut self) -> ProcessEvent {
        loop {
            tokio::select! {
                biased;
                _ = tokio::time::sleep_until(self.deadline) => return ProcessEvent::TimedOut,
                chunk = self.output.recv(), if self.streams_open => match chunk {
                    Some(chunk) => return ProcessEvent::Output(chunk),
                    None => self.streams_open = false,
                },
                status = self.child.wait(), if self.exited.is_none() => {
                    return match status {
                        Ok(status) => {
                            self.exited = Some(status);
                            ProcessEvent::Exited(Some(status))
                        }
                        Err(e) => {
                            tracing::warn!(pid = ?self.pid, error = %e, "failed to wait on process");
                            ProcessEvent::Exited(None)
                        }
                    };
                }
            }
        }
    }

    /// Queue text for the child's stdin. Returns false once stdin is closed.
    pub fn send_input(&self, text: impl Into<String>) -> bool {
        self.input
            .as_ref()
            .map(|tx| tx.send(text.into()).is_ok())
            .unwrap_or(false)
    }

    /// Kill the whole process group and reap the child.
    pub async fn terminate(&mut self) {
        if let Some(pid) = self.pid
            && let Err(e) = kill_process_group(pid)
        {
            tracing::warn!(pid, error = %e, "failed to kill process group");
        }
        if self.exited.is_none() {
            if let Err(e) = self.child.start_kill() {
                tracing::debug!(pid = ?self.pid, error = %e, "direct kill failed");
            }
            match self.child.wait().await {
                Ok(status) => self.exited = Some(status),
                Err(e) => tracing::warn!(pid = ?self.pid, error = %e, "failed to reap process"),
            }
        }
    }

    /// Stop the process if `state` requires it, collect the output still in
    /// flight, kill whatever is left of the process group, and build the
    /// result. Nothing the child started outlives this call.
    pub async fn finish(
        mut self,
        state: TerminalState,
        mut transcript: Transcript,
        auto_responses: usize,
    ) -> ExecutionResult {
        self.input = None;
        if state != TerminalState::Completed {
            self.terminate().await;
        }

        let grace_until = Instant::now() + self.drain_grace;
        while self.streams_open {
            match tokio::time::timeout_at(grace_until, self.output.recv()).await {
                Ok(Some(chunk)) => transcript.push(&chunk),
                Ok(None) => self.streams_open = false,
                Err(_) => break,
            }
        }
        if self.streams_open {
            tracing::debug!(pid = ?self.pid, "pipes still open after exit, killing process group");
        }
        // Descendants may have detached from the pipes; the group outlives
        // its leader either way.
        self.terminate().await;
        transcript.finish();

        let elapsed = self.started.elapsed();
        let exit_code = self.exited.and_then(|s| s.code());
        tracing::debug!(pid = ?self.pid, %state, ?exit_code, elapsed_ms = elapsed.as_millis() as u64, "process finished");

        let (stdout, stderr, combined) = transcript.into_parts();
        ExecutionResult {
            state,
            exit_code,
            stdout,
            stderr,
            combined,
            elapsed,
            auto_responses,
            launch_error: None,
        }
    }
}

async fn read_stream<R>(mut reader: R, kind: StreamKind, tx: mpsc::Sender<OutputChunk>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_BUF_SIZE];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let chunk = OutputChunk {
                    kind,
                    bytes: buf[..n].to_vec(),
                };
                if tx.send(chunk).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::debug!(?kind, error = %e, "output stream read failed");
                break;
            }
        }
    }
}

async fn write_input(mut stdin: ChildStdin, mut rx: mpsc::UnboundedReceiver<String>) {
    while let Some(text) = rx.recv().await {
        if let Err(e) = stdin.write_all(text.as_bytes()).await {
            tracing::debug!(error = %e, "stdin closed by child");
            return;
        }
        if let Err(e) = stdin.flush().await {
            tracing::debug!(error = %e, "stdin flush failed");
            return;
        }
    }
    let _ = stdin.shutdown().await;
}
