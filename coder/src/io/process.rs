//! Running lint and compile commands with timeouts and bounded output.

use std::io::Read;
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// Returned when a check command exceeds its timeout.
pub const TIMED_OUT: &str = "Command timed out";
/// Returned when a check command produced nothing on stdout or stderr.
pub const NO_OUTPUT: &str = "(no output)";

/// How long to wait for pipe readers once the child has exited and the
/// timeout budget is spent. Grandchildren can hold the pipes open indefinitely.
const DRAIN_GRACE: Duration = Duration::from_millis(100);

/// Runs a shell command line and reports its combined output as text.
///
/// Implementations never fail: spawn errors and timeouts are folded into the
/// returned text so the model can see them on the next turn.
pub trait CommandRunner {
    fn run(&self, cwd: &Path, command_line: &str) -> String;
}

/// [`CommandRunner`] that executes through `sh -c`.
#[derive(Debug, Clone)]
pub struct ShellCommandRunner {
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

impl ShellCommandRunner {
    pub fn new(timeout: Duration, output_limit_bytes: usize) -> Self {
        Self {
            timeout,
            output_limit_bytes,
        }
    }
}

impl CommandRunner for ShellCommandRunner {
    #[instrument(skip(self), fields(timeout_secs = self.timeout.as_secs()))]
    fn run(&self, cwd: &Path, command_line: &str) -> String {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command_line).current_dir(cwd);
        match run_command_with_timeout(cmd, self.timeout, self.output_limit_bytes) {
            Ok(output) if output.timed_out => TIMED_OUT.to_string(),
            Ok(output) => combined_text(&output),
            Err(err) => format!("Error running command: {err:#}"),
        }
    }
}

/// Stdout followed by stderr, trimmed, with truncation notices appended.
pub fn combined_text(output: &CommandOutput) -> String {
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&output.stdout_truncated_notice("command"));
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    text.push_str(&output.stderr_truncated_notice("command"));
    let trimmed = text.trim();
    if trimmed.is_empty() {
        NO_OUTPUT.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn stdout_truncated_notice(&self, label: &str) -> String {
        if self.stdout_truncated > 0 {
            format!(
                "\n[{label} stdout truncated {} bytes]\n",
                self.stdout_truncated
            )
        } else {
            String::new()
        }
    }

    pub fn stderr_truncated_notice(&self, label: &str) -> String {
        if self.stderr_truncated > 0 {
            format!(
                "\n[{label} stderr truncated {} bytes]\n",
                self.stderr_truncated
            )
        } else {
            String::new()
        }
    }
}

/// Run a command with a timeout and capture stdout/stderr without risking pipe deadlocks.
///
/// Output is read concurrently while the child runs. `output_limit_bytes` bounds the amount of
/// stdout/stderr stored in memory (bytes beyond this are discarded while still draining the pipe).
/// Readers still blocked after the deadline, e.g. on a pipe inherited by a grandchild, are
/// abandoned and their output dropped.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), output_limit_bytes))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    let deadline = Instant::now() + timeout;
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let stdout_rx = spawn_reader(stdout, output_limit_bytes);
    let stderr_rx = spawn_reader(stderr, output_limit_bytes);

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!(
                timeout_secs = timeout.as_secs(),
                "command timed out, killing"
            );
            timed_out = true;
            child.kill().context("kill command")?;
            child.wait().context("wait command after kill")?
        }
    };

    let (stdout, stdout_truncated) =
        collect_output(&stdout_rx, deadline).context("collect stdout")?;
    let (stderr, stderr_truncated) =
        collect_output(&stderr_rx, deadline).context("collect stderr")?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

type StreamResult = Result<(Vec<u8>, usize)>;

fn spawn_reader<R: Read + Send + 'static>(reader: R, limit: usize) -> Receiver<StreamResult> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        // Receiver is gone once the deadline passed; nothing left to deliver to.
        let _ = tx.send(read_stream_limited(reader, limit));
    });
    rx
}

fn collect_output(rx: &Receiver<StreamResult>, deadline: Instant) -> StreamResult {
    let wait = deadline
        .saturating_duration_since(Instant::now())
        .max(DRAIN_GRACE);
    match rx.recv_timeout(wait) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => {
            warn!("output pipe still open after deadline, dropping captured output");
            Ok((Vec::new(), 0))
        }
        Err(RecvTimeoutError::Disconnected) => Err(anyhow!("output reader thread panicked")),
    }
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((buf, truncated))
}
