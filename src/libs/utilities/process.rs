// Process launching.
//
// `ProcessLauncher` is the seam between the orchestrator and whatever actually starts a
// process. `LocalLauncher` runs it on this host with `std::process`, capturing stdout and
// stderr on helper threads while the calling thread polls for exit, the wall-clock timeout
// and cancellation. A killed child is always reaped within a bounded time.

use crate::error::ExecutionError;
use crate::libs::utilities::cancel::CancellationToken;
use crate::schemas::execution::{ExecutionRequest, ProcessOutput};
use crate::{log_debug, log_warn};
use colored::Colorize;
use std::io::{Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(10);
const REAP_TIMEOUT: Duration = Duration::from_secs(5);
const READER_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// How a launcher runs processes. Only a direct launcher is trusted to forward stdin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LauncherKind {
    /// Runs the process directly on the host.
    Direct,
    /// Runs the process inside a container; the tool is found through `PATH`.
    Container,
    /// A wrapping launcher supplied by a host plugin; may drop stdin.
    Plugin,
}

pub trait ProcessLauncher: Send + Sync {
    fn kind(&self) -> LauncherKind;

    /// Runs the request to completion and returns its exit code and captured output.
    fn launch(&self, request: &ExecutionRequest) -> Result<ProcessOutput, ExecutionError>;
}

/// Launches processes on the local host.
#[derive(Debug, Clone, Default)]
pub struct LocalLauncher {
    cancel: CancellationToken,
}

impl LocalLauncher {
    pub fn new() -> Self {
        LocalLauncher::default()
    }

    /// Kills running processes once `cancel` fires.
    pub fn with_cancellation(cancel: CancellationToken) -> Self {
        LocalLauncher { cancel }
    }
}

impl ProcessLauncher for LocalLauncher {
    fn kind(&self) -> LauncherKind {
        LauncherKind::Direct
    }

    fn launch(&self, request: &ExecutionRequest) -> Result<ProcessOutput, ExecutionError> {
        let program = request.command_line.program().to_string();
        if self.cancel.is_cancelled() {
            return Err(ExecutionError::Cancelled);
        }
        log_debug!(
            "[Process] Launching {} in {}",
            request.command_line.to_string().cyan(),
            request.working_directory.display()
        );

        let mut command = Command::new(&program);
        command
            .args(request.command_line.arguments())
            .current_dir(&request.working_directory)
            .envs(&request.environment)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if request.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            });

        let mut child = command
            .spawn()
            .map_err(|source| ExecutionError::Launch {
                program: program.clone(),
                source,
            })?;

        let stdout = spawn_reader(child.stdout.take());
        let stderr = spawn_reader(child.stderr.take());

        if let (Some(payload), Some(mut stdin)) = (&request.stdin, child.stdin.take()) {
            if let Err(e) = stdin.write_all(payload.expose().as_bytes()) {
                log_warn!("[Process] Could not write stdin of '{}': {}", program, e);
            }
            // stdin is closed here.
        }

        let started = Instant::now();
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {}
                Err(source) => {
                    reap(&mut child);
                    return Err(ExecutionError::Launch { program, source });
                }
            }
            if self.cancel.is_cancelled() {
                log_warn!("[Process] Cancelled, killing '{}'", program.yellow());
                reap(&mut child);
                return Err(ExecutionError::Cancelled);
            }
            if let Some(timeout) = request.timeout {
                if started.elapsed() >= timeout {
                    log_warn!(
                        "[Process] '{}' exceeded {:?}, killing it",
                        program.yellow(),
                        timeout
                    );
                    reap(&mut child);
                    return Err(ExecutionError::TimedOut(timeout));
                }
            }
            thread::sleep(POLL_INTERVAL);
        };

        let output = ProcessOutput {
            exit_code: exit_code(&status),
            stdout: collect(stdout),
            stderr: collect(stderr),
        };
        log_debug!(
            "[Process] '{}' exited with {:?} after {:?}",
            program,
            output.exit_code,
            started.elapsed()
        );
        Ok(output)
    }
}

fn exit_code(status: &ExitStatus) -> Option<i32> {
    status.code()
}

/// Reads a pipe to the end on a helper thread.
fn spawn_reader<R: Read + Send + 'static>(pipe: Option<R>) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel();
    if let Some(mut pipe) = pipe {
        thread::spawn(move || {
            let mut buffer = Vec::new();
            let _ = pipe.read_to_end(&mut buffer);
            let _ = tx.send(String::from_utf8_lossy(&buffer).into_owned());
        });
    }
    rx
}

/// Output of a reader. Descendants that keep the pipe open cannot block us forever.
fn collect(rx: mpsc::Receiver<String>) -> String {
    rx.recv_timeout(READER_JOIN_TIMEOUT).unwrap_or_default()
}

/// Kills the child and waits (bounded) for it to be reaped.
fn reap(child: &mut Child) {
    if let Ok(Some(_)) = child.try_wait() {
        return;
    }
    let _ = child.kill();
    let deadline = Instant::now() + REAP_TIMEOUT;
    while Instant::now() < deadline {
        match child.try_wait() {
            Ok(None) => thread::sleep(POLL_INTERVAL),
            _ => return,
        }
    }
    log_warn!("[Process] Child {} could not be reaped in time", child.id());
}
