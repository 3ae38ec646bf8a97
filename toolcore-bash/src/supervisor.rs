//! Foreground and background shell execution under process-group isolation.
//!
//! Every spawned child becomes the leader of its own process group so a
//! timeout or cancellation can be turned into a single `killpg` against the
//! whole subtree rather than chasing descendants one at a time.

use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::time::timeout as tokio_timeout;

use crate::process_group::{self, KillSignal};

/// Environment variable injected into every child spawned by the supervisor.
pub const SKETCH_ENV_VAR: &str = "SKETCH";

/// Output cap for foreground invocations, per `MaxOut`.
pub const MAX_OUT_BYTES: usize = 128 * 1024;

/// Number of leading bytes quoted in an overflow message.
const OVERFLOW_SAMPLE_BYTES: usize = 1024;

/// Tiered timeouts applied to bash invocations. A zero duration is treated
/// as "unset" and falls back to the corresponding default.
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    pub fast: Duration,
    pub slow: Duration,
    pub background: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            fast: Duration::from_secs(30),
            slow: Duration::from_secs(15 * 60),
            background: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl Timeouts {
    fn resolve(configured: Duration, default: Duration) -> Duration {
        if configured.is_zero() {
            default
        } else {
            configured
        }
    }

    /// Effective timeout for a request, per the derivation rule in the data model.
    pub fn for_request(&self, request: &BashRequest) -> Duration {
        let defaults = Timeouts::default();
        if request.background {
            Self::resolve(self.background, defaults.background)
        } else if request.slow_ok {
            Self::resolve(self.slow, defaults.slow)
        } else {
            Self::resolve(self.fast, defaults.fast)
        }
    }
}

/// A request to run a shell command.
#[derive(Debug, Clone)]
pub struct BashRequest {
    pub command: String,
    pub slow_ok: bool,
    pub background: bool,
}

/// A handle to a detached background command.
#[derive(Debug, Clone)]
pub struct BackgroundHandle {
    pub pid: u32,
    pub stdout_path: PathBuf,
    pub stderr_path: PathBuf,
}

/// Reasons a foreground invocation can fail, in the precedence order the
/// supervisor checks them.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("timed out after {elapsed:?}")]
    Timeout {
        elapsed: Duration,
        partial_output: String,
    },
    #[error("{message}")]
    Overflow { message: String },
    #[error("command exited with {underlying}")]
    ExitNonZero { underlying: String, output: String },
    #[error("internal error: {0}")]
    Internal(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Format the overflow message: the *entire* output is replaced by this
/// string, carrying only the byte counts and a sample of the start.
fn overflow_message(total_len: usize, sample: &[u8]) -> String {
    let sample_len = sample.len().min(OVERFLOW_SAMPLE_BYTES);
    let sample_text = String::from_utf8_lossy(&sample[..sample_len]);
    format!(
        "output too long: got {total_len} bytes, max is {MAX_OUT_BYTES} bytes\ninitial bytes of output:\n{sample_text}"
    )
}

/// Spawn `bash -c <command>` in a new process group, inheriting `cwd` and
/// extending the environment with `SKETCH=1`.
fn build_command(command: &str, cwd: &str) -> Command {
    let mut cmd = Command::new("bash");
    cmd.arg("-c").arg(command);
    if !cwd.is_empty() {
        cmd.current_dir(cwd);
    }
    cmd.env(SKETCH_ENV_VAR, "1");
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        unsafe {
            cmd.pre_exec(|| process_group::set_process_group());
        }
    }

    cmd
}

/// Read combined stdout+stderr into a single buffer capped at `MAX_OUT_BYTES`.
/// Returns `Ok(bytes)` normally, or `Err(overflow message)` the moment the cap
/// is exceeded — the caller must treat overflow as replacing the *entire*
/// output, not just the tail.
async fn read_capped(
    mut stdout: tokio::process::ChildStdout,
    mut stderr: tokio::process::ChildStderr,
) -> Result<Vec<u8>, String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    let mut stdout_done = false;
    let mut stderr_done = false;

    loop {
        if stdout_done && stderr_done {
            break;
        }
        tokio::select! {
            n = stdout.read(&mut chunk), if !stdout_done => {
                match n {
                    Ok(0) => stdout_done = true,
                    Ok(n) => buf.extend_from_slice(&chunk[..n]),
                    Err(_) => stdout_done = true,
                }
            }
            n = stderr.read(&mut chunk), if !stderr_done => {
                match n {
                    Ok(0) => stderr_done = true,
                    Ok(n) => buf.extend_from_slice(&chunk[..n]),
                    Err(_) => stderr_done = true,
                }
            }
        }
        if buf.len() > MAX_OUT_BYTES {
            return Err(overflow_message(buf.len(), &buf));
        }
    }
    Ok(buf)
}

/// Run a foreground bash command to completion, enforcing the derived
/// timeout and the output cap, and reporting failures in precedence order:
/// timeout, then overflow, then non-zero exit.
pub async fn run_foreground(
    request: &BashRequest,
    cwd: &str,
    timeouts: &Timeouts,
) -> Result<String, SupervisorError> {
    let budget = timeouts.for_request(request);
    let mut command = build_command(&request.command, cwd);
    let start = Instant::now();

    let mut child = command.spawn()?;
    let pid = child.id();
    let stdout = child.stdout.take().expect("piped stdout");
    let stderr = child.stderr.take().expect("piped stderr");

    let read_task = tokio::spawn(read_capped(stdout, stderr));

    let wait_result = tokio_timeout(budget, child.wait()).await;

    match wait_result {
        Err(_elapsed) => {
            tracing::warn!(?pid, budget = ?budget, "bash command timed out; killing process group");
            if let Some(pid) = pid {
                let _ = process_group::kill_process_group_by_pid_with_signal(pid, KillSignal::Kill);
            }
            let _ = child.wait().await;
            let partial = read_task
                .await
                .ok()
                .and_then(|r| r.ok())
                .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
                .unwrap_or_default();
            reap_zombies(pid);
            Err(SupervisorError::Timeout {
                elapsed: start.elapsed(),
                partial_output: partial,
            })
        }
        Ok(Ok(status)) => {
            let output_result = read_task.await.map_err(|e| {
                SupervisorError::Internal(format!("output reader task failed: {e}"))
            })?;
            reap_zombies(pid);
            match output_result {
                Err(message) => {
                    tracing::warn!(?pid, "bash command output exceeded the cap");
                    Err(SupervisorError::Overflow { message })
                }
                Ok(bytes) => {
                    let text = String::from_utf8_lossy(&bytes).into_owned();
                    if status.success() {
                        Ok(text)
                    } else {
                        Err(SupervisorError::ExitNonZero {
                            underlying: status.to_string(),
                            output: text,
                        })
                    }
                }
            }
        }
        Ok(Err(err)) => {
            reap_zombies(pid);
            Err(SupervisorError::Io(err))
        }
    }
}

/// Non-blockingly reap any zombies left in the child's process group.
/// A no-op unless running as PID 1, where init must collect terminated
/// grandchildren itself.
#[cfg(target_os = "linux")]
fn reap_zombies(pid: Option<u32>) {
    if unsafe { libc::getpid() } != 1 {
        return;
    }
    let Some(pid) = pid else { return };
    let pgid = unsafe { libc::getpgid(pid as libc::pid_t) };
    if pgid == -1 {
        return;
    }
    const MAX_ITERATIONS: u32 = 1000;
    const BACKOFF: Duration = Duration::from_millis(100);
    for _ in 0..MAX_ITERATIONS {
        let result = unsafe { libc::waitpid(-pgid, std::ptr::null_mut(), libc::WNOHANG) };
        if result == 0 {
            std::thread::sleep(BACKOFF);
            continue;
        }
        if result == -1 {
            break;
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn reap_zombies(_pid: Option<u32>) {}

/// Spawn a background command detached from the caller. Returns immediately
/// once the temp directory, output files, and child process exist; the
/// reaper and deadline watcher continue independently.
pub async fn run_background(request: &BashRequest, cwd: &str, timeout: Duration) -> Result<BackgroundHandle> {
    let temp_dir =
        tempfile::Builder::new().prefix("sketch-bg-").tempdir().context("creating background temp dir")?;
    let dir_path = temp_dir.keep();

    let stdout_path = dir_path.join("stdout");
    let stderr_path = dir_path.join("stderr");

    let stdout_file = tokio::fs::File::create(&stdout_path).await?.into_std().await;
    let stderr_file = tokio::fs::File::create(&stderr_path).await?.into_std().await;

    let mut command = build_command(&request.command, cwd);
    command.stdout(Stdio::from(stdout_file));
    command.stderr(Stdio::from(stderr_file));

    let mut child = command.spawn().context("spawning background command")?;
    let pid = child.id().unwrap_or(0);
    tracing::info!(pid, dir = %dir_path.display(), "spawned background bash command");

    // Reaper: prevents a zombie of the direct child from accumulating.
    tokio::spawn(async move {
        let _ = child.wait().await;
    });

    // Deadline watcher: SIGKILL the group once the background timeout elapses.
    tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        if process_group::kill_process_group_by_pid_with_signal(pid, KillSignal::Kill).is_err() {
            let _ = process_group::kill_process_group_with_signal(pid, KillSignal::Kill);
        }
    });

    Ok(BackgroundHandle {
        pid,
        stdout_path,
        stderr_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn foreground_echo_succeeds() {
        let request = BashRequest {
            command: "echo 'Hello, world!'".to_string(),
            slow_ok: false,
            background: false,
        };
        let timeouts = Timeouts::default();
        let output = run_foreground(&request, "", &timeouts).await.unwrap();
        assert_eq!(output, "Hello, world!\n");
    }

    #[tokio::test]
    async fn foreground_injects_sketch_env() {
        let request = BashRequest {
            command: "printenv SKETCH".to_string(),
            slow_ok: false,
            background: false,
        };
        let timeouts = Timeouts::default();
        let output = run_foreground(&request, "", &timeouts).await.unwrap();
        assert_eq!(output.trim(), "1");
    }

    #[tokio::test]
    async fn foreground_times_out() {
        let request = BashRequest {
            command: "sleep 1 && echo x".to_string(),
            slow_ok: false,
            background: false,
        };
        let timeouts = Timeouts {
            fast: Duration::from_millis(100),
            ..Timeouts::default()
        };
        let start = Instant::now();
        let err = run_foreground(&request, "", &timeouts).await.unwrap_err();
        assert!(matches!(err, SupervisorError::Timeout { .. }));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn foreground_reports_non_zero_exit() {
        let request = BashRequest {
            command: "exit 7".to_string(),
            slow_ok: false,
            background: false,
        };
        let timeouts = Timeouts::default();
        let err = run_foreground(&request, "", &timeouts).await.unwrap_err();
        assert!(matches!(err, SupervisorError::ExitNonZero { .. }));
    }

    #[tokio::test]
    async fn foreground_overflow_replaces_entire_output() {
        let request = BashRequest {
            command: format!("head -c {} /dev/zero | tr '\\0' 'a'", MAX_OUT_BYTES + 4096),
            slow_ok: false,
            background: false,
        };
        let timeouts = Timeouts::default();
        let err = run_foreground(&request, "", &timeouts).await.unwrap_err();
        match err {
            SupervisorError::Overflow { message } => {
                assert!(message.starts_with("output too long"));
            }
            other => panic!("expected overflow, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn background_writes_output_to_files() {
        let request = BashRequest {
            command: "echo hi".to_string(),
            slow_ok: false,
            background: true,
        };
        let handle = run_background(&request, "", Duration::from_secs(5)).await.unwrap();
        assert!(handle.pid > 0);

        for _ in 0..50 {
            if let Ok(contents) = tokio::fs::read_to_string(&handle.stdout_path).await {
                if contents == "hi\n" {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("background stdout file never contained expected output");
    }
}
