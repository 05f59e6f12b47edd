//! The process supervisor (spec.md §4.6, component C6).
//!
//! Launches the child toolchain test binary, hands its stdout to the event
//! decoder, captures stderr separately, and mediates cancellation: an
//! interrupt first, escalating to a hard kill if the child hasn't exited
//! within the configured timeout.

use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};

use crate::errors::ChildSpawnError;

/// Environment variables forwarded to the child verbatim; everything else
/// is dropped so the child's behavior doesn't depend on the invoking
/// shell's ambient environment (spec.md §4.6: "propagating only
/// whitelisted environment").
const ENV_WHITELIST: &[&str] = &["PATH", "HOME", "GOPATH", "GOCACHE", "GOFLAGS", "TMPDIR", "TEMP", "TMP"];

/// A spawned child process plus the plumbing the orchestrator needs: its
/// stdout (handed to the decoder via [`Self::take_stdout`]) and a handle to
/// read back captured stderr and the exit code once it's done.
pub struct SupervisedChild {
    child: Child,
    stdout: Option<BufReader<ChildStdout>>,
    stderr: Option<ChildStderr>,
}

/// The child's outcome: its exit code plus anything it wrote to stderr,
/// surfaced in the summary on a non-test-failure non-zero exit (spec.md
/// §4.6).
#[derive(Debug)]
pub struct ChildOutcome {
    pub exit_code: i32,
    pub stderr: String,
}

impl SupervisedChild {
    /// Launches `program` with `args` in `cwd`, piping stdout/stderr.
    pub fn spawn(
        program: &str,
        args: &[String],
        cwd: &camino::Utf8Path,
    ) -> Result<Self, ChildSpawnError> {
        let mut command = Command::new(program);
        command
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env_clear();

        for key in ENV_WHITELIST {
            if let Ok(value) = std::env::var(key) {
                command.env(key, value);
            }
        }

        let mut child = command.spawn().map_err(|source| ChildSpawnError {
            program: program.to_string(),
            source,
        })?;

        let stdout = BufReader::new(child.stdout.take().expect("stdout was piped"));
        let stderr = child.stderr.take().expect("stderr was piped");

        Ok(Self {
            child,
            stdout: Some(stdout),
            stderr: Some(stderr),
        })
    }

    /// Takes ownership of the child's stdout reader, handing it to the
    /// event decoder. Must be called at most once.
    pub fn take_stdout(&mut self) -> BufReader<ChildStdout> {
        self.stdout.take().expect("stdout already taken")
    }

    /// Drains stderr into a string and awaits the exit code, running the
    /// cancellation escalation described in spec.md §4.6/§5: on
    /// cancellation, send an interrupt; if the child hasn't exited after
    /// `drain_timeout`, escalate to a hard kill.
    pub async fn finish(
        mut self,
        cancelled: impl std::future::Future<Output = ()>,
        drain_timeout: Duration,
    ) -> ChildOutcome {
        let mut stderr = self.stderr.take().expect("stderr already taken");
        let stderr_task = tokio::spawn(async move {
            let mut buf = String::new();
            let _ = stderr.read_to_string(&mut buf).await;
            buf
        });

        tokio::pin!(cancelled);
        let status = tokio::select! {
            status = self.child.wait() => status.ok(),
            _ = &mut cancelled => {
                if let Some(pid) = self.child.id() {
                    send_interrupt(pid);
                }
                match tokio::time::timeout(drain_timeout, self.child.wait()).await {
                    Ok(status) => status.ok(),
                    Err(_) => {
                        let _ = self.child.start_kill();
                        self.child.wait().await.ok()
                    }
                }
            }
        };

        let exit_code = status.and_then(|s| s.code()).unwrap_or(-1);
        let stderr_text = stderr_task.await.unwrap_or_default();

        ChildOutcome {
            exit_code,
            stderr: stderr_text,
        }
    }
}

#[cfg(unix)]
fn send_interrupt(pid: u32) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;
    let _ = kill(Pid::from_raw(pid as i32), Signal::SIGINT);
}

#[cfg(windows)]
fn send_interrupt(pid: u32) {
    // Windows has no SIGINT equivalent for an arbitrary child; a CTRL_BREAK
    // event requires the child to share our console's process group, which
    // `Command` doesn't arrange for by default. Escalate straight to a kill
    // request instead - the drain timeout still gives the child a window to
    // exit on its own via the next `wait()` poll.
    let _ = pid;
}
