use crate::error::{ProbeError, Result};
use crate::lock;
use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

/// Exit code iputils `ping` uses for errors other than missing replies
/// (unknown host, no route, network unreachable).
pub const UNREACHABLE_EXIT_CODE: i32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitClass {
    Reachable,
    Unreachable,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PingReport {
    pub exit: ExitClass,
    pub output: String,
}

/// A blocking reachability check against one address.
///
/// Implementations must return promptly once `cancel` fires.
pub trait PingRunner: Send + Sync {
    fn run(&self, address: &str, echo_count: u32, cancel: &CheckCancel) -> Result<PingReport>;
}

pub fn classify_exit(code: Option<i32>, cancelled: bool) -> ExitClass {
    if cancelled {
        return ExitClass::Cancelled;
    }
    match code {
        Some(0) => ExitClass::Reachable,
        Some(UNREACHABLE_EXIT_CODE) => ExitClass::Unreachable,
        _ => ExitClass::Failed,
    }
}

#[derive(Debug, Default)]
struct CancelState {
    cancelled: bool,
    group: Option<i32>,
}

#[derive(Debug, Default)]
struct CancelInner {
    state: Mutex<CancelState>,
    cond: Condvar,
}

/// Cancellation token for an in-flight check.
///
/// A runner registers the process group of the check it spawned; `cancel`
/// terminates that whole group and wakes anyone blocked in `wait_cancelled`.
/// The token stays cancelled until `reset`.
#[derive(Debug, Clone, Default)]
pub struct CheckCancel {
    inner: Arc<CancelInner>,
}

impl CheckCancel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let mut state = lock(&self.inner.state);
        state.cancelled = true;
        if let Some(group) = state.group.take() {
            terminate_group(group);
        }
        drop(state);
        self.inner.cond.notify_all();
    }

    pub fn reset(&self) {
        lock(&self.inner.state).cancelled = false;
    }

    pub fn is_cancelled(&self) -> bool {
        lock(&self.inner.state).cancelled
    }

    /// Blocks until cancelled or `timeout` elapses. Returns whether the token fired.
    pub fn wait_cancelled(&self, timeout: Duration) -> bool {
        let state = lock(&self.inner.state);
        let (state, _) = self
            .inner
            .cond
            .wait_timeout_while(state, timeout, |state| !state.cancelled)
            .unwrap_or_else(PoisonError::into_inner);
        state.cancelled
    }

    /// Records the process group of a freshly spawned check. If the token has
    /// already fired the group is terminated right away.
    pub fn register_group(&self, group: i32) {
        let mut state = lock(&self.inner.state);
        if state.cancelled {
            terminate_group(group);
        } else {
            state.group = Some(group);
        }
    }

    pub fn release_group(&self) {
        lock(&self.inner.state).group = None;
    }
}

fn terminate_group(group: i32) {
    debug!(group, "terminating ping process group");
    match killpg(Pid::from_raw(group), Signal::SIGTERM) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(err) => warn!(group, error = %err, "failed to signal ping process group"),
    }
}

/// Runs the system `ping` binary in its own process group.
#[derive(Debug, Clone)]
pub struct SystemPingRunner {
    program: PathBuf,
}

impl Default for SystemPingRunner {
    fn default() -> Self {
        Self {
            program: PathBuf::from("ping"),
        }
    }
}

impl SystemPingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &PathBuf {
        &self.program
    }
}

impl PingRunner for SystemPingRunner {
    fn run(&self, address: &str, echo_count: u32, cancel: &CheckCancel) -> Result<PingReport> {
        let spawn_failure = |source: std::io::Error| ProbeError::CheckSpawnFailure {
            address: address.to_string(),
            source,
        };

        let child = Command::new(&self.program)
            .arg("-n")
            .arg("-c")
            .arg(echo_count.to_string())
            .arg(address)
            .env("LC_ALL", "C")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .spawn()
            .map_err(spawn_failure)?;

        // process_group(0) makes the child the leader of a group with its own pid.
        cancel.register_group(child.id() as i32);
        let output = child.wait_with_output();
        cancel.release_group();
        let output = output.map_err(spawn_failure)?;

        let exit = classify_exit(output.status.code(), cancel.is_cancelled());
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        if exit != ExitClass::Reachable && !output.stderr.is_empty() {
            text.push_str(&String::from_utf8_lossy(&output.stderr));
        }

        debug!(address, status = %output.status, ?exit, "ping finished");
        Ok(PingReport { exit, output: text })
    }
}
