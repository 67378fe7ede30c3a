//! Managed child processes
//!
//! A [`ManagedProcess`] owns one spawned application instance: its input
//! stream, its drain task and its lifecycle state. Commands go in through
//! [`ManagedProcess::send`]; output comes back through the drain task into the
//! shared [`OutputPipeline`].

use std::collections::BTreeMap;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use shared::{process_debug, process_error, process_info, process_warn, ProcessKey, ProcessState};
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};

use crate::config::LaunchSpec;
use crate::error::{HarnessError, HarnessResult, WriteFailure};
use crate::runtime::drain::{spawn_drain, OutputPipeline, ProcessCounters};

/// How a call to [`ManagedProcess::terminate`] ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationOutcome {
    /// Exited within the grace period after its input closed and SIGTERM
    Exited,
    /// Did not exit in time and was killed
    ForceKilled,
    /// Was already terminated or reaped before this call
    AlreadyTerminated,
}

#[derive(Debug, Clone, Copy)]
pub struct Termination {
    pub outcome: TerminationOutcome,
    pub exit_status: Option<ExitStatus>,
}

/// Upper bound for writing one command when none is configured
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle for one spawned application process
pub struct ManagedProcess {
    key: ProcessKey,
    display_name: String,
    pid: Option<u32>,
    started_at: Instant,
    write_timeout: Duration,
    child: Mutex<Child>,
    stdin: Mutex<Option<ChildStdin>>,
    state: Arc<watch::Sender<ProcessState>>,
    counters: Arc<ProcessCounters>,
    drain: StdMutex<Option<JoinHandle<()>>>,
    exit_status: StdMutex<Option<ExitStatus>>,
}

impl std::fmt::Debug for ManagedProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedProcess")
            .field("key", &self.key)
            .field("pid", &self.pid)
            .field("state", &self.state())
            .finish()
    }
}

fn build_command(spec: &LaunchSpec, env: &BTreeMap<String, String>) -> Command {
    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if let Some(dir) = &spec.working_dir {
        cmd.current_dir(dir);
    }

    for (key, value) in env.iter().chain(spec.env.iter()) {
        cmd.env(key, value);
    }

    cmd
}

async fn write_line(pipe: &mut ChildStdin, command: &str) -> std::io::Result<()> {
    let mut line = String::with_capacity(command.len() + 1);
    line.push_str(command);
    line.push('\n');
    pipe.write_all(line.as_bytes()).await?;
    pipe.flush().await
}

impl ManagedProcess {
    /// Start one process and its drain task.
    ///
    /// `env` is applied first, then the launch spec's own overrides. Must be called
    /// from within a tokio runtime.
    pub fn spawn(
        key: ProcessKey,
        spec: &LaunchSpec,
        env: &BTreeMap<String, String>,
        pipeline: OutputPipeline,
    ) -> HarnessResult<Self> {
        let (state, _) = watch::channel(ProcessState::Spawning);
        let state = Arc::new(state);

        let mut child = build_command(spec, env)
            .spawn()
            .map_err(|source| HarnessError::SpawnFailed { process: key, source })?;

        let pid = child.id();
        let stdin = child.stdin.take();
        let counters = Arc::new(ProcessCounters::default());

        // Before the drain starts, so end of output always moves Running to Draining
        state.send_replace(ProcessState::Running);

        let drain = spawn_drain(
            key,
            child.stdout.take(),
            child.stderr.take(),
            pipeline,
            counters.clone(),
            state.clone(),
        );

        shared::logging::log_startup(
            &key,
            &format!(
                "{} (PID: {}): {} {}",
                key.display_name(),
                pid.map(|p| p.to_string()).unwrap_or_else(|| "?".to_string()),
                spec.program,
                spec.args.join(" ")
            ),
        );

        Ok(Self {
            key,
            display_name: key.display_name(),
            pid,
            started_at: Instant::now(),
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            child: Mutex::new(child),
            stdin: Mutex::new(stdin),
            state,
            counters,
            drain: StdMutex::new(Some(drain)),
            exit_status: StdMutex::new(None),
        })
    }

    /// Bound each `send` by `limit`
    pub fn with_write_timeout(mut self, limit: Duration) -> Self {
        self.write_timeout = limit;
        self
    }

    pub fn key(&self) -> ProcessKey {
        self.key
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn state(&self) -> ProcessState {
        *self.state.borrow()
    }

    /// Subscribe to state changes
    pub fn watch_state(&self) -> watch::Receiver<ProcessState> {
        self.state.subscribe()
    }

    /// Failure-matching records seen from this process
    pub fn error_count(&self) -> u64 {
        self.counters.errors()
    }

    pub fn counters(&self) -> &ProcessCounters {
        &self.counters
    }

    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit_status.lock().ok().and_then(|status| *status)
    }

    fn record_exit(&self, status: Option<ExitStatus>) {
        if let (Some(status), Ok(mut slot)) = (status, self.exit_status.lock()) {
            slot.get_or_insert(status);
        }
    }

    fn mark_terminated(&self) {
        self.state.send_if_modified(|current| {
            if *current == ProcessState::Terminated {
                false
            } else {
                *current = ProcessState::Terminated;
                true
            }
        });
    }

    /// Write `command` plus a newline to the process input and flush.
    ///
    /// Commands from one caller arrive in order. Fails with `WriteFailed` when
    /// the process is not running or its input is closed, including when
    /// `terminate` runs concurrently. A write that does not complete within
    /// the write timeout (the child stopped reading) fails and closes the
    /// input.
    pub async fn send(&self, command: &str) -> HarnessResult<()> {
        let mut stdin = self.stdin.lock().await;

        let state = self.state();
        if !state.accepts_input() {
            return Err(HarnessError::write(self.key, WriteFailure::NotRunning { state }));
        }

        let Some(pipe) = stdin.as_mut() else {
            return Err(HarnessError::write(self.key, WriteFailure::StreamClosed));
        };

        let failure = match timeout(self.write_timeout, write_line(pipe, command)).await {
            Ok(Ok(())) => None,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => Some(WriteFailure::StreamClosed),
            Ok(Err(e)) => Some(WriteFailure::Io(e)),
            Err(_) => Some(WriteFailure::TimedOut {
                after: self.write_timeout,
            }),
        };

        if let Some(reason) = failure {
            // Later sends fail fast
            *stdin = None;
            return Err(HarnessError::write(self.key, reason));
        }

        self.counters.commands.fetch_add(1, Ordering::AcqRel);
        process_debug!(self.key, "⌨️ {}", command);
        Ok(())
    }

    /// Reap the process if it exited on its own.
    ///
    /// Returns the exit status when the process has exited. Never blocks; if
    /// a termination is in progress this returns `None`.
    pub fn try_reap(&self) -> Option<ExitStatus> {
        let Ok(mut child) = self.child.try_lock() else {
            return None;
        };

        match child.try_wait() {
            Ok(Some(status)) => {
                self.record_exit(Some(status));
                if let Ok(mut stdin) = self.stdin.try_lock() {
                    stdin.take();
                }
                if self.state() != ProcessState::Terminated {
                    process_info!(self.key, "🏁 {} exited on its own: {}", self.display_name, status);
                }
                self.mark_terminated();
                Some(status)
            }
            Ok(None) => None,
            Err(e) => {
                process_warn!(self.key, "⚠️ Error checking process status: {}", e);
                None
            }
        }
    }

    /// Close input, request graceful exit, and wait (bounded) for the process
    /// and its drain task.
    ///
    /// A process still running after `grace` is killed. Calling this again
    /// after it returned is a no-op.
    pub async fn terminate(&self, grace: Duration, drain_grace: Duration) -> HarnessResult<Termination> {
        let mut child = self.child.lock().await;

        let stopped = if self.state() == ProcessState::Terminated {
            Ok(TerminationOutcome::AlreadyTerminated)
        } else {
            self.stop_child(&mut child, grace).await
        };

        self.finish_termination(stopped, drain_grace).await
    }

    /// Shutdown bookkeeping that runs whether or not stopping the child
    /// succeeded: input closed, drain joined, state `Terminated`.
    async fn finish_termination(
        &self,
        stopped: HarnessResult<TerminationOutcome>,
        drain_grace: Duration,
    ) -> HarnessResult<Termination> {
        self.stdin.lock().await.take();

        // A reaped process may still have output in flight
        self.join_drain(drain_grace).await;
        self.mark_terminated();

        let outcome = match stopped {
            Ok(outcome) => outcome,
            Err(e) => {
                process_error!(self.key, "💥 {} could not be stopped: {}", self.display_name, e);
                return Err(e);
            }
        };

        if outcome != TerminationOutcome::AlreadyTerminated {
            shared::logging::log_shutdown(&self.key, &format!("{:?} after {:?}", outcome, self.uptime()));
        }

        Ok(Termination {
            outcome,
            exit_status: self.exit_status(),
        })
    }

    async fn stop_child(&self, child: &mut Child, grace: Duration) -> HarnessResult<TerminationOutcome> {
        // A send blocked on a full pipe holds the lock; SIGTERM below unblocks it
        if let Ok(mut stdin) = timeout(grace, self.stdin.lock()).await {
            stdin.take();
        }

        self.request_exit(child);

        match timeout(grace, child.wait()).await {
            Ok(Ok(status)) => {
                self.record_exit(Some(status));
                Ok(TerminationOutcome::Exited)
            }
            Ok(Err(e)) => {
                process_warn!(self.key, "⚠️ Failed waiting for exit, killing: {}", e);
                self.force_kill(child).await.map(|()| TerminationOutcome::ForceKilled)
            }
            Err(_) => {
                let err = HarnessError::TerminationTimeout {
                    process: self.key,
                    timeout: grace,
                };
                process_warn!(self.key, "⏰ {}, force killing", err);
                self.force_kill(child).await.map(|()| TerminationOutcome::ForceKilled)
            }
        }
    }

    #[cfg(unix)]
    fn request_exit(&self, child: &mut Child) {
        use nix::sys::signal::{self, Signal};
        use nix::unistd::Pid;

        let Some(pid) = child.id() else {
            return;
        };

        if let Err(e) = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            process_warn!(self.key, "⚠️ Failed to send SIGTERM: {}", e);
        }
    }

    #[cfg(not(unix))]
    fn request_exit(&self, child: &mut Child) {
        if let Err(e) = child.start_kill() {
            process_warn!(self.key, "⚠️ Failed to terminate: {}", e);
        }
    }

    async fn force_kill(&self, child: &mut Child) -> HarnessResult<()> {
        if let Err(e) = child.kill().await {
            process_warn!(self.key, "⚠️ Kill failed: {}", e);
            return Err(e.into());
        }
        match child.try_wait() {
            Ok(status) => self.record_exit(status),
            Err(e) => process_warn!(self.key, "⚠️ Error collecting exit status: {}", e),
        }
        Ok(())
    }

    async fn join_drain(&self, drain_grace: Duration) {
        let handle = self.drain.lock().ok().and_then(|mut drain| drain.take());
        let Some(mut handle) = handle else {
            return;
        };

        match timeout(drain_grace, &mut handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => process_warn!(self.key, "⚠️ Drain task failed: {}", e),
            Err(_) => {
                // Output pipe inherited by a grandchild that is still alive
                process_warn!(self.key, "⏰ Drain task still running after {:?}, aborting", drain_grace);
                handle.abort();
            }
        }
    }
}

impl Drop for ManagedProcess {
    fn drop(&mut self) {
        // Emergency cleanup - kill_on_drop takes the child down with the handle
        if self.state() != ProcessState::Terminated {
            process_warn!(self.key, "🚨 Emergency cleanup: dropping {} without terminate", self.display_name);
        }
    }
}
