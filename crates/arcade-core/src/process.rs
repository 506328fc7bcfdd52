use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use arcade_platform::CloseSignal;
use async_trait::async_trait;
use log::{debug, error, info, warn};
use thiserror::Error;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

#[cfg(windows)]
const FOCUS_ATTEMPTS: u32 = 10;
#[cfg(windows)]
const FOCUS_RETRY_INTERVAL: Duration = Duration::from_millis(500);

/// Lifecycle notifications for the managed launcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessEvent {
    Started {
        pid: u32,
    },
    /// `requested` is set when the exit was initiated through
    /// [`ProcessControl::request_graceful_close`].
    Exited {
        pid: u32,
        code: Option<i32>,
        requested: bool,
    },
}

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("launcher executable not found at {}", path.display())]
    MissingExecutable { path: PathBuf },
    #[error("failed to launch {}: {source}", path.display())]
    LaunchFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to stop launcher process {pid}: {source}")]
    StopFailed {
        pid: u32,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Launched { pid: u32 },
    AlreadyRunning,
}

#[async_trait]
pub trait ProcessControl: Send + Sync {
    fn executable_exists(&self) -> bool;

    fn is_running(&self) -> bool;

    /// Launch the executable unless a process is already being supervised.
    async fn start(&self) -> Result<StartOutcome, ProcessError>;

    /// Ask the launcher to exit and wait for it, escalating to a forced kill
    /// once the close timeout elapses. Returns once no process is running.
    async fn request_graceful_close(&self) -> Result<(), ProcessError>;
}

#[derive(Debug, Clone)]
pub struct ProcessOptions {
    pub executable: PathBuf,
    pub exit_poll_interval: Duration,
    pub close_timeout: Duration,
}

impl ProcessOptions {
    #[must_use]
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            exit_poll_interval: Duration::from_secs(1),
            close_timeout: Duration::from_secs(30),
        }
    }
}

struct ManagedProcess {
    pid: u32,
    generation: u64,
    child: Child,
}

type Slot = Arc<Mutex<Option<ManagedProcess>>>;

/// Owns at most one running launcher process.
///
/// The process handle lives in a slot shared with a per-launch exit watcher.
/// Whoever takes the handle out of the slot reports the exit, so a crash and a
/// requested close can never both be reported for the same process.
pub struct ProcessSupervisor {
    options: ProcessOptions,
    slot: Slot,
    generation: AtomicU64,
    events: mpsc::UnboundedSender<ProcessEvent>,
    close_signal: Box<dyn CloseSignal>,
}

impl ProcessSupervisor {
    #[must_use]
    pub fn new(
        options: ProcessOptions,
        close_signal: Box<dyn CloseSignal>,
    ) -> (Self, mpsc::UnboundedReceiver<ProcessEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let supervisor = Self {
            options,
            slot: Arc::new(Mutex::new(None)),
            generation: AtomicU64::new(0),
            events,
            close_signal,
        };
        (supervisor, receiver)
    }

    fn lock_slot(&self) -> std::sync::MutexGuard<'_, Option<ManagedProcess>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn spawn(&self) -> Result<Child, ProcessError> {
        let executable = &self.options.executable;
        let mut command = Command::new(executable);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = executable.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            command.current_dir(dir);
        }

        command.spawn().map_err(|source| ProcessError::LaunchFailed {
            path: executable.clone(),
            source,
        })
    }
}

#[async_trait]
impl ProcessControl for ProcessSupervisor {
    fn executable_exists(&self) -> bool {
        self.options.executable.is_file()
    }

    fn is_running(&self) -> bool {
        self.lock_slot().is_some()
    }

    async fn start(&self) -> Result<StartOutcome, ProcessError> {
        let mut slot = self.lock_slot();
        if let Some(managed) = slot.as_ref() {
            debug!("Launcher already running as {}", managed.pid);
            return Ok(StartOutcome::AlreadyRunning);
        }

        if !self.executable_exists() {
            error!(
                "Launcher executable missing at {}",
                self.options.executable.display()
            );
            return Err(ProcessError::MissingExecutable {
                path: self.options.executable.clone(),
            });
        }

        let child = self.spawn()?;
        let pid = child.id().unwrap_or_default();
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        *slot = Some(ManagedProcess {
            pid,
            generation,
            child,
        });
        drop(slot);

        info!(
            "Started launcher {} (pid {pid})",
            self.options.executable.display()
        );
        let _ = self.events.send(ProcessEvent::Started { pid });

        tokio::spawn(watch_exit(
            Arc::clone(&self.slot),
            generation,
            self.options.exit_poll_interval,
            self.events.clone(),
        ));

        #[cfg(windows)]
        tokio::spawn(async move {
            for _ in 0..FOCUS_ATTEMPTS {
                tokio::time::sleep(FOCUS_RETRY_INTERVAL).await;
                if arcade_platform::bring_to_front(pid) {
                    debug!("Launcher {pid} brought to the foreground");
                    return;
                }
            }
            debug!("Launcher {pid} never showed a window to focus");
        });

        Ok(StartOutcome::Launched { pid })
    }

    async fn request_graceful_close(&self) -> Result<(), ProcessError> {
        let taken = self.lock_slot().take();
        let Some(mut managed) = taken else {
            debug!("No launcher running; nothing to close");
            return Ok(());
        };
        let pid = managed.pid;
        info!("Asking launcher {pid} to close");

        let signalled = match self.close_signal.request_close(pid) {
            Ok(()) => true,
            Err(error) => {
                warn!("Close signal for launcher {pid} failed: {error}");
                false
            }
        };

        let mut code = None;
        let mut exited = false;
        if signalled {
            match tokio::time::timeout(self.options.close_timeout, managed.child.wait()).await {
                Ok(Ok(status)) => {
                    code = status.code();
                    exited = true;
                }
                Ok(Err(error)) => warn!("Failed to wait for launcher {pid}: {error}"),
                Err(_) => warn!(
                    "Launcher {pid} did not exit within {:?}, killing it",
                    self.options.close_timeout
                ),
            }
        }

        if !exited {
            if let Err(source) = managed.child.kill().await {
                self.close_signal.release(pid);
                // Keep supervising the survivor so nothing is launched beside it.
                let generation = managed.generation;
                *self.lock_slot() = Some(managed);
                tokio::spawn(watch_exit(
                    Arc::clone(&self.slot),
                    generation,
                    self.options.exit_poll_interval,
                    self.events.clone(),
                ));
                return Err(ProcessError::StopFailed { pid, source });
            }
        }

        self.close_signal.release(pid);
        info!("Launcher {pid} closed");
        let _ = self.events.send(ProcessEvent::Exited {
            pid,
            code,
            requested: true,
        });
        Ok(())
    }
}

async fn watch_exit(
    slot: Slot,
    generation: u64,
    poll_interval: Duration,
    events: mpsc::UnboundedSender<ProcessEvent>,
) {
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let exited = {
            let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
            let Some(managed) = guard
                .as_mut()
                .filter(|managed| managed.generation == generation)
            else {
                // Taken by a requested close, which reports the exit itself.
                return;
            };

            match managed.child.try_wait() {
                Ok(Some(status)) => {
                    let pid = managed.pid;
                    *guard = None;
                    Some((pid, status.code()))
                }
                Ok(None) => None,
                Err(error) => {
                    warn!("Failed to poll launcher {}: {error}", managed.pid);
                    None
                }
            }
        };

        if let Some((pid, code)) = exited {
            warn!("Launcher {pid} exited on its own (code {code:?})");
            let _ = events.send(ProcessEvent::Exited {
                pid,
                code,
                requested: false,
            });
            return;
        }
    }
}
