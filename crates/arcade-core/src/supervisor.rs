//! One reconciliation cycle: compare the installed launcher with the latest
//! published one, replace it when they differ and make sure it is running.

use std::path::PathBuf;
use std::sync::Arc;

use arcade_api::{ApiError, LauncherApi, LauncherInfo, Version};
use log::{debug, error, info, warn};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::apply::{UpdateApplier, UpdateError};
use crate::process::{ProcessControl, ProcessError, ProcessEvent, StartOutcome};
use crate::state::{StateMachine, SupervisorState};

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("update service unreachable: {0}")]
    NetworkUnavailable(#[source] ApiError),
    #[error("failed to query latest launcher: {0}")]
    RemoteQueryFailed(#[source] ApiError),
    #[error(transparent)]
    Update(#[from] UpdateError),
    #[error("launcher executable not found at {}", path.display())]
    MissingExecutable { path: PathBuf },
    #[error("failed to start launcher: {0}")]
    ProcessLaunchFailed(#[source] ProcessError),
    #[error("failed to stop launcher before updating: {0}")]
    ProcessStopFailed(#[source] ProcessError),
    #[error("cycle cancelled")]
    Cancelled,
}

impl CycleError {
    fn from_query(error: ApiError) -> Self {
        if error.is_connectivity() {
            Self::NetworkUnavailable(error)
        } else {
            Self::RemoteQueryFailed(error)
        }
    }

    fn from_start(error: ProcessError) -> Self {
        match error {
            ProcessError::MissingExecutable { path } => Self::MissingExecutable { path },
            other => Self::ProcessLaunchFailed(other),
        }
    }
}

#[derive(Debug)]
pub enum CycleOutcome {
    UpToDate { version: Version },
    Updated { from: Version, to: Version },
    /// Launcher started without consulting the update service.
    StartedWithoutCheck,
    Failed(CycleError),
    /// The cycle failed and there is no launcher executable to fall back on.
    /// The next cycle should follow shortly so the launcher is reinstalled.
    LauncherMissing(CycleError),
    /// Another cycle held the guard.
    Skipped,
    Cancelled,
}

impl CycleOutcome {
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_) | Self::LauncherMissing(_))
    }

    #[must_use]
    pub fn needs_reinstall(&self) -> bool {
        matches!(self, Self::LauncherMissing(_))
    }
}

pub struct Supervisor {
    api: Arc<dyn LauncherApi>,
    process: Arc<dyn ProcessControl>,
    applier: UpdateApplier,
    state: Arc<StateMachine>,
    cycle_guard: Mutex<()>,
    cancel: CancellationToken,
}

impl Supervisor {
    #[must_use]
    pub fn new(
        api: Arc<dyn LauncherApi>,
        process: Arc<dyn ProcessControl>,
        applier: UpdateApplier,
        state: Arc<StateMachine>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            api,
            process,
            applier,
            state,
            cycle_guard: Mutex::new(()),
            cancel,
        }
    }

    #[must_use]
    pub fn state(&self) -> &StateMachine {
        &self.state
    }

    /// Run one reconciliation cycle unless one is already in flight.
    ///
    /// Failures never escape: they move the state to `Failed`, keep whatever
    /// launcher is installed running and come back as
    /// [`CycleOutcome::Failed`] for the caller to schedule a retry, or as
    /// [`CycleOutcome::LauncherMissing`] when nothing is left to run.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let Ok(_guard) = self.cycle_guard.try_lock() else {
            debug!("Update cycle already in progress; skipping");
            return CycleOutcome::Skipped;
        };
        if self.cancel.is_cancelled() {
            return CycleOutcome::Cancelled;
        }

        match self.reconcile().await {
            Ok(outcome) => outcome,
            Err(CycleError::Cancelled) => {
                info!("Update cycle cancelled");
                CycleOutcome::Cancelled
            }
            Err(error) => self.fail(error).await,
        }
    }

    /// Start the installed launcher without asking the update service, used
    /// when the machine never came online.
    pub async fn start_without_update(&self) -> CycleOutcome {
        let Ok(_guard) = self.cycle_guard.try_lock() else {
            return CycleOutcome::Skipped;
        };

        match self.ensure_started().await {
            Ok(()) => CycleOutcome::StartedWithoutCheck,
            Err(CycleError::Cancelled) => CycleOutcome::Cancelled,
            Err(error) => self.fail(error).await,
        }
    }

    /// Whether `event` is a launcher exit the supervisor did not cause.
    ///
    /// Only one launcher is supervised at a time, so an exit that arrives
    /// while a launcher is running belongs to a process that was already
    /// replaced.
    #[must_use]
    pub fn should_restart(&self, event: &ProcessEvent) -> bool {
        matches!(event, ProcessEvent::Exited { requested: false, .. })
            && !self.state.current().is_stopping_launcher()
            && !self.process.is_running()
    }

    /// Stop scheduling, wait for any in-flight cycle to wind down and close
    /// the launcher.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let _guard = self.cycle_guard.lock().await;

        self.state.transition(SupervisorState::ClosingProcess);
        if let Err(error) = self.process.request_graceful_close().await {
            error!("Failed to close launcher during shutdown: {error}");
        }
        self.state.transition(SupervisorState::Idle);
    }

    async fn reconcile(&self) -> Result<CycleOutcome, CycleError> {
        self.state.transition(SupervisorState::CheckingForUpdates);

        let latest = tokio::select! {
            () = self.cancel.cancelled() => return Err(CycleError::Cancelled),
            latest = self.api.latest_launcher() => latest.map_err(CycleError::from_query)?,
        };
        let installed = self.installed_version().await;

        if !installed.is_different(&latest.version) {
            info!("Launcher {installed} is up to date");
            self.ensure_started().await?;
            return Ok(CycleOutcome::UpToDate { version: installed });
        }

        info!("Launcher update available: {installed} -> {}", latest.version);
        self.install(&latest).await?;
        self.ensure_started().await?;
        Ok(CycleOutcome::Updated {
            from: installed,
            to: latest.version,
        })
    }

    async fn install(&self, latest: &LauncherInfo) -> Result<(), CycleError> {
        self.state.transition(SupervisorState::ClosingProcess);
        self.process
            .request_graceful_close()
            .await
            .map_err(CycleError::ProcessStopFailed)?;

        self.state.transition(SupervisorState::UpdatingProcess);
        self.applier
            .apply_update(self.api.as_ref(), latest, &self.cancel)
            .await
            .map_err(|error| match error {
                UpdateError::Cancelled => CycleError::Cancelled,
                other => CycleError::Update(other),
            })?;

        self.report_version(latest.version).await;
        Ok(())
    }

    /// The recorded version, or zero when the executable itself is gone.
    async fn installed_version(&self) -> Version {
        if self.process.executable_exists() {
            return self.applier.record().read();
        }

        warn!("Launcher executable missing; treating launcher as not installed");
        self.report_version(Version::ZERO).await;
        Version::ZERO
    }

    async fn ensure_started(&self) -> Result<(), CycleError> {
        if self.cancel.is_cancelled() {
            return Err(CycleError::Cancelled);
        }

        self.state.transition(SupervisorState::StartingProcess);
        self.process
            .start()
            .await
            .map_err(CycleError::from_start)?;
        self.state.transition(SupervisorState::Idle);
        Ok(())
    }

    async fn fail(&self, error: CycleError) -> CycleOutcome {
        error!("Update cycle failed: {error}");
        self.state.transition(SupervisorState::Failed);

        let launcher_missing = match &error {
            CycleError::MissingExecutable { .. } => {
                self.report_version(Version::ZERO).await;
                true
            }
            // The old launcher may still be alive without a handle.
            CycleError::ProcessStopFailed(_) | CycleError::ProcessLaunchFailed(_) => false,
            _ => self.keep_running().await,
        };

        if launcher_missing {
            warn!("No launcher installed; a reinstall is needed");
            CycleOutcome::LauncherMissing(error)
        } else {
            CycleOutcome::Failed(error)
        }
    }

    /// Best-effort start of whatever launcher is installed. The state stays
    /// `Failed` either way. Returns `true` when the executable is gone.
    async fn keep_running(&self) -> bool {
        if self.cancel.is_cancelled() || self.process.is_running() {
            return false;
        }

        match self.process.start().await {
            Ok(StartOutcome::Launched { pid }) => {
                info!("Started installed launcher (pid {pid}) after failed cycle");
                false
            }
            Ok(StartOutcome::AlreadyRunning) => false,
            Err(ProcessError::MissingExecutable { .. }) => {
                self.report_version(Version::ZERO).await;
                true
            }
            Err(error) => {
                warn!("Could not keep launcher running: {error}");
                false
            }
        }
    }

    async fn report_version(&self, version: Version) {
        let reported = tokio::select! {
            () = self.cancel.cancelled() => return,
            reported = self.api.report_installed_version(version) => reported,
        };
        if let Err(error) = reported {
            warn!("Failed to report installed version {version}: {error}");
        }
    }
}
