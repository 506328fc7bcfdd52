//! Supervisor state holder.
//!
//! Exactly one [`SupervisorState`] is active at a time. Every change goes
//! through [`StateMachine::transition`], which publishes the new value on a
//! broadcast channel; publication never waits on subscribers; a subscriber
//! that falls behind loses the oldest notifications, not the swap.

use std::fmt;
use std::sync::{Mutex, PoisonError};

use log::{debug, warn};
use tokio::sync::broadcast;

const NOTIFY_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SupervisorState {
    #[default]
    Idle,
    StartingProcess,
    ClosingProcess,
    RestartingProcess,
    CheckingForUpdates,
    UpdatingProcess,
    WaitingOnNetwork,
    Failed,
}

impl SupervisorState {
    pub const ALL: [Self; 8] = [
        Self::Idle,
        Self::StartingProcess,
        Self::ClosingProcess,
        Self::RestartingProcess,
        Self::CheckingForUpdates,
        Self::UpdatingProcess,
        Self::WaitingOnNetwork,
        Self::Failed,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::StartingProcess => "startingProcess",
            Self::ClosingProcess => "closingProcess",
            Self::RestartingProcess => "restartingProcess",
            Self::CheckingForUpdates => "checkingForUpdates",
            Self::UpdatingProcess => "updatingProcess",
            Self::WaitingOnNetwork => "waitingOnNetwork",
            Self::Failed => "failed",
        }
    }

    /// States in which the supervisor itself is taking the launcher down, so
    /// an observed exit is expected rather than a crash.
    #[must_use]
    pub fn is_stopping_launcher(self) -> bool {
        matches!(self, Self::ClosingProcess | Self::UpdatingProcess)
    }

    /// Transition table. `Failed` may move anywhere (recovery) and any state
    /// may move to `ClosingProcess` (host shutdown) or `Failed`.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        use SupervisorState::{
            CheckingForUpdates, ClosingProcess, Failed, Idle, RestartingProcess, StartingProcess,
            UpdatingProcess, WaitingOnNetwork,
        };

        if matches!(self, Failed) || matches!(next, ClosingProcess | Failed) {
            return true;
        }

        match self {
            Idle => matches!(
                next,
                CheckingForUpdates | StartingProcess | RestartingProcess | WaitingOnNetwork
            ),
            WaitingOnNetwork => matches!(next, CheckingForUpdates | StartingProcess | Idle),
            CheckingForUpdates => matches!(next, StartingProcess | UpdatingProcess),
            ClosingProcess => matches!(next, UpdatingProcess | Idle),
            UpdatingProcess => matches!(next, StartingProcess),
            StartingProcess => matches!(next, Idle | CheckingForUpdates | RestartingProcess),
            RestartingProcess => matches!(next, CheckingForUpdates | StartingProcess | Idle),
            Failed => true,
        }
    }
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct StateMachine {
    current: Mutex<SupervisorState>,
    notifier: broadcast::Sender<SupervisorState>,
}

impl StateMachine {
    #[must_use]
    pub fn new() -> Self {
        let (notifier, _) = broadcast::channel(NOTIFY_CAPACITY);
        Self {
            current: Mutex::new(SupervisorState::Idle),
            notifier,
        }
    }

    #[must_use]
    pub fn current(&self) -> SupervisorState {
        *self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Receive every state change published after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SupervisorState> {
        self.notifier.subscribe()
    }

    /// Move to `next`. Returns `false` (and publishes nothing) when `next` is
    /// already the current state.
    pub fn transition(&self, next: SupervisorState) -> bool {
        let mut current = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if *current == next {
            return false;
        }

        let previous = *current;
        if !previous.can_transition_to(next) {
            warn!("Unexpected supervisor transition {previous} -> {next}");
        }
        *current = next;
        // Sending under the lock keeps notification order equal to swap order.
        let _ = self.notifier.send(next);
        drop(current);

        debug!("Supervisor state {previous} -> {next}");
        true
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}
