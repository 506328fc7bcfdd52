use arcade_core::SupervisorState;
use log::{error, info, warn};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

/// Status line shown to whoever is looking at the cabinet.
pub fn status_text(state: SupervisorState) -> &'static str {
    match state {
        SupervisorState::Idle => "Awaiting Instructions...",
        SupervisorState::StartingProcess => "Starting Launcher...",
        SupervisorState::ClosingProcess => "Closing Launcher...",
        SupervisorState::RestartingProcess => "Restarting Launcher...",
        SupervisorState::CheckingForUpdates => "Checking for updates...",
        SupervisorState::UpdatingProcess => "Updating Launcher...",
        SupervisorState::WaitingOnNetwork => "Waiting for an internet connection...",
        SupervisorState::Failed => "Failed (Please contact IT for support)",
    }
}

/// Log every state change until the state machine is dropped.
pub fn spawn_status_reporter(mut changes: broadcast::Receiver<SupervisorState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match changes.recv().await {
                Ok(state @ SupervisorState::Failed) => error!("Status: {}", status_text(state)),
                Ok(state) => info!("Status: {}", status_text(state)),
                Err(RecvError::Lagged(missed)) => {
                    warn!("Status reporter missed {missed} updates");
                }
                Err(RecvError::Closed) => return,
            }
        }
    })
}
