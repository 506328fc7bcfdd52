use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

use crate::network::{NetworkProbe, NetworkWait, wait_for_network};
use crate::process::ProcessEvent;
use crate::state::SupervisorState;
use crate::supervisor::{CycleOutcome, Supervisor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleConfig {
    pub check_interval: Duration,
    pub failure_retry_interval: Duration,
    pub restart_delay: Duration,
    pub network_wait: Duration,
    pub network_poll_interval: Duration,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(60 * 60),
            failure_retry_interval: Duration::from_secs(60 * 60),
            restart_delay: Duration::from_secs(5),
            network_wait: Duration::from_secs(60),
            network_poll_interval: Duration::from_secs(1),
        }
    }
}

impl ScheduleConfig {
    fn delay_after(&self, outcome: &CycleOutcome) -> Duration {
        if outcome.needs_reinstall() {
            self.restart_delay
        } else if outcome.is_failure() {
            self.failure_retry_interval
        } else {
            self.check_interval
        }
    }
}

/// Decides when reconciliation cycles run: once at startup, periodically,
/// and shortly after the launcher exits on its own.
pub struct Scheduler {
    supervisor: Arc<Supervisor>,
    probe: Box<dyn NetworkProbe>,
    config: ScheduleConfig,
    events: mpsc::UnboundedReceiver<ProcessEvent>,
    cancel: CancellationToken,
}

impl Scheduler {
    #[must_use]
    pub fn new(
        supervisor: Arc<Supervisor>,
        probe: Box<dyn NetworkProbe>,
        config: ScheduleConfig,
        events: mpsc::UnboundedReceiver<ProcessEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            supervisor,
            probe,
            config,
            events,
            cancel,
        }
    }

    /// Drive cycles until cancelled.
    pub async fn run(mut self) {
        let network = wait_for_network(
            self.probe.as_ref(),
            self.config.network_wait,
            self.config.network_poll_interval,
            self.supervisor.state(),
            &self.cancel,
        )
        .await;

        let outcome = match network {
            NetworkWait::Available => self.supervisor.run_cycle().await,
            NetworkWait::TimedOut => {
                warn!("Starting installed launcher without checking for updates");
                self.supervisor.start_without_update().await
            }
            NetworkWait::Cancelled => return,
        };

        let mut next_check = Instant::now() + self.config.delay_after(&outcome);
        let mut restart_at: Option<Instant> = None;
        let mut events_open = true;

        loop {
            tokio::select! {
                biased;

                () = self.cancel.cancelled() => {
                    info!("Scheduler stopped");
                    return;
                }
                event = self.events.recv(), if events_open => {
                    let Some(event) = event else {
                        debug!("Process event channel closed");
                        events_open = false;
                        continue;
                    };
                    if self.supervisor.should_restart(&event) {
                        info!(
                            "Launcher exited unexpectedly; restarting in {:?}",
                            self.config.restart_delay
                        );
                        self.supervisor
                            .state()
                            .transition(SupervisorState::RestartingProcess);
                        restart_at = Some(Instant::now() + self.config.restart_delay);
                    }
                }
                () = sleep_until(restart_at.unwrap_or(next_check)), if restart_at.is_some() => {
                    restart_at = None;
                    let outcome = self.supervisor.run_cycle().await;
                    next_check = Instant::now() + self.config.delay_after(&outcome);
                }
                () = sleep_until(next_check) => {
                    restart_at = None;
                    let outcome = self.supervisor.run_cycle().await;
                    next_check = Instant::now() + self.config.delay_after(&outcome);
                }
            }
        }
    }
}
