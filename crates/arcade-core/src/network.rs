use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::net::TcpStream;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::state::{StateMachine, SupervisorState};

#[async_trait]
pub trait NetworkProbe: Send + Sync {
    async fn is_available(&self) -> bool;
}

/// Treats the network as up when a TCP connection to `address` can be opened.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    address: String,
    timeout: Duration,
}

impl TcpProbe {
    #[must_use]
    pub fn new(address: impl Into<String>, timeout: Duration) -> Self {
        Self {
            address: address.into(),
            timeout,
        }
    }
}

#[async_trait]
impl NetworkProbe for TcpProbe {
    async fn is_available(&self) -> bool {
        match tokio::time::timeout(self.timeout, TcpStream::connect(&self.address)).await {
            Ok(Ok(_)) => true,
            Ok(Err(error)) => {
                debug!("Connectivity probe to {} failed: {error}", self.address);
                false
            }
            Err(_) => {
                debug!("Connectivity probe to {} timed out", self.address);
                false
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkWait {
    Available,
    TimedOut,
    Cancelled,
}

/// Poll `probe` until it succeeds, `max_wait` elapses or `cancel` fires.
///
/// The state moves to `WaitingOnNetwork` on the first failed probe only, so a
/// machine that is already online never shows the waiting state.
pub async fn wait_for_network(
    probe: &dyn NetworkProbe,
    max_wait: Duration,
    poll_interval: Duration,
    state: &StateMachine,
    cancel: &CancellationToken,
) -> NetworkWait {
    let deadline = Instant::now() + max_wait;

    loop {
        let available = tokio::select! {
            () = cancel.cancelled() => return NetworkWait::Cancelled,
            available = probe.is_available() => available,
        };
        if available {
            return NetworkWait::Available;
        }

        if state.transition(SupervisorState::WaitingOnNetwork) {
            info!("Waiting up to {max_wait:?} for an internet connection");
        }
        if Instant::now() >= deadline {
            warn!("No internet connection after {max_wait:?}");
            return NetworkWait::TimedOut;
        }

        tokio::select! {
            () = cancel.cancelled() => return NetworkWait::Cancelled,
            () = tokio::time::sleep(poll_interval) => {}
        }
    }
}
