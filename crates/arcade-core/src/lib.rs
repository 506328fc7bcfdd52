//! Update and process supervision for the arcade launcher.
//!
//! [`Supervisor`] runs reconciliation cycles against a [`arcade_api::LauncherApi`],
//! replacing the installed launcher through [`UpdateApplier`] and keeping it
//! alive through a [`ProcessControl`]. [`Scheduler`] decides when cycles run.

mod apply;
mod network;
mod process;
mod scheduler;
mod state;
mod supervisor;
mod version_record;

pub use apply::{UpdateApplier, UpdateError};
pub use network::{NetworkProbe, NetworkWait, TcpProbe, wait_for_network};
pub use process::{
    ProcessControl, ProcessError, ProcessEvent, ProcessOptions, ProcessSupervisor, StartOutcome,
};
pub use scheduler::{ScheduleConfig, Scheduler};
pub use state::{StateMachine, SupervisorState};
pub use supervisor::{CycleError, CycleOutcome, Supervisor};
pub use version_record::LocalVersionRecord;
