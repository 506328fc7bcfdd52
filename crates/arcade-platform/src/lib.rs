//! Platform glue for the arcade updater: filesystem layout, the close signal
//! understood by the launcher, window focus, and helper processes.

mod paths;
mod processes;
mod signal;
mod window;

pub use paths::{AppPaths, AppPathsError};
pub use processes::{helper_command, terminate_stale_instances};
#[cfg(not(windows))]
pub use signal::TerminateClose;
#[cfg(windows)]
pub use signal::KeystrokeClose;
pub use signal::{CLOSE_KEY_CODE, CloseSignal, platform_close_signal};
pub use window::bring_to_front;
