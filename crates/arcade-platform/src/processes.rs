use std::ffi::OsStr;
use std::path::Path;
use std::process::{Command, Stdio};

use log::{debug, info, warn};

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Build a command for a short-lived platform helper (`taskkill`, `kill`,
/// `pkill`). Output is discarded and, on Windows, no console window is
/// flashed over the launcher.
pub fn helper_command(program: impl AsRef<OsStr>) -> Command {
    let mut command = Command::new(program);
    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        command.creation_flags(CREATE_NO_WINDOW);
    }

    command
}

/// Forcefully terminate every running process started from an executable
/// named like `executable`.
///
/// Used once at startup so a launcher left behind by a previous updater run
/// is not running unsupervised next to the one we are about to start.
/// Returns `true` when the helper reported that something was terminated.
pub fn terminate_stale_instances(executable: &Path) -> bool {
    let Some(file_name) = executable.file_name().and_then(OsStr::to_str) else {
        return false;
    };

    #[cfg(windows)]
    let mut command = {
        let mut command = helper_command("taskkill");
        command.args(["/F", "/T", "/IM", file_name]);
        command
    };

    #[cfg(not(windows))]
    let mut command = {
        let mut command = helper_command("pkill");
        command.args(["-KILL", "-x", process_name(file_name)]);
        command
    };

    match command.status() {
        Ok(status) if status.success() => {
            info!("Terminated stale instances of {file_name}");
            true
        }
        Ok(status) => {
            debug!("No stale instances of {file_name} found ({status})");
            false
        }
        Err(error) => {
            warn!("Failed to look for stale instances of {file_name}: {error}");
            false
        }
    }
}

// pkill matches against the 15 character kernel comm name on Linux.
#[cfg(not(windows))]
fn process_name(file_name: &str) -> &str {
    match file_name.char_indices().nth(15) {
        Some((index, _)) if cfg!(target_os = "linux") => &file_name[..index],
        _ => file_name,
    }
}
