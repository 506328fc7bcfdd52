use std::io;

use log::debug;

/// Virtual key the launcher interprets as "please exit" (`E`).
pub const CLOSE_KEY_CODE: u8 = 69;

/// Platform convention for asking the managed launcher to exit on its own.
///
/// The launcher is not driven through a structured IPC protocol; each
/// platform has its own way of nudging it. Implementations must not block
/// waiting for the process to exit, the caller owns that wait.
pub trait CloseSignal: Send + Sync {
    /// Ask the process `pid` to close.
    ///
    /// # Errors
    /// Returns an error when the signal could not be delivered.
    fn request_close(&self, pid: u32) -> io::Result<()>;

    /// Called once the process is gone (or was killed), to undo any lingering
    /// side effect of [`CloseSignal::request_close`].
    fn release(&self, _pid: u32) {}
}

/// Holds the close key down on the foreground input queue until the launcher
/// has exited, then releases it.
#[cfg(windows)]
#[derive(Debug, Clone, Copy)]
pub struct KeystrokeClose {
    pub key_code: u8,
}

#[cfg(windows)]
impl Default for KeystrokeClose {
    fn default() -> Self {
        Self {
            key_code: CLOSE_KEY_CODE,
        }
    }
}

#[cfg(windows)]
impl CloseSignal for KeystrokeClose {
    fn request_close(&self, pid: u32) -> io::Result<()> {
        use windows_sys::Win32::UI::Input::KeyboardAndMouse::keybd_event;

        let _ = crate::window::bring_to_front(pid);
        debug!("Sending close key {} to launcher {pid}", self.key_code);
        // SAFETY: `keybd_event` takes plain integer arguments.
        unsafe { keybd_event(self.key_code, 0, 0, 0) };
        Ok(())
    }

    fn release(&self, _pid: u32) {
        use windows_sys::Win32::UI::Input::KeyboardAndMouse::{KEYEVENTF_KEYUP, keybd_event};

        // SAFETY: `keybd_event` takes plain integer arguments.
        unsafe { keybd_event(self.key_code, 0, KEYEVENTF_KEYUP, 0) };
    }
}

/// Sends `SIGTERM` to the launcher.
#[cfg(not(windows))]
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminateClose;

#[cfg(not(windows))]
impl CloseSignal for TerminateClose {
    fn request_close(&self, pid: u32) -> io::Result<()> {
        // 0 and anything past `i32::MAX` would address a process group.
        let target = libc::pid_t::try_from(pid)
            .ok()
            .filter(|target| *target > 0)
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidInput, format!("invalid pid {pid}"))
            })?;

        debug!("Sending SIGTERM to launcher {pid}");
        // SAFETY: `kill` only takes plain integers.
        if unsafe { libc::kill(target, libc::SIGTERM) } == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }
}

/// The close signal appropriate for the current platform.
#[must_use]
pub fn platform_close_signal() -> Box<dyn CloseSignal> {
    #[cfg(windows)]
    {
        Box::new(KeystrokeClose::default())
    }

    #[cfg(not(windows))]
    {
        Box::new(TerminateClose)
    }
}
