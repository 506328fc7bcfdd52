//! Best-effort window focus for the managed launcher.
//!
//! The launcher runs fullscreen on an unattended cabinet; after (re)starting it
//! we try to bring its top-level window to the foreground so it receives
//! input. Failure is never fatal.

#[cfg(windows)]
mod windows_impl {
    use windows_sys::Win32::Foundation::{HWND, LPARAM};
    use windows_sys::Win32::UI::WindowsAndMessaging::{
        EnumWindows, GetWindowThreadProcessId, IsWindowVisible, SW_RESTORE, SetForegroundWindow,
        ShowWindow,
    };
    use windows_sys::core::BOOL;

    const CONTINUE: BOOL = 1;
    const STOP: BOOL = 0;

    struct Search {
        pid: u32,
        found: HWND,
    }

    // SAFETY: callback signature is required by `EnumWindows`. `lparam` is
    // always a pointer to the `Search` owned by `find_window_for_pid`.
    unsafe extern "system" fn match_process(hwnd: HWND, lparam: LPARAM) -> BOOL {
        let search = lparam as *mut Search;
        if search.is_null() {
            return CONTINUE;
        }

        let mut owner_pid = 0u32;
        // SAFETY: `hwnd` comes from the enumeration and `owner_pid` is valid
        // stack storage.
        unsafe { GetWindowThreadProcessId(hwnd, &mut owner_pid) };

        // SAFETY: `search` points to storage that outlives the enumeration.
        let search = unsafe { &mut *search };
        // SAFETY: `hwnd` comes from the enumeration.
        if owner_pid == search.pid && unsafe { IsWindowVisible(hwnd) } != 0 {
            search.found = hwnd;
            return STOP;
        }

        CONTINUE
    }

    fn find_window_for_pid(pid: u32) -> Option<HWND> {
        let mut search = Search {
            pid,
            found: std::ptr::null_mut(),
        };
        // SAFETY: callback and `lparam` both satisfy `EnumWindows` requirements.
        unsafe {
            EnumWindows(Some(match_process), &mut search as *mut Search as LPARAM);
        }
        if search.found.is_null() {
            None
        } else {
            Some(search.found)
        }
    }

    pub fn bring_to_front(pid: u32) -> bool {
        let Some(hwnd) = find_window_for_pid(pid) else {
            return false;
        };
        // SAFETY: `hwnd` was returned by the enumeration above.
        unsafe {
            ShowWindow(hwnd, SW_RESTORE);
            SetForegroundWindow(hwnd) != 0
        }
    }
}

/// Try to bring the top-level window owned by `pid` to the foreground.
///
/// Returns `false` when no visible window is owned by the process yet or the
/// platform has no notion of focusing another process's window.
#[cfg(windows)]
#[must_use]
pub fn bring_to_front(pid: u32) -> bool {
    windows_impl::bring_to_front(pid)
}

#[cfg(not(windows))]
#[must_use]
pub fn bring_to_front(_pid: u32) -> bool {
    false
}
