use thiserror::Error;

#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("another arcade updater is already supervising this machine")]
    AlreadyRunning,
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[cfg(windows)]
    #[error("win32 call {api} failed with code {code}")]
    Win32 { api: &'static str, code: u32 },
}

impl AcquireError {
    #[cfg_attr(windows, allow(dead_code))]
    fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }
}

#[cfg(windows)]
mod windows_impl {
    use std::ptr;

    use arcade_platform::AppPaths;
    use windows_sys::Win32::Foundation::{CloseHandle, ERROR_ALREADY_EXISTS, GetLastError, HANDLE};
    use windows_sys::Win32::System::Threading::CreateMutexA;

    const MUTEX_NAME: &[u8] = b"Global\\ArcadeUpdaterMutex\0";

    pub struct SingleInstance {
        handle: HANDLE,
    }

    impl SingleInstance {
        pub fn acquire(_paths: &AppPaths) -> Result<Self, super::AcquireError> {
            // SAFETY: static NUL-terminated name and null security attributes;
            // the returned handle is checked before use.
            unsafe {
                let handle = CreateMutexA(ptr::null(), 1, MUTEX_NAME.as_ptr());
                if handle.is_null() {
                    return Err(super::AcquireError::Win32 {
                        api: "CreateMutexA",
                        code: GetLastError(),
                    });
                }

                if GetLastError() == ERROR_ALREADY_EXISTS {
                    CloseHandle(handle);
                    return Err(super::AcquireError::AlreadyRunning);
                }

                Ok(Self { handle })
            }
        }
    }

    impl Drop for SingleInstance {
        fn drop(&mut self) {
            // SAFETY: `self.handle` came from `CreateMutexA` and is owned here.
            unsafe {
                CloseHandle(self.handle);
            }
        }
    }
}

#[cfg(not(windows))]
mod lock_file_impl {
    use std::fs::{File, OpenOptions};
    use std::io::{Seek, SeekFrom, Write};

    use arcade_platform::AppPaths;
    use fs2::FileExt;

    /// Holds an exclusive advisory lock on `<data_dir>/instance.lock` for the
    /// lifetime of the updater.
    pub struct SingleInstance {
        _file: File,
    }

    impl SingleInstance {
        pub fn acquire(paths: &AppPaths) -> Result<Self, super::AcquireError> {
            let lock_path = paths.lock_file();
            if let Some(parent) = lock_path.parent() {
                std::fs::create_dir_all(parent).map_err(|error| {
                    super::AcquireError::io("failed to create data directory", error)
                })?;
            }

            let mut lock_file = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .truncate(false)
                .open(&lock_path)
                .map_err(|error| {
                    super::AcquireError::io("failed to open instance lock file", error)
                })?;

            match lock_file.try_lock_exclusive() {
                Ok(()) => {}
                Err(error) if error.kind() == std::io::ErrorKind::WouldBlock => {
                    return Err(super::AcquireError::AlreadyRunning);
                }
                Err(error) => {
                    return Err(super::AcquireError::io(
                        "failed to acquire instance lock",
                        error,
                    ));
                }
            }

            lock_file
                .set_len(0)
                .and_then(|()| lock_file.seek(SeekFrom::Start(0)).map(|_| ()))
                .and_then(|()| writeln!(lock_file, "{}", std::process::id()))
                .map_err(|error| {
                    super::AcquireError::io("failed to write instance lock metadata", error)
                })?;

            Ok(Self { _file: lock_file })
        }
    }
}

#[cfg(not(windows))]
pub use lock_file_impl::SingleInstance;
#[cfg(windows)]
pub use windows_impl::SingleInstance;
