use std::path::PathBuf;
use thiserror::Error;

const LAUNCHER_DIR_NAME: &str = "Launcher";
const VERSION_FILE_NAME: &str = "launcher_version.txt";
const CONFIG_FILE_NAME: &str = "Config.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AppPathsError {
    #[error("Could not determine working directory")]
    WorkingDirUnavailable,
    #[error("Could not determine data directory")]
    DataDirUnavailable,
}

/// Filesystem layout of one updater installation.
///
/// `root_dir` holds the configuration, the version marker and the launcher
/// install directory. `data_dir` holds updater-private files (logs, the
/// instance lock) and never lives inside the install directory.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub root_dir: PathBuf,
    pub data_dir: PathBuf,
}

impl AppPaths {
    /// Build application paths rooted at the current working directory.
    ///
    /// # Errors
    /// Returns an error when the working directory or the per-user data
    /// directory cannot be determined.
    pub fn new() -> Result<Self, AppPathsError> {
        let root_dir =
            std::env::current_dir().map_err(|_| AppPathsError::WorkingDirUnavailable)?;
        Self::with_root(root_dir)
    }

    /// Build application paths rooted at `root_dir`.
    ///
    /// # Errors
    /// Returns an error when the per-user data directory cannot be determined.
    pub fn with_root(root_dir: impl Into<PathBuf>) -> Result<Self, AppPathsError> {
        let data_dir = dirs::data_dir()
            .ok_or(AppPathsError::DataDirUnavailable)?
            .join("arcade-updater");
        Ok(Self {
            root_dir: root_dir.into(),
            data_dir,
        })
    }

    #[must_use]
    pub fn launcher_dir(&self) -> PathBuf {
        self.root_dir.join(LAUNCHER_DIR_NAME)
    }

    #[must_use]
    pub fn launcher_executable(&self, file_name: &str) -> PathBuf {
        self.launcher_dir().join(file_name)
    }

    /// The version marker sits next to the install directory so that wiping
    /// the install directory never touches it.
    #[must_use]
    pub fn version_file(&self) -> PathBuf {
        self.root_dir.join(VERSION_FILE_NAME)
    }

    #[must_use]
    pub fn config_file(&self) -> PathBuf {
        self.root_dir.join(CONFIG_FILE_NAME)
    }

    #[must_use]
    pub fn log_file(&self) -> PathBuf {
        self.data_dir.join("updater.log")
    }

    #[must_use]
    pub fn lock_file(&self) -> PathBuf {
        self.data_dir.join("instance.lock")
    }

    /// Ensure the data and install directories exist on disk.
    ///
    /// # Errors
    /// Returns an error if any directory cannot be created.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(self.launcher_dir())?;
        Ok(())
    }
}
