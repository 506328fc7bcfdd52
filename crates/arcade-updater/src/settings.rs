use std::path::{Path, PathBuf};
use std::time::Duration;

use arcade_api::ApiCredentials;
use arcade_core::{ProcessOptions, ScheduleConfig};
use serde::Deserialize;
use thiserror::Error;

#[cfg(windows)]
const DEFAULT_LAUNCHER_EXECUTABLE: &str = "Research-Arcade-Launcher.exe";
#[cfg(not(windows))]
const DEFAULT_LAUNCHER_EXECUTABLE: &str = "Research-Arcade-Launcher";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("configuration file {} not found", path.display())]
    Missing { path: PathBuf },
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Contents of `Config.json` next to the launcher directory.
///
/// The service connection keys keep the names existing machines already use
/// (`ApiHost`, `ApiUser`, `ApiPass`); everything else is optional tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdaterSettings {
    #[serde(rename = "ApiHost", alias = "apiHost", default = "default_api_host")]
    pub api_host: String,

    #[serde(rename = "ApiUser", alias = "apiUser", default = "default_api_user")]
    pub api_user: String,

    #[serde(rename = "ApiPass", alias = "apiPass", default = "default_api_pass")]
    pub api_pass: String,

    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,

    #[serde(default)]
    pub failure_retry_secs: Option<u64>,

    #[serde(default = "default_restart_delay")]
    pub restart_delay_secs: u64,

    #[serde(default = "default_network_wait")]
    pub network_wait_secs: u64,

    #[serde(default = "default_close_timeout")]
    pub close_timeout_secs: u64,

    #[serde(default = "default_exit_poll_interval")]
    pub exit_poll_interval_ms: u64,

    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    #[serde(default = "default_launcher_executable")]
    pub launcher_executable: String,

    #[serde(default = "default_reserved_dir")]
    pub reserved_dir: String,

    #[serde(default = "default_connectivity_probe")]
    pub connectivity_probe: String,

    #[serde(default)]
    pub debug_logging: bool,

    #[serde(default = "default_max_log_size_bytes")]
    pub max_log_size_bytes: u64,
}

fn default_api_host() -> String {
    "https://localhost:5001".to_string()
}

fn default_api_user() -> String {
    "Research-Arcade-User".to_string()
}

fn default_api_pass() -> String {
    "Research-Arcade-Password".to_string()
}

fn default_check_interval() -> u64 {
    60 * 60
}

fn default_restart_delay() -> u64 {
    5
}

fn default_network_wait() -> u64 {
    60
}

fn default_close_timeout() -> u64 {
    30
}

fn default_exit_poll_interval() -> u64 {
    1000
}

fn default_http_timeout() -> u64 {
    30
}

fn default_launcher_executable() -> String {
    DEFAULT_LAUNCHER_EXECUTABLE.to_string()
}

fn default_reserved_dir() -> String {
    "Games".to_string()
}

fn default_connectivity_probe() -> String {
    "google.com:443".to_string()
}

pub fn default_max_log_size_bytes() -> u64 {
    5 * 1024 * 1024
}

impl Default for UpdaterSettings {
    fn default() -> Self {
        Self {
            api_host: default_api_host(),
            api_user: default_api_user(),
            api_pass: default_api_pass(),
            check_interval_secs: default_check_interval(),
            failure_retry_secs: None,
            restart_delay_secs: default_restart_delay(),
            network_wait_secs: default_network_wait(),
            close_timeout_secs: default_close_timeout(),
            exit_poll_interval_ms: default_exit_poll_interval(),
            http_timeout_secs: default_http_timeout(),
            launcher_executable: default_launcher_executable(),
            reserved_dir: default_reserved_dir(),
            connectivity_probe: default_connectivity_probe(),
            debug_logging: false,
            max_log_size_bytes: default_max_log_size_bytes(),
        }
    }
}

impl UpdaterSettings {
    /// Load settings from `path`. A missing file is an error: the updater
    /// has no safe service address to fall back to on a deployed machine.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                SettingsError::Missing {
                    path: path.to_path_buf(),
                }
            } else {
                SettingsError::Read {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;

        serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn credentials(&self) -> ApiCredentials {
        ApiCredentials {
            user: self.api_user.clone(),
            password: self.api_pass.clone(),
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs.max(1))
    }

    pub fn schedule_config(&self) -> ScheduleConfig {
        let check_interval = Duration::from_secs(self.check_interval_secs.max(1));
        ScheduleConfig {
            check_interval,
            failure_retry_interval: self
                .failure_retry_secs
                .map_or(check_interval, |secs| Duration::from_secs(secs.max(1))),
            restart_delay: Duration::from_secs(self.restart_delay_secs),
            network_wait: Duration::from_secs(self.network_wait_secs),
            ..ScheduleConfig::default()
        }
    }

    pub fn process_options(&self, executable: PathBuf) -> ProcessOptions {
        ProcessOptions {
            executable,
            exit_poll_interval: Duration::from_millis(self.exit_poll_interval_ms.max(50)),
            close_timeout: Duration::from_secs(self.close_timeout_secs),
        }
    }
}
