use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::error::ApiError;
use crate::types::{LauncherInfo, Version};

/// Archive bytes as they arrive from the network.
pub type ArchiveStream = BoxStream<'static, Result<Vec<u8>, ApiError>>;

/// The fleet-management service the updater reconciles against.
#[async_trait]
pub trait LauncherApi: Send + Sync {
    /// Fetch the launcher build this machine should be running.
    async fn latest_launcher(&self) -> Result<LauncherInfo, ApiError>;

    /// Open the archive for `info` as a byte stream.
    async fn download_archive(&self, info: &LauncherInfo) -> Result<ArchiveStream, ApiError>;

    /// Tell the service which launcher version is now installed on this
    /// machine.
    async fn report_installed_version(&self, version: Version) -> Result<(), ApiError>;
}
