//! Client side of the fleet-management service: the launcher version model,
//! the `LauncherApi` seam the supervisor consumes, and its HTTP
//! implementation.

mod client;
mod error;
mod traits;
mod types;

pub use client::{ApiCredentials, HttpApiClient};
pub use error::ApiError;
pub use traits::{ArchiveStream, LauncherApi};
pub use types::{LauncherInfo, Version, VersionComponent, VersionParseError};
