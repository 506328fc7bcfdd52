use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Launcher version as published by the fleet service: `major.minor.subMinor`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub sub_minor: u32,
}

impl Version {
    /// "Nothing installed".
    pub const ZERO: Self = Self::new(0, 0, 0);

    #[must_use]
    pub const fn new(major: u32, minor: u32, sub_minor: u32) -> Self {
        Self {
            major,
            minor,
            sub_minor,
        }
    }

    /// Lenient parse used for the local version marker.
    ///
    /// Anything that is not exactly three dot-separated decimal numbers maps
    /// to [`Version::ZERO`], so a corrupted marker reads as "not installed"
    /// and triggers a reinstall instead of an error.
    #[must_use]
    pub fn parse_or_zero(input: &str) -> Self {
        input.parse().unwrap_or(Self::ZERO)
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    #[must_use]
    pub fn is_different(&self, other: &Self) -> bool {
        self != other
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then(self.minor.cmp(&other.minor))
            .then(self.sub_minor.cmp(&other.sub_minor))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.sub_minor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionComponent {
    Major,
    Minor,
    SubMinor,
}

impl fmt::Display for VersionComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Major => write!(f, "major"),
            Self::Minor => write!(f, "minor"),
            Self::SubMinor => write!(f, "sub-minor"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VersionParseError {
    #[error("Expected X.Y.Z format, got: {input}")]
    InvalidFormat { input: String },
    #[error("Invalid {component} version: {value}")]
    InvalidComponent {
        component: VersionComponent,
        value: String,
    },
}

fn parse_component(component: VersionComponent, value: &str) -> Result<u32, VersionParseError> {
    let invalid = || VersionParseError::InvalidComponent {
        component,
        value: value.to_string(),
    };
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    value.parse().map_err(|_| invalid())
}

impl FromStr for Version {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let parts: Vec<&str> = s.split('.').collect();
        let [major, minor, sub_minor] = parts.as_slice() else {
            return Err(VersionParseError::InvalidFormat {
                input: s.to_string(),
            });
        };

        Ok(Self::new(
            parse_component(VersionComponent::Major, major)?,
            parse_component(VersionComponent::Minor, minor)?,
            parse_component(VersionComponent::SubMinor, sub_minor)?,
        ))
    }
}

/// The latest launcher build published by the fleet service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LauncherInfo {
    pub version: Version,
    pub archive_url: String,
    pub published_at: Option<DateTime<Utc>>,
}

/// Wire shape of `GET /api/LauncherVersions/Latest`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LatestVersionResponse {
    pub version_number: String,
    #[serde(default)]
    pub file_url: Option<String>,
    #[serde(default)]
    pub uploaded_at: Option<String>,
}

impl TryFrom<LatestVersionResponse> for LauncherInfo {
    type Error = VersionParseError;

    fn try_from(response: LatestVersionResponse) -> Result<Self, Self::Error> {
        Ok(Self {
            version: response.version_number.parse()?,
            archive_url: response.file_url.unwrap_or_default(),
            published_at: response.uploaded_at.as_deref().and_then(parse_timestamp),
        })
    }
}

/// The service emits timestamps both with and without an offset; offset-less
/// values are taken as UTC.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
