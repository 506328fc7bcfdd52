use std::io::{self, Write as _};
use std::path::{Path, PathBuf};

use arcade_api::Version;
use log::{debug, warn};

/// The launcher version installed on this machine, persisted as a dotted
/// triple in a small text file.
///
/// The record only ever reflects an update that was applied completely; it
/// is written once, at the end of a successful update, and replaced
/// atomically so a crash mid-write leaves the previous value intact.
#[derive(Debug, Clone)]
pub struct LocalVersionRecord {
    path: PathBuf,
}

impl LocalVersionRecord {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the installed version. A missing, unreadable or malformed marker
    /// reads as [`Version::ZERO`].
    #[must_use]
    pub fn read(&self) -> Version {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                debug!("No version marker at {}", self.path.display());
                return Version::ZERO;
            }
            Err(error) => {
                warn!(
                    "Failed to read version marker {}: {error}",
                    self.path.display()
                );
                return Version::ZERO;
            }
        };

        let version = Version::parse_or_zero(&content);
        if version.is_zero() {
            warn!(
                "Version marker {} holds {:?}; treating launcher as not installed",
                self.path.display(),
                content.trim()
            );
        }
        version
    }

    /// Replace the persisted version.
    ///
    /// # Errors
    /// Returns an error when the temporary file cannot be written or moved
    /// over the marker.
    pub fn write(&self, version: Version) -> io::Result<()> {
        let parent = self
            .path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent)?;

        let mut staged = tempfile::Builder::new()
            .prefix(".launcher_version.")
            .suffix(".tmp")
            .tempfile_in(parent)?;
        writeln!(staged, "{version}")?;
        staged.as_file().sync_all()?;
        staged.persist(&self.path).map_err(|error| error.error)?;

        debug!("Recorded launcher version {version} in {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use arcade_api::Version;

    use super::LocalVersionRecord;

    #[test]
    fn missing_marker_reads_as_zero() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let record = LocalVersionRecord::new(temp.path().join("launcher_version.txt"));

        assert_eq!(record.read(), Version::ZERO);
    }

    #[test]
    fn write_then_read_returns_version() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let record = LocalVersionRecord::new(temp.path().join("launcher_version.txt"));

        record
            .write(Version::new(1, 2, 0))
            .expect("version should be written");

        assert_eq!(record.read(), Version::new(1, 2, 0));
        let raw = std::fs::read_to_string(record.path()).expect("marker should be readable");
        assert_eq!(raw, "1.2.0\n");
    }

    #[test]
    fn malformed_marker_reads_as_zero() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let path = temp.path().join("launcher_version.txt");
        std::fs::write(&path, "1.2").expect("marker should be written");

        assert_eq!(LocalVersionRecord::new(path).read(), Version::ZERO);
    }

    #[test]
    fn write_replaces_existing_marker_without_leaving_temp_files() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let record = LocalVersionRecord::new(temp.path().join("launcher_version.txt"));

        record.write(Version::new(1, 0, 0)).expect("first write");
        record.write(Version::new(2, 0, 0)).expect("second write");

        assert_eq!(record.read(), Version::new(2, 0, 0));
        let leftovers = std::fs::read_dir(temp.path())
            .expect("read temp dir entries")
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn write_creates_missing_parent_directory() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let record = LocalVersionRecord::new(temp.path().join("nested").join("marker.txt"));

        record.write(Version::new(0, 3, 1)).expect("write should succeed");

        assert_eq!(record.read(), Version::new(0, 3, 1));
    }
}
