use std::ffi::{OsStr, OsString};
use std::io;
use std::path::{Path, PathBuf};

use arcade_api::{ApiError, LauncherApi, LauncherInfo, Version};
use futures_util::StreamExt;
use log::{debug, info, warn};
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::version_record::LocalVersionRecord;

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("failed to clear install directory entry {}: {source}", path.display())]
    Clear {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("archive download failed: {0}")]
    Download(#[source] ApiError),
    #[error("{context} {}: {source}", path.display())]
    DownloadIo {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{context}: {source}")]
    Extract {
        context: &'static str,
        #[source]
        source: zip::result::ZipError,
    },
    #[error("{context} {}: {source}", path.display())]
    ExtractIo {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("extraction worker stopped unexpectedly: {0}")]
    ExtractWorker(String),
    #[error("failed to remove temporary archive: {0}")]
    Cleanup(#[source] io::Error),
    #[error("failed to record launcher version {version}: {source}")]
    Persist {
        version: Version,
        #[source]
        source: io::Error,
    },
    #[error("update cancelled")]
    Cancelled,
}

impl UpdateError {
    fn download_io(context: &'static str, path: &Path, source: io::Error) -> Self {
        Self::DownloadIo {
            context,
            path: path.to_path_buf(),
            source,
        }
    }

    fn extract_io(context: &'static str, path: &Path, source: io::Error) -> Self {
        Self::ExtractIo {
            context,
            path: path.to_path_buf(),
            source,
        }
    }

    #[must_use]
    pub fn is_download(&self) -> bool {
        matches!(self, Self::Download(_) | Self::DownloadIo { .. })
    }

    #[must_use]
    pub fn is_extract(&self) -> bool {
        matches!(
            self,
            Self::Extract { .. } | Self::ExtractIo { .. } | Self::ExtractWorker(_)
        )
    }
}

/// Replaces the launcher installation with a downloaded archive.
///
/// The archive is downloaded next to the installation first, so a failed
/// download leaves the old launcher untouched. Only then is everything in the
/// install directory except the reserved data directory removed and the
/// archive unpacked in its place. Extraction writes in place: a failure half
/// way leaves a partial install behind, which the next cycle repairs because
/// the version record was not advanced.
#[derive(Debug, Clone)]
pub struct UpdateApplier {
    install_dir: PathBuf,
    reserved_dir: OsString,
    record: LocalVersionRecord,
}

impl UpdateApplier {
    #[must_use]
    pub fn new(
        install_dir: impl Into<PathBuf>,
        reserved_dir: impl Into<OsString>,
        record: LocalVersionRecord,
    ) -> Self {
        Self {
            install_dir: install_dir.into(),
            reserved_dir: reserved_dir.into(),
            record,
        }
    }

    #[must_use]
    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    #[must_use]
    pub fn record(&self) -> &LocalVersionRecord {
        &self.record
    }

    /// Download `target` and install it. The launcher must not be running.
    ///
    /// # Errors
    /// Returns an error when the archive cannot be downloaded, the install
    /// directory cannot be cleared, the archive cannot be extracted or the new
    /// version cannot be recorded. The version record is left untouched on
    /// every error and the installed files only on download errors.
    pub async fn apply_update(
        &self,
        api: &dyn LauncherApi,
        target: &LauncherInfo,
        cancel: &CancellationToken,
    ) -> Result<(), UpdateError> {
        info!(
            "Installing launcher {} into {}",
            target.version,
            self.install_dir.display()
        );

        std::fs::create_dir_all(&self.install_dir).map_err(|source| UpdateError::Clear {
            path: self.install_dir.clone(),
            source,
        })?;

        let archive = self.download(api, target, cancel).await?;
        if cancel.is_cancelled() {
            return Err(UpdateError::Cancelled);
        }

        self.clear_install_dir(archive.path())?;
        self.extract(archive.path(), cancel).await?;
        archive.close().map_err(UpdateError::Cleanup)?;

        if cancel.is_cancelled() {
            return Err(UpdateError::Cancelled);
        }

        self.record
            .write(target.version)
            .map_err(|source| UpdateError::Persist {
                version: target.version,
                source,
            })?;
        info!("Launcher {} installed", target.version);
        Ok(())
    }

    /// Remove every install directory entry except the reserved one and the
    /// downloaded archive.
    fn clear_install_dir(&self, archive: &Path) -> Result<(), UpdateError> {
        let entries = std::fs::read_dir(&self.install_dir).map_err(|source| UpdateError::Clear {
            path: self.install_dir.clone(),
            source,
        })?;

        for entry in entries {
            let entry = entry.map_err(|source| UpdateError::Clear {
                path: self.install_dir.clone(),
                source,
            })?;
            let path = entry.path();
            if path == archive {
                continue;
            }
            if self.is_reserved(&entry.file_name()) {
                debug!("Preserving {}", path.display());
                continue;
            }

            let is_dir = entry.file_type().is_ok_and(|kind| kind.is_dir());
            let removed = if is_dir {
                std::fs::remove_dir_all(&path)
            } else {
                std::fs::remove_file(&path)
            };
            removed.map_err(|source| UpdateError::Clear { path, source })?;
        }

        Ok(())
    }

    fn is_reserved(&self, name: &OsStr) -> bool {
        if cfg!(windows) {
            name.eq_ignore_ascii_case(&self.reserved_dir)
        } else {
            name == self.reserved_dir
        }
    }

    async fn download(
        &self,
        api: &dyn LauncherApi,
        target: &LauncherInfo,
        cancel: &CancellationToken,
    ) -> Result<NamedTempFile, UpdateError> {
        let mut stream = tokio::select! {
            () = cancel.cancelled() => return Err(UpdateError::Cancelled),
            stream = api.download_archive(target) => stream.map_err(UpdateError::Download)?,
        };

        // Dropping `archive` on any early return deletes the partial download.
        let archive = tempfile::Builder::new()
            .prefix(".launcher-download.")
            .suffix(".zip")
            .tempfile_in(&self.install_dir)
            .map_err(|error| {
                UpdateError::download_io("failed to create download file", &self.install_dir, error)
            })?;
        let mut file = tokio::fs::File::from_std(archive.reopen().map_err(|error| {
            UpdateError::download_io("failed to open download file", archive.path(), error)
        })?);

        let mut downloaded: u64 = 0;
        loop {
            let chunk = tokio::select! {
                () = cancel.cancelled() => return Err(UpdateError::Cancelled),
                chunk = stream.next() => chunk,
            };
            let Some(chunk) = chunk else {
                break;
            };
            let chunk = chunk.map_err(UpdateError::Download)?;
            file.write_all(&chunk).await.map_err(|error| {
                UpdateError::download_io("failed to write download data", archive.path(), error)
            })?;
            downloaded += chunk.len() as u64;
        }

        file.flush().await.map_err(|error| {
            UpdateError::download_io("failed to flush download file", archive.path(), error)
        })?;
        drop(file);

        info!("Download complete: {downloaded} bytes");
        Ok(archive)
    }

    async fn extract(&self, archive: &Path, cancel: &CancellationToken) -> Result<(), UpdateError> {
        let archive = archive.to_path_buf();
        let dest = self.install_dir.clone();
        let cancel = cancel.clone();

        tokio::task::spawn_blocking(move || extract_zip(&archive, &dest, &cancel))
            .await
            .map_err(|error| UpdateError::ExtractWorker(error.to_string()))?
    }
}

fn extract_zip(zip_path: &Path, dest: &Path, cancel: &CancellationToken) -> Result<(), UpdateError> {
    let file = std::fs::File::open(zip_path)
        .map_err(|error| UpdateError::extract_io("failed to open archive", zip_path, error))?;
    let mut archive = zip::ZipArchive::new(file).map_err(|source| UpdateError::Extract {
        context: "failed to read archive",
        source,
    })?;

    for i in 0..archive.len() {
        if cancel.is_cancelled() {
            return Err(UpdateError::Cancelled);
        }

        let mut entry = archive.by_index(i).map_err(|source| UpdateError::Extract {
            context: "failed to read archive entry",
            source,
        })?;
        let Some(name) = entry.enclosed_name() else {
            warn!("Skipping archive entry with unsafe path: {}", entry.name());
            continue;
        };
        let out_path = dest.join(name);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(|error| {
                UpdateError::extract_io("failed to create directory", &out_path, error)
            })?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(|error| {
                UpdateError::extract_io("failed to create parent directory", parent, error)
            })?;
        }
        let mut outfile = std::fs::File::create(&out_path).map_err(|error| {
            UpdateError::extract_io("failed to create extracted file", &out_path, error)
        })?;
        io::copy(&mut entry, &mut outfile).map_err(|error| {
            UpdateError::extract_io("failed to extract archive entry", &out_path, error)
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                let _ = std::fs::set_permissions(&out_path, std::fs::Permissions::from_mode(mode));
            }
        }
    }

    debug!("Extracted {} entries into {}", archive.len(), dest.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;
    use std::path::Path;

    use arcade_api::{ApiError, ArchiveStream, LauncherApi, LauncherInfo, Version, VersionParseError};
    use async_trait::async_trait;
    use futures_util::StreamExt;
    use tokio_util::sync::CancellationToken;

    use super::{UpdateApplier, UpdateError, extract_zip};
    use crate::version_record::LocalVersionRecord;

    enum Archive {
        Bytes(Vec<u8>),
        FailMidStream(Vec<u8>),
        Refused,
    }

    struct ArchiveApi(Archive);

    fn api_error() -> ApiError {
        ApiError::InvalidVersion(VersionParseError::InvalidFormat {
            input: "connection reset".to_string(),
        })
    }

    #[async_trait]
    impl LauncherApi for ArchiveApi {
        async fn latest_launcher(&self) -> Result<LauncherInfo, ApiError> {
            Err(api_error())
        }

        async fn download_archive(&self, _info: &LauncherInfo) -> Result<ArchiveStream, ApiError> {
            match &self.0 {
                Archive::Bytes(bytes) => {
                    let chunks: Vec<Result<Vec<u8>, ApiError>> =
                        bytes.chunks(7).map(|chunk| Ok(chunk.to_vec())).collect();
                    Ok(futures_util::stream::iter(chunks).boxed())
                }
                Archive::FailMidStream(prefix) => Ok(futures_util::stream::iter(vec![
                    Ok(prefix.clone()),
                    Err(api_error()),
                ])
                .boxed()),
                Archive::Refused => Err(api_error()),
            }
        }

        async fn report_installed_version(&self, _version: Version) -> Result<(), ApiError> {
            Ok(())
        }
    }

    fn zip_bytes(files: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default().unix_permissions(0o755);
        for (name, content) in files {
            writer.start_file(*name, options).expect("entry should start");
            writer
                .write_all(content.as_bytes())
                .expect("entry should be written");
        }
        writer.finish().expect("archive should finalize").into_inner()
    }

    fn target(version: Version) -> LauncherInfo {
        LauncherInfo {
            version,
            archive_url: "https://cdn.example.com/launcher.zip".to_string(),
            published_at: None,
        }
    }

    struct Fixture {
        _temp: tempfile::TempDir,
        applier: UpdateApplier,
    }

    impl Fixture {
        fn new() -> Self {
            let temp = tempfile::tempdir().expect("tempdir should be created");
            let install_dir = temp.path().join("Launcher");
            std::fs::create_dir_all(install_dir.join("Games").join("Pong"))
                .expect("games dir should be created");
            std::fs::write(install_dir.join("Games").join("Pong").join("save.dat"), b"hi-score")
                .expect("save should be written");
            std::fs::write(install_dir.join("old-launcher.exe"), b"old")
                .expect("old file should be written");
            std::fs::create_dir_all(install_dir.join("assets")).expect("assets dir");
            std::fs::write(install_dir.join("assets").join("logo.png"), b"png").expect("asset");

            let record = LocalVersionRecord::new(temp.path().join("launcher_version.txt"));
            record.write(Version::new(1, 0, 0)).expect("record should be seeded");

            Self {
                applier: UpdateApplier::new(install_dir, "Games", record),
                _temp: temp,
            }
        }

        fn install_dir(&self) -> &Path {
            self.applier.install_dir()
        }

        fn has_temp_archive(&self) -> bool {
            std::fs::read_dir(self.install_dir())
                .expect("install dir should be readable")
                .filter_map(Result::ok)
                .any(|entry| {
                    entry
                        .file_name()
                        .to_string_lossy()
                        .starts_with(".launcher-download.")
                })
        }
    }

    #[tokio::test]
    async fn apply_update_replaces_files_and_keeps_reserved_dir() {
        let fixture = Fixture::new();
        let api = ArchiveApi(Archive::Bytes(zip_bytes(&[
            ("Research-Arcade-Launcher.exe", "new"),
            ("assets/banner.png", "banner"),
        ])));

        fixture
            .applier
            .apply_update(&api, &target(Version::new(1, 2, 0)), &CancellationToken::new())
            .await
            .expect("update should apply");

        let dir = fixture.install_dir();
        assert_eq!(
            std::fs::read(dir.join("Games").join("Pong").join("save.dat")).expect("save kept"),
            b"hi-score"
        );
        assert!(!dir.join("old-launcher.exe").exists());
        assert!(!dir.join("assets").join("logo.png").exists());
        assert_eq!(
            std::fs::read(dir.join("Research-Arcade-Launcher.exe")).expect("new exe"),
            b"new"
        );
        assert!(dir.join("assets").join("banner.png").is_file());
        assert!(!fixture.has_temp_archive());
        assert_eq!(fixture.applier.record().read(), Version::new(1, 2, 0));
    }

    #[tokio::test]
    async fn refused_download_keeps_recorded_version() {
        let fixture = Fixture::new();
        let api = ArchiveApi(Archive::Refused);

        let error = fixture
            .applier
            .apply_update(&api, &target(Version::new(1, 2, 0)), &CancellationToken::new())
            .await
            .expect_err("download should fail");

        assert!(error.is_download());
        assert_eq!(fixture.applier.record().read(), Version::new(1, 0, 0));
        assert!(fixture.install_dir().join("Games").join("Pong").join("save.dat").is_file());
        assert!(fixture.install_dir().join("old-launcher.exe").is_file());
    }

    #[tokio::test]
    async fn interrupted_download_removes_partial_archive() {
        let fixture = Fixture::new();
        let api = ArchiveApi(Archive::FailMidStream(b"PK\x03\x04partial".to_vec()));

        let error = fixture
            .applier
            .apply_update(&api, &target(Version::new(1, 2, 0)), &CancellationToken::new())
            .await
            .expect_err("download should fail");

        assert!(matches!(error, UpdateError::Download(_)));
        assert!(!fixture.has_temp_archive());
        assert_eq!(fixture.applier.record().read(), Version::new(1, 0, 0));
        assert_eq!(
            std::fs::read(fixture.install_dir().join("old-launcher.exe")).expect("old exe kept"),
            b"old"
        );
        assert!(fixture.install_dir().join("assets").join("logo.png").is_file());
    }

    #[tokio::test]
    async fn leftover_partial_download_is_cleared() {
        let fixture = Fixture::new();
        std::fs::write(
            fixture.install_dir().join(".launcher-download.crashed.zip"),
            b"PK",
        )
        .expect("leftover should be written");
        let api = ArchiveApi(Archive::Bytes(zip_bytes(&[("Research-Arcade-Launcher.exe", "new")])));

        fixture
            .applier
            .apply_update(&api, &target(Version::new(1, 2, 0)), &CancellationToken::new())
            .await
            .expect("update should apply");

        assert!(!fixture.has_temp_archive());
        assert!(fixture.install_dir().join("Research-Arcade-Launcher.exe").is_file());
    }

    #[tokio::test]
    async fn corrupt_archive_is_an_extract_error() {
        let fixture = Fixture::new();
        let api = ArchiveApi(Archive::Bytes(b"definitely not a zip archive".to_vec()));

        let error = fixture
            .applier
            .apply_update(&api, &target(Version::new(1, 2, 0)), &CancellationToken::new())
            .await
            .expect_err("extraction should fail");

        assert!(error.is_extract(), "unexpected error: {error}");
        assert_eq!(fixture.applier.record().read(), Version::new(1, 0, 0));
        assert!(!fixture.has_temp_archive());
    }

    #[tokio::test]
    async fn cancelled_update_does_not_touch_record() {
        let fixture = Fixture::new();
        let api = ArchiveApi(Archive::Bytes(zip_bytes(&[("launcher", "new")])));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let error = fixture
            .applier
            .apply_update(&api, &target(Version::new(2, 0, 0)), &cancel)
            .await
            .expect_err("cancelled update should fail");

        assert!(matches!(error, UpdateError::Cancelled));
        assert_eq!(fixture.applier.record().read(), Version::new(1, 0, 0));
    }

    #[tokio::test]
    async fn missing_install_dir_is_created() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let record = LocalVersionRecord::new(temp.path().join("launcher_version.txt"));
        let applier = UpdateApplier::new(temp.path().join("Launcher"), "Games", record);
        let api = ArchiveApi(Archive::Bytes(zip_bytes(&[("launcher", "fresh")])));

        applier
            .apply_update(&api, &target(Version::new(0, 1, 0)), &CancellationToken::new())
            .await
            .expect("fresh install should succeed");

        assert!(temp.path().join("Launcher").join("launcher").is_file());
        assert_eq!(applier.record().read(), Version::new(0, 1, 0));
    }

    #[test]
    fn extract_zip_skips_unsafe_paths() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let zip_path = temp.path().join("unsafe.zip");
        let extract_dir = temp.path().join("extract");
        std::fs::write(&zip_path, zip_bytes(&[("../outside.txt", "escape"), ("inside.txt", "ok")]))
            .expect("archive should be written");

        extract_zip(&zip_path, &extract_dir, &CancellationToken::new())
            .expect("extraction should not fail");

        assert!(!temp.path().join("outside.txt").exists());
        assert!(extract_dir.join("inside.txt").is_file());
    }
}
