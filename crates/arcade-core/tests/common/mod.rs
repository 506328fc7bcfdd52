#![allow(dead_code)]

use std::io::Write as _;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arcade_api::{ApiError, ArchiveStream, LauncherApi, LauncherInfo, Version, VersionParseError};
use arcade_core::{
    LocalVersionRecord, NetworkProbe, ProcessControl, ProcessError, ProcessEvent, StartOutcome,
    StateMachine, Supervisor, UpdateApplier,
};
use async_trait::async_trait;
use futures_util::StreamExt;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub const EXECUTABLE: &str = "Research-Arcade-Launcher.exe";

pub fn api_error(message: &str) -> ApiError {
    ApiError::InvalidVersion(VersionParseError::InvalidFormat {
        input: message.to_string(),
    })
}

pub fn launcher_zip(files: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default().unix_permissions(0o755);
    for (name, content) in files {
        writer.start_file(*name, options).expect("start zip entry");
        writer
            .write_all(content.as_bytes())
            .expect("write zip entry");
    }
    writer.finish().expect("finish zip").into_inner()
}

pub struct MockApi {
    latest: Mutex<Result<LauncherInfo, String>>,
    archive: Mutex<Option<Vec<u8>>>,
    query_delay: Duration,
    reports: Mutex<Vec<Version>>,
    queries: AtomicUsize,
    downloads: AtomicUsize,
    active_queries: AtomicUsize,
    max_active_queries: AtomicUsize,
}

impl MockApi {
    pub fn publishing(version: Version, archive: Vec<u8>) -> Self {
        Self {
            latest: Mutex::new(Ok(LauncherInfo {
                version,
                archive_url: format!("https://cdn.example.com/launcher-{version}.zip"),
                published_at: None,
            })),
            archive: Mutex::new(Some(archive)),
            query_delay: Duration::ZERO,
            reports: Mutex::new(Vec::new()),
            queries: AtomicUsize::new(0),
            downloads: AtomicUsize::new(0),
            active_queries: AtomicUsize::new(0),
            max_active_queries: AtomicUsize::new(0),
        }
    }

    pub fn unreachable() -> Self {
        let api = Self::publishing(Version::ZERO, Vec::new());
        *api.latest.lock().expect("latest lock") = Err("service unavailable".to_string());
        api
    }

    pub fn with_query_delay(mut self, delay: Duration) -> Self {
        self.query_delay = delay;
        self
    }

    pub fn with_broken_download(self) -> Self {
        *self.archive.lock().expect("archive lock") = None;
        self
    }

    pub fn serve_archive(&self, archive: Vec<u8>) {
        *self.archive.lock().expect("archive lock") = Some(archive);
    }

    pub fn publish(&self, version: Version) {
        let mut latest = self.latest.lock().expect("latest lock");
        *latest = Ok(LauncherInfo {
            version,
            archive_url: String::new(),
            published_at: None,
        });
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    pub fn max_active_queries(&self) -> usize {
        self.max_active_queries.load(Ordering::SeqCst)
    }

    pub fn reports(&self) -> Vec<Version> {
        self.reports.lock().expect("reports lock").clone()
    }
}

#[async_trait]
impl LauncherApi for MockApi {
    async fn latest_launcher(&self) -> Result<LauncherInfo, ApiError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let active = self.active_queries.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active_queries.fetch_max(active, Ordering::SeqCst);

        if !self.query_delay.is_zero() {
            tokio::time::sleep(self.query_delay).await;
        }

        self.active_queries.fetch_sub(1, Ordering::SeqCst);
        self.latest
            .lock()
            .expect("latest lock")
            .clone()
            .map_err(|message| api_error(&message))
    }

    async fn download_archive(&self, _info: &LauncherInfo) -> Result<ArchiveStream, ApiError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        let archive = self.archive.lock().expect("archive lock").clone();
        match archive {
            Some(bytes) => Ok(futures_util::stream::iter(vec![Ok(bytes)]).boxed()),
            None => Err(api_error("archive download refused")),
        }
    }

    async fn report_installed_version(&self, version: Version) -> Result<(), ApiError> {
        self.reports.lock().expect("reports lock").push(version);
        Ok(())
    }
}

/// Stands in for the launcher process; "running" is a flag and the executable
/// is whatever file sits at the configured path.
pub struct MockProcess {
    executable: PathBuf,
    running: AtomicBool,
    refuse_close: AtomicBool,
    next_pid: AtomicU32,
    starts: AtomicUsize,
    closes: AtomicUsize,
    calls: Mutex<Vec<&'static str>>,
    events: mpsc::UnboundedSender<ProcessEvent>,
}

impl MockProcess {
    pub fn new(executable: PathBuf) -> (Self, mpsc::UnboundedReceiver<ProcessEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let process = Self {
            executable,
            running: AtomicBool::new(false),
            refuse_close: AtomicBool::new(false),
            next_pid: AtomicU32::new(1000),
            starts: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
            events,
        };
        (process, receiver)
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    /// Make closes fail after the handle is already lost, leaving a launcher
    /// that may still be alive but is no longer tracked.
    pub fn refuse_close(&self) {
        self.refuse_close.store(true, Ordering::SeqCst);
    }

    /// Simulate the launcher dying without being asked to.
    pub fn crash(&self) {
        self.running.store(false, Ordering::SeqCst);
        let pid = self.next_pid.load(Ordering::SeqCst);
        let _ = self.events.send(ProcessEvent::Exited {
            pid,
            code: Some(1),
            requested: false,
        });
    }
}

#[async_trait]
impl ProcessControl for MockProcess {
    fn executable_exists(&self) -> bool {
        self.executable.is_file()
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    async fn start(&self) -> Result<StartOutcome, ProcessError> {
        if self.is_running() {
            return Ok(StartOutcome::AlreadyRunning);
        }
        if !self.executable_exists() {
            return Err(ProcessError::MissingExecutable {
                path: self.executable.clone(),
            });
        }

        self.calls.lock().expect("calls lock").push("start");
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);
        let pid = self.next_pid.fetch_add(1, Ordering::SeqCst) + 1;
        let _ = self.events.send(ProcessEvent::Started { pid });
        Ok(StartOutcome::Launched { pid })
    }

    async fn request_graceful_close(&self) -> Result<(), ProcessError> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        if self.refuse_close.load(Ordering::SeqCst) {
            return Err(ProcessError::StopFailed {
                pid: self.next_pid.load(Ordering::SeqCst),
                source: std::io::Error::other("access denied"),
            });
        }

        self.calls.lock().expect("calls lock").push("close");
        self.closes.fetch_add(1, Ordering::SeqCst);
        let pid = self.next_pid.load(Ordering::SeqCst);
        let _ = self.events.send(ProcessEvent::Exited {
            pid,
            code: Some(0),
            requested: true,
        });
        Ok(())
    }
}

pub struct Harness {
    pub temp: TempDir,
    pub api: Arc<MockApi>,
    pub process: Arc<MockProcess>,
    pub state: Arc<StateMachine>,
    pub supervisor: Arc<Supervisor>,
    pub cancel: CancellationToken,
    pub events: Option<mpsc::UnboundedReceiver<ProcessEvent>>,
}

impl Harness {
    pub fn new(api: MockApi) -> Self {
        let temp = tempfile::tempdir().expect("create temp dir");
        let install_dir = temp.path().join("Launcher");
        std::fs::create_dir_all(&install_dir).expect("create install dir");

        let record = LocalVersionRecord::new(temp.path().join("launcher_version.txt"));
        let applier = UpdateApplier::new(install_dir.clone(), "Games", record);
        let (process, events) = MockProcess::new(install_dir.join(EXECUTABLE));

        let api = Arc::new(api);
        let process = Arc::new(process);
        let state = Arc::new(StateMachine::new());
        let cancel = CancellationToken::new();
        let supervisor = Arc::new(Supervisor::new(
            api.clone(),
            process.clone(),
            applier,
            state.clone(),
            cancel.clone(),
        ));

        Self {
            temp,
            api,
            process,
            state,
            supervisor,
            cancel,
            events: Some(events),
        }
    }

    pub fn install_dir(&self) -> PathBuf {
        self.temp.path().join("Launcher")
    }

    pub fn record(&self) -> LocalVersionRecord {
        LocalVersionRecord::new(self.temp.path().join("launcher_version.txt"))
    }

    /// Lay down an installed launcher with a save file under `Games/`.
    pub fn install(&self, version: Version) {
        let dir = self.install_dir();
        std::fs::write(dir.join(EXECUTABLE), format!("launcher {version}")).expect("write exe");
        std::fs::create_dir_all(dir.join("Games").join("Pong")).expect("create games dir");
        std::fs::write(dir.join("Games").join("Pong").join("scores.dat"), "AAA 9000")
            .expect("write save");
        std::fs::write(dir.join("stale-asset.dat"), "old").expect("write asset");
        self.record().write(version).expect("write version record");
    }

    pub fn take_events(&mut self) -> mpsc::UnboundedReceiver<ProcessEvent> {
        self.events.take().expect("events already taken")
    }
}

pub struct StaticProbe(pub bool);

#[async_trait]
impl NetworkProbe for StaticProbe {
    async fn is_available(&self) -> bool {
        self.0
    }
}

/// Poll `condition` every few milliseconds, failing the test after five
/// seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
