mod logging;
mod settings;
mod shutdown;
mod single_instance;
mod status;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use arcade_api::HttpApiClient;
use arcade_core::{
    LocalVersionRecord, ProcessSupervisor, Scheduler, StateMachine, Supervisor, TcpProbe,
    UpdateApplier,
};
use arcade_platform::AppPaths;
use log::{error, info, warn};
use tokio_util::sync::CancellationToken;

use crate::settings::UpdaterSettings;
use crate::single_instance::{AcquireError, SingleInstance};

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

fn main() -> ExitCode {
    let paths = match AppPaths::new() {
        Ok(paths) => paths,
        Err(error) => {
            eprintln!("arcade-updater: {error}");
            return ExitCode::FAILURE;
        }
    };

    let settings = UpdaterSettings::load(&paths.config_file());
    let (debug_logging, max_log_size) = settings.as_ref().map_or(
        (false, crate::settings::default_max_log_size_bytes()),
        |settings| (settings.debug_logging, settings.max_log_size_bytes),
    );
    logging::init_logging(&paths, debug_logging, max_log_size);

    let settings = match settings {
        Ok(settings) => settings,
        Err(error) => {
            error!("Cannot start: {error}");
            return ExitCode::FAILURE;
        }
    };

    let _instance = match SingleInstance::acquire(&paths) {
        Ok(instance) => instance,
        Err(AcquireError::AlreadyRunning) => {
            warn!("Another updater instance is running; exiting");
            return ExitCode::SUCCESS;
        }
        Err(error) => {
            error!("Cannot start: {error}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(error) = paths.ensure_dirs() {
        error!("Failed to create updater directories: {error}");
        return ExitCode::FAILURE;
    }

    let executable = paths.launcher_executable(&settings.launcher_executable);
    arcade_platform::terminate_stale_instances(&executable);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(error) => {
            error!("Failed to start async runtime: {error}");
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(run(&paths, &settings))
}

async fn run(paths: &AppPaths, settings: &UpdaterSettings) -> ExitCode {
    let api = match HttpApiClient::new(
        &settings.api_host,
        &settings.credentials(),
        settings.http_timeout(),
    ) {
        Ok(api) => api,
        Err(error) => {
            error!("Cannot start: {error}");
            return ExitCode::FAILURE;
        }
    };

    let executable = paths.launcher_executable(&settings.launcher_executable);
    let (process, events) = ProcessSupervisor::new(
        settings.process_options(executable),
        arcade_platform::platform_close_signal(),
    );
    let applier = UpdateApplier::new(
        paths.launcher_dir(),
        settings.reserved_dir.as_str(),
        LocalVersionRecord::new(paths.version_file()),
    );

    let state = Arc::new(StateMachine::new());
    let status = status::spawn_status_reporter(state.subscribe());
    let cancel = CancellationToken::new();
    let supervisor = Arc::new(Supervisor::new(
        Arc::new(api),
        Arc::new(process),
        applier,
        state,
        cancel.clone(),
    ));

    info!(
        "Supervising {} against {}",
        paths.launcher_dir().display(),
        settings.api_host
    );
    let scheduler = tokio::spawn(
        Scheduler::new(
            Arc::clone(&supervisor),
            Box::new(TcpProbe::new(
                settings.connectivity_probe.as_str(),
                PROBE_TIMEOUT,
            )),
            settings.schedule_config(),
            events,
            cancel,
        )
        .run(),
    );

    if let Err(error) = shutdown::wait_for_shutdown_signal().await {
        error!("Failed to listen for shutdown signals: {error}");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");

    supervisor.shutdown().await;
    if let Err(error) = scheduler.await {
        error!("Scheduler task failed: {error}");
    }
    drop(supervisor);
    let _ = status.await;

    ExitCode::SUCCESS
}
