//! Removbl - Client for the Removbl remote image-processing service
//!
//! Headless entry point for the client.
//!
//! # Overview
//!
//! This binary drives one complete workflow cycle against the configured
//! processing service:
//! - Logging infrastructure (file rotation + console output)
//! - Tokio async runtime (4 worker threads for network I/O)
//! - State management ([`StateManager`])
//! - Configuration loading ([`ConfigManager`])
//! - Workflow controller (select file → submit → download result)
//!
//! # Execution Flow
//!
//! 1. Load YAML configuration from Removbl Data/
//! 2. Initialize logging → logs/removbl.<date>
//! 3. Create tokio runtime with 4 worker threads
//! 4. Create StateManager, PreviewRegistry, HttpBackend, WorkflowController
//! 5. Start the background health monitor
//! 6. Select the input file, submit it, and save the processed image
//! 7. Tear the controller down and shut the runtime down with a 5s timeout
//!
//! # Usage
//!
//! ```text
//! removbl <image-file> [output-dir]
//! ```
//!
//! On success the path of the saved processed image is printed to stdout.

use anyhow::{Context, Result};
use bytes::Bytes;
use camino::{Utf8Path, Utf8PathBuf};
use removbl::metrics::Metrics;
use removbl::services::backend::HttpBackend;
use removbl::services::validate::FileCandidate;
use removbl::workflow::navigation::SelectionController;
use removbl::{
    APP_NAME, ClientSettings, ConfigManager, PreviewRegistry, StateChange, StateManager, VERSION,
    WorkflowController,
};
use std::fs;
use std::sync::Arc;
use tokio::sync::broadcast;

fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let Some(input) = args.next() else {
        eprintln!("usage: removbl <image-file> [output-dir]");
        std::process::exit(2);
    };
    let input = Utf8PathBuf::from(input);
    let output_dir = Utf8PathBuf::from(args.next().unwrap_or_else(|| ".".to_string()));

    // Load configuration first so the debug flag applies to logging
    let config_manager = ConfigManager::new("Removbl Data")?;
    let user_config = config_manager.load_user_config()?;
    let settings = user_config.settings;

    let _guard = removbl::logging::setup_logging("logs", "removbl", settings.debug_mode, true)?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);
    tracing::info!("Processing service: {}", settings.submit_url());

    // Create tokio runtime for the network exchange and timers
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(4)
        .thread_name("removbl-worker")
        .build()?;

    let result = runtime.block_on(run(settings, &input, &output_dir));

    // Shutdown the tokio runtime gracefully
    runtime.shutdown_timeout(std::time::Duration::from_secs(5));
    tracing::info!("Shutdown complete");

    result
}

async fn run(settings: ClientSettings, input: &Utf8Path, output_dir: &Utf8Path) -> Result<()> {
    let state = Arc::new(StateManager::new());
    let registry = Arc::new(PreviewRegistry::new());
    let metrics = Arc::new(Metrics::new());
    let backend = HttpBackend::new(&settings)?;

    let controller = Arc::new(WorkflowController::new(
        Arc::clone(&state),
        Arc::clone(&registry),
        backend,
        settings,
        Arc::clone(&metrics),
    ));
    let selection = SelectionController::new(Arc::clone(&controller));

    let monitor = controller.spawn_health_monitor();
    spawn_event_logger(state.subscribe());

    let outcome = drive_cycle(&controller, &selection, input, output_dir).await;

    controller.teardown();
    let _ = monitor.await;

    outcome
}

/// One full cycle: select the input file, submit it, save the result.
async fn drive_cycle(
    controller: &WorkflowController<HttpBackend>,
    selection: &SelectionController<HttpBackend>,
    input: &Utf8Path,
    output_dir: &Utf8Path,
) -> Result<()> {
    // Placeholder features never reach the core.
    if !selection.is_workflow_active() {
        anyhow::bail!(
            "{} is not available yet",
            selection.selection().feature.display_name()
        );
    }

    let candidate = load_candidate(input)?;
    if !controller.select_file(candidate) {
        return Err(boundary_error(controller.state()));
    }

    controller.submit().await;

    let snapshot = controller.state().snapshot();
    if let Some(error) = snapshot.last_error {
        if let Some(hint) = &error.hint {
            eprintln!("hint: {}", hint);
        }
        anyhow::bail!("processing failed: {}", error.message);
    }

    let saved = controller.materialize_result(output_dir)?;
    println!("{}", saved);
    Ok(())
}

/// Build a candidate from a file on disk, deriving the media type from the
/// extension. Unknown extensions become an opaque type the validator will
/// reject with the usual "not an image" answer.
fn load_candidate(path: &Utf8Path) -> Result<FileCandidate> {
    let data = fs::read(path).with_context(|| format!("Failed to read {}", path))?;

    let mime_type = image::ImageFormat::from_path(path)
        .map(|format| format.to_mime_type().to_string())
        .unwrap_or_else(|_| "application/octet-stream".to_string());

    let display_name = path.file_name().unwrap_or("image").to_string();

    Ok(FileCandidate::new(display_name, mime_type, Bytes::from(data)))
}

/// The error the controller stored at its boundary, as an application error.
fn boundary_error(state: &Arc<StateManager>) -> anyhow::Error {
    match state.read(|s| s.last_error.clone()) {
        Some(error) => anyhow::anyhow!("{}", error.message),
        None => anyhow::anyhow!("file selection was not accepted"),
    }
}

/// Mirror state changes into the log so the console shows live progress.
fn spawn_event_logger(mut rx: broadcast::Receiver<StateChange>) {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(StateChange::ProgressUpdated { percent }) => {
                    tracing::info!("progress: {}%", percent);
                }
                Ok(StateChange::PhaseChanged { phase }) => {
                    tracing::info!("phase: {:?}", phase);
                }
                Ok(StateChange::ServiceHealthChanged { health }) => {
                    tracing::info!("service health: {:?}", health);
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Closed) => break,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("event logger lagged, {} events skipped", skipped);
                }
            }
        }
    });
}
