// Workflow controller - owns the lifecycle of one processing cycle
//
// This module contains the WorkflowController which coordinates between:
// - StateManager (workflow state + change events)
// - PreviewRegistry (transient preview references)
// - ProcessingBackend (network exchange with the remote service)
// - the progress estimator (token-owned ticking task)
//
// It handles:
// - File selection and validation
// - Submission, completion classification, and the stale-token discard
// - Idempotent resets (cancel, start over, feature switch, teardown)
// - Download materialization of the processed image
// - The periodic background liveness probe

use crate::metrics::Metrics;
use crate::models::{ErrorInfo, ImageHandle, PROGRESS_COMPLETE, Phase};
use crate::models::config::ClientSettings;
use crate::resources::PreviewRegistry;
use crate::services::backend::{BackendError, ProcessedPayload, ProcessingBackend, UploadPayload};
use crate::services::progress;
use crate::services::validate::{FileCandidate, UploadPolicy, validate};
use crate::state::StateManager;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use std::fs;
use std::sync::Arc;
use tokio::sync::watch;

pub mod navigation;

/// Orchestrator for the image-processing workflow.
///
/// All user intents and asynchronous completions funnel through this
/// controller; nothing else mutates [`crate::models::WorkflowState`]. Every
/// failure is converted to [`ErrorInfo`] and stored in the state — no error
/// escapes to the view layer.
///
/// # Race safety
///
/// Each submission mints a fresh request token. A completion only applies
/// while `is_in_flight` holds and its token equals the current one; anything
/// else is a stale completion and is discarded whole, including the preview
/// reference it may have provisionally acquired. Requests superseded by a
/// resubmission, a cancel, or a feature switch are not aborted at the
/// transport level — their results simply fail this check.
///
/// # Example
/// ```ignore
/// let controller = Arc::new(WorkflowController::new(
///     state, registry, HttpBackend::new(&settings)?, settings, metrics,
/// ));
/// controller.select_file(candidate);
/// controller.submit().await;
/// let saved = controller.materialize_result(Utf8Path::new("."))?;
/// ```
pub struct WorkflowController<B> {
    /// Shared workflow state manager
    state: Arc<StateManager>,

    /// Owner of all transient preview payloads
    registry: Arc<PreviewRegistry>,

    /// The network seam; scripted in tests, [`crate::services::HttpBackend`]
    /// in production. Shared with the health monitor task.
    backend: Arc<B>,

    settings: ClientSettings,
    policy: UploadPolicy,
    metrics: Arc<Metrics>,

    /// Replaces path separators and shell-hostile characters in generated
    /// download names
    stem_sanitizer: Regex,

    /// Cancellation signal for the background health monitor
    cancel_tx: watch::Sender<bool>,
    cancel_rx: watch::Receiver<bool>,
}

impl<B: ProcessingBackend> WorkflowController<B> {
    pub fn new(
        state: Arc<StateManager>,
        registry: Arc<PreviewRegistry>,
        backend: B,
        settings: ClientSettings,
        metrics: Arc<Metrics>,
    ) -> Self {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let policy = UploadPolicy::new(settings.max_upload_bytes);

        Self {
            state,
            registry,
            backend: Arc::new(backend),
            settings,
            policy,
            metrics,
            stem_sanitizer: Regex::new(r"[^A-Za-z0-9._-]+").expect("Invalid stem sanitizer regex"),
            cancel_tx,
            cancel_rx,
        }
    }

    /// The shared state manager, for subscribers and snapshots.
    pub fn state(&self) -> &Arc<StateManager> {
        &self.state
    }

    /// The preview registry, for leak accounting.
    pub fn registry(&self) -> &Arc<PreviewRegistry> {
        &self.registry
    }

    // ===== User intents =====

    /// Accept a candidate file into the workflow.
    ///
    /// Runs the validator; a rejection stays in the current phase with
    /// `last_error` set. Acceptance releases any prior handles, acquires a
    /// preview reference for the new original, and enters Processing.
    ///
    /// Returns true when the candidate was accepted.
    pub fn select_file(&self, candidate: FileCandidate) -> bool {
        if self.state.read(|s| s.is_in_flight) {
            tracing::warn!("ignoring file selection while a submission is outstanding");
            return false;
        }

        match validate(candidate, &self.policy) {
            Err(err) => {
                tracing::info!("file rejected: {}", err);
                self.metrics.record_validation_rejected();
                self.state.update(|state| {
                    state.last_error = Some(ErrorInfo::validation(err.to_string()));
                });
                false
            }
            Ok(validated) => {
                let file = validated.into_inner();
                let byte_size = file.byte_size();
                let preview = self.registry.acquire(file.data.clone());
                let handle = ImageHandle {
                    preview,
                    display_name: file.display_name,
                    byte_size,
                    mime_type: file.mime_type,
                };

                tracing::info!(
                    "accepted {} ({} bytes), entering processing phase",
                    handle.display_name,
                    byte_size
                );

                // Swap the new original in and drain whatever was held
                // before, so the registry releases exactly once per handle.
                let mut prior = Vec::new();
                self.state.update(|state| {
                    prior = state.take_preview_refs();
                    state.original = Some(handle);
                    state.phase = Phase::Processing;
                    state.progress = 0;
                    state.last_error = None;
                });
                self.registry.release_all(prior);
                true
            }
        }
    }

    /// Submit the accepted original to the processing service.
    ///
    /// Mints a new request token (superseding any outstanding request),
    /// starts the progress estimator for that token, performs the exchange,
    /// and applies the completion if — and only if — the token is still
    /// current when the answer arrives. The outcome lands in the state:
    /// Result phase on success, `last_error` on failure.
    pub async fn submit(&self) {
        let Some(upload) = self.prepare_upload() else {
            return;
        };

        let token = self.state.begin_submission();
        self.metrics.record_submission_started();
        tracing::info!("request {}: submitting {}", token, upload.file_name);

        tokio::spawn(progress::drive(
            Arc::clone(&self.state),
            token,
            self.settings.progress_cadence(),
            self.settings.progress_ceiling(),
        ));

        let outcome = self.backend.submit(upload).await;
        self.finish_submission(token, outcome);
    }

    /// Abandon the current cycle from the Processing phase.
    ///
    /// Any outstanding request keeps running at the transport level; its
    /// completion will fail the currency check and be discarded.
    pub fn cancel(&self) {
        if self.state.read(|s| s.phase) != Phase::Processing {
            tracing::warn!("cancel ignored outside the processing phase");
            return;
        }
        tracing::info!("cancelling the current cycle");
        self.reset();
    }

    /// Leave the Result phase and return to Upload for a fresh cycle.
    pub fn start_over(&self) {
        if self.state.read(|s| s.phase) != Phase::Result {
            tracing::warn!("start over ignored outside the result phase");
            return;
        }
        tracing::info!("starting over");
        self.reset();
    }

    /// Force the workflow back to the Upload phase, releasing every held
    /// preview reference. Idempotent; callable from any phase. Invoked by
    /// cancel, start over, feature/page switches, and teardown.
    pub fn reset(&self) {
        let refs = self.state.reset_workflow();
        self.registry.release_all(refs);
    }

    /// Write the processed image to `dir` under its generated name
    /// (`processed-<original-stem>.<ext>`).
    ///
    /// Pure side effect: reads the processed handle, mutates no state, and
    /// can be repeated for independent materializations of the same payload.
    pub fn materialize_result(&self, dir: &Utf8Path) -> Result<Utf8PathBuf> {
        let handle = self
            .state
            .read(|s| {
                if s.phase == Phase::Result {
                    s.processed.clone()
                } else {
                    None
                }
            })
            .context("no processed image to download")?;

        let data = self
            .registry
            .resolve(handle.preview)
            .context("processed image reference was revoked")?;

        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create download directory: {}", dir))?;

        let path = dir.join(&handle.display_name);
        fs::write(&path, &data).with_context(|| format!("Failed to write {}", path))?;

        tracing::info!("saved processed image to {}", path);
        Ok(path)
    }

    // ===== Background health probing =====

    /// Start the periodic liveness probe.
    ///
    /// Runs independently of any in-flight submission and updates
    /// `service_health` in the state after every probe. Stops when
    /// [`teardown`](Self::teardown) fires the cancellation channel (or the
    /// controller is dropped, which closes it).
    pub fn spawn_health_monitor(&self) -> tokio::task::JoinHandle<()> {
        let state = Arc::clone(&self.state);
        let backend = Arc::clone(&self.backend);
        let metrics = Arc::clone(&self.metrics);
        let period = self.settings.probe_interval();
        let mut cancel_rx = self.cancel_rx.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            tracing::debug!("health monitor started");

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let health = backend.probe().await;
                        metrics.record_probe(health);
                        state.set_service_health(health);
                    }
                    _ = cancel_rx.changed() => {
                        tracing::debug!("health monitor stopped");
                        break;
                    }
                }
            }
        })
    }

    /// Shut the controller down: stop the health monitor, release every
    /// held preview reference, and log the session summary.
    pub fn teardown(&self) {
        tracing::info!("tearing down the workflow controller");
        let _ = self.cancel_tx.send(true);
        self.reset();

        tracing::info!(
            "preview references: {} acquired, {} released, {} still live",
            self.registry.acquired_total(),
            self.registry.released_total(),
            self.registry.active()
        );
        self.metrics.log_summary();
    }

    // ===== Completion handling =====

    /// Snapshot the original into an upload payload, if the workflow is in
    /// a submittable state.
    fn prepare_upload(&self) -> Option<UploadPayload> {
        let handle = self.state.read(|s| {
            if s.phase == Phase::Processing {
                s.original.clone()
            } else {
                None
            }
        });

        let Some(handle) = handle else {
            tracing::warn!("submit ignored: no original image in the processing phase");
            return None;
        };

        let Some(data) = self.registry.resolve(handle.preview) else {
            // A held handle whose reference no longer resolves means the
            // pairing invariant was broken somewhere upstream.
            tracing::error!("original preview reference was already revoked");
            self.state.update(|state| {
                state.last_error = Some(ErrorInfo::validation(
                    "original image is no longer available",
                ));
            });
            return None;
        };

        Some(UploadPayload {
            data,
            file_name: handle.display_name,
            mime_type: handle.mime_type,
        })
    }

    /// Apply a completed exchange to the state, or discard it if the
    /// request is no longer current.
    fn finish_submission(&self, token: u64, outcome: Result<ProcessedPayload, BackendError>) {
        match outcome {
            Ok(payload) => {
                // Pin 100 while this request is still the authoritative
                // one, so the bar shows completion before the phase flips.
                self.state.update(|state| {
                    if state.is_in_flight && state.request_token == token {
                        state.progress = PROGRESS_COMPLETE;
                    }
                });

                let original_name = self
                    .state
                    .read(|s| s.original.as_ref().map(|h| h.display_name.clone()))
                    .unwrap_or_else(|| "image".to_string());

                let preview = self.registry.acquire(payload.data.clone());
                let handle = ImageHandle {
                    preview,
                    display_name: self.download_name(&original_name, &payload.mime_type),
                    byte_size: payload.data.len() as u64,
                    mime_type: payload.mime_type,
                };

                let mut applied = false;
                self.state.update(|state| {
                    if state.is_in_flight && state.request_token == token {
                        state.processed = Some(handle);
                        state.phase = Phase::Result;
                        state.is_in_flight = false;
                        state.progress = 0;
                        state.last_error = None;
                        applied = true;
                    }
                });

                if applied {
                    self.metrics.record_submission_succeeded();
                    tracing::info!("request {}: completed", token);
                } else {
                    // Stale success: nothing may change, and the reference
                    // acquired above goes straight back.
                    self.registry.release(preview);
                    self.metrics.record_stale_discard();
                    tracing::info!("request {}: stale completion discarded", token);
                }
            }
            Err(err) => {
                let info = ErrorInfo::from(err);
                let mut applied = false;
                self.state.update(|state| {
                    if state.is_in_flight && state.request_token == token {
                        state.is_in_flight = false;
                        state.progress = 0;
                        state.last_error = Some(info.clone());
                        applied = true;
                    }
                });

                if applied {
                    self.metrics.record_submission_failed();
                    tracing::warn!("request {}: failed: {}", token, info.message);
                } else {
                    self.metrics.record_stale_discard();
                    tracing::info!("request {}: stale failure discarded", token);
                }
            }
        }
    }

    /// Generated download file name: `processed-<stem>.<ext>`, stem taken
    /// from the original name and sanitized, extension mapped from the
    /// processed payload's media type.
    fn download_name(&self, original_name: &str, mime_type: &str) -> String {
        let stem = original_name
            .rsplit_once('.')
            .map_or(original_name, |(stem, _)| stem);
        let stem = self.stem_sanitizer.replace_all(stem, "-");
        let stem = stem.trim_matches('-');
        let stem = if stem.is_empty() { "image" } else { stem };

        format!(
            "processed-{}.{}",
            stem,
            self.settings.extension_for(mime_type)
        )
    }
}
