use crate::resources::PreviewRef;

/// Progress value the controller pins once the network exchange completes.
///
/// The estimator itself never reaches this value; its ceiling stays strictly
/// below so the bar cannot show "done" while a request is still outstanding.
/// See [`crate::services::progress`] for the estimator side of the contract.
pub const PROGRESS_COMPLETE: u8 = 100;

/// Discrete stage of one processing cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// No image accepted yet; waiting for a file selection.
    Upload,
    /// An original is held; the user may submit, retry, or cancel.
    Processing,
    /// A processed image is held; the user may download or start over.
    Result,
}

/// Last known answer from the liveness probe.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServiceHealth {
    /// No probe has completed yet.
    Unknown,
    Available,
    Unavailable,
}

/// Top-level features the client offers. Only background removal is backed
/// by the workflow; the others render inert placeholders.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Feature {
    RemoveBg,
    Resize,
    Format,
}

impl Feature {
    /// Human-readable feature name for status output.
    pub fn display_name(&self) -> &'static str {
        match self {
            Feature::RemoveBg => "Remove background",
            Feature::Resize => "Resize image",
            Feature::Format => "Convert format",
        }
    }
}

/// Top-level pages of the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Page {
    Main,
    Profile,
}

/// Which feature and page are active. Owned by
/// [`crate::workflow::navigation::SelectionController`]; every change
/// cascades a workflow reset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FeatureSelection {
    pub feature: Feature,
    pub page: Page,
}

impl Default for FeatureSelection {
    fn default() -> Self {
        Self {
            feature: Feature::RemoveBg,
            page: Page::Main,
        }
    }
}

impl FeatureSelection {
    /// Only the background-removal feature on the main page renders the
    /// workflow; every other combination is a placeholder.
    pub fn is_workflow_active(&self) -> bool {
        self.feature == Feature::RemoveBg && self.page == Page::Main
    }
}

/// One binary image known to the client.
///
/// The payload bytes live in the [`crate::resources::PreviewRegistry`],
/// keyed by `preview`; the handle carries only the revocable reference and
/// metadata. Resolving a revoked reference yields `None`, so a handle whose
/// reference has been released can never reach stale bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageHandle {
    /// Revocable reference to the payload in the preview registry.
    pub preview: PreviewRef,

    /// Original file name (original handle) or generated download name
    /// (processed handle).
    pub display_name: String,

    pub byte_size: u64,
    pub mime_type: String,
}

/// Error taxonomy surfaced to the view layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Local validation failure; retrying without changing the input is
    /// pointless.
    Validation,
    /// Transport-level failure (host unreachable, timeout). Transient.
    NetworkUnreachable,
    /// The service answered with a non-success status.
    Service,
    /// The service answered 2xx but the body was not an image.
    MalformedResponse,
}

/// A failure converted at the workflow boundary, stored in
/// [`WorkflowState::last_error`]. Nothing propagates past the controller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
    pub retryable: bool,

    /// User-actionable remediation text, set for [`ErrorKind::NetworkUnreachable`].
    pub hint: Option<String>,
}

impl ErrorInfo {
    pub fn validation(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Validation,
            message: message.into(),
            retryable: false,
            hint: None,
        }
    }

    pub fn unreachable(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::NetworkUnreachable,
            message: message.into(),
            retryable: true,
            hint: Some(
                "Check your network connection and that the processing service is running."
                    .to_string(),
            ),
        }
    }

    pub fn service(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Service,
            message: message.into(),
            // The same request will be rejected again; the user has to
            // change something first.
            retryable: false,
            hint: None,
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::MalformedResponse,
            message: message.into(),
            retryable: true,
            hint: None,
        }
    }
}

/// Single source of truth for the active processing cycle.
///
/// # Thread Safety
///
/// `WorkflowState` is wrapped in `Arc<RwLock<WorkflowState>>` by
/// [`crate::state::StateManager`]. Never mutate it directly — go through
/// the manager so change events fire:
/// - [`read()`](crate::state::StateManager::read) for read-only access
/// - [`update()`](crate::state::StateManager::update) for mutations
///
/// # Invariants
///
/// - `processed` is `Some` only in [`Phase::Result`].
/// - `progress` is 0 whenever `is_in_flight` is false.
/// - `request_token` only ever grows, across resets included, so a stale
///   completion can never collide with a newer token.
#[derive(Clone, Debug)]
pub struct WorkflowState {
    /// Current stage of the cycle.
    pub phase: Phase,

    /// The accepted original image, present from Processing onward.
    pub original: Option<ImageHandle>,

    /// The processed result, present only in Result.
    pub processed: Option<ImageHandle>,

    // Submission state
    pub is_in_flight: bool,
    pub progress: u8,
    pub last_error: Option<ErrorInfo>,

    /// Identifier of the currently-authoritative submission. Completions
    /// carrying any other token are discarded without touching state.
    pub request_token: u64,

    /// Outcome of the most recent liveness probe. Independent of the
    /// workflow cycle; survives resets.
    pub service_health: ServiceHealth,
}

impl Default for WorkflowState {
    fn default() -> Self {
        Self {
            phase: Phase::Upload,
            original: None,
            processed: None,
            is_in_flight: false,
            progress: 0,
            last_error: None,
            request_token: 0,
            service_health: ServiceHealth::Unknown,
        }
    }
}

impl WorkflowState {
    /// True while the renderable state may show a result comparison.
    pub fn has_result(&self) -> bool {
        self.phase == Phase::Result && self.processed.is_some()
    }

    /// Take both handles out of the state, returning their preview
    /// references for release by the caller. The registry belongs to the
    /// controller; state only bookkeeps the references.
    pub fn take_preview_refs(&mut self) -> Vec<PreviewRef> {
        let mut refs = Vec::with_capacity(2);
        if let Some(handle) = self.original.take() {
            refs.push(handle.preview);
        }
        if let Some(handle) = self.processed.take() {
            refs.push(handle.preview);
        }
        refs
    }

    /// Return to the initial Upload phase. Handles must already have been
    /// taken via [`take_preview_refs`](Self::take_preview_refs);
    /// `request_token` and `service_health` deliberately survive.
    pub fn reset_cycle(&mut self) {
        self.phase = Phase::Upload;
        self.original = None;
        self.processed = None;
        self.is_in_flight = false;
        self.progress = 0;
        self.last_error = None;
    }
}
