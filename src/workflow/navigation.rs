// Navigation/selection controller
//
// Tracks which top-level feature and page are active. The selection state
// is owned here — there is no ambient global — and every actual change
// cascades a full workflow reset so handles from the previous feature can
// never leak into the next one.

use super::WorkflowController;
use crate::models::{Feature, FeatureSelection, Page};
use crate::services::backend::ProcessingBackend;
use std::sync::{Arc, RwLock};

/// Pure state holder over [`FeatureSelection`].
///
/// Only the background-removal feature on the main page routes to the
/// workflow; every other combination renders an inert placeholder and does
/// not interact with the core at all. Switching feature or page — even with
/// a submission outstanding — resets the workflow; the in-flight request is
/// left to finish and its completion is discarded by the token check.
pub struct SelectionController<B> {
    selection: RwLock<FeatureSelection>,
    workflow: Arc<WorkflowController<B>>,
}

impl<B: ProcessingBackend> SelectionController<B> {
    pub fn new(workflow: Arc<WorkflowController<B>>) -> Self {
        Self {
            selection: RwLock::new(FeatureSelection::default()),
            workflow,
        }
    }

    /// Current feature/page combination.
    pub fn selection(&self) -> FeatureSelection {
        *self.selection.read().unwrap()
    }

    /// Whether the current selection renders the workflow.
    pub fn is_workflow_active(&self) -> bool {
        self.selection().is_workflow_active()
    }

    /// Switch the active feature. Re-selecting the current feature is a
    /// no-op; an actual switch resets the workflow.
    pub fn select_feature(&self, feature: Feature) {
        {
            let mut selection = self.selection.write().unwrap();
            if selection.feature == feature {
                tracing::debug!("feature {} already active", feature.display_name());
                return;
            }
            tracing::info!("switching feature to {}", feature.display_name());
            selection.feature = feature;
        }
        self.workflow.reset();
    }

    /// Switch the active page. Re-selecting the current page is a no-op;
    /// an actual switch resets the workflow.
    pub fn select_page(&self, page: Page) {
        {
            let mut selection = self.selection.write().unwrap();
            if selection.page == page {
                tracing::debug!("page {:?} already active", page);
                return;
            }
            tracing::info!("switching page to {:?}", page);
            selection.page = page;
        }
        self.workflow.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Metrics;
    use crate::models::{ClientSettings, Phase, ServiceHealth};
    use crate::resources::PreviewRegistry;
    use crate::services::backend::{BackendError, ProcessedPayload, UploadPayload};
    use crate::services::validate::FileCandidate;
    use crate::state::StateManager;
    use bytes::Bytes;
    use std::future::Future;

    struct IdleBackend;

    impl ProcessingBackend for IdleBackend {
        fn submit(
            &self,
            _upload: UploadPayload,
        ) -> impl Future<Output = Result<ProcessedPayload, BackendError>> + Send {
            async { panic!("backend must not be called") }
        }

        fn probe(&self) -> impl Future<Output = ServiceHealth> + Send {
            async { ServiceHealth::Unknown }
        }
    }

    fn workflow() -> Arc<WorkflowController<IdleBackend>> {
        Arc::new(WorkflowController::new(
            Arc::new(StateManager::new()),
            Arc::new(PreviewRegistry::new()),
            IdleBackend,
            ClientSettings::default(),
            Arc::new(Metrics::new()),
        ))
    }

    #[test]
    fn test_default_selection_routes_to_workflow() {
        let selection = SelectionController::new(workflow());
        assert!(selection.is_workflow_active());
        assert_eq!(selection.selection().feature, Feature::RemoveBg);
        assert_eq!(selection.selection().page, Page::Main);
    }

    #[test]
    fn test_feature_switch_resets_workflow_and_releases_handles() {
        let workflow = workflow();
        let selection = SelectionController::new(Arc::clone(&workflow));

        let candidate = FileCandidate::new("photo.png", "image/png", Bytes::from_static(b"img"));
        assert!(workflow.select_file(candidate));
        assert_eq!(workflow.state().read(|s| s.phase), Phase::Processing);

        selection.select_feature(Feature::Resize);

        assert!(!selection.is_workflow_active());
        let state = workflow.state().snapshot();
        assert_eq!(state.phase, Phase::Upload);
        assert!(state.original.is_none());
        assert_eq!(workflow.registry().active(), 0);
    }

    #[test]
    fn test_page_switch_resets_workflow() {
        let workflow = workflow();
        let selection = SelectionController::new(Arc::clone(&workflow));

        let candidate = FileCandidate::new("photo.png", "image/png", Bytes::from_static(b"img"));
        workflow.select_file(candidate);

        selection.select_page(Page::Profile);

        assert!(!selection.is_workflow_active());
        assert_eq!(workflow.state().read(|s| s.phase), Phase::Upload);
        assert_eq!(workflow.registry().active(), 0);
    }

    #[test]
    fn test_reselecting_current_feature_is_a_noop() {
        let workflow = workflow();
        let selection = SelectionController::new(Arc::clone(&workflow));

        let candidate = FileCandidate::new("photo.png", "image/png", Bytes::from_static(b"img"));
        workflow.select_file(candidate);

        selection.select_feature(Feature::RemoveBg);
        selection.select_page(Page::Main);

        // Same selection: the cycle in progress survives.
        assert_eq!(workflow.state().read(|s| s.phase), Phase::Processing);
        assert_eq!(workflow.registry().active(), 1);
    }

    #[test]
    fn test_switch_and_return_lands_on_clean_upload() {
        let workflow = workflow();
        let selection = SelectionController::new(Arc::clone(&workflow));

        let candidate = FileCandidate::new("photo.png", "image/png", Bytes::from_static(b"img"));
        workflow.select_file(candidate);

        selection.select_feature(Feature::Format);
        selection.select_feature(Feature::RemoveBg);

        assert!(selection.is_workflow_active());
        let state = workflow.state().snapshot();
        assert_eq!(state.phase, Phase::Upload);
        assert!(state.original.is_none());
        assert!(state.last_error.is_none());
    }
}
