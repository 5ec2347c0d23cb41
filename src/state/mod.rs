// State management module
//
// This module provides the StateManager which wraps WorkflowState with
// thread-safe access using Arc<RwLock<T>> and emits change events for
// view-layer updates.

use crate::models::{ErrorInfo, Phase, ServiceHealth, WorkflowState};
use crate::resources::PreviewRef;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;

/// Change events emitted when state is modified
///
/// These events are emitted to notify interested parties (primarily the
/// view layer) about state changes without requiring them to poll.
#[derive(Clone, Debug, PartialEq)]
pub enum StateChange {
    /// The workflow moved to another phase
    PhaseChanged { phase: Phase },

    /// A new submission became the authoritative one
    SubmissionStarted { token: u64 },

    /// The in-flight submission finished (or was abandoned by a reset)
    SubmissionFinished { token: u64, succeeded: bool },

    /// Estimated or pinned progress changed
    ProgressUpdated { percent: u8 },

    /// The boundary error changed (set on failure, cleared on new attempts)
    ErrorChanged { error: Option<ErrorInfo> },

    /// The background liveness probe reported a different answer
    ServiceHealthChanged { health: ServiceHealth },

    /// The workflow has been reset to the Upload phase
    StateReset,
}

/// Thread-safe state manager with event emission
///
/// This is the central state management component that:
/// - Provides thread-safe access to [`WorkflowState`] via `Arc<RwLock<T>>`
/// - Detects state changes and emits [`StateChange`] events
/// - Enforces the completion-currency check (request token) for every
///   mutation that applies an asynchronous outcome
///
/// # Usage
///
/// Always use `StateManager` instead of accessing [`WorkflowState`] directly:
/// - [`read()`](Self::read) for reading state without cloning
/// - [`update()`](Self::update) for mutations with automatic event emission
/// - [`subscribe()`](Self::subscribe) for listening to state changes
pub struct StateManager {
    /// The workflow state protected by RwLock for thread-safe access
    state: Arc<RwLock<WorkflowState>>,

    /// Broadcast channel for emitting state change events
    state_tx: broadcast::Sender<StateChange>,
}

impl StateManager {
    /// Create a new StateManager with default state
    pub fn new() -> Self {
        let (state_tx, _) = broadcast::channel(100);
        Self {
            state: Arc::new(RwLock::new(WorkflowState::default())),
            state_tx,
        }
    }

    /// Get a read-only snapshot of the current state
    ///
    /// This clones the entire state, so it's safe to use without holding
    /// locks. For checking individual fields, prefer `read()` with a closure.
    pub fn snapshot(&self) -> WorkflowState {
        self.state.read().unwrap().clone()
    }

    /// Execute a function with read access to the state
    ///
    /// # Example
    /// ```ignore
    /// let busy = state_manager.read(|state| state.is_in_flight);
    /// ```
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&WorkflowState) -> R,
    {
        let state = self.state.read().unwrap();
        f(&state)
    }

    /// Update the state and emit change events
    ///
    /// This is the primary way to modify state. It:
    /// 1. Captures the old state
    /// 2. Applies the update function
    /// 3. Detects what changed
    /// 4. Emits appropriate events
    ///
    /// # Returns
    /// The StateChange events that were emitted
    pub fn update<F>(&self, update_fn: F) -> Vec<StateChange>
    where
        F: FnOnce(&mut WorkflowState),
    {
        let mut state = self.state.write().unwrap();
        let old_state = state.clone();

        // Apply the update
        update_fn(&mut state);

        // Detect changes and emit events
        let changes = self.detect_changes(&old_state, &state);

        for change in &changes {
            // Ignore send errors - it's OK if no one is listening
            let _ = self.state_tx.send(change.clone());
        }

        changes
    }

    /// Subscribe to state change events
    ///
    /// Returns a receiver that will get notified of all future state
    /// changes. Multiple subscribers can listen simultaneously.
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.state_tx.subscribe()
    }

    /// Detect what changed between two states and generate events
    fn detect_changes(&self, old: &WorkflowState, new: &WorkflowState) -> Vec<StateChange> {
        let mut changes = Vec::new();

        if old.phase != new.phase {
            changes.push(StateChange::PhaseChanged { phase: new.phase });
        }

        // A token bump is the authoritative "new submission" signal;
        // is_in_flight alone misses a resubmission that supersedes an
        // outstanding one.
        if old.request_token != new.request_token {
            changes.push(StateChange::SubmissionStarted {
                token: new.request_token,
            });
        }

        if old.is_in_flight && !new.is_in_flight {
            changes.push(StateChange::SubmissionFinished {
                token: new.request_token,
                succeeded: new.has_result() && new.last_error.is_none(),
            });
        }

        if old.progress != new.progress {
            changes.push(StateChange::ProgressUpdated {
                percent: new.progress,
            });
        }

        if old.last_error != new.last_error {
            changes.push(StateChange::ErrorChanged {
                error: new.last_error.clone(),
            });
        }

        if old.service_health != new.service_health {
            changes.push(StateChange::ServiceHealthChanged {
                health: new.service_health,
            });
        }

        changes
    }

    // Convenience methods for common state updates

    /// Mint a new request token and mark a submission in flight.
    ///
    /// The token immediately invalidates any earlier outstanding request:
    /// its completion will fail the currency check and be discarded.
    pub fn begin_submission(&self) -> u64 {
        let mut token = 0;
        self.update(|state| {
            state.request_token += 1;
            token = state.request_token;
            state.is_in_flight = true;
            state.progress = 0;
            state.last_error = None;
        });
        token
    }

    /// Advance estimated progress for the given request.
    ///
    /// Returns false without mutating anything when the request is no
    /// longer current, which is the signal for the ticking task to stop.
    pub fn tick_progress(&self, token: u64, ceiling: u8) -> bool {
        let mut current = false;
        self.update(|state| {
            if state.is_in_flight && state.request_token == token {
                state.progress = crate::services::progress::advance(state.progress, ceiling);
                current = true;
            }
        });
        current
    }

    /// Record the latest liveness probe outcome.
    pub fn set_service_health(&self, health: ServiceHealth) -> Vec<StateChange> {
        self.update(|state| {
            state.service_health = health;
        })
    }

    /// Reset the workflow to the Upload phase and return the preview
    /// references that were held, for release by the caller.
    ///
    /// Idempotent: resetting an already-clean workflow emits the reset
    /// event and returns no references.
    pub fn reset_workflow(&self) -> Vec<PreviewRef> {
        let mut refs = Vec::new();
        self.update(|state| {
            refs = state.take_preview_refs();
            state.reset_cycle();
        });

        // Emit a reset event
        let _ = self.state_tx.send(StateChange::StateReset);

        refs
    }

    /// Get an Arc reference to the state for use in worker tasks
    pub fn state_arc(&self) -> Arc<RwLock<WorkflowState>> {
        Arc::clone(&self.state)
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

// Make StateManager cloneable for sharing across tasks
impl Clone for StateManager {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            state_tx: self.state_tx.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ImageHandle;

    fn handle(id: u64) -> ImageHandle {
        ImageHandle {
            preview: PreviewRef::from_raw(id),
            display_name: "photo.png".to_string(),
            byte_size: 16,
            mime_type: "image/png".to_string(),
        }
    }

    #[test]
    fn test_new_state_manager() {
        let manager = StateManager::new();
        let state = manager.snapshot();

        assert_eq!(state.phase, Phase::Upload);
        assert!(!state.is_in_flight);
        assert_eq!(state.request_token, 0);
    }

    #[test]
    fn test_begin_submission_mints_monotonic_tokens() {
        let manager = StateManager::new();

        let first = manager.begin_submission();
        let second = manager.begin_submission();

        assert!(second > first);
        assert_eq!(manager.read(|s| s.request_token), second);
        assert!(manager.read(|s| s.is_in_flight));
    }

    #[test]
    fn test_begin_submission_clears_previous_error() {
        let manager = StateManager::new();
        manager.update(|s| s.last_error = Some(ErrorInfo::service("HTTP 500")));

        manager.begin_submission();

        assert!(manager.read(|s| s.last_error.is_none()));
        assert_eq!(manager.read(|s| s.progress), 0);
    }

    #[test]
    fn test_tick_progress_applies_only_to_current_request() {
        let manager = StateManager::new();
        let token = manager.begin_submission();

        assert!(manager.tick_progress(token, 95));
        let after_one_tick = manager.read(|s| s.progress);
        assert!(after_one_tick > 0);

        // A stale token neither advances nor claims currency.
        assert!(!manager.tick_progress(token + 1, 95));
        assert_eq!(manager.read(|s| s.progress), after_one_tick);
    }

    #[test]
    fn test_tick_progress_stops_after_flight_ends() {
        let manager = StateManager::new();
        let token = manager.begin_submission();
        manager.update(|s| {
            s.is_in_flight = false;
            s.progress = 0;
        });

        assert!(!manager.tick_progress(token, 95));
    }

    #[test]
    fn test_update_with_change_detection() {
        let manager = StateManager::new();

        let changes = manager.update(|state| {
            state.phase = Phase::Processing;
            state.progress = 10;
        });

        assert_eq!(changes.len(), 2);
        assert!(matches!(changes[0], StateChange::PhaseChanged { phase: Phase::Processing }));
        assert!(matches!(changes[1], StateChange::ProgressUpdated { percent: 10 }));
    }

    #[test]
    fn test_submission_lifecycle_events() {
        let manager = StateManager::new();
        let mut rx = manager.subscribe();

        let token = manager.begin_submission();
        let event = rx.try_recv().unwrap();
        assert_eq!(event, StateChange::SubmissionStarted { token });

        let changes = manager.update(|state| {
            state.is_in_flight = false;
            state.last_error = Some(ErrorInfo::unreachable("connection refused"));
        });
        assert!(changes.iter().any(|c| matches!(
            c,
            StateChange::SubmissionFinished { succeeded: false, .. }
        )));
    }

    #[test]
    fn test_superseding_submission_emits_started_event() {
        let manager = StateManager::new();
        manager.begin_submission();

        let mut rx = manager.subscribe();
        let token = manager.begin_submission();

        // in_flight never dropped, but the token bump is still a start.
        let event = rx.try_recv().unwrap();
        assert_eq!(event, StateChange::SubmissionStarted { token });
    }

    #[test]
    fn test_reset_workflow_returns_held_refs_and_emits_event() {
        let manager = StateManager::new();
        manager.update(|state| {
            state.phase = Phase::Result;
            state.original = Some(handle(1));
            state.processed = Some(handle(2));
        });

        let mut rx = manager.subscribe();
        let refs = manager.reset_workflow();

        assert_eq!(refs.len(), 2);
        let state = manager.snapshot();
        assert_eq!(state.phase, Phase::Upload);
        assert!(state.original.is_none());
        assert!(state.processed.is_none());

        // PhaseChanged from the update, then the explicit reset marker.
        let mut saw_reset = false;
        while let Ok(event) = rx.try_recv() {
            if event == StateChange::StateReset {
                saw_reset = true;
            }
        }
        assert!(saw_reset);
    }

    #[test]
    fn test_reset_workflow_is_idempotent() {
        let manager = StateManager::new();

        assert!(manager.reset_workflow().is_empty());
        assert!(manager.reset_workflow().is_empty());
        assert_eq!(manager.read(|s| s.phase), Phase::Upload);
    }

    #[test]
    fn test_service_health_change_detection() {
        let manager = StateManager::new();

        let changes = manager.set_service_health(ServiceHealth::Available);
        assert_eq!(
            changes,
            vec![StateChange::ServiceHealthChanged {
                health: ServiceHealth::Available
            }]
        );

        // Same value again: no event.
        let changes = manager.set_service_health(ServiceHealth::Available);
        assert!(changes.is_empty());
    }

    #[test]
    fn test_multiple_subscribers() {
        let manager = StateManager::new();
        let mut rx1 = manager.subscribe();
        let mut rx2 = manager.subscribe();

        manager.begin_submission();

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[test]
    fn test_clone_shares_state() {
        let manager1 = StateManager::new();
        let manager2 = manager1.clone();

        manager1.update(|state| {
            state.progress = 10;
            state.is_in_flight = true;
        });

        assert_eq!(manager2.read(|s| s.progress), 10);
    }
}
