//! Data models for the Removbl client.
//!
//! This module contains the core data structures used throughout the crate:
//! - [`WorkflowState`]: the single source of truth for the active processing cycle
//! - [`ImageHandle`]: one binary image known to the client (metadata plus a revocable preview reference)
//! - [`ErrorInfo`] / [`ErrorKind`]: the failure taxonomy stored at the workflow boundary
//! - [`FeatureSelection`]: the active feature/page combination driving workflow resets
//! - [`UserConfig`] / [`ClientSettings`]: user preferences loaded from `Removbl Config.yaml`
//!
//! # Architecture Note
//!
//! The models are designed to be:
//! - **Serializable**: config structs derive `Serialize`/`Deserialize` for YAML persistence
//! - **Cloneable**: `WorkflowState` is wrapped in `Arc<RwLock<>>` by [`StateManager`](crate::state::StateManager) for thread-safe access
//! - **Mutated indirectly**: state updates go through the manager's `update()` so change events fire

pub mod app_state;
pub mod config;

pub use app_state::{
    ErrorInfo, ErrorKind, Feature, FeatureSelection, ImageHandle, PROGRESS_COMPLETE, Page, Phase,
    ServiceHealth, WorkflowState,
};
pub use config::{ClientSettings, UserConfig};
