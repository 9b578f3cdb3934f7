//! Shared handler state.

use std::sync::Arc;

use courier_runtime::LifecycleManager;

/// State cloned into every handler.
#[derive(Clone)]
pub struct AppState {
    /// The session lifecycle manager driving all gateway operations.
    pub manager: Arc<LifecycleManager>,
}

impl AppState {
    /// Wrap a lifecycle manager for the router.
    pub fn new(manager: Arc<LifecycleManager>) -> Self {
        Self { manager }
    }
}
