use std::sync::Arc;

use starchart_orchestrator::Orchestrator;

/// Shared application state, injected into all route handlers via Axum state.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    /// Shared secret the worker endpoint expects. Without one the endpoint
    /// refuses every call.
    pub worker_secret: Option<String>,
}
