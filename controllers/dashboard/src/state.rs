//! Shared handler state.

use std::sync::Arc;
use watch_engine::EngineContext;

/// State shared by every route.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Watch-and-stream engine
    pub engine: Arc<EngineContext>,
}

impl AppState {
    /// Wraps an engine.
    pub fn new(engine: Arc<EngineContext>) -> Self {
        Self { engine }
    }
}
