//! Application state for the API server.

use std::sync::Arc;
use std::time::Duration;

use searchrel_core::{ClassificationGateway, ZeroShotClassifier};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Gateway over the loaded classifier (read-only).
    pub gateway: Arc<ClassificationGateway>,
    /// Upper bound on a single classification, if any.
    pub classify_timeout: Option<Duration>,
}

impl AppState {
    /// Creates application state around a loaded classifier.
    pub fn new(classifier: Arc<dyn ZeroShotClassifier>) -> Self {
        Self::with_gateway(ClassificationGateway::new(classifier))
    }

    /// Creates application state with a prebuilt gateway.
    pub fn with_gateway(gateway: ClassificationGateway) -> Self {
        Self {
            gateway: Arc::new(gateway),
            classify_timeout: None,
        }
    }

    /// Sets the per-request classification timeout.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.classify_timeout = timeout;
        self
    }
}
