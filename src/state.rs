//! Shared application state.

use std::sync::Arc;
use std::time::Duration;

use crate::backend::{BackendClient, HttpBackend};
use crate::classify::Classifier;
use crate::config::Config;
use crate::demo::DemoOrchestrator;
use crate::executor::CommandExecutor;
use crate::limiter::RateLimiter;
use crate::store::MemoryCounterStore;

/// Everything the HTTP handlers share.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: Arc<MemoryCounterStore>,
    pub limiter: Arc<RateLimiter>,
    pub executor: Arc<CommandExecutor>,
    pub demos: Arc<DemoOrchestrator>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let backend = Arc::new(HttpBackend::new(config.backend_url.clone()));
        Self::with_backend(config, backend)
    }

    /// Build the state around an injected backend, for tests.
    pub fn with_backend(config: Config, backend: Arc<dyn BackendClient>) -> Self {
        let store = Arc::new(MemoryCounterStore::new());
        let limiter = Arc::new(RateLimiter::new(
            store.clone(),
            config.window_secs,
            config.max_requests,
        ));
        let executor = Arc::new(CommandExecutor::new(
            backend,
            Classifier::default(),
            Duration::from_millis(config.retry_backoff_ms),
        ));
        let demos = Arc::new(DemoOrchestrator::new(
            executor.clone(),
            config.concurrency,
            config.default_timeout_ms,
        ));
        Self {
            config,
            store,
            limiter,
            executor,
            demos,
        }
    }
}
