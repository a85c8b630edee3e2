//! Server module for MCP protocol handling.
//!
//! This module provides:
//! - MCP server implementation over stdio
//! - Tool call handlers and routing
//! - Shared application state wiring the engine, loop and adapters

mod handlers;
mod mcp;

pub use handlers::*;
pub use mcp::*;

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::Config;
use crate::error::AppResult;
use crate::remediation::{
    ActionExecutor, Classifier, DryRunExecutor, HeuristicClassifier, HttpClassifier,
    MetricsSource, MonitoringLoop, RemediationEngine, SystemMetricsSource, WebhookExecutor,
};

/// Application state shared across handlers.
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// Remediation engine.
    pub engine: Arc<RemediationEngine>,
    /// Monitoring loop driving `engine`.
    pub monitor: Arc<MonitoringLoop>,
}

impl AppState {
    /// Wire state from explicit collaborators.
    pub fn new(
        config: Config,
        executor: Arc<dyn ActionExecutor>,
        classifier: Arc<dyn Classifier>,
        source: Arc<dyn MetricsSource>,
    ) -> Self {
        let engine = Arc::new(RemediationEngine::new(config.engine.clone(), executor));
        let monitor = Arc::new(MonitoringLoop::new(
            Arc::clone(&engine),
            classifier,
            source,
            config.monitor.clone(),
        ));

        Self {
            config,
            engine,
            monitor,
        }
    }

    /// Wire state with adapters selected by configuration.
    ///
    /// `ACTION_WEBHOOK_URL` selects the webhook executor (dry-run otherwise)
    /// and `CLASSIFIER_URL` the HTTP classifier (heuristic otherwise).
    pub fn from_config(config: Config) -> AppResult<Self> {
        let executor: Arc<dyn ActionExecutor> = match config.executor.webhook_url {
            Some(ref url) => {
                info!(url = %url, "Using webhook action executor");
                Arc::new(WebhookExecutor::new(url, &config.request)?)
            }
            None => {
                info!("No ACTION_WEBHOOK_URL set, actions run in dry-run mode");
                Arc::new(DryRunExecutor::new())
            }
        };

        let classifier: Arc<dyn Classifier> = match config.classifier.url {
            Some(ref url) => {
                info!(url = %url, "Using HTTP classifier");
                let budget = config.request.worst_case();
                if budget > config.monitor.sample_timeout() {
                    warn!(
                        worst_case_ms = budget.as_millis() as u64,
                        sample_timeout_ms = config.monitor.sample_timeout_ms,
                        "Classifier retries exceed SAMPLE_TIMEOUT_MS, later retries will be cut off"
                    );
                }
                Arc::new(HttpClassifier::new(
                    url,
                    &config.classifier,
                    config.request.clone(),
                )?)
            }
            None => {
                info!("No CLASSIFIER_URL set, using heuristic classifier");
                Arc::new(HeuristicClassifier::default())
            }
        };

        let source: Arc<dyn MetricsSource> = Arc::new(SystemMetricsSource::new());

        Ok(Self::new(config, executor, classifier, source))
    }

    /// Wire state with the local adapters only. Never fails.
    pub fn with_defaults(config: Config) -> Self {
        Self::new(
            config,
            Arc::new(DryRunExecutor::new()),
            Arc::new(HeuristicClassifier::default()),
            Arc::new(SystemMetricsSource::new()),
        )
    }
}

/// Shared application state handle
pub type SharedState = Arc<AppState>;
