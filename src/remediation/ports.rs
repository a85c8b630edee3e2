//! Boundary contracts for the collaborators the remediation core drives.
//!
//! Failures are ordinary `Result` values; callers absorb them rather than
//! propagating.

use async_trait::async_trait;

use super::types::{ActionContext, MetricsSnapshot, Prediction, RemediationAction};
use crate::error::{ClassifierResult, ExecutorResult, SourceResult};

/// Produces an anomaly classification for a metrics snapshot.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Classify `metrics`.
    async fn classify(&self, metrics: &MetricsSnapshot) -> ClassifierResult<Prediction>;
}

/// Performs the side effect behind a remediation action.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    /// Execute `action`. `Ok(())` means the side effect succeeded.
    async fn execute(&self, action: RemediationAction, context: &ActionContext)
        -> ExecutorResult<()>;
}

/// Samples current infrastructure metrics.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Take one snapshot.
    async fn sample(&self) -> SourceResult<MetricsSnapshot>;
}
