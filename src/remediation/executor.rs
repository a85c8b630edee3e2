//! Action executor adapters.
//!
//! - [`DryRunExecutor`] logs the side effect it would perform and succeeds.
//! - [`WebhookExecutor`] forwards each action to an external handler over
//!   HTTP, one endpoint per action.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::ports::ActionExecutor;
use super::types::{ActionContext, RemediationAction};
use crate::config::RequestConfig;
use crate::error::{ExecutorError, ExecutorResult};

// ============================================================================
// Dry Run
// ============================================================================

/// Executor that only logs what it would do.
#[derive(Debug, Clone, Default)]
pub struct DryRunExecutor;

impl DryRunExecutor {
    /// Create a new dry-run executor.
    pub fn new() -> Self {
        Self
    }

    /// Human-readable description of the side effect behind `action`.
    pub fn describe(action: RemediationAction) -> &'static str {
        match action {
            RemediationAction::RestartService => "restart the affected service",
            RemediationAction::ScaleUp => "add one unit of capacity",
            RemediationAction::ScaleDown => "remove one unit of capacity",
            RemediationAction::ClearCache => "flush application caches",
            RemediationAction::RestartContainer => "restart the affected container",
            RemediationAction::EmergencyShutdown => "shut the system down",
            RemediationAction::SendAlert => "page the on-call operator",
        }
    }
}

#[async_trait]
impl ActionExecutor for DryRunExecutor {
    async fn execute(
        &self,
        action: RemediationAction,
        context: &ActionContext,
    ) -> ExecutorResult<()> {
        info!(
            action = %action,
            rule = %context.rule_name,
            disruptive = action.is_disruptive(),
            "[dry-run] would {}",
            Self::describe(action)
        );
        Ok(())
    }
}

// ============================================================================
// Webhook
// ============================================================================

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    action: RemediationAction,
    rule_name: &'a str,
    metrics: &'a std::collections::BTreeMap<String, f64>,
    timestamp: chrono::DateTime<chrono::Utc>,
}

/// Executor that POSTs each action to `{base_url}/actions/{action}`.
///
/// Any 2xx response is a success; everything else is reported as a
/// failure carrying the status and body.
#[derive(Clone)]
pub struct WebhookExecutor {
    client: Client,
    base_url: String,
}

impl WebhookExecutor {
    /// Create a new webhook executor.
    pub fn new(base_url: &str, request_config: &RequestConfig) -> ExecutorResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(ExecutorError::Http)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Endpoint receiving `action`.
    pub fn endpoint(&self, action: RemediationAction) -> String {
        format!("{}/actions/{}", self.base_url, action.as_str())
    }
}

#[async_trait]
impl ActionExecutor for WebhookExecutor {
    async fn execute(
        &self,
        action: RemediationAction,
        context: &ActionContext,
    ) -> ExecutorResult<()> {
        let url = self.endpoint(action);
        let payload = WebhookPayload {
            action,
            rule_name: &context.rule_name,
            metrics: &context.metrics,
            timestamp: context.timestamp,
        };

        debug!(url = %url, action = %action, "Dispatching action webhook");

        let response = self.client.post(&url).json(&payload).send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        warn!(url = %url, status = status.as_u16(), "Action webhook rejected");
        Err(ExecutorError::Failed {
            action: action.to_string(),
            message: format!("HTTP {}: {}", status.as_u16(), body),
        })
    }
}
