use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use super::SharedState;
use crate::config::ConfigUpdate;
use crate::error::{McpError, McpResult};
use crate::remediation::{MetricsSnapshot, Prediction, RuleSpec};

/// Default number of entries returned by `remediation_history`.
const DEFAULT_HISTORY_LIMIT: usize = 20;
/// Default number of records returned by `monitor_recent`.
const DEFAULT_RECENT_LIMIT: usize = 10;

/// Route tool calls to appropriate handlers
pub async fn handle_tool_call(
    state: &SharedState,
    tool_name: &str,
    arguments: Option<Value>,
) -> McpResult<Value> {
    info!(tool = %tool_name, "Routing tool call");

    match tool_name {
        // Engine
        "remediation_status" => handle_status(state).await,
        "remediation_enable" => handle_enable(state).await,
        "remediation_disable" => handle_disable(state).await,
        "remediation_set_override" => handle_set_override(state, arguments).await,
        "remediation_list_rules" => handle_list_rules(state).await,
        "remediation_add_rule" => handle_add_rule(state, arguments).await,
        "remediation_remove_rule" => handle_remove_rule(state, arguments).await,
        "remediation_set_rule_enabled" => handle_set_rule_enabled(state, arguments).await,
        "remediation_history" => handle_history(state, arguments).await,
        "remediation_process_metrics" => handle_process_metrics(state, arguments).await,
        // Monitoring loop
        "monitor_status" => handle_monitor_status(state).await,
        "monitor_start" => handle_monitor_start(state).await,
        "monitor_stop" => handle_monitor_stop(state).await,
        "monitor_update_config" => handle_monitor_update_config(state, arguments).await,
        "monitor_recent" => handle_monitor_recent(state, arguments).await,
        _ => Err(McpError::UnknownTool {
            tool_name: tool_name.to_string(),
        }),
    }
}

// ============================================================================
// Engine Handlers
// ============================================================================

async fn handle_status(state: &SharedState) -> McpResult<Value> {
    let status = state.engine.status().await;
    serde_json::to_value(status).map_err(McpError::Json)
}

async fn handle_enable(state: &SharedState) -> McpResult<Value> {
    state.engine.enable().await;
    Ok(json!({ "enabled": true }))
}

async fn handle_disable(state: &SharedState) -> McpResult<Value> {
    state.engine.disable().await;
    Ok(json!({ "enabled": false }))
}

async fn handle_set_override(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    #[derive(Deserialize)]
    struct OverrideParams {
        active: bool,
    }

    let params: OverrideParams = parse_arguments("remediation_set_override", arguments)?;
    state.engine.set_manual_override(params.active).await;

    Ok(json!({ "manual_override": params.active }))
}

async fn handle_list_rules(state: &SharedState) -> McpResult<Value> {
    let rules = state.engine.list_rules().await;
    Ok(json!({
        "count": rules.len(),
        "rules": rules,
    }))
}

async fn handle_add_rule(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("remediation_add_rule", arguments, |spec: RuleSpec| async move {
        let rule = spec.into_rule(&state.config.rules);
        let summary = json!({
            "added": rule.name,
            "priority": rule.priority,
            "cooldown_minutes": rule.cooldown_minutes,
            "enabled": rule.enabled,
        });
        state.engine.add_rule(rule).await.map(|_| summary)
    })
    .await
}

async fn handle_remove_rule(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    #[derive(Deserialize)]
    struct RemoveParams {
        name: String,
    }

    let params: RemoveParams = parse_arguments("remediation_remove_rule", arguments)?;
    let removed = state.engine.remove_rule(&params.name).await;

    Ok(json!({
        "name": params.name,
        "removed": removed,
    }))
}

async fn handle_set_rule_enabled(
    state: &SharedState,
    arguments: Option<Value>,
) -> McpResult<Value> {
    #[derive(Deserialize)]
    struct ToggleParams {
        name: String,
        enabled: bool,
    }

    execute_handler(
        "remediation_set_rule_enabled",
        arguments,
        |params: ToggleParams| async move {
            state
                .engine
                .set_rule_enabled(&params.name, params.enabled)
                .await
                .map(|_| json!({ "name": params.name, "enabled": params.enabled }))
        },
    )
    .await
}

async fn handle_history(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    #[derive(Deserialize, Default)]
    struct HistoryParams {
        limit: Option<usize>,
    }

    let params: HistoryParams = parse_optional_arguments("remediation_history", arguments)?;
    let actions = state
        .engine
        .action_history(params.limit.unwrap_or(DEFAULT_HISTORY_LIMIT))
        .await;

    Ok(json!({
        "count": actions.len(),
        "actions": actions,
    }))
}

/// Arguments for `remediation_process_metrics`.
#[derive(Debug, Deserialize)]
pub struct ProcessMetricsParams {
    /// Metric name to value
    pub metrics: BTreeMap<String, f64>,
    /// Caller-supplied prediction; when absent the classifier is consulted
    #[serde(default)]
    pub prediction: Option<Prediction>,
}

/// Response for `remediation_process_metrics`.
#[derive(Debug, Serialize)]
struct ProcessMetricsResult {
    triggered: usize,
    prediction_source: &'static str,
    results: Vec<crate::remediation::ActionResult>,
}

async fn handle_process_metrics(
    state: &SharedState,
    arguments: Option<Value>,
) -> McpResult<Value> {
    let params: ProcessMetricsParams =
        parse_arguments("remediation_process_metrics", arguments)?;

    if let Some(ref prediction) = params.prediction {
        prediction
            .validate()
            .map_err(|message| McpError::InvalidParameters {
                tool_name: "remediation_process_metrics".to_string(),
                message: format!("prediction.{}", message),
            })?;
    }

    let snapshot = MetricsSnapshot::new(params.metrics);
    let (results, prediction_source) = match params.prediction {
        Some(prediction) => (
            state.engine.process(&snapshot, Some(&prediction)).await,
            "supplied",
        ),
        None => (state.monitor.manual_trigger(snapshot).await, "classifier"),
    };

    let result = ProcessMetricsResult {
        triggered: results.len(),
        prediction_source,
        results,
    };
    serde_json::to_value(result).map_err(McpError::Json)
}

// ============================================================================
// Monitoring Loop Handlers
// ============================================================================

async fn handle_monitor_status(state: &SharedState) -> McpResult<Value> {
    let status = state.monitor.status().await;
    serde_json::to_value(status).map_err(McpError::Json)
}

async fn handle_monitor_start(state: &SharedState) -> McpResult<Value> {
    let started = state.monitor.start().await;
    Ok(json!({
        "started": started,
        "state": state.monitor.state().await,
    }))
}

async fn handle_monitor_stop(state: &SharedState) -> McpResult<Value> {
    let stopped = state.monitor.stop().await;
    Ok(json!({
        "stopped": stopped,
        "state": state.monitor.state().await,
    }))
}

async fn handle_monitor_update_config(
    state: &SharedState,
    arguments: Option<Value>,
) -> McpResult<Value> {
    execute_handler(
        "monitor_update_config",
        arguments,
        |update: ConfigUpdate| async move { state.monitor.update_config(update).await },
    )
    .await
}

async fn handle_monitor_recent(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    #[derive(Deserialize, Default)]
    struct RecentParams {
        limit: Option<usize>,
    }

    let params: RecentParams = parse_optional_arguments("monitor_recent", arguments)?;
    let snapshots = state
        .monitor
        .recent(params.limit.unwrap_or(DEFAULT_RECENT_LIMIT))
        .await;

    Ok(json!({
        "count": snapshots.len(),
        "snapshots": snapshots,
    }))
}

// ============================================================================
// Helper functions
// ============================================================================

/// Helper to parse arguments with consistent error handling
fn parse_arguments<T: serde::de::DeserializeOwned>(
    tool_name: &str,
    arguments: Option<Value>,
) -> McpResult<T> {
    match arguments {
        Some(args) => serde_json::from_value(args).map_err(|e| McpError::InvalidParameters {
            tool_name: tool_name.to_string(),
            message: e.to_string(),
        }),
        None => Err(McpError::InvalidParameters {
            tool_name: tool_name.to_string(),
            message: "Missing arguments".to_string(),
        }),
    }
}

/// Like [`parse_arguments`], but missing arguments mean "all defaults".
fn parse_optional_arguments<T: serde::de::DeserializeOwned + Default>(
    tool_name: &str,
    arguments: Option<Value>,
) -> McpResult<T> {
    match arguments {
        Some(Value::Null) | None => Ok(T::default()),
        Some(args) => parse_arguments(tool_name, Some(args)),
    }
}

/// Parse typed arguments, run `operation`, and serialize its result.
///
/// Operation errors become [`McpError::ExecutionFailed`].
async fn execute_handler<P, R, E, F, Fut>(
    tool_name: &str,
    arguments: Option<Value>,
    operation: F,
) -> McpResult<Value>
where
    P: serde::de::DeserializeOwned,
    R: Serialize,
    E: std::fmt::Display,
    F: FnOnce(P) -> Fut,
    Fut: std::future::Future<Output = Result<R, E>>,
{
    let params: P = parse_arguments(tool_name, arguments)?;

    let result = operation(params)
        .await
        .map_err(|e| McpError::ExecutionFailed {
            message: e.to_string(),
        })?;

    serde_json::to_value(result).map_err(McpError::Json)
}
