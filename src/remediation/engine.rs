//! Remediation engine.
//!
//! Evaluates the rule catalog against a metrics snapshot (optionally merged
//! with an anomaly prediction), enforces cooldowns and the engine-wide
//! enable/override gates, drives the action executor and records every
//! outcome.
//!
//! # Locking
//!
//! All engine state sits behind one async mutex. A `process` call holds it
//! from the gate check until its last action completes, so two concurrent
//! calls can never trigger the same rule inside its cooldown window, and
//! catalog or flag mutations never interleave with an evaluation.
//!
//! A rule is marked triggered as soon as its conditions match, and each
//! action result is appended to history as soon as the action completes.
//! Dropping a `process` future part-way therefore never leaves a fired
//! rule outside its cooldown or a finished action unrecorded.
//!
//! # Evaluation
//!
//! ```text
//! gate ──▶ merge prediction ──▶ rules by priority ──▶ cooldown? ──▶ conditions? ──▶ actions
//!                                     ▲                                                │
//!                                     └──────────────── next rule ◀────────────────────┘
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::catalog::RuleCatalog;
use super::ports::ActionExecutor;
use super::types::{
    ActionContext, ActionResult, ConditionCheck, MetricsSnapshot, Prediction, RemediationAction,
    RemediationRule,
};
use crate::config::EngineConfig;
use crate::error::{ExecutorError, RemediationError, RemediationResult};

// ============================================================================
// Engine Status
// ============================================================================

/// Read-only snapshot of engine state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStatus {
    /// Engine-wide enable flag
    pub enabled: bool,
    /// Manual override flag
    pub manual_override: bool,
    /// Rules in the catalog
    pub rule_count: usize,
    /// Rules with their own toggle on
    pub enabled_rule_count: usize,
    /// Action results recorded so far
    pub total_actions: usize,
    /// Most recent action results, oldest first
    pub recent_actions: Vec<ActionResult>,
}

// ============================================================================
// Engine State
// ============================================================================

/// Internal state guarded by the engine lock.
#[derive(Debug)]
struct EngineState {
    is_enabled: bool,
    manual_override: bool,
    catalog: RuleCatalog,
    history: Vec<ActionResult>,
}

impl EngineState {
    fn is_gated(&self) -> bool {
        !self.is_enabled || self.manual_override
    }
}

// ============================================================================
// Remediation Engine
// ============================================================================

/// Prioritized, cooldown-gated rule evaluator.
///
/// # Example
///
/// ```rust,ignore
/// let engine = RemediationEngine::new(EngineConfig::default(), Arc::new(DryRunExecutor::new()));
///
/// let metrics = MetricsSnapshot::from_pairs([("cpu_percent", 97.0), ("memory_percent", 96.0)]);
/// let results = engine.process(&metrics, None).await;
/// ```
pub struct RemediationEngine {
    config: EngineConfig,
    executor: Arc<dyn ActionExecutor>,
    state: Mutex<EngineState>,
}

impl RemediationEngine {
    /// Create an engine loaded with the built-in rule set.
    pub fn new(config: EngineConfig, executor: Arc<dyn ActionExecutor>) -> Self {
        Self::with_catalog(config, executor, RuleCatalog::with_defaults())
    }

    /// Create an engine around an explicit catalog.
    pub fn with_catalog(
        config: EngineConfig,
        executor: Arc<dyn ActionExecutor>,
        catalog: RuleCatalog,
    ) -> Self {
        info!(
            enabled = config.enabled,
            rules = catalog.len(),
            action_timeout_ms = config.action_timeout_ms,
            "Initializing RemediationEngine"
        );

        let state = EngineState {
            is_enabled: config.enabled,
            manual_override: false,
            catalog,
            history: Vec::new(),
        };

        Self {
            config,
            executor,
            state: Mutex::new(state),
        }
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Evaluate all rules against `metrics` at the current time.
    ///
    /// Returns an empty list without touching any state when the engine is
    /// disabled or manually overridden. Executor failures are recorded as
    /// unsuccessful results and never abort the evaluation.
    pub async fn process(
        &self,
        metrics: &MetricsSnapshot,
        prediction: Option<&Prediction>,
    ) -> Vec<ActionResult> {
        self.process_at(metrics, prediction, Utc::now()).await
    }

    /// Evaluate all rules against `metrics` as of `now`.
    pub async fn process_at(
        &self,
        metrics: &MetricsSnapshot,
        prediction: Option<&Prediction>,
        now: DateTime<Utc>,
    ) -> Vec<ActionResult> {
        let mut state = self.state.lock().await;

        if state.is_gated() {
            debug!(
                enabled = state.is_enabled,
                manual_override = state.manual_override,
                "Remediation gated, skipping evaluation"
            );
            return Vec::new();
        }

        let view = match prediction {
            Some(p) => metrics.with_prediction(p),
            None => metrics.clone(),
        };

        let mut results = Vec::new();

        for idx in state.catalog.evaluation_order() {
            let Some(rule) = state.catalog.get_index(idx) else {
                continue;
            };

            if !rule.enabled {
                continue;
            }

            if rule.in_cooldown(now) {
                debug!(
                    rule = %rule.name,
                    cooldown_ends_at = ?rule.cooldown_ends_at(),
                    "Rule in cooldown, skipping"
                );
                continue;
            }

            match rule.check(&view.metrics) {
                ConditionCheck::Satisfied => {}
                ConditionCheck::Unsatisfied => continue,
                ConditionCheck::Fault { metric, value } => {
                    warn!(
                        rule = %rule.name,
                        metric = %metric,
                        value = value,
                        "Rule evaluation fault, skipping rule"
                    );
                    continue;
                }
            }

            let actions = rule.actions.clone();
            let context = ActionContext {
                rule_name: rule.name.clone(),
                metrics: view.metrics.clone(),
                timestamp: now,
            };

            info!(
                rule = %context.rule_name,
                priority = rule.priority,
                actions = actions.len(),
                "Remediation rule triggered"
            );

            if let Some(rule) = state.catalog.get_index_mut(idx) {
                rule.mark_triggered(now);
            }

            for action in actions {
                let result = self.run_action(action, &context).await;
                state.history.push(result.clone());
                results.push(result);
            }
        }

        results
    }

    /// Run one action through the executor, bounded by the action timeout.
    ///
    /// The call runs on its own task so a panicking handler is reported as a
    /// failed action instead of unwinding through the evaluation.
    async fn run_action(&self, action: RemediationAction, context: &ActionContext) -> ActionResult {
        let executor = Arc::clone(&self.executor);
        let task_context = context.clone();
        let mut handle =
            tokio::spawn(async move { executor.execute(action, &task_context).await });

        let timeout = self.config.action_timeout();
        let outcome = match tokio::time::timeout(timeout, &mut handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) if join_err.is_panic() => Err(ExecutorError::Panicked {
                action: action.to_string(),
            }),
            Ok(Err(join_err)) => Err(ExecutorError::Failed {
                action: action.to_string(),
                message: join_err.to_string(),
            }),
            Err(_) => {
                handle.abort();
                Err(ExecutorError::Timeout {
                    action: action.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        };

        match outcome {
            Ok(()) => {
                info!(rule = %context.rule_name, action = %action, "Remediation action succeeded");
                ActionResult::new(action, context, None)
            }
            Err(e) => {
                warn!(
                    rule = %context.rule_name,
                    action = %action,
                    error = %e,
                    "Remediation action failed"
                );
                ActionResult::new(action, context, Some(e.to_string()))
            }
        }
    }

    // ========================================================================
    // Gates
    // ========================================================================

    /// Turn automatic remediation on.
    pub async fn enable(&self) {
        self.state.lock().await.is_enabled = true;
        info!("Remediation engine enabled");
    }

    /// Turn automatic remediation off.
    pub async fn disable(&self) {
        self.state.lock().await.is_enabled = false;
        info!("Remediation engine disabled");
    }

    /// Set or clear the manual override.
    pub async fn set_manual_override(&self, active: bool) {
        self.state.lock().await.manual_override = active;
        if active {
            warn!("Manual override active, automatic remediation suspended");
        } else {
            info!("Manual override cleared");
        }
    }

    /// Engine-wide enable flag.
    pub async fn is_enabled(&self) -> bool {
        self.state.lock().await.is_enabled
    }

    /// Manual override flag.
    pub async fn manual_override(&self) -> bool {
        self.state.lock().await.manual_override
    }

    // ========================================================================
    // Catalog
    // ========================================================================

    /// Add a rule to the catalog.
    pub async fn add_rule(&self, rule: RemediationRule) -> RemediationResult<()> {
        let name = rule.name.clone();
        let priority = rule.priority;
        self.state.lock().await.catalog.add(rule)?;
        info!(rule = %name, priority = priority, "Rule added");
        Ok(())
    }

    /// Remove a rule by name. Returns true if found and removed.
    pub async fn remove_rule(&self, name: &str) -> bool {
        let removed = self.state.lock().await.catalog.remove(name);
        if removed {
            info!(rule = %name, "Rule removed");
        }
        removed
    }

    /// Rules in insertion order.
    pub async fn list_rules(&self) -> Vec<RemediationRule> {
        self.state.lock().await.catalog.list().to_vec()
    }

    /// Get a rule by name.
    pub async fn get_rule(&self, name: &str) -> Option<RemediationRule> {
        self.state.lock().await.catalog.get(name).cloned()
    }

    /// Toggle a single rule.
    pub async fn set_rule_enabled(&self, name: &str, enabled: bool) -> RemediationResult<()> {
        let mut state = self.state.lock().await;
        let rule = state
            .catalog
            .get_mut(name)
            .ok_or_else(|| RemediationError::RuleNotFound {
                name: name.to_string(),
            })?;
        rule.enabled = enabled;
        info!(rule = %name, enabled = enabled, "Rule toggled");
        Ok(())
    }

    // ========================================================================
    // Status & History
    // ========================================================================

    /// Current engine status.
    pub async fn status(&self) -> EngineStatus {
        let state = self.state.lock().await;
        EngineStatus {
            enabled: state.is_enabled,
            manual_override: state.manual_override,
            rule_count: state.catalog.len(),
            enabled_rule_count: state.catalog.enabled_count(),
            total_actions: state.history.len(),
            recent_actions: tail(&state.history, self.config.recent_actions_limit),
        }
    }

    /// The most recent `limit` action results, oldest first.
    pub async fn action_history(&self, limit: usize) -> Vec<ActionResult> {
        tail(&self.state.lock().await.history, limit)
    }

    /// Drop the oldest history entries beyond `keep`. Returns how many were
    /// dropped.
    pub async fn trim_history(&self, keep: usize) -> usize {
        let mut state = self.state.lock().await;
        let excess = state.history.len().saturating_sub(keep);
        if excess > 0 {
            state.history.drain(..excess);
            debug!(dropped = excess, kept = keep, "Action history trimmed");
        }
        excess
    }
}

fn tail(history: &[ActionResult], limit: usize) -> Vec<ActionResult> {
    let start = history.len().saturating_sub(limit);
    history[start..].to_vec()
}

// ============================================================================
// Tests
// ============================================================================
