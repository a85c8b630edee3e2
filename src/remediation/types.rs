//! Core data types for the remediation system.
//!
//! Rules, actions, metrics snapshots, predictions and action results are
//! all plain serde-serializable values; only the engine mutates rule
//! runtime fields.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Metric key under which a prediction's anomaly score is merged.
pub const ML_ANOMALY_SCORE: &str = "ml_anomaly_score";

/// Metric key under which a prediction's confidence is merged.
pub const ML_CONFIDENCE: &str = "ml_confidence";

// ============================================================================
// Remediation Action
// ============================================================================

/// Corrective action identifier passed to the action executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemediationAction {
    /// Restart the affected service
    RestartService,
    /// Add capacity
    ScaleUp,
    /// Remove capacity
    ScaleDown,
    /// Flush caches to relieve memory or disk
    ClearCache,
    /// Restart the affected container
    RestartContainer,
    /// Shut the system down before damage spreads
    EmergencyShutdown,
    /// Notify operators
    SendAlert,
}

impl RemediationAction {
    /// All actions, in declaration order.
    pub const ALL: [RemediationAction; 7] = [
        RemediationAction::RestartService,
        RemediationAction::ScaleUp,
        RemediationAction::ScaleDown,
        RemediationAction::ClearCache,
        RemediationAction::RestartContainer,
        RemediationAction::EmergencyShutdown,
        RemediationAction::SendAlert,
    ];

    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            RemediationAction::RestartService => "restart_service",
            RemediationAction::ScaleUp => "scale_up",
            RemediationAction::ScaleDown => "scale_down",
            RemediationAction::ClearCache => "clear_cache",
            RemediationAction::RestartContainer => "restart_container",
            RemediationAction::EmergencyShutdown => "emergency_shutdown",
            RemediationAction::SendAlert => "send_alert",
        }
    }

    /// Whether the action takes capacity offline.
    pub fn is_disruptive(&self) -> bool {
        matches!(
            self,
            RemediationAction::RestartService
                | RemediationAction::RestartContainer
                | RemediationAction::EmergencyShutdown
        )
    }
}

impl std::fmt::Display for RemediationAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RemediationAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.to_lowercase();
        RemediationAction::ALL
            .iter()
            .find(|a| a.as_str() == lowered)
            .copied()
            .ok_or_else(|| format!("Unknown remediation action: {}", s))
    }
}

// ============================================================================
// Conditions
// ============================================================================

/// Comparison applied between an observed metric and a threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionOperator {
    #[serde(rename = ">")]
    GreaterThan,
    #[serde(rename = "<")]
    LessThan,
    #[serde(rename = "=", alias = "==")]
    Equal,
    #[serde(rename = ">=")]
    GreaterOrEqual,
    #[serde(rename = "<=")]
    LessOrEqual,
}

impl ConditionOperator {
    /// Apply the comparison `observed <op> threshold`.
    pub fn compare(&self, observed: f64, threshold: f64) -> bool {
        match self {
            ConditionOperator::GreaterThan => observed > threshold,
            ConditionOperator::LessThan => observed < threshold,
            ConditionOperator::Equal => (observed - threshold).abs() < f64::EPSILON,
            ConditionOperator::GreaterOrEqual => observed >= threshold,
            ConditionOperator::LessOrEqual => observed <= threshold,
        }
    }

    /// Symbol form.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionOperator::GreaterThan => ">",
            ConditionOperator::LessThan => "<",
            ConditionOperator::Equal => "=",
            ConditionOperator::GreaterOrEqual => ">=",
            ConditionOperator::LessOrEqual => "<=",
        }
    }
}

impl std::fmt::Display for ConditionOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Threshold clause on a single metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleCondition {
    /// Threshold compared against the observed value
    pub threshold: f64,
    /// Comparison operator
    pub operator: ConditionOperator,
    /// How long the condition is expected to hold (informational)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    /// Whether an absent metric fails the rule
    #[serde(default)]
    pub required: bool,
}

impl RuleCondition {
    /// Create a non-required condition.
    pub fn new(operator: ConditionOperator, threshold: f64) -> Self {
        Self {
            threshold,
            operator,
            duration_minutes: None,
            required: false,
        }
    }

    /// Mark the condition as required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Attach a sustained-duration hint.
    pub fn for_minutes(mut self, minutes: u32) -> Self {
        self.duration_minutes = Some(minutes);
        self
    }
}

/// Outcome of checking a rule's conditions against a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionCheck {
    /// Every condition holds
    Satisfied,
    /// At least one condition does not hold
    Unsatisfied,
    /// A referenced metric is not a finite number
    Fault { metric: String, value: f64 },
}

// ============================================================================
// Remediation Rule
// ============================================================================

/// A named, prioritized, cooldown-gated condition/action pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemediationRule {
    /// Unique rule name
    pub name: String,
    /// Metric name to threshold clause
    pub conditions: BTreeMap<String, RuleCondition>,
    /// Actions executed in order when the rule triggers
    pub actions: Vec<RemediationAction>,
    /// Lower values are evaluated first
    pub priority: u32,
    /// Minimum minutes between two triggers
    pub cooldown_minutes: u32,
    /// Per-rule toggle
    pub enabled: bool,
    /// When the rule last triggered
    #[serde(default)]
    pub last_triggered: Option<DateTime<Utc>>,
    /// Number of times the rule has triggered
    #[serde(default)]
    pub trigger_count: u64,
}

impl RemediationRule {
    /// Create an enabled rule with no conditions.
    pub fn new(
        name: impl Into<String>,
        actions: Vec<RemediationAction>,
        priority: u32,
        cooldown_minutes: u32,
    ) -> Self {
        Self {
            name: name.into(),
            conditions: BTreeMap::new(),
            actions,
            priority,
            cooldown_minutes,
            enabled: true,
            last_triggered: None,
            trigger_count: 0,
        }
    }

    /// Add a condition on `metric`.
    pub fn with_condition(mut self, metric: impl Into<String>, condition: RuleCondition) -> Self {
        self.conditions.insert(metric.into(), condition);
        self
    }

    /// Check the structural invariants a rule must satisfy before it is
    /// admitted to the catalog.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name must not be empty".to_string());
        }
        if self.actions.is_empty() {
            return Err("actions must not be empty".to_string());
        }
        if let Some((metric, _)) = self
            .conditions
            .iter()
            .find(|(_, c)| !c.threshold.is_finite())
        {
            return Err(format!("threshold for '{}' must be a finite number", metric));
        }
        Ok(())
    }

    /// When the current cooldown ends, if the rule has ever triggered.
    pub fn cooldown_ends_at(&self) -> Option<DateTime<Utc>> {
        self.last_triggered
            .map(|t| t + ChronoDuration::minutes(i64::from(self.cooldown_minutes)))
    }

    /// Whether the rule is still cooling down at `now`.
    pub fn in_cooldown(&self, now: DateTime<Utc>) -> bool {
        self.cooldown_ends_at().map(|end| now < end).unwrap_or(false)
    }

    /// Evaluate all conditions conjunctively against `metrics`.
    ///
    /// An absent metric fails a required condition and is skipped
    /// otherwise.
    pub fn check(&self, metrics: &BTreeMap<String, f64>) -> ConditionCheck {
        let mut satisfied = true;
        for (metric, condition) in &self.conditions {
            match metrics.get(metric) {
                Some(&value) if !value.is_finite() => {
                    return ConditionCheck::Fault {
                        metric: metric.clone(),
                        value,
                    };
                }
                Some(&value) => {
                    if !condition.operator.compare(value, condition.threshold) {
                        satisfied = false;
                    }
                }
                None if condition.required => satisfied = false,
                None => {}
            }
        }
        if satisfied {
            ConditionCheck::Satisfied
        } else {
            ConditionCheck::Unsatisfied
        }
    }

    /// Record a trigger at `now`.
    pub fn mark_triggered(&mut self, now: DateTime<Utc>) {
        self.last_triggered = Some(now);
        self.trigger_count += 1;
    }
}

// ============================================================================
// Metrics Snapshot & Prediction
// ============================================================================

/// Timestamped mapping of metric name to value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Metric values by name
    pub metrics: BTreeMap<String, f64>,
    /// When the snapshot was taken
    pub timestamp: DateTime<Utc>,
}

impl MetricsSnapshot {
    /// Create a snapshot stamped with the current time.
    pub fn new(metrics: BTreeMap<String, f64>) -> Self {
        Self {
            metrics,
            timestamp: Utc::now(),
        }
    }

    /// Create an empty snapshot stamped with the current time.
    pub fn empty() -> Self {
        Self::new(BTreeMap::new())
    }

    /// Build a snapshot from `(name, value)` pairs.
    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        Self::new(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Look up a metric.
    pub fn get(&self, metric: &str) -> Option<f64> {
        self.metrics.get(metric).copied()
    }

    /// Return a copy with the prediction merged in as
    /// `ml_anomaly_score` and `ml_confidence`.
    pub fn with_prediction(&self, prediction: &Prediction) -> MetricsSnapshot {
        let mut merged = self.clone();
        merged
            .metrics
            .insert(ML_ANOMALY_SCORE.to_string(), prediction.anomaly_score);
        merged
            .metrics
            .insert(ML_CONFIDENCE.to_string(), prediction.confidence);
        merged
    }
}

/// Anomaly classification for one snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Anomaly score (0.0 - 1.0)
    pub anomaly_score: f64,
    /// Classifier confidence (0.0 - 1.0)
    pub confidence: f64,
    /// Classifier verdict
    pub is_anomaly: bool,
}

impl Prediction {
    /// Check that score and confidence both lie in 0.0 - 1.0.
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.anomaly_score) {
            return Err(format!(
                "anomaly_score must be between 0 and 1, got {}",
                self.anomaly_score
            ));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(format!(
                "confidence must be between 0 and 1, got {}",
                self.confidence
            ));
        }
        Ok(())
    }

    /// Whether the prediction clears `threshold`.
    pub fn is_confident(&self, threshold: f64) -> bool {
        self.confidence >= threshold
    }
}

// ============================================================================
// Action Context & Result
// ============================================================================

/// Context handed to the action executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionContext {
    /// Rule that requested the action
    pub rule_name: String,
    /// Metrics view the rule was evaluated against
    pub metrics: BTreeMap<String, f64>,
    /// Evaluation time
    pub timestamp: DateTime<Utc>,
}

/// Outcome of executing one action for one rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    /// Unique result ID
    pub id: Uuid,
    /// Rule that triggered the action
    pub rule_name: String,
    /// The executed action
    pub action: RemediationAction,
    /// Whether the executor reported success
    pub success: bool,
    /// Evaluation time
    pub timestamp: DateTime<Utc>,
    /// Metrics view the rule was evaluated against
    pub context: BTreeMap<String, f64>,
    /// Failure reason when `success` is false
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionResult {
    /// Build a result for `action` from its execution context.
    pub fn new(action: RemediationAction, context: &ActionContext, error: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            rule_name: context.rule_name.clone(),
            action,
            success: error.is_none(),
            timestamp: context.timestamp,
            context: context.metrics.clone(),
            error,
        }
    }
}
