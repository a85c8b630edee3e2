//! Rule catalog: ordered storage of remediation rules.
//!
//! Rules are kept in insertion order. Priority ordering is applied only
//! when the engine asks for an evaluation order.

use std::collections::BTreeMap;

use serde::Deserialize;

use super::types::{ConditionOperator, RemediationAction, RemediationRule, RuleCondition};
use crate::config::RuleDefaults;
use crate::error::{RemediationError, RemediationResult};

/// Ordered collection of remediation rules with unique names.
#[derive(Debug, Clone, Default)]
pub struct RuleCatalog {
    rules: Vec<RemediationRule>,
}

impl RuleCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a catalog holding the built-in rule set.
    pub fn with_defaults() -> Self {
        Self {
            rules: default_rules(),
        }
    }

    /// Append a rule.
    ///
    /// Rejects rules whose name is already taken or that break a rule
    /// invariant (see [`RemediationRule::validate`]).
    pub fn add(&mut self, rule: RemediationRule) -> RemediationResult<()> {
        rule.validate()
            .map_err(|reason| RemediationError::InvalidRule {
                name: rule.name.clone(),
                reason,
            })?;

        if self.get(&rule.name).is_some() {
            return Err(RemediationError::DuplicateRule { name: rule.name });
        }

        self.rules.push(rule);
        Ok(())
    }

    /// Remove the first rule named `name`. Returns true if found and removed.
    pub fn remove(&mut self, name: &str) -> bool {
        match self.rules.iter().position(|r| r.name == name) {
            Some(idx) => {
                self.rules.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Rules in insertion order.
    pub fn list(&self) -> &[RemediationRule] {
        &self.rules
    }

    /// Get a rule by name.
    pub fn get(&self, name: &str) -> Option<&RemediationRule> {
        self.rules.iter().find(|r| r.name == name)
    }

    /// Get a mutable rule by name.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut RemediationRule> {
        self.rules.iter_mut().find(|r| r.name == name)
    }

    /// Get a rule by position.
    pub fn get_index(&self, idx: usize) -> Option<&RemediationRule> {
        self.rules.get(idx)
    }

    /// Get a mutable rule by position.
    pub fn get_index_mut(&mut self, idx: usize) -> Option<&mut RemediationRule> {
        self.rules.get_mut(idx)
    }

    /// Number of rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Number of rules with their own toggle on.
    pub fn enabled_count(&self) -> usize {
        self.rules.iter().filter(|r| r.enabled).count()
    }

    /// Indices of the rules sorted by ascending priority.
    ///
    /// The sort is stable, so equal priorities keep insertion order.
    pub fn evaluation_order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.rules.len()).collect();
        order.sort_by_key(|&idx| self.rules[idx].priority);
        order
    }
}

// ============================================================================
// Rule Spec
// ============================================================================

/// Externally supplied rule definition.
///
/// Priority, cooldown and the enabled flag are optional and filled from
/// [`RuleDefaults`]; runtime fields cannot be supplied.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleSpec {
    pub name: String,
    #[serde(default)]
    pub conditions: BTreeMap<String, RuleCondition>,
    pub actions: Vec<RemediationAction>,
    #[serde(default)]
    pub priority: Option<u32>,
    #[serde(default)]
    pub cooldown_minutes: Option<u32>,
    #[serde(default)]
    pub enabled: Option<bool>,
}

impl RuleSpec {
    /// Build a rule, filling omitted fields from `defaults`.
    pub fn into_rule(self, defaults: &RuleDefaults) -> RemediationRule {
        RemediationRule {
            name: self.name,
            conditions: self.conditions,
            actions: self.actions,
            priority: self.priority.unwrap_or(defaults.default_priority),
            cooldown_minutes: self
                .cooldown_minutes
                .unwrap_or(defaults.default_cooldown_minutes),
            enabled: self.enabled.unwrap_or(true),
            last_triggered: None,
            trigger_count: 0,
        }
    }
}

// ============================================================================
// Built-in Rules
// ============================================================================

/// The rule set every engine starts with.
pub fn default_rules() -> Vec<RemediationRule> {
    use ConditionOperator::{GreaterOrEqual, GreaterThan, LessThan};
    use RemediationAction::*;

    vec![
        RemediationRule::new("Critical System Failure", vec![EmergencyShutdown, SendAlert], 0, 30)
            .with_condition("cpu_percent", RuleCondition::new(GreaterThan, 95.0).required())
            .with_condition("memory_percent", RuleCondition::new(GreaterThan, 95.0).required())
            .with_condition("ml_anomaly_score", RuleCondition::new(GreaterThan, 0.9)),
        RemediationRule::new("Service Unresponsive", vec![RestartContainer, SendAlert], 0, 10)
            .with_condition("error_rate", RuleCondition::new(GreaterThan, 0.25).required())
            .with_condition(
                "response_time_ms",
                RuleCondition::new(GreaterThan, 5000.0).required(),
            ),
        RemediationRule::new("High CPU Usage", vec![ScaleUp, SendAlert], 1, 10).with_condition(
            "cpu_percent",
            RuleCondition::new(GreaterThan, 85.0).required().for_minutes(5),
        ),
        RemediationRule::new("Memory Pressure", vec![ClearCache, RestartService], 1, 15)
            .with_condition(
                "memory_percent",
                RuleCondition::new(GreaterThan, 90.0).required().for_minutes(5),
            ),
        RemediationRule::new("Disk Space Critical", vec![ClearCache, SendAlert], 1, 60)
            .with_condition("disk_percent", RuleCondition::new(GreaterThan, 90.0).required()),
        RemediationRule::new("ML Anomaly Detected", vec![SendAlert], 2, 20)
            .with_condition("ml_anomaly_score", RuleCondition::new(GreaterThan, 0.8).required())
            .with_condition("ml_confidence", RuleCondition::new(GreaterOrEqual, 0.7).required()),
        RemediationRule::new("Low Utilization", vec![ScaleDown], 3, 30)
            .with_condition(
                "cpu_percent",
                RuleCondition::new(LessThan, 20.0).required().for_minutes(30),
            )
            .with_condition("memory_percent", RuleCondition::new(LessThan, 30.0).required()),
    ]
}
