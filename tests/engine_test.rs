//! Integration tests for the remediation engine
//!
//! Drives the engine through its public API with a recording executor and
//! checks gating, ordering, cooldown and condition semantics.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use pretty_assertions::assert_eq;

use ops_remediation::config::EngineConfig;
use ops_remediation::error::{ExecutorError, ExecutorResult, RemediationError};
use ops_remediation::remediation::{
    ActionContext, ActionExecutor, ConditionOperator, MetricsSnapshot, Prediction,
    RemediationAction, RemediationEngine, RemediationRule, RuleCatalog, RuleCondition,
};

/// Executor that records every call and optionally fails one action.
#[derive(Default)]
struct RecordingExecutor {
    calls: Mutex<Vec<(String, RemediationAction)>>,
    fail_on: Option<RemediationAction>,
}

impl RecordingExecutor {
    fn failing_on(action: RemediationAction) -> Self {
        Self {
            fail_on: Some(action),
            ..Default::default()
        }
    }

    fn calls(&self) -> Vec<(String, RemediationAction)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ActionExecutor for RecordingExecutor {
    async fn execute(
        &self,
        action: RemediationAction,
        context: &ActionContext,
    ) -> ExecutorResult<()> {
        self.calls
            .lock()
            .unwrap()
            .push((context.rule_name.clone(), action));

        if self.fail_on == Some(action) {
            return Err(ExecutorError::Failed {
                action: action.to_string(),
                message: "handler refused".to_string(),
            });
        }
        Ok(())
    }
}

fn default_engine() -> (RemediationEngine, Arc<RecordingExecutor>) {
    let executor = Arc::new(RecordingExecutor::default());
    let engine = RemediationEngine::new(EngineConfig::default(), executor.clone());
    (engine, executor)
}

fn engine_with(rules: Vec<RemediationRule>) -> (RemediationEngine, Arc<RecordingExecutor>) {
    let executor = Arc::new(RecordingExecutor::default());
    let mut catalog = RuleCatalog::new();
    for rule in rules {
        catalog.add(rule).unwrap();
    }
    let engine = RemediationEngine::with_catalog(EngineConfig::default(), executor.clone(), catalog);
    (engine, executor)
}

fn cpu_rule(name: &str, priority: u32, cooldown: u32) -> RemediationRule {
    RemediationRule::new(name, vec![RemediationAction::SendAlert], priority, cooldown).with_condition(
        "cpu_percent",
        RuleCondition::new(ConditionOperator::GreaterThan, 80.0).required(),
    )
}

fn extreme_metrics() -> MetricsSnapshot {
    MetricsSnapshot::from_pairs([
        ("cpu_percent", 100.0),
        ("memory_percent", 100.0),
        ("disk_percent", 100.0),
        ("error_rate", 1.0),
        ("response_time_ms", 60000.0),
    ])
}

fn anomaly() -> Prediction {
    Prediction {
        anomaly_score: 0.95,
        confidence: 0.92,
        is_anomaly: true,
    }
}

// ============================================================================
// Gates
// ============================================================================

#[tokio::test]
async fn test_disabled_engine_never_acts() {
    let (engine, executor) = default_engine();
    engine.disable().await;

    let results = engine.process(&extreme_metrics(), Some(&anomaly())).await;

    assert!(results.is_empty());
    assert!(executor.calls().is_empty());
    assert!(engine.action_history(100).await.is_empty());
}

#[tokio::test]
async fn test_manual_override_beats_enable_flag() {
    let (engine, executor) = default_engine();
    engine.set_manual_override(true).await;
    assert!(engine.is_enabled().await);

    let results = engine.process(&extreme_metrics(), Some(&anomaly())).await;
    assert!(results.is_empty());
    assert!(executor.calls().is_empty());

    engine.set_manual_override(false).await;
    let results = engine.process(&extreme_metrics(), Some(&anomaly())).await;
    assert!(!results.is_empty());
}

#[tokio::test]
async fn test_gated_calls_do_not_start_cooldowns() {
    let (engine, _) = engine_with(vec![cpu_rule("cpu", 1, 30)]);
    let metrics = MetricsSnapshot::from_pairs([("cpu_percent", 90.0)]);

    engine.disable().await;
    engine.process(&metrics, None).await;
    engine.enable().await;

    assert_eq!(engine.process(&metrics, None).await.len(), 1);
}

// ============================================================================
// Ordering and conditions
// ============================================================================

#[tokio::test]
async fn test_lower_priority_value_runs_first() {
    let (engine, executor) = engine_with(vec![cpu_rule("background", 3, 0), cpu_rule("urgent", 0, 0)]);

    let results = engine
        .process(&MetricsSnapshot::from_pairs([("cpu_percent", 95.0)]), None)
        .await;

    let order: Vec<&str> = results.iter().map(|r| r.rule_name.as_str()).collect();
    assert_eq!(order, vec!["urgent", "background"]);
    assert_eq!(executor.calls()[0].0, "urgent");
}

#[tokio::test]
async fn test_equal_priority_keeps_insertion_order() {
    let (engine, _) = engine_with(vec![
        cpu_rule("first", 2, 0),
        cpu_rule("second", 2, 0),
        cpu_rule("third", 2, 0),
    ]);

    let results = engine
        .process(&MetricsSnapshot::from_pairs([("cpu_percent", 95.0)]), None)
        .await;

    let order: Vec<&str> = results.iter().map(|r| r.rule_name.as_str()).collect();
    assert_eq!(order, vec!["first", "second", "third"]);
}

#[tokio::test]
async fn test_required_absent_metric_blocks_rule() {
    let required = RemediationRule::new("needs-latency", vec![RemediationAction::RestartService], 1, 0)
        .with_condition(
            "latency_ms",
            RuleCondition::new(ConditionOperator::GreaterThan, 100.0).required(),
        );
    let (engine, _) = engine_with(vec![required]);

    let results = engine
        .process(&MetricsSnapshot::from_pairs([("cpu_percent", 99.0)]), None)
        .await;
    assert!(results.is_empty());
}

#[tokio::test]
async fn test_optional_absent_metric_is_ignored() {
    let rule = cpu_rule("cpu-with-optional", 1, 0).with_condition(
        "latency_ms",
        RuleCondition::new(ConditionOperator::GreaterThan, 100.0),
    );
    let (engine, _) = engine_with(vec![rule]);

    let results = engine
        .process(&MetricsSnapshot::from_pairs([("cpu_percent", 99.0)]), None)
        .await;
    assert_eq!(results.len(), 1);

    // Present but failing still blocks the rule
    let results = engine
        .process(
            &MetricsSnapshot::from_pairs([("cpu_percent", 99.0), ("latency_ms", 10.0)]),
            None,
        )
        .await;
    assert!(results.is_empty());
}

#[tokio::test]
async fn test_non_finite_metric_only_skips_that_rule() {
    let (engine, _) = engine_with(vec![
        cpu_rule("cpu", 0, 0),
        RemediationRule::new("disk", vec![RemediationAction::ClearCache], 1, 0).with_condition(
            "disk_percent",
            RuleCondition::new(ConditionOperator::GreaterThan, 90.0).required(),
        ),
    ]);

    let results = engine
        .process(
            &MetricsSnapshot::from_pairs([("cpu_percent", f64::NAN), ("disk_percent", 95.0)]),
            None,
        )
        .await;

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].rule_name, "disk");
}

// ============================================================================
// Actions and history
// ============================================================================

#[tokio::test]
async fn test_executor_failure_is_recorded_and_later_actions_still_run() {
    let executor = Arc::new(RecordingExecutor::failing_on(RemediationAction::ClearCache));
    let rule = RemediationRule::new(
        "memory",
        vec![RemediationAction::ClearCache, RemediationAction::RestartService],
        1,
        0,
    );
    let mut catalog = RuleCatalog::new();
    catalog.add(rule).unwrap();
    let engine = RemediationEngine::with_catalog(EngineConfig::default(), executor.clone(), catalog);

    let results = engine.process(&MetricsSnapshot::empty(), None).await;

    assert_eq!(results.len(), 2);
    assert!(!results[0].success);
    assert!(results[0].error.as_deref().unwrap().contains("handler refused"));
    assert!(results[1].success);

    let rule = engine.get_rule("memory").await.unwrap();
    assert_eq!(rule.trigger_count, 1);
    assert!(rule.last_triggered.is_some());
}

#[tokio::test]
async fn test_history_is_chronological_and_limited() {
    let (engine, _) = engine_with(vec![cpu_rule("cpu", 0, 0)]);
    let metrics = MetricsSnapshot::from_pairs([("cpu_percent", 90.0)]);
    let start = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();

    for minute in 0..5 {
        engine
            .process_at(&metrics, None, start + Duration::minutes(minute))
            .await;
    }

    let history = engine.action_history(3).await;
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].timestamp, start + Duration::minutes(2));
    assert_eq!(history[2].timestamp, start + Duration::minutes(4));

    assert_eq!(engine.trim_history(2).await, 3);
    assert_eq!(engine.status().await.total_actions, 2);
}

#[tokio::test]
async fn test_status_reports_counts() {
    let (engine, _) = default_engine();
    engine.set_rule_enabled("Low Utilization", false).await.unwrap();

    let status = engine.status().await;
    assert!(status.enabled);
    assert!(!status.manual_override);
    assert_eq!(status.rule_count, 7);
    assert_eq!(status.enabled_rule_count, 6);
    assert_eq!(status.total_actions, 0);
}

#[tokio::test]
async fn test_disabled_rule_is_skipped() {
    let (engine, _) = engine_with(vec![cpu_rule("cpu", 0, 0)]);
    engine.set_rule_enabled("cpu", false).await.unwrap();

    let results = engine
        .process(&MetricsSnapshot::from_pairs([("cpu_percent", 99.0)]), None)
        .await;
    assert!(results.is_empty());

    assert!(matches!(
        engine.set_rule_enabled("missing", true).await,
        Err(RemediationError::RuleNotFound { .. })
    ));
}

// ============================================================================
// Catalog mutation
// ============================================================================

#[tokio::test]
async fn test_add_then_remove_restores_catalog() {
    let (engine, _) = default_engine();
    let before: Vec<String> = engine.list_rules().await.into_iter().map(|r| r.name).collect();

    engine.add_rule(cpu_rule("temporary", 0, 5)).await.unwrap();
    assert_eq!(engine.list_rules().await.len(), before.len() + 1);
    assert!(engine.remove_rule("temporary").await);

    let after: Vec<String> = engine.list_rules().await.into_iter().map(|r| r.name).collect();
    assert_eq!(after, before);
}

#[tokio::test]
async fn test_add_rule_rejects_duplicates_and_invalid_rules() {
    let (engine, _) = default_engine();

    assert!(matches!(
        engine.add_rule(cpu_rule("High CPU Usage", 1, 10)).await,
        Err(RemediationError::DuplicateRule { .. })
    ));
    assert!(matches!(
        engine
            .add_rule(RemediationRule::new("no-actions", vec![], 1, 10))
            .await,
        Err(RemediationError::InvalidRule { .. })
    ));
    assert!(!engine.remove_rule("never-added").await);
}

// ============================================================================
// End-to-end scenarios
// ============================================================================

#[tokio::test]
async fn test_critical_failure_fires_shutdown_then_alert() {
    let (engine, executor) = default_engine();
    let metrics = MetricsSnapshot::from_pairs([("cpu_percent", 96.0), ("memory_percent", 96.0)]);

    let results = engine.process(&metrics, Some(&anomaly())).await;

    assert_eq!(results[0].rule_name, "Critical System Failure");
    assert_eq!(results[0].action, RemediationAction::EmergencyShutdown);
    assert_eq!(results[1].rule_name, "Critical System Failure");
    assert_eq!(results[1].action, RemediationAction::SendAlert);
    assert_eq!(results[0].context.get("ml_anomaly_score"), Some(&0.95));

    assert_eq!(
        executor.calls()[..2].to_vec(),
        vec![
            ("Critical System Failure".to_string(), RemediationAction::EmergencyShutdown),
            ("Critical System Failure".to_string(), RemediationAction::SendAlert),
        ]
    );
}

#[tokio::test]
async fn test_healthy_metrics_trigger_nothing() {
    let (engine, executor) = default_engine();
    let metrics = MetricsSnapshot::from_pairs([("cpu_percent", 50.0), ("memory_percent", 50.0)]);

    let results = engine.process(&metrics, None).await;

    assert!(results.is_empty());
    assert!(executor.calls().is_empty());
    assert_eq!(engine.action_history(100).await.len(), 0);
}

#[tokio::test]
async fn test_cooldown_suppresses_then_releases() {
    let (engine, _) = engine_with(vec![cpu_rule("cpu", 1, 5)]);
    let metrics = MetricsSnapshot::from_pairs([("cpu_percent", 90.0)]);
    let t = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();

    assert_eq!(engine.process_at(&metrics, None, t).await.len(), 1);
    assert!(engine
        .process_at(&metrics, None, t + Duration::minutes(2))
        .await
        .is_empty());
    assert_eq!(
        engine
            .process_at(&metrics, None, t + Duration::minutes(6))
            .await
            .len(),
        1
    );

    assert_eq!(engine.get_rule("cpu").await.unwrap().trigger_count, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_process_fires_cooldown_rule_once() {
    let (engine, executor) = engine_with(vec![cpu_rule("cpu", 1, 30)]);
    let engine = Arc::new(engine);

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                let metrics = MetricsSnapshot::from_pairs([("cpu_percent", 95.0)]);
                engine.process(&metrics, None).await.len()
            })
        })
        .collect();

    let mut total = 0;
    for task in tasks {
        total += task.await.unwrap();
    }

    assert_eq!(total, 1);
    assert_eq!(executor.calls().len(), 1);
    assert_eq!(engine.action_history(100).await.len(), 1);
    assert_eq!(engine.get_rule("cpu").await.unwrap().trigger_count, 1);
}
