//! Auto-remediation control loop.
//!
//! ```text
//! MetricsSource ──▶ MonitoringLoop ──▶ Classifier
//!                         │
//!                         ▼
//!                 RemediationEngine ──▶ ActionExecutor
//!                         │
//!                   RuleCatalog + history
//! ```
//!
//! The engine decides which rules fire for one snapshot. The loop drives the
//! engine on a schedule, absorbs collaborator failures and keeps a bounded
//! buffer of recent cycles. Collaborators are reached only through the
//! traits in [`ports`].

pub mod buffer;
pub mod catalog;
pub mod classifier;
pub mod engine;
pub mod executor;
pub mod monitor;
pub mod ports;
pub mod source;
pub mod types;

pub use buffer::{SnapshotBuffer, SnapshotRecord};
pub use catalog::{default_rules, RuleCatalog, RuleSpec};
pub use classifier::{HeuristicClassifier, HttpClassifier};
pub use engine::{EngineStatus, RemediationEngine};
pub use executor::{DryRunExecutor, WebhookExecutor};
pub use monitor::{CycleReport, LoopState, MonitorStatus, MonitoringLoop};
pub use ports::{ActionExecutor, Classifier, MetricsSource};
pub use source::SystemMetricsSource;
pub use types::{
    ActionContext, ActionResult, ConditionCheck, ConditionOperator, MetricsSnapshot, Prediction,
    RemediationAction, RemediationRule, RuleCondition, ML_ANOMALY_SCORE, ML_CONFIDENCE,
};
