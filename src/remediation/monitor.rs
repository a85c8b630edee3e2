//! Monitoring loop for the remediation system.
//!
//! A background task that periodically samples metrics, asks the classifier
//! for a prediction, feeds both to the [`RemediationEngine`] and keeps a
//! bounded history of recent cycles.
//!
//! # Lifecycle
//!
//! ```text
//! Stopped ──start()──▶ Running ──stop()──▶ Stopping ──▶ Stopped
//! ```
//!
//! Stopping is cooperative: the task checks a watch channel between cycles
//! and while sleeping, so an evaluation already in progress always runs to
//! completion. `stop()` waits a bounded time for the task. Past that bound
//! it waits for any in-flight cycle to release the cycle lock and only then
//! aborts the task, so a cycle is never cut off half way.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::buffer::{SnapshotBuffer, SnapshotRecord};
use super::engine::RemediationEngine;
use super::ports::{Classifier, MetricsSource};
use super::types::{ActionResult, MetricsSnapshot, Prediction};
use crate::config::{ConfigUpdate, MonitorConfig};
use crate::error::{ClassifierError, RemediationResult, SourceError};

// ============================================================================
// Loop State
// ============================================================================

/// Lifecycle state of the monitoring loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    /// No background task
    Stopped,
    /// Background task sampling on schedule
    Running,
    /// Stop requested, waiting for the task to exit
    Stopping,
}

impl LoopState {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            LoopState::Stopped => "stopped",
            LoopState::Running => "running",
            LoopState::Stopping => "stopping",
        }
    }
}

impl std::fmt::Display for LoopState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Read-only view of the loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorStatus {
    /// Lifecycle state
    pub state: LoopState,
    /// Active configuration
    pub config: MonitorConfig,
    /// Cycles completed since creation
    pub cycles_completed: u64,
    /// Cycles that ran on fallback metrics
    pub degraded_cycles: u64,
    /// When the last cycle completed
    pub last_cycle_at: Option<DateTime<Utc>>,
    /// Records currently in the ring buffer
    pub buffered_snapshots: usize,
}

/// Outcome of one monitoring cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    /// What was pushed onto the ring buffer
    pub record: SnapshotRecord,
    /// Action results the engine produced
    pub results: Vec<ActionResult>,
}

#[derive(Debug, Default)]
struct LoopStats {
    cycles_completed: u64,
    degraded_cycles: u64,
    last_cycle_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Shared Loop Internals
// ============================================================================

/// State shared between the handle and the background task.
struct LoopShared {
    engine: Arc<RemediationEngine>,
    classifier: Arc<dyn Classifier>,
    source: Arc<dyn MetricsSource>,
    state: RwLock<LoopState>,
    config: RwLock<MonitorConfig>,
    buffer: RwLock<SnapshotBuffer>,
    stats: RwLock<LoopStats>,
    last_good: RwLock<Option<MetricsSnapshot>>,
    /// Held for the whole of a cycle
    cycle: Mutex<()>,
}

impl LoopShared {
    async fn run_cycle(&self) -> CycleReport {
        let _cycle = self.cycle.lock().await;
        let config = self.config.read().await.clone();

        let (metrics, degraded) = self.acquire_metrics(&config).await;
        let prediction = self.acquire_prediction(&metrics, &config).await;

        let results = self.engine.process(&metrics, prediction.as_ref()).await;
        self.engine
            .trim_history(self.engine.config().history_retention)
            .await;

        let record = SnapshotRecord {
            metrics,
            prediction,
            timestamp: Utc::now(),
            degraded,
            actions_triggered: results.len(),
        };
        self.buffer.write().await.push(record.clone());

        {
            let mut stats = self.stats.write().await;
            stats.cycles_completed += 1;
            if degraded {
                stats.degraded_cycles += 1;
            }
            stats.last_cycle_at = Some(record.timestamp);
        }

        debug!(
            degraded = degraded,
            has_prediction = record.prediction.is_some(),
            actions = results.len(),
            "Monitoring cycle complete"
        );

        CycleReport { record, results }
    }

    /// Sample metrics, falling back to the last good snapshot (re-stamped)
    /// or an empty one.
    async fn acquire_metrics(&self, config: &MonitorConfig) -> (MetricsSnapshot, bool) {
        let sampled = match tokio::time::timeout(config.sample_timeout(), self.source.sample()).await
        {
            Ok(result) => result,
            Err(_) => Err(SourceError::Timeout {
                timeout_ms: config.sample_timeout_ms,
            }),
        };

        match sampled {
            Ok(snapshot) => {
                *self.last_good.write().await = Some(snapshot.clone());
                (snapshot, false)
            }
            Err(e) => {
                warn!(error = %e, "Metrics unavailable, using fallback snapshot");
                (self.fallback_snapshot().await, true)
            }
        }
    }

    async fn fallback_snapshot(&self) -> MetricsSnapshot {
        match self.last_good.read().await.as_ref() {
            Some(last) => MetricsSnapshot::new(last.metrics.clone()),
            None => MetricsSnapshot::empty(),
        }
    }

    /// Classify `metrics`, discarding failures and low-confidence results.
    async fn acquire_prediction(
        &self,
        metrics: &MetricsSnapshot,
        config: &MonitorConfig,
    ) -> Option<Prediction> {
        let classified = match tokio::time::timeout(
            config.sample_timeout(),
            self.classifier.classify(metrics),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ClassifierError::Timeout {
                timeout_ms: config.sample_timeout_ms,
            }),
        };

        let prediction = match classified {
            Ok(prediction) => prediction,
            Err(e) => {
                warn!(error = %e, "Classifier unavailable, continuing without prediction");
                return None;
            }
        };

        if !prediction.is_confident(config.confidence_threshold) {
            debug!(
                confidence = prediction.confidence,
                threshold = config.confidence_threshold,
                "Discarding low-confidence prediction"
            );
            return None;
        }

        Some(prediction)
    }
}

async fn run_loop(shared: Arc<LoopShared>, mut stop_rx: watch::Receiver<bool>) {
    info!("Monitoring loop started");

    loop {
        if *stop_rx.borrow() {
            break;
        }

        shared.run_cycle().await;

        let interval = shared.config.read().await.interval();
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = stop_rx.changed() => break,
        }
    }

    info!("Monitoring loop exiting");
}

// ============================================================================
// Monitoring Loop
// ============================================================================

#[derive(Default)]
struct LoopControl {
    task: Option<JoinHandle<()>>,
    stop_tx: Option<watch::Sender<bool>>,
}

/// Handle to the background monitoring task.
///
/// # Example
///
/// ```rust,ignore
/// let monitor = MonitoringLoop::new(engine, classifier, source, config.monitor.clone());
/// monitor.start().await;
/// // ...
/// let recent = monitor.recent(10).await;
/// monitor.stop().await;
/// ```
pub struct MonitoringLoop {
    shared: Arc<LoopShared>,
    control: Mutex<LoopControl>,
}

impl MonitoringLoop {
    /// Create a stopped loop.
    pub fn new(
        engine: Arc<RemediationEngine>,
        classifier: Arc<dyn Classifier>,
        source: Arc<dyn MetricsSource>,
        config: MonitorConfig,
    ) -> Self {
        info!(
            interval_secs = config.monitoring_interval_secs,
            confidence_threshold = config.confidence_threshold,
            buffer_capacity = config.buffer_capacity,
            "Initializing MonitoringLoop"
        );

        let shared = LoopShared {
            engine,
            classifier,
            source,
            state: RwLock::new(LoopState::Stopped),
            buffer: RwLock::new(SnapshotBuffer::new(config.buffer_capacity)),
            config: RwLock::new(config),
            stats: RwLock::new(LoopStats::default()),
            last_good: RwLock::new(None),
            cycle: Mutex::new(()),
        };

        Self {
            shared: Arc::new(shared),
            control: Mutex::new(LoopControl::default()),
        }
    }

    /// The engine this loop drives.
    pub fn engine(&self) -> &Arc<RemediationEngine> {
        &self.shared.engine
    }

    /// Spawn the background task. Returns false if the loop is not stopped.
    pub async fn start(&self) -> bool {
        let mut control = self.control.lock().await;
        let mut state = self.shared.state.write().await;

        if *state != LoopState::Stopped {
            warn!(state = %*state, "Monitoring loop already running, ignoring start");
            return false;
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        control.task = Some(tokio::spawn(run_loop(Arc::clone(&self.shared), stop_rx)));
        control.stop_tx = Some(stop_tx);
        *state = LoopState::Running;

        info!("Monitoring loop running");
        true
    }

    /// Signal the background task to exit and wait for it.
    ///
    /// A cycle that is already running always completes, even when that
    /// takes longer than `stop_timeout`. Returns false if the loop was not
    /// running.
    pub async fn stop(&self) -> bool {
        let mut control = self.control.lock().await;
        let Some(mut handle) = control.task.take() else {
            debug!("Monitoring loop not running, ignoring stop");
            return false;
        };

        *self.shared.state.write().await = LoopState::Stopping;
        if let Some(stop_tx) = control.stop_tx.take() {
            let _ = stop_tx.send(true);
        }

        let timeout = self.shared.config.read().await.stop_timeout();
        match tokio::time::timeout(timeout, &mut handle).await {
            Ok(Ok(())) => info!("Monitoring loop stopped"),
            Ok(Err(e)) => warn!(error = %e, "Monitoring task ended abnormally"),
            Err(_) => {
                warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    "Monitoring loop did not stop in time, waiting for in-flight cycle"
                );
                let _cycle = self.shared.cycle.lock().await;
                handle.abort();
                let _ = (&mut handle).await;
                info!("Monitoring loop aborted between cycles");
            }
        }

        *self.shared.state.write().await = LoopState::Stopped;
        true
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> LoopState {
        *self.shared.state.read().await
    }

    /// Run one cycle immediately, outside the schedule.
    pub async fn run_cycle(&self) -> CycleReport {
        self.shared.run_cycle().await
    }

    /// Current loop status.
    pub async fn status(&self) -> MonitorStatus {
        let state = *self.shared.state.read().await;
        let config = self.shared.config.read().await.clone();
        let buffered_snapshots = self.shared.buffer.read().await.len();
        let stats = self.shared.stats.read().await;

        MonitorStatus {
            state,
            config,
            cycles_completed: stats.cycles_completed,
            degraded_cycles: stats.degraded_cycles,
            last_cycle_at: stats.last_cycle_at,
            buffered_snapshots,
        }
    }

    /// Active configuration.
    pub async fn config(&self) -> MonitorConfig {
        self.shared.config.read().await.clone()
    }

    /// The most recent `limit` snapshot records, oldest first.
    pub async fn recent(&self, limit: usize) -> Vec<SnapshotRecord> {
        self.shared.buffer.read().await.recent(limit)
    }

    /// Apply a partial configuration update.
    ///
    /// The update is validated as a whole; on error the previous
    /// configuration stays in place. Shrinking the buffer capacity drops
    /// the oldest records immediately.
    pub async fn update_config(&self, update: ConfigUpdate) -> RemediationResult<MonitorConfig> {
        let mut config = self.shared.config.write().await;
        let next = config.apply(&update)?;

        if next.buffer_capacity != config.buffer_capacity {
            let dropped = self
                .shared
                .buffer
                .write()
                .await
                .resize(next.buffer_capacity);
            if dropped > 0 {
                debug!(dropped = dropped, "Snapshot buffer trimmed");
            }
        }

        *config = next.clone();
        info!(
            interval_secs = next.monitoring_interval_secs,
            confidence_threshold = next.confidence_threshold,
            buffer_capacity = next.buffer_capacity,
            "Monitoring configuration updated"
        );
        Ok(next)
    }

    /// Evaluate caller-supplied metrics right away.
    ///
    /// A prediction is requested on demand and filtered by the confidence
    /// threshold like a scheduled cycle. The ring buffer is not touched.
    pub async fn manual_trigger(&self, metrics: MetricsSnapshot) -> Vec<ActionResult> {
        let config = self.shared.config.read().await.clone();
        let prediction = self.shared.acquire_prediction(&metrics, &config).await;

        info!(
            metrics = metrics.metrics.len(),
            has_prediction = prediction.is_some(),
            "Manual trigger"
        );

        self.shared
            .engine
            .process(&metrics, prediction.as_ref())
            .await
    }
}

impl Drop for MonitoringLoop {
    fn drop(&mut self) {
        if let Some(task) = self.control.get_mut().task.take() {
            task.abort();
        }
    }
}
