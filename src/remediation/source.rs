//! Host metrics source backed by `sysinfo`.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sysinfo::{Disks, System};
use tracing::debug;

use super::ports::MetricsSource;
use super::types::MetricsSnapshot;
use crate::error::{SourceError, SourceResult};

/// Samples CPU, memory, swap, disk and load figures from the local host.
///
/// Emits `cpu_percent`, `memory_percent`, `swap_percent`, `disk_percent`
/// (fullest mounted disk) and `load_avg_1m`. Metrics the host cannot report
/// are left out of the snapshot rather than zeroed.
#[derive(Clone)]
pub struct SystemMetricsSource {
    system: Arc<Mutex<System>>,
}

impl Default for SystemMetricsSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemMetricsSource {
    /// Create a source and prime the CPU counters.
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_usage();
        system.refresh_memory();
        Self {
            system: Arc::new(Mutex::new(system)),
        }
    }

    fn collect(system: &mut System) -> BTreeMap<String, f64> {
        system.refresh_cpu_usage();
        system.refresh_memory();

        let mut metrics = BTreeMap::new();
        metrics.insert(
            "cpu_percent".to_string(),
            f64::from(system.global_cpu_usage()),
        );

        if let Some(pct) = percent(system.used_memory(), system.total_memory()) {
            metrics.insert("memory_percent".to_string(), pct);
        }
        if let Some(pct) = percent(system.used_swap(), system.total_swap()) {
            metrics.insert("swap_percent".to_string(), pct);
        }

        let disks = Disks::new_with_refreshed_list();
        let fullest = disks
            .list()
            .iter()
            .filter_map(|d| {
                percent(
                    d.total_space().saturating_sub(d.available_space()),
                    d.total_space(),
                )
            })
            .fold(None, |acc: Option<f64>, pct| Some(acc.map_or(pct, |a| a.max(pct))));
        if let Some(pct) = fullest {
            metrics.insert("disk_percent".to_string(), pct);
        }

        metrics.insert("load_avg_1m".to_string(), System::load_average().one);
        metrics
    }
}

fn percent(used: u64, total: u64) -> Option<f64> {
    if total == 0 {
        None
    } else {
        Some(used as f64 / total as f64 * 100.0)
    }
}

#[async_trait]
impl MetricsSource for SystemMetricsSource {
    async fn sample(&self) -> SourceResult<MetricsSnapshot> {
        let system = Arc::clone(&self.system);

        let metrics = tokio::task::spawn_blocking(move || {
            let mut guard = system.lock().map_err(|_| SourceError::Sample {
                message: "system handle poisoned".to_string(),
            })?;
            Ok::<_, SourceError>(Self::collect(&mut guard))
        })
        .await
        .map_err(|e| SourceError::Sample {
            message: e.to_string(),
        })??;

        debug!(metrics = metrics.len(), "Sampled host metrics");
        Ok(MetricsSnapshot::new(metrics))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_handles_zero_total() {
        assert_eq!(percent(10, 0), None);
        assert_eq!(percent(50, 200), Some(25.0));
    }

    #[tokio::test]
    async fn test_sample_reports_cpu() {
        let source = SystemMetricsSource::new();
        let snapshot = source.sample().await.unwrap();
        let cpu = snapshot.get("cpu_percent").unwrap();
        assert!((0.0..=100.0).contains(&cpu));
    }
}
