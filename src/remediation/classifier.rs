//! Classifier adapters.
//!
//! [`HttpClassifier`] calls an external anomaly-detection service.
//! [`HeuristicClassifier`] is the local stand-in used when no service is
//! configured.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, warn};

use super::ports::Classifier;
use super::types::{MetricsSnapshot, Prediction};
use crate::config::{ClassifierConfig, RequestConfig};
use crate::error::{ClassifierError, ClassifierResult};

// ============================================================================
// HTTP Classifier
// ============================================================================

#[derive(Debug, Serialize)]
struct ClassifyRequest<'a> {
    metrics: &'a std::collections::BTreeMap<String, f64>,
    timestamp: chrono::DateTime<chrono::Utc>,
}

/// Client for an external anomaly classification service.
///
/// POSTs the snapshot to the configured URL and expects a [`Prediction`]
/// JSON body. Transport errors and 5xx responses are retried with
/// exponential backoff; 4xx responses are not.
#[derive(Clone)]
pub struct HttpClassifier {
    client: Client,
    url: String,
    api_key: Option<String>,
    request_config: RequestConfig,
}

impl HttpClassifier {
    /// Create a new HTTP classifier.
    pub fn new(url: &str, config: &ClassifierConfig, request_config: RequestConfig) -> ClassifierResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(ClassifierError::Http)?;

        Ok(Self {
            client,
            url: url.to_string(),
            api_key: config.api_key.clone(),
            request_config,
        })
    }

    async fn execute_request(&self, snapshot: &MetricsSnapshot) -> ClassifierResult<Prediction> {
        let body = ClassifyRequest {
            metrics: &snapshot.metrics,
            timestamp: snapshot.timestamp,
        };

        let mut request = self.client.post(&self.url).json(&body);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ClassifierError::Timeout {
                    timeout_ms: self.request_config.timeout_ms,
                }
            } else {
                ClassifierError::Http(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ClassifierError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let prediction: Prediction =
            response
                .json()
                .await
                .map_err(|e| ClassifierError::InvalidResponse {
                    message: e.to_string(),
                })?;

        prediction
            .validate()
            .map_err(|message| ClassifierError::InvalidResponse { message })?;

        Ok(prediction)
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify(&self, metrics: &MetricsSnapshot) -> ClassifierResult<Prediction> {
        let mut last_error = None;
        let mut retries = 0;

        while retries <= self.request_config.max_retries {
            if retries > 0 {
                let delay = self.request_config.backoff_delay(retries);
                warn!(
                    retry = retries,
                    delay_ms = delay.as_millis(),
                    "Retrying classifier request"
                );
                tokio::time::sleep(delay).await;
            }

            let start = Instant::now();

            match self.execute_request(metrics).await {
                Ok(prediction) => {
                    debug!(
                        anomaly_score = prediction.anomaly_score,
                        confidence = prediction.confidence,
                        latency_ms = start.elapsed().as_millis() as u64,
                        "Classifier responded"
                    );
                    return Ok(prediction);
                }
                Err(e @ ClassifierError::Api { status, .. }) if status < 500 => {
                    return Err(e);
                }
                Err(e @ ClassifierError::InvalidResponse { .. }) => {
                    return Err(e);
                }
                Err(e) => {
                    warn!(error = %e, retry = retries, "Classifier request failed");
                    last_error = Some(e);
                    retries += 1;
                }
            }
        }

        Err(ClassifierError::Unavailable {
            message: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string()),
            retries: self.request_config.max_retries,
        })
    }
}

// ============================================================================
// Heuristic Classifier
// ============================================================================

/// Utilization metrics the heuristic looks at.
const HEURISTIC_SIGNALS: [&str; 3] = ["cpu_percent", "memory_percent", "disk_percent"];

/// Local classifier scoring a snapshot by its hottest utilization metric.
///
/// The score is the highest of the observed percentages scaled to 0-1.
/// Confidence grows with the number of signals present, so a snapshot with
/// only one signal never clears the default 0.7 threshold.
#[derive(Debug, Clone)]
pub struct HeuristicClassifier {
    anomaly_cutoff: f64,
}

impl Default for HeuristicClassifier {
    fn default() -> Self {
        Self {
            anomaly_cutoff: 0.9,
        }
    }
}

impl HeuristicClassifier {
    /// Create a heuristic classifier flagging scores above `anomaly_cutoff`.
    pub fn new(anomaly_cutoff: f64) -> Self {
        Self { anomaly_cutoff }
    }

    /// Score a snapshot without going through the async port.
    pub fn score(&self, metrics: &MetricsSnapshot) -> Option<Prediction> {
        let observed: Vec<f64> = HEURISTIC_SIGNALS
            .iter()
            .filter_map(|name| metrics.get(name))
            .filter(|v| v.is_finite())
            .collect();

        if observed.is_empty() {
            return None;
        }

        let hottest = observed.iter().cloned().fold(f64::MIN, f64::max);
        let anomaly_score = (hottest / 100.0).clamp(0.0, 1.0);
        let confidence = 0.4 + 0.2 * observed.len() as f64;

        Some(Prediction {
            anomaly_score,
            confidence: confidence.min(1.0),
            is_anomaly: anomaly_score > self.anomaly_cutoff,
        })
    }
}

#[async_trait]
impl Classifier for HeuristicClassifier {
    async fn classify(&self, metrics: &MetricsSnapshot) -> ClassifierResult<Prediction> {
        self.score(metrics)
            .ok_or_else(|| ClassifierError::InvalidResponse {
                message: "no utilization metrics to score".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heuristic_scores_hottest_signal() {
        let classifier = HeuristicClassifier::default();
        let snapshot = MetricsSnapshot::from_pairs([
            ("cpu_percent", 40.0),
            ("memory_percent", 96.0),
            ("disk_percent", 20.0),
        ]);

        let prediction = classifier.score(&snapshot).unwrap();
        assert!((prediction.anomaly_score - 0.96).abs() < 1e-9);
        assert!((prediction.confidence - 1.0).abs() < 1e-9);
        assert!(prediction.is_anomaly);
    }

    #[test]
    fn test_heuristic_confidence_tracks_signal_count() {
        let classifier = HeuristicClassifier::default();
        let snapshot = MetricsSnapshot::from_pairs([("cpu_percent", 99.0)]);

        let prediction = classifier.score(&snapshot).unwrap();
        assert!(prediction.confidence < 0.7);
    }

    #[tokio::test]
    async fn test_heuristic_without_signals_fails() {
        let classifier = HeuristicClassifier::default();
        let snapshot = MetricsSnapshot::from_pairs([("queue_depth", 10.0)]);
        assert!(classifier.classify(&snapshot).await.is_err());
    }
}
