use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, RemediationError, RemediationResult};

/// Smallest sampling interval the monitoring loop accepts.
pub const MIN_MONITORING_INTERVAL_SECS: u64 = 5;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub logging: LoggingConfig,
    pub request: RequestConfig,
    pub monitor: MonitorConfig,
    pub engine: EngineConfig,
    pub classifier: ClassifierConfig,
    pub executor: ExecutorConfig,
    pub rules: RuleDefaults,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// HTTP request configuration for the classifier and webhook adapters
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

/// Monitoring loop configuration.
///
/// `monitoring_interval_secs`, `confidence_threshold` and `buffer_capacity`
/// can be changed at runtime through `MonitoringLoop::update_config`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Seconds between sampling cycles (>= 5)
    pub monitoring_interval_secs: u64,
    /// Predictions below this confidence are discarded (0.0 - 1.0)
    pub confidence_threshold: f64,
    /// Capacity of the recent-snapshot ring buffer (>= 1)
    pub buffer_capacity: usize,
    /// Start the loop together with the server
    pub autostart: bool,
    /// Bound on a single metrics sample or classification call
    pub sample_timeout_ms: u64,
    /// Bound on waiting for the background task during stop
    pub stop_timeout_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            monitoring_interval_secs: 30,
            confidence_threshold: 0.7,
            buffer_capacity: 100,
            autostart: true,
            sample_timeout_ms: 5000,
            stop_timeout_ms: 10000,
        }
    }
}

impl MonitorConfig {
    /// Check the runtime-tunable fields against their allowed ranges.
    pub fn validate(&self) -> RemediationResult<()> {
        validate_interval(self.monitoring_interval_secs)?;
        validate_confidence(self.confidence_threshold)?;
        validate_capacity(self.buffer_capacity)?;
        Ok(())
    }

    /// Sampling interval as Duration.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.monitoring_interval_secs)
    }

    /// Sample/classify timeout as Duration.
    pub fn sample_timeout(&self) -> Duration {
        Duration::from_millis(self.sample_timeout_ms)
    }

    /// Stop timeout as Duration.
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    /// Apply a partial update, returning the new configuration.
    ///
    /// Every supplied field is validated before anything is applied, so a
    /// rejected update leaves `self` untouched.
    pub fn apply(&self, update: &ConfigUpdate) -> RemediationResult<MonitorConfig> {
        if let Some(interval) = update.monitoring_interval {
            validate_interval(interval)?;
        }
        if let Some(threshold) = update.confidence_threshold {
            validate_confidence(threshold)?;
        }
        if let Some(capacity) = update.buffer_capacity {
            validate_capacity(capacity)?;
        }

        let mut next = self.clone();
        if let Some(interval) = update.monitoring_interval {
            next.monitoring_interval_secs = interval;
        }
        if let Some(threshold) = update.confidence_threshold {
            next.confidence_threshold = threshold;
        }
        if let Some(capacity) = update.buffer_capacity {
            next.buffer_capacity = capacity;
        }
        Ok(next)
    }
}

/// Partial monitoring configuration supplied at runtime.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigUpdate {
    /// New sampling interval in seconds
    #[serde(default)]
    pub monitoring_interval: Option<u64>,
    /// New confidence threshold
    #[serde(default)]
    pub confidence_threshold: Option<f64>,
    /// New ring buffer capacity
    #[serde(default)]
    pub buffer_capacity: Option<usize>,
}

impl ConfigUpdate {
    /// Whether the update changes nothing.
    pub fn is_empty(&self) -> bool {
        self.monitoring_interval.is_none()
            && self.confidence_threshold.is_none()
            && self.buffer_capacity.is_none()
    }
}

fn validate_interval(secs: u64) -> RemediationResult<()> {
    if secs < MIN_MONITORING_INTERVAL_SECS {
        return Err(RemediationError::InvalidConfig {
            field: "monitoring_interval".to_string(),
            reason: format!(
                "must be at least {} seconds, got {}",
                MIN_MONITORING_INTERVAL_SECS, secs
            ),
        });
    }
    Ok(())
}

fn validate_confidence(threshold: f64) -> RemediationResult<()> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(RemediationError::InvalidConfig {
            field: "confidence_threshold".to_string(),
            reason: format!("must be between 0 and 1, got {}", threshold),
        });
    }
    Ok(())
}

fn validate_capacity(capacity: usize) -> RemediationResult<()> {
    if capacity == 0 {
        return Err(RemediationError::InvalidConfig {
            field: "buffer_capacity".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }
    Ok(())
}

/// Remediation engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Initial value of the engine-wide enable flag
    pub enabled: bool,
    /// Bound on a single action executor call
    pub action_timeout_ms: u64,
    /// History entries kept by the monitoring loop's trim pass
    pub history_retention: usize,
    /// Number of entries reported as `recent_actions` in status
    pub recent_actions_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            action_timeout_ms: 30000,
            history_retention: 1000,
            recent_actions_limit: 10,
        }
    }
}

impl EngineConfig {
    /// Action timeout as Duration.
    pub fn action_timeout(&self) -> Duration {
        Duration::from_millis(self.action_timeout_ms)
    }
}

/// Classifier adapter configuration
#[derive(Debug, Clone, Default)]
pub struct ClassifierConfig {
    /// Endpoint of the anomaly classification service; `None` selects the
    /// local heuristic classifier.
    pub url: Option<String>,
    pub api_key: Option<String>,
}

/// Action executor adapter configuration
#[derive(Debug, Clone, Default)]
pub struct ExecutorConfig {
    /// Base URL receiving action webhooks; `None` selects the dry-run executor.
    pub webhook_url: Option<String>,
}

/// Defaults applied to added rules that omit priority or cooldown.
#[derive(Debug, Clone, Serialize)]
pub struct RuleDefaults {
    pub default_priority: u32,
    pub default_cooldown_minutes: u32,
}

impl Default for RuleDefaults {
    fn default() -> Self {
        Self {
            default_priority: 5,
            default_cooldown_minutes: 15,
        }
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 1000,
            max_retries: 2,
            retry_delay_ms: 250,
        }
    }
}

impl RequestConfig {
    /// Delay before retry `retry` (1-based): `retry_delay_ms * 2^(retry - 1)`.
    ///
    /// Saturates instead of overflowing for large retry counts.
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let factor = 2_u64
            .checked_pow(retry.saturating_sub(1))
            .unwrap_or(u64::MAX);
        Duration::from_millis(self.retry_delay_ms.saturating_mul(factor))
    }

    /// Longest a retried request can take: every attempt timing out plus
    /// every backoff delay.
    pub fn worst_case(&self) -> Duration {
        let attempts = u64::from(self.max_retries).saturating_add(1);
        // Sum of the backoff series is retry_delay_ms * (2^max_retries - 1)
        let backoff_factor = 2_u64
            .checked_pow(self.max_retries)
            .map(|f| f - 1)
            .unwrap_or(u64::MAX);

        let total_ms = self
            .timeout_ms
            .saturating_mul(attempts)
            .saturating_add(self.retry_delay_ms.saturating_mul(backoff_factor));
        Duration::from_millis(total_ms)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            request: RequestConfig::default(),
            monitor: MonitorConfig::default(),
            engine: EngineConfig::default(),
            classifier: ClassifierConfig::default(),
            executor: ExecutorConfig::default(),
            rules: RuleDefaults::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let request = RequestConfig {
            timeout_ms: env_or("REQUEST_TIMEOUT_MS", 1000),
            max_retries: env_or("MAX_RETRIES", 2),
            retry_delay_ms: env_or("RETRY_DELAY_MS", 250),
        };

        let monitor = MonitorConfig {
            monitoring_interval_secs: env_or("MONITORING_INTERVAL_SECS", 30),
            confidence_threshold: env_or("CONFIDENCE_THRESHOLD", 0.7),
            buffer_capacity: env_or("BUFFER_CAPACITY", 100),
            autostart: env::var("MONITOR_AUTOSTART")
                .map(|v| v.to_lowercase() != "false")
                .unwrap_or(true),
            sample_timeout_ms: env_or("SAMPLE_TIMEOUT_MS", 5000),
            stop_timeout_ms: env_or("STOP_TIMEOUT_MS", 10000),
        };
        monitor.validate().map_err(|e| AppError::Config {
            message: e.to_string(),
        })?;

        let engine = EngineConfig {
            enabled: env::var("REMEDIATION_ENABLED")
                .map(|v| v.to_lowercase() != "false")
                .unwrap_or(true),
            action_timeout_ms: env_or("ACTION_TIMEOUT_MS", 30000),
            history_retention: env_or("HISTORY_RETENTION", 1000),
            recent_actions_limit: env_or("RECENT_ACTIONS_LIMIT", 10),
        };

        let classifier = ClassifierConfig {
            url: non_empty_var("CLASSIFIER_URL"),
            api_key: non_empty_var("CLASSIFIER_API_KEY"),
        };

        let executor = ExecutorConfig {
            webhook_url: non_empty_var("ACTION_WEBHOOK_URL"),
        };

        let rules = RuleDefaults {
            default_priority: env_or("DEFAULT_RULE_PRIORITY", 5),
            default_cooldown_minutes: env_or("DEFAULT_RULE_COOLDOWN_MINUTES", 15),
        };

        Ok(Config {
            logging,
            request,
            monitor,
            engine,
            classifier,
            executor,
            rules,
        })
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}
