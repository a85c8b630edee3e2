use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Remediation error: {0}")]
    Remediation(#[from] RemediationError),

    #[error("Classifier error: {0}")]
    Classifier(#[from] ClassifierError),

    #[error("Executor error: {0}")]
    Executor(#[from] ExecutorError),

    #[error("MCP protocol error: {0}")]
    Mcp(#[from] McpError),
}

/// Errors raised by the remediation engine and monitoring loop.
///
/// Collaborator failures never surface here; they are absorbed into
/// `ActionResult`s, dropped predictions, or fallback snapshots.
#[derive(Debug, Error)]
pub enum RemediationError {
    #[error("Rule already exists: {name}")]
    DuplicateRule { name: String },

    #[error("Invalid rule '{name}': {reason}")]
    InvalidRule { name: String, reason: String },

    #[error("Rule not found: {name}")]
    RuleNotFound { name: String },

    #[error("Invalid configuration for {field}: {reason}")]
    InvalidConfig { field: String, reason: String },
}

/// Classifier port errors
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("Classifier unavailable: {message} (retries: {retries})")]
    Unavailable { message: String, retries: u32 },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Classification timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Action executor port errors
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Action {action} failed: {message}")]
    Failed { action: String, message: String },

    #[error("Action {action} timed out after {timeout_ms}ms")]
    Timeout { action: String, timeout_ms: u64 },

    #[error("Action {action} handler panicked")]
    Panicked { action: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Metrics source errors
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Metrics sampling failed: {message}")]
    Sample { message: String },

    #[error("Metrics sampling timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

/// MCP protocol errors
#[derive(Debug, Error)]
pub enum McpError {
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Unknown tool: {tool_name}")]
    UnknownTool { tool_name: String },

    #[error("Invalid parameters for {tool_name}: {message}")]
    InvalidParameters { tool_name: String, message: String },

    #[error("Tool execution failed: {message}")]
    ExecutionFailed { message: String },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<RemediationError> for McpError {
    fn from(err: RemediationError) -> Self {
        McpError::ExecutionFailed {
            message: err.to_string(),
        }
    }
}

impl From<AppError> for McpError {
    fn from(err: AppError) -> Self {
        McpError::ExecutionFailed {
            message: err.to_string(),
        }
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for engine and loop operations
pub type RemediationResult<T> = Result<T, RemediationError>;

/// Result type alias for classifier calls
pub type ClassifierResult<T> = Result<T, ClassifierError>;

/// Result type alias for action executor calls
pub type ExecutorResult<T> = Result<T, ExecutorError>;

/// Result type alias for metrics sampling
pub type SourceResult<T> = Result<T, SourceError>;

/// Result type alias for MCP operations
pub type McpResult<T> = Result<T, McpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_display() {
        let err = AppError::Config {
            message: "bad interval".to_string(),
        };
        assert_eq!(err.to_string(), "Configuration error: bad interval");
    }

    #[test]
    fn test_remediation_error_display() {
        let err = RemediationError::DuplicateRule {
            name: "High CPU Usage".to_string(),
        };
        assert_eq!(err.to_string(), "Rule already exists: High CPU Usage");

        let err = RemediationError::InvalidRule {
            name: "empty".to_string(),
            reason: "actions must not be empty".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid rule 'empty': actions must not be empty"
        );

        let err = RemediationError::InvalidConfig {
            field: "monitoring_interval".to_string(),
            reason: "must be at least 5 seconds".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid configuration for monitoring_interval: must be at least 5 seconds"
        );
    }

    #[test]
    fn test_classifier_error_display() {
        let err = ClassifierError::Unavailable {
            message: "connection refused".to_string(),
            retries: 2,
        };
        assert_eq!(
            err.to_string(),
            "Classifier unavailable: connection refused (retries: 2)"
        );

        let err = ClassifierError::Timeout { timeout_ms: 5000 };
        assert_eq!(err.to_string(), "Classification timeout after 5000ms");
    }

    #[test]
    fn test_executor_error_display() {
        let err = ExecutorError::Timeout {
            action: "scale_up".to_string(),
            timeout_ms: 100,
        };
        assert_eq!(err.to_string(), "Action scale_up timed out after 100ms");

        let err = ExecutorError::Panicked {
            action: "send_alert".to_string(),
        };
        assert_eq!(err.to_string(), "Action send_alert handler panicked");
    }

    #[test]
    fn test_remediation_error_conversion_to_mcp_error() {
        let err = RemediationError::RuleNotFound {
            name: "missing".to_string(),
        };
        let mcp_err: McpError = err.into();
        assert!(matches!(mcp_err, McpError::ExecutionFailed { .. }));
        assert!(mcp_err.to_string().contains("Rule not found"));
    }

    #[test]
    fn test_remediation_error_conversion_to_app_error() {
        let err = RemediationError::DuplicateRule {
            name: "dup".to_string(),
        };
        let app_err: AppError = err.into();
        assert!(matches!(app_err, AppError::Remediation(_)));
    }
}
