//! MCP protocol implementation for JSON-RPC 2.0 communication.
//!
//! Line-delimited JSON-RPC 2.0 over stdio. Each tool maps onto one engine
//! or monitoring loop operation; see [`tool_definitions`] for the schemas.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, error, info};

use super::{handle_tool_call, SharedState};
use crate::config::MIN_MONITORING_INTERVAL_SECS;
use crate::remediation::RemediationAction;

#[cfg(test)]
#[path = "mcp_tests.rs"]
mod mcp_tests;

/// JSON-RPC 2.0 request structure.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC version (must be "2.0").
    pub jsonrpc: String,
    /// Request identifier (None for notifications).
    pub id: Option<Value>,
    /// The method name to invoke.
    pub method: String,
    /// Optional parameters for the method.
    #[serde(default)]
    pub params: Option<Value>,
}

/// JSON-RPC 2.0 response structure.
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    /// JSON-RPC version (always "2.0").
    pub jsonrpc: String,
    /// Request identifier (null when answering an unidentifiable request).
    pub id: Value,
    /// The result on success (mutually exclusive with error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// The error on failure (mutually exclusive with result).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    /// Error code (negative for predefined errors).
    pub code: i32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional error data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// MCP server information returned during initialization.
#[derive(Debug, Serialize)]
pub struct ServerInfo {
    /// The server name identifier.
    pub name: String,
    /// The server version string.
    pub version: String,
}

/// MCP server capabilities advertised to clients.
#[derive(Debug, Serialize)]
pub struct Capabilities {
    /// Tool-related capabilities.
    pub tools: ToolCapabilities,
}

/// Tool-specific capabilities.
#[derive(Debug, Serialize)]
pub struct ToolCapabilities {
    /// Whether the tool list can change dynamically.
    #[serde(rename = "listChanged")]
    pub list_changed: bool,
}

/// Result of the MCP initialize handshake.
#[derive(Debug, Serialize)]
pub struct InitializeResult {
    /// The MCP protocol version supported.
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    /// Server capabilities.
    pub capabilities: Capabilities,
    /// Server identification information.
    #[serde(rename = "serverInfo")]
    pub server_info: ServerInfo,
}

/// MCP tool definition with JSON Schema.
#[derive(Debug, Clone, Serialize)]
pub struct Tool {
    /// Unique tool name (used in tool calls).
    pub name: String,
    /// Human-readable description of the tool.
    pub description: String,
    /// JSON Schema for the tool's input parameters.
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Parameters for a tools/call request.
#[derive(Debug, Deserialize)]
pub struct ToolCallParams {
    /// The name of the tool to invoke.
    pub name: String,
    /// Optional arguments for the tool.
    #[serde(default)]
    pub arguments: Option<Value>,
}

/// Content item within a tool result.
#[derive(Debug, Serialize)]
pub struct ToolResultContent {
    /// The content type (e.g., "text").
    #[serde(rename = "type")]
    pub content_type: String,
    /// The text content of the result.
    pub text: String,
}

/// Result of a tool invocation.
#[derive(Debug, Serialize)]
pub struct ToolCallResult {
    /// The result content items.
    pub content: Vec<ToolResultContent>,
    /// Whether the result represents an error.
    #[serde(rename = "isError", skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl JsonRpcResponse {
    /// Create a success response
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.unwrap_or(Value::Null),
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response
    pub fn error(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.unwrap_or(Value::Null),
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

/// MCP Server running over stdio.
///
/// Handles JSON-RPC 2.0 messages over stdin/stdout for MCP protocol
/// communication with clients.
pub struct McpServer {
    /// Shared application state.
    state: SharedState,
}

impl McpServer {
    /// Create a new MCP server
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }

    /// Run the server on stdin/stdout until EOF.
    pub async fn run(&self) -> std::io::Result<()> {
        info!("Ops remediation MCP server starting...");
        self.serve(tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// Serve line-delimited requests from `input`, writing responses to
    /// `output`. Returns when `input` reaches EOF.
    pub async fn serve<R, W>(&self, input: R, mut output: W) -> std::io::Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = BufReader::new(input).lines();

        while let Some(line) = lines.next_line().await? {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            debug!(request = %trimmed, "Received request");

            let response = match serde_json::from_str::<JsonRpcRequest>(trimmed) {
                Ok(request) => self.handle_request(request).await,
                Err(e) => {
                    error!(error = %e, "Failed to parse request");
                    Some(JsonRpcResponse::error(
                        None,
                        -32700,
                        format!("Parse error: {}", e),
                    ))
                }
            };

            // Notifications get no response
            if let Some(response) = response {
                let response_json = serde_json::to_string(&response)?;
                debug!(response = %response_json, "Sending response");

                output.write_all(response_json.as_bytes()).await?;
                output.write_all(b"\n").await?;
                output.flush().await?;
            }
        }

        info!("EOF received, shutting down");
        Ok(())
    }

    /// Handle a single JSON-RPC request. Returns None for notifications.
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let is_notification = request.id.is_none();

        match request.method.as_str() {
            "initialize" => Some(self.handle_initialize(request.id)),
            "initialized" => {
                debug!("Received initialized notification");
                None
            }
            "notifications/cancelled" => {
                debug!("Received cancelled notification");
                None
            }
            "tools/list" => Some(self.handle_tools_list(request.id)),
            "tools/call" => Some(self.handle_tool_call(request.id, request.params).await),
            "ping" => Some(JsonRpcResponse::success(
                request.id,
                Value::Object(Default::default()),
            )),
            method => {
                if is_notification {
                    debug!(method = %method, "Unknown notification, ignoring");
                    None
                } else {
                    error!(method = %method, "Unknown method");
                    Some(JsonRpcResponse::error(
                        request.id,
                        -32601,
                        format!("Method not found: {}", method),
                    ))
                }
            }
        }
    }

    /// Handle initialize request
    fn handle_initialize(&self, id: Option<Value>) -> JsonRpcResponse {
        info!("Handling initialize request");

        let result = InitializeResult {
            protocol_version: "2024-11-05".to_string(),
            capabilities: Capabilities {
                tools: ToolCapabilities {
                    list_changed: false,
                },
            },
            server_info: ServerInfo {
                name: "ops-remediation".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };

        match serde_json::to_value(result) {
            Ok(val) => JsonRpcResponse::success(id, val),
            Err(e) => {
                error!(error = %e, "Failed to serialize initialize result");
                JsonRpcResponse::error(id, -32603, format!("Internal error: {}", e))
            }
        }
    }

    /// Handle tools/list request
    fn handle_tools_list(&self, id: Option<Value>) -> JsonRpcResponse {
        info!("Handling tools/list request");

        let tools = tool_definitions();

        JsonRpcResponse::success(
            id,
            serde_json::json!({
                "tools": tools
            }),
        )
    }

    /// Handle tools/call request
    async fn handle_tool_call(&self, id: Option<Value>, params: Option<Value>) -> JsonRpcResponse {
        let params: ToolCallParams = match params {
            Some(p) => match serde_json::from_value(p) {
                Ok(p) => p,
                Err(e) => {
                    return JsonRpcResponse::error(id, -32602, format!("Invalid params: {}", e));
                }
            },
            None => {
                return JsonRpcResponse::error(id, -32602, "Missing params");
            }
        };

        info!(tool = %params.name, "Handling tool call");

        let (content, is_error) =
            match handle_tool_call(&self.state, &params.name, params.arguments).await {
                Ok(result) => {
                    let text = serde_json::to_string_pretty(&result).unwrap_or_else(|e| {
                        error!(error = %e, "Failed to serialize tool result");
                        format!("{{\"error\": \"Serialization failed: {}\"}}", e)
                    });
                    (
                        ToolResultContent {
                            content_type: "text".to_string(),
                            text,
                        },
                        None,
                    )
                }
                Err(e) => (
                    ToolResultContent {
                        content_type: "text".to_string(),
                        text: format!("Error: {}", e),
                    },
                    Some(true),
                ),
            };

        let tool_result = ToolCallResult {
            content: vec![content],
            is_error,
        };

        match serde_json::to_value(tool_result) {
            Ok(val) => JsonRpcResponse::success(id, val),
            Err(e) => {
                error!(error = %e, "Failed to serialize tool call result");
                JsonRpcResponse::error(id.clone(), -32603, format!("Internal error: {}", e))
            }
        }
    }
}


// ============================================================================
// Tool Definitions
// ============================================================================

/// Every tool this server exposes, in `tools/list` order.
pub fn tool_definitions() -> Vec<Tool> {
    vec![
        // Engine
        get_status_tool(),
        get_enable_tool(),
        get_disable_tool(),
        get_set_override_tool(),
        get_list_rules_tool(),
        get_add_rule_tool(),
        get_remove_rule_tool(),
        get_set_rule_enabled_tool(),
        get_history_tool(),
        get_process_metrics_tool(),
        // Monitoring loop
        get_monitor_status_tool(),
        get_monitor_start_tool(),
        get_monitor_stop_tool(),
        get_monitor_update_config_tool(),
        get_monitor_recent_tool(),
    ]
}

fn no_arguments() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {}
    })
}

fn action_names() -> Vec<&'static str> {
    RemediationAction::ALL.iter().map(|a| a.as_str()).collect()
}

fn get_status_tool() -> Tool {
    Tool {
        name: "remediation_status".to_string(),
        description: "Engine flags, rule counts and the most recent action results.".to_string(),
        input_schema: no_arguments(),
    }
}

fn get_enable_tool() -> Tool {
    Tool {
        name: "remediation_enable".to_string(),
        description: "Turn automatic remediation on.".to_string(),
        input_schema: no_arguments(),
    }
}

fn get_disable_tool() -> Tool {
    Tool {
        name: "remediation_disable".to_string(),
        description: "Turn automatic remediation off. Evaluations return no actions until re-enabled.".to_string(),
        input_schema: no_arguments(),
    }
}

fn get_set_override_tool() -> Tool {
    Tool {
        name: "remediation_set_override".to_string(),
        description: "Set or clear the manual override. While active, no rule fires regardless of the enable flag.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "active": {
                    "type": "boolean",
                    "description": "true to suppress all automatic actions"
                }
            },
            "required": ["active"]
        }),
    }
}

fn get_list_rules_tool() -> Tool {
    Tool {
        name: "remediation_list_rules".to_string(),
        description: "List every rule in insertion order with its trigger bookkeeping.".to_string(),
        input_schema: no_arguments(),
    }
}

fn get_add_rule_tool() -> Tool {
    Tool {
        name: "remediation_add_rule".to_string(),
        description: "Add a rule. Omitted priority and cooldown fall back to the configured defaults.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "name": {
                    "type": "string",
                    "description": "Unique rule name"
                },
                "conditions": {
                    "type": "object",
                    "description": "Metric name to condition",
                    "additionalProperties": {
                        "type": "object",
                        "properties": {
                            "operator": {
                                "type": "string",
                                "enum": [">", "<", "=", ">=", "<="]
                            },
                            "threshold": { "type": "number" },
                            "required": {
                                "type": "boolean",
                                "description": "Rule fails when the metric is absent"
                            },
                            "duration_minutes": { "type": "integer", "minimum": 0 }
                        },
                        "required": ["operator", "threshold"]
                    }
                },
                "actions": {
                    "type": "array",
                    "minItems": 1,
                    "items": {
                        "type": "string",
                        "enum": action_names()
                    },
                    "description": "Actions to run in order when the rule fires"
                },
                "priority": {
                    "type": "integer",
                    "minimum": 0,
                    "description": "Lower runs first"
                },
                "cooldown_minutes": {
                    "type": "integer",
                    "minimum": 0
                },
                "enabled": {
                    "type": "boolean",
                    "default": true
                }
            },
            "required": ["name", "actions"]
        }),
    }
}

fn get_remove_rule_tool() -> Tool {
    Tool {
        name: "remediation_remove_rule".to_string(),
        description: "Remove a rule by name.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "name": { "type": "string" }
            },
            "required": ["name"]
        }),
    }
}

fn get_set_rule_enabled_tool() -> Tool {
    Tool {
        name: "remediation_set_rule_enabled".to_string(),
        description: "Enable or disable a single rule without removing it.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "name": { "type": "string" },
                "enabled": { "type": "boolean" }
            },
            "required": ["name", "enabled"]
        }),
    }
}

fn get_history_tool() -> Tool {
    Tool {
        name: "remediation_history".to_string(),
        description: "Most recent action results, oldest first.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "limit": {
                    "type": "integer",
                    "minimum": 0,
                    "default": 20
                }
            }
        }),
    }
}

fn get_process_metrics_tool() -> Tool {
    Tool {
        name: "remediation_process_metrics".to_string(),
        description: "Evaluate a metrics snapshot now. Without a prediction, the classifier is consulted and low-confidence results are dropped.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "metrics": {
                    "type": "object",
                    "additionalProperties": { "type": "number" },
                    "description": "Metric name to value"
                },
                "prediction": {
                    "type": "object",
                    "properties": {
                        "anomaly_score": { "type": "number", "minimum": 0, "maximum": 1 },
                        "confidence": { "type": "number", "minimum": 0, "maximum": 1 },
                        "is_anomaly": { "type": "boolean" }
                    },
                    "required": ["anomaly_score", "confidence", "is_anomaly"]
                }
            },
            "required": ["metrics"]
        }),
    }
}

fn get_monitor_status_tool() -> Tool {
    Tool {
        name: "monitor_status".to_string(),
        description: "Monitoring loop state, configuration and cycle counters.".to_string(),
        input_schema: no_arguments(),
    }
}

fn get_monitor_start_tool() -> Tool {
    Tool {
        name: "monitor_start".to_string(),
        description: "Start the monitoring loop.".to_string(),
        input_schema: no_arguments(),
    }
}

fn get_monitor_stop_tool() -> Tool {
    Tool {
        name: "monitor_stop".to_string(),
        description: "Stop the monitoring loop after the current cycle.".to_string(),
        input_schema: no_arguments(),
    }
}

fn get_monitor_update_config_tool() -> Tool {
    Tool {
        name: "monitor_update_config".to_string(),
        description: "Change loop settings. All supplied fields are validated before any is applied.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "monitoring_interval": {
                    "type": "integer",
                    "minimum": MIN_MONITORING_INTERVAL_SECS,
                    "description": "Seconds between cycles"
                },
                "confidence_threshold": {
                    "type": "number",
                    "minimum": 0,
                    "maximum": 1
                },
                "buffer_capacity": {
                    "type": "integer",
                    "minimum": 1
                }
            },
            "additionalProperties": false
        }),
    }
}

fn get_monitor_recent_tool() -> Tool {
    Tool {
        name: "monitor_recent".to_string(),
        description: "Most recent monitoring cycles from the ring buffer, oldest first.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "limit": {
                    "type": "integer",
                    "minimum": 0,
                    "default": 10
                }
            }
        }),
    }
}
