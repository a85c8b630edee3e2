//! Integration tests for MCP protocol handling
//!
//! Feeds line-delimited JSON-RPC through `McpServer::serve` using in-memory
//! buffers and checks the responses, without touching stdio.

use std::sync::Arc;

use serde_json::{json, Value};

use ops_remediation::config::Config;
use ops_remediation::{AppState, McpServer, SharedState};

fn state() -> SharedState {
    let mut config = Config::default();
    config.monitor.autostart = false;
    Arc::new(AppState::with_defaults(config))
}

/// Run a session of requests and return one parsed response per line.
async fn session(state: &SharedState, requests: &[Value]) -> Vec<Value> {
    let input: String = requests
        .iter()
        .map(|r| format!("{}\n", r))
        .collect();

    let server = McpServer::new(Arc::clone(state));
    let mut output: Vec<u8> = Vec::new();
    server
        .serve(input.as_bytes(), &mut output)
        .await
        .expect("session failed");

    String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).expect("Failed to parse JSON-RPC response"))
        .collect()
}

/// Verify JSON-RPC 2.0 response structure
fn assert_valid_jsonrpc_response(response: &Value) {
    assert_eq!(response["jsonrpc"], "2.0", "Invalid JSON-RPC version");
    assert!(
        response.get("result").is_some() || response.get("error").is_some(),
        "Response must have result or error"
    );
}

fn call(id: u64, name: &str, arguments: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": { "name": name, "arguments": arguments }
    })
}

/// Parse the JSON payload carried in a successful tool result.
fn tool_payload(response: &Value) -> Value {
    assert!(
        response["result"].get("isError").is_none(),
        "tool failed: {}",
        response["result"]["content"][0]["text"]
    );
    let text = response["result"]["content"][0]["text"].as_str().unwrap();
    serde_json::from_str(text).unwrap()
}

#[cfg(test)]
mod handshake_tests {
    use super::*;

    #[tokio::test]
    async fn test_initialize_and_list_tools() {
        let responses = session(
            &state(),
            &[
                json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}),
                json!({"jsonrpc": "2.0", "method": "initialized"}),
                json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}),
                json!({"jsonrpc": "2.0", "id": 3, "method": "ping"}),
            ],
        )
        .await;

        // The notification is not answered
        assert_eq!(responses.len(), 3);
        for response in &responses {
            assert_valid_jsonrpc_response(response);
        }

        assert_eq!(responses[0]["result"]["serverInfo"]["name"], "ops-remediation");
        assert_eq!(responses[1]["id"], 2);
        assert_eq!(responses[1]["result"]["tools"].as_array().unwrap().len(), 15);
        assert_eq!(responses[2]["result"], json!({}));
    }

    #[tokio::test]
    async fn test_parse_error_and_blank_lines() {
        let server = McpServer::new(state());
        let mut output: Vec<u8> = Vec::new();
        server
            .serve("\n{not json}\n\n".as_bytes(), &mut output)
            .await
            .unwrap();

        let text = String::from_utf8(output).unwrap();
        let responses: Vec<Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0]["error"]["code"], -32700);
        assert_eq!(responses[0]["id"], Value::Null);
    }
}

#[cfg(test)]
mod engine_tool_tests {
    use super::*;

    #[tokio::test]
    async fn test_rule_lifecycle_over_mcp() {
        let state = state();
        let responses = session(
            &state,
            &[
                call(
                    1,
                    "remediation_add_rule",
                    json!({
                        "name": "Queue Backlog",
                        "conditions": {
                            "queue_depth": { "operator": ">=", "threshold": 500, "required": true }
                        },
                        "actions": ["scale_up", "send_alert"],
                        "priority": 0,
                        "cooldown_minutes": 0
                    }),
                ),
                call(2, "remediation_process_metrics", json!({ "metrics": { "queue_depth": 800 } })),
                call(3, "remediation_set_rule_enabled", json!({ "name": "Queue Backlog", "enabled": false })),
                call(4, "remediation_process_metrics", json!({ "metrics": { "queue_depth": 800 } })),
                call(5, "remediation_remove_rule", json!({ "name": "Queue Backlog" })),
                call(6, "remediation_history", json!({ "limit": 10 })),
            ],
        )
        .await;

        assert_eq!(tool_payload(&responses[0])["added"], "Queue Backlog");

        let first = tool_payload(&responses[1]);
        assert_eq!(first["triggered"], 2);
        assert_eq!(first["results"][0]["action"], "scale_up");
        assert_eq!(first["results"][1]["action"], "send_alert");

        assert_eq!(tool_payload(&responses[3])["triggered"], 0);
        assert_eq!(tool_payload(&responses[4])["removed"], true);
        assert_eq!(tool_payload(&responses[5])["count"], 2);

        assert!(state.engine.get_rule("Queue Backlog").await.is_none());
    }

    #[tokio::test]
    async fn test_override_blocks_processing() {
        let responses = session(
            &state(),
            &[
                call(1, "remediation_set_override", json!({ "active": true })),
                call(
                    2,
                    "remediation_process_metrics",
                    json!({
                        "metrics": { "cpu_percent": 99, "memory_percent": 99 },
                        "prediction": { "anomaly_score": 0.99, "confidence": 0.99, "is_anomaly": true }
                    }),
                ),
                call(3, "remediation_status", json!({})),
            ],
        )
        .await;

        assert_eq!(tool_payload(&responses[1])["triggered"], 0);

        let status = tool_payload(&responses[2]);
        assert_eq!(status["manual_override"], true);
        assert_eq!(status["total_actions"], 0);
    }

    #[tokio::test]
    async fn test_invalid_rule_is_reported_as_tool_error() {
        let responses = session(
            &state(),
            &[call(
                1,
                "remediation_add_rule",
                json!({ "name": "empty", "actions": [] }),
            )],
        )
        .await;

        assert_eq!(responses[0]["result"]["isError"], true);
        let text = responses[0]["result"]["content"][0]["text"].as_str().unwrap();
        assert!(text.contains("actions must not be empty"));
    }
}

#[cfg(test)]
mod monitor_tool_tests {
    use super::*;

    #[tokio::test]
    async fn test_update_config_and_status() {
        let responses = session(
            &state(),
            &[
                call(1, "monitor_update_config", json!({ "monitoring_interval": 15, "buffer_capacity": 4 })),
                call(2, "monitor_update_config", json!({ "monitoring_interval": 1 })),
                call(3, "monitor_status", json!({})),
            ],
        )
        .await;

        let updated = tool_payload(&responses[0]);
        assert_eq!(updated["monitoring_interval_secs"], 15);
        assert_eq!(updated["buffer_capacity"], 4);

        assert_eq!(responses[1]["result"]["isError"], true);

        let status = tool_payload(&responses[2]);
        assert_eq!(status["state"], "stopped");
        assert_eq!(status["config"]["monitoring_interval_secs"], 15);
    }

    #[tokio::test]
    async fn test_start_and_stop_over_mcp() {
        let state = state();
        let responses = session(
            &state,
            &[
                call(1, "monitor_start", json!({})),
                call(2, "monitor_start", json!({})),
                call(3, "monitor_stop", json!({})),
                call(4, "monitor_recent", json!({})),
            ],
        )
        .await;

        let started = tool_payload(&responses[0]);
        assert_eq!(started["started"], true);
        assert_eq!(started["state"], "running");
        assert_eq!(tool_payload(&responses[1])["started"], false);

        let stopped = tool_payload(&responses[2]);
        assert_eq!(stopped["stopped"], true);
        assert_eq!(stopped["state"], "stopped");

        assert!(tool_payload(&responses[3])["snapshots"].is_array());
    }
}
