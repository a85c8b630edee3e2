//! # Ops Remediation
//!
//! An auto-remediation control loop for infrastructure monitoring.
//!
//! Metrics snapshots, optionally enriched with an anomaly prediction, are
//! evaluated against a catalog of prioritized rules. A rule whose
//! conditions hold fires its actions in order and then cools down.
//!
//! ## Features
//!
//! - **Rule Catalog**: named, prioritized threshold rules with cooldowns
//! - **Remediation Engine**: gated evaluation with per-rule fault isolation
//! - **Monitoring Loop**: scheduled sampling with fallback and a ring buffer
//! - **MCP Control Surface**: runtime control over stdio JSON-RPC
//!
//! ## Architecture
//!
//! ```text
//! MCP Client → MCP Server → RemediationEngine → ActionExecutor (webhook / dry-run)
//!                  ↓               ↑
//!            MonitoringLoop ───────┘
//!              ↓         ↓
//!     MetricsSource   Classifier (HTTP / heuristic)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use ops_remediation::{AppState, Config, McpServer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let state = Arc::new(AppState::from_config(config)?);
//!     state.monitor.start().await;
//!     McpServer::new(Arc::clone(&state)).run().await?;
//!     state.monitor.stop().await;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

/// Configuration management loaded from the environment.
pub mod config;
/// Error types and result aliases for the application.
pub mod error;
/// Rule catalog, engine, monitoring loop and collaborator adapters.
pub mod remediation;
/// MCP server implementation and request handling.
pub mod server;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use server::{AppState, McpServer, SharedState};
