//! # API Request/Response Types
//!
//! JSON structures for the HTTP API. Protocol messages and replies are the
//! responder's own types and are not repeated here.

use eavdb_core::{EvaluationState, Triple};
use serde::{Deserialize, Serialize};

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Per-database line of the status response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseStatus {
    pub name: String,
    pub triples: usize,
    pub blocks: usize,
}

/// Evaluation status. `state` is absent when nothing is running.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub state: Option<EvaluationState>,
    pub round: u64,
    pub databases: Vec<DatabaseStatus>,
}

/// All triples of one database, in index order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseResponse {
    pub name: String,
    pub triples: Vec<Triple>,
    pub checksum: u64,
}

/// Error body for non-2xx responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    #[must_use]
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
