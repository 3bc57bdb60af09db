//! Engine metadata types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Process-wide metadata served by `GET /info`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineInfo {
    pub name: String,
    pub version: String,
    /// Random identifier generated at engine startup
    pub instance_id: Uuid,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub uptime_seconds: u64,
    pub executable: String,
    pub executable_args: Vec<String>,
    pub default_delay_ms: u64,
    /// Number of pipelines in the registry, terminated ones included
    pub pipelines: usize,
    /// Number of pipelines currently `Running`
    pub running: usize,
}
