//! Pipeline domain types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

/// Identity of a pipeline
///
/// Issued by the engine in strictly increasing order and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipelineId(pub u64);

impl fmt::Display for PipelineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PipelineId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>().map(PipelineId)
    }
}

/// Pipeline lifecycle status
///
/// ```text
/// Pending -> Running -> Finished
///    |          \----> Killed
///    |-> Failed
///    \-> Killed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipelineStatus {
    Pending,
    Running,
    Failed,
    Killed,
    Finished,
}

impl PipelineStatus {
    /// Whether no further status transition can happen
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PipelineStatus::Failed | PipelineStatus::Killed | PipelineStatus::Finished
        )
    }

    /// Whether moving from `self` to `next` is a legal transition
    pub fn can_transition_to(self, next: PipelineStatus) -> bool {
        use PipelineStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Failed)
                | (Pending, Killed)
                | (Running, Finished)
                | (Running, Killed)
        )
    }
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStatus::Pending => "Pending",
            PipelineStatus::Running => "Running",
            PipelineStatus::Failed => "Failed",
            PipelineStatus::Killed => "Killed",
            PipelineStatus::Finished => "Finished",
        };
        f.write_str(name)
    }
}

/// What a client submitted: the script plus extra command-line parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineDefinition {
    pub script: String,
    #[serde(default)]
    pub params: Vec<String>,
}

impl PipelineDefinition {
    pub fn new(script: impl Into<String>, params: Vec<String>) -> Self {
        Self {
            script: script.into(),
            params,
        }
    }
}

/// Pipeline representation returned by the engine API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineInfo {
    pub id: PipelineId,
    #[serde(flatten)]
    pub definition: PipelineDefinition,
    pub delay_ms: u64,
    pub status: PipelineStatus,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
    /// OS process id, known once the process has been spawned
    pub pid: Option<u32>,
    /// Exit code of the process; `None` while running or when killed by a signal
    pub exit_code: Option<i32>,
    /// Why the start failed, for `Failed` pipelines
    pub error: Option<String>,
}
