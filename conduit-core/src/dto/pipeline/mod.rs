//! Pipeline DTOs for the engine HTTP API

use serde::{Deserialize, Serialize};

/// Query parameters accepted by `POST /pipeline`
///
/// The script itself travels as the raw request body. Both parameters are
/// kept as strings here and parsed by the engine so that malformed values
/// can be reported as client errors.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreatePipelineQuery {
    /// Start delay in Go duration syntax, e.g. `500ms`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<String>,
    /// Extra arguments, quoted following `/bin/sh` rules
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<String>,
}
