//! Configuration module
//!
//! Handles CLI configuration such as the engine URL.

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// URL of the engine service
    pub engine_url: String,
}
