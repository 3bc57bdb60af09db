//! Engine metadata endpoints

use crate::EngineClient;
use crate::error::Result;
use conduit_core::domain::engine::EngineInfo;
use serde_json::Value as JsonValue;

impl EngineClient {
    /// Liveness check; returns the body the engine answered with
    pub async fn ping(&self) -> Result<String> {
        let response = self.client.get(self.url("/ping")).send().await?;
        let response = self.check_status(response).await?;

        Ok(response.text().await?)
    }

    /// Engine metadata
    pub async fn info(&self) -> Result<EngineInfo> {
        let response = self.client.get(self.url("/info")).send().await?;

        self.handle_response(response).await
    }

    /// Capability descriptor of the pipeline executable
    pub async fn capabilities(&self) -> Result<JsonValue> {
        let response = self.client.get(self.url("/capabilities")).send().await?;

        self.handle_response(response).await
    }
}
