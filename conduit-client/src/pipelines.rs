//! Pipeline-related API endpoints

use crate::EngineClient;
use crate::error::Result;
use conduit_core::domain::pipeline::{PipelineId, PipelineInfo};
use conduit_core::dto::pipeline::CreatePipelineQuery;
use conduit_core::params::join_params;

/// Query string for `POST /pipeline`; empty values are left out
fn create_query(delay: Option<&str>, params: &[String]) -> CreatePipelineQuery {
    CreatePipelineQuery {
        delay: delay.filter(|d| !d.is_empty()).map(str::to_string),
        params: (!params.is_empty()).then(|| join_params(params)),
    }
}

impl EngineClient {
    // =============================================================================
    // Pipeline Management
    // =============================================================================

    /// Create a new pipeline
    ///
    /// # Arguments
    /// * `script` - Pipeline script, sent as the request body
    /// * `delay` - Start delay as a Go-style duration (e.g. "1.5s"); engine default when `None`
    /// * `params` - Extra arguments passed to the executable after the script
    ///
    /// # Returns
    /// The registered pipeline, usually still `Pending`
    pub async fn create_pipeline(
        &self,
        script: &str,
        delay: Option<&str>,
        params: &[String],
    ) -> Result<PipelineInfo> {
        tracing::debug!("Creating pipeline ({} bytes of script)", script.len());

        let response = self
            .client
            .post(self.url("/pipeline"))
            .query(&create_query(delay, params))
            .body(script.to_string())
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// List the identities of all pipelines, ascending
    pub async fn list_pipelines(&self) -> Result<Vec<PipelineId>> {
        let response = self.client.get(self.url("/pipelines")).send().await?;

        self.handle_response(response).await
    }

    /// List the identities of running pipelines, ascending
    pub async fn list_running(&self) -> Result<Vec<PipelineId>> {
        let response = self.client.get(self.url("/running")).send().await?;

        self.handle_response(response).await
    }

    /// Get a pipeline by ID
    pub async fn get_pipeline(&self, id: PipelineId) -> Result<PipelineInfo> {
        let url = self.url(&format!("/pipeline/{}", id));
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Get the output (stdout and stderr) captured so far
    pub async fn get_output(&self, id: PipelineId) -> Result<Vec<u8>> {
        let url = self.url(&format!("/pipeline/{}/out", id));
        let response = self.client.get(&url).send().await?;

        self.handle_bytes_response(response).await
    }

    /// Kill a pipeline
    ///
    /// # Returns
    /// The pipeline after the kill, normally `Killed`
    pub async fn kill_pipeline(&self, id: PipelineId) -> Result<PipelineInfo> {
        tracing::debug!("Killing pipeline {}", id);

        let url = self.url(&format!("/pipeline/{}", id));
        let response = self.client.delete(&url).send().await?;

        self.handle_response(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_query_omits_defaults() {
        let query = create_query(None, &[]);
        assert!(query.delay.is_none());
        assert!(query.params.is_none());

        let query = create_query(Some(""), &[]);
        assert!(query.delay.is_none());
    }

    #[test]
    fn test_create_query_quotes_params() {
        let params = vec!["first".to_string(), "second arg".to_string()];
        let query = create_query(Some("1.5s"), &params);

        assert_eq!(query.delay.as_deref(), Some("1.5s"));
        assert_eq!(query.params.as_deref(), Some("first 'second arg'"));
    }
}
