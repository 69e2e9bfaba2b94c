//! Fallback request/response API for project records.
//!
//! ```text
//! GET   {api}/api/projects/{id}/      → project record
//! PATCH {api}/api/projects/{id}/      ← {status?, progress?}
//! PATCH {api}/api/milestones/{id}/    ← {name?, dueDate?, completed?, progress?, …}
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use super::model::{MilestonePatch, ProjectPatch, ProjectState};
use crate::config::SyncConfig;

/// Fallback API errors. `Clone` so they can ride on local events.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("Request to {url} failed: {reason}")]
    Request { url: String, reason: String },
    #[error("{url} responded with HTTP {status}")]
    Status { status: u16, url: String },
    #[error("Invalid response from {url}: {reason}")]
    Decode { url: String, reason: String },
}

/// The fallback API as seen by the project sync service.
pub trait ProjectApi: Send + Sync + 'static {
    fn get_project(&self, project_id: &str) -> impl Future<Output = Result<ProjectState, ApiError>> + Send;

    fn patch_project(
        &self,
        project_id: &str,
        patch: &ProjectPatch,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    fn patch_milestone(
        &self,
        milestone_id: &str,
        patch: &MilestonePatch,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;
}

impl<A: ProjectApi> ProjectApi for Arc<A> {
    fn get_project(&self, project_id: &str) -> impl Future<Output = Result<ProjectState, ApiError>> + Send {
        (**self).get_project(project_id)
    }

    fn patch_project(
        &self,
        project_id: &str,
        patch: &ProjectPatch,
    ) -> impl Future<Output = Result<(), ApiError>> + Send {
        (**self).patch_project(project_id, patch)
    }

    fn patch_milestone(
        &self,
        milestone_id: &str,
        patch: &MilestonePatch,
    ) -> impl Future<Output = Result<(), ApiError>> + Send {
        (**self).patch_milestone(milestone_id, patch)
    }
}

/// HTTP implementation over `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpProjectApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpProjectApi {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let base_url = base_url.into();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Request {
                url: base_url.clone(),
                reason: e.to_string(),
            })?;
        Ok(Self { client, base_url })
    }

    pub fn from_config(config: &SyncConfig) -> Result<Self, ApiError> {
        Self::new(config.api_base_url.clone(), config.http_timeout)
    }

    pub fn project_url(&self, project_id: &str) -> String {
        format!("{}/api/projects/{project_id}/", self.base_url.trim_end_matches('/'))
    }

    pub fn milestone_url(&self, milestone_id: &str) -> String {
        format!("{}/api/milestones/{milestone_id}/", self.base_url.trim_end_matches('/'))
    }

    async fn patch<B: Serialize + Sync>(&self, url: String, body: &B) -> Result<(), ApiError> {
        let resp = self
            .client
            .patch(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| ApiError::Request {
                url: url.clone(),
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            return Err(ApiError::Status {
                status: resp.status().as_u16(),
                url,
            });
        }
        Ok(())
    }
}

impl ProjectApi for HttpProjectApi {
    async fn get_project(&self, project_id: &str) -> Result<ProjectState, ApiError> {
        let url = self.project_url(project_id);
        let resp = self.client.get(&url).send().await.map_err(|e| ApiError::Request {
            url: url.clone(),
            reason: e.to_string(),
        })?;

        if !resp.status().is_success() {
            return Err(ApiError::Status {
                status: resp.status().as_u16(),
                url,
            });
        }

        let body = resp.text().await.map_err(|e| ApiError::Request {
            url: url.clone(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&body).map_err(|e| ApiError::Decode {
            url,
            reason: e.to_string(),
        })
    }

    async fn patch_project(&self, project_id: &str, patch: &ProjectPatch) -> Result<(), ApiError> {
        self.patch(self.project_url(project_id), patch).await
    }

    async fn patch_milestone(&self, milestone_id: &str, patch: &MilestonePatch) -> Result<(), ApiError> {
        self.patch(self.milestone_url(milestone_id), patch).await
    }
}
