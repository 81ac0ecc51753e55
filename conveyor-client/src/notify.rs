//! Internal push bridge

use crate::ServerClient;
use crate::error::{ClientError, Result};
use conveyor_core::domain::snapshot::StatusSnapshot;
use conveyor_core::dto::job::{API_KEY_HEADER, NotifyResponse};
use tracing::debug;

impl ServerClient {
    /// Push a status snapshot to the server, which fans it out to observers
    ///
    /// # Returns
    /// The server's response, including how many connections were notified
    pub async fn notify(&self, snapshot: &StatusSnapshot) -> Result<NotifyResponse> {
        let api_key = self.api_key.as_deref().ok_or(ClientError::MissingApiKey)?;
        let url = format!(
            "{}/internal/jobs/{}/notify",
            self.base_url, snapshot.job_id
        );

        debug!(job_id = %snapshot.job_id, status = %snapshot.status, "Pushing snapshot");

        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, api_key)
            .json(snapshot)
            .send()
            .await?;

        self.handle_response(response).await
    }
}
