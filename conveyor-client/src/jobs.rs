//! Job lifecycle endpoints

use crate::ServerClient;
use crate::error::Result;
use conveyor_core::domain::job::Job;
use conveyor_core::dto::job::{CreateJob, JobDetails};

impl ServerClient {
    /// Create a job and its ordered steps
    ///
    /// # Returns
    /// The created job, PENDING until a worker claims it
    pub async fn create_job(&self, req: CreateJob) -> Result<Job> {
        let url = format!("{}/jobs", self.base_url);
        let response = self.client.post(&url).json(&req).send().await?;

        self.handle_response(response).await
    }

    /// Get a job with its steps
    pub async fn get_job(&self, job_id: &str) -> Result<JobDetails> {
        let url = format!("{}/jobs/{}", self.base_url, job_id);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// List all jobs, newest first
    pub async fn list_jobs(&self) -> Result<Vec<Job>> {
        let url = format!("{}/jobs", self.base_url);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Request cooperative cancellation of a job
    ///
    /// The running step, if any, finishes; no further step starts.
    pub async fn cancel_job(&self, job_id: &str) -> Result<Job> {
        let url = format!("{}/jobs/{}/cancel", self.base_url, job_id);
        let response = self.client.post(&url).send().await?;

        self.handle_response(response).await
    }
}
