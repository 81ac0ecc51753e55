//! Job DTOs for the lifecycle API and the internal push bridge

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::job::Job;
use crate::domain::step::Step;

/// Header carrying the shared secret on internal endpoints
pub const API_KEY_HEADER: &str = "x-api-key";

/// Request to create a job with its ordered list of step names
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateJob {
    pub name: String,
    pub job_type: String,
    pub owner_id: String,
    /// Handed to the first step
    #[serde(default)]
    pub input: serde_json::Value,
    pub steps: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// A job together with its steps in execution order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDetails {
    pub job: Job,
    pub steps: Vec<Step>,
}

/// Response of `POST /internal/jobs/{id}/notify`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyResponse {
    pub job_id: String,
    pub notified: usize,
}
