//! Observer access checks

use async_trait::async_trait;
use conveyor_store::JobStore;
use std::collections::HashMap;
use std::sync::Arc;

use super::registry::AttachError;

/// Credentials presented when an observer connects
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub token: Option<String>,
}

impl Credentials {
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }
}

/// Decides whether credentials may observe a job
#[async_trait]
pub trait AccessPolicy: Send + Sync {
    async fn authorize(&self, credentials: &Credentials, job_id: &str) -> Result<(), AttachError>;
}

/// Grants access when the token maps to the job's owner
pub struct OwnerAccessPolicy {
    tokens: HashMap<String, String>,
    store: Arc<dyn JobStore>,
}

impl OwnerAccessPolicy {
    pub fn new(tokens: HashMap<String, String>, store: Arc<dyn JobStore>) -> Self {
        Self { tokens, store }
    }
}

#[async_trait]
impl AccessPolicy for OwnerAccessPolicy {
    async fn authorize(&self, credentials: &Credentials, job_id: &str) -> Result<(), AttachError> {
        let owner = credentials
            .token
            .as_deref()
            .and_then(|token| self.tokens.get(token))
            .ok_or(AttachError::Unauthorized)?;

        let job = self
            .store
            .find_job(job_id)
            .await
            .map_err(|e| AttachError::Lookup(e.to_string()))?
            .ok_or_else(|| AttachError::JobNotFound(job_id.to_string()))?;

        if &job.owner_id != owner {
            return Err(AttachError::Forbidden(job_id.to_string()));
        }

        Ok(())
    }
}
