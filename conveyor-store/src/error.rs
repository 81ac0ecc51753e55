//! Store error types

use conveyor_core::TransitionError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    pub fn job_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: "Job",
            id: id.into(),
        }
    }

    pub fn step_not_found(id: i64) -> Self {
        Self::NotFound {
            entity: "Step",
            id: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
