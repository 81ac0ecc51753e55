//! Job Repository
//!
//! Handles all database operations related to jobs.

use conveyor_core::domain::job::{Job, JobStatus};
use sqlx::{PgExecutor, PgPool};

const JOB_COLUMNS: &str = "id, name, job_type, owner_id, status, progress, error_message, \
     created_at, started_at, completed_at, metadata, input, worker_id";

/// Insert a new job row
pub async fn insert(executor: impl PgExecutor<'_>, job: &Job) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO jobs (id, name, job_type, owner_id, status, progress, error_message,
                          created_at, started_at, completed_at, metadata, input, worker_id)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        "#,
    )
    .bind(&job.id)
    .bind(&job.name)
    .bind(&job.job_type)
    .bind(&job.owner_id)
    .bind(status_to_string(job.status))
    .bind(job.progress)
    .bind(&job.error_message)
    .bind(job.created_at)
    .bind(job.started_at)
    .bind(job.completed_at)
    .bind(serde_json::to_value(&job.metadata).unwrap_or_default())
    .bind(&job.input)
    .bind(&job.worker_id)
    .execute(executor)
    .await?;

    Ok(())
}

/// Find a job by ID
pub async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Job>, sqlx::Error> {
    let row = sqlx::query_as::<_, JobRow>(&format!(
        "SELECT {} FROM jobs WHERE id = $1",
        JOB_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.into()))
}

/// List all jobs
pub async fn list_all(pool: &PgPool) -> Result<Vec<Job>, sqlx::Error> {
    let rows = sqlx::query_as::<_, JobRow>(&format!(
        "SELECT {} FROM jobs ORDER BY created_at DESC",
        JOB_COLUMNS
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

/// Update the aggregate fields of a job
///
/// Skips the write when the stored job is CANCELLED, or when a CANCELLED write
/// meets a job that already finished.
pub async fn update_state(pool: &PgPool, job: &Job) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE jobs
        SET status = $2, progress = $3, error_message = $4,
            started_at = $5, completed_at = $6
        WHERE id = $1
          AND status <> 'CANCELLED'
          AND ($2 <> 'CANCELLED' OR status NOT IN ('COMPLETED', 'FAILED'))
        "#,
    )
    .bind(&job.id)
    .bind(status_to_string(job.status))
    .bind(job.progress)
    .bind(&job.error_message)
    .bind(job.started_at)
    .bind(job.completed_at)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Claim the oldest pending, unclaimed job for a worker
///
/// `SKIP LOCKED` keeps concurrent workers from claiming the same row.
pub async fn claim_next(pool: &PgPool, worker_id: &str) -> Result<Option<Job>, sqlx::Error> {
    let row = sqlx::query_as::<_, JobRow>(&format!(
        r#"
        UPDATE jobs
        SET worker_id = $1
        WHERE id = (
            SELECT id FROM jobs
            WHERE status = 'PENDING' AND worker_id IS NULL
            ORDER BY created_at ASC
            LIMIT 1
            FOR UPDATE SKIP LOCKED
        )
        RETURNING {}
        "#,
        JOB_COLUMNS
    ))
    .bind(worker_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.into()))
}

// =============================================================================
// Helper Functions
// =============================================================================

fn status_to_string(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Pending => "PENDING",
        JobStatus::Running => "RUNNING",
        JobStatus::Completed => "COMPLETED",
        JobStatus::Failed => "FAILED",
        JobStatus::Cancelled => "CANCELLED",
    }
}

fn string_to_status(s: &str) -> JobStatus {
    match s {
        "PENDING" => JobStatus::Pending,
        "RUNNING" => JobStatus::Running,
        "COMPLETED" => JobStatus::Completed,
        "FAILED" => JobStatus::Failed,
        "CANCELLED" => JobStatus::Cancelled,
        _ => JobStatus::Pending,
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct JobRow {
    id: String,
    name: String,
    job_type: String,
    owner_id: String,
    status: String,
    progress: i32,
    error_message: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
    started_at: Option<chrono::DateTime<chrono::Utc>>,
    completed_at: Option<chrono::DateTime<chrono::Utc>>,
    metadata: serde_json::Value,
    input: serde_json::Value,
    worker_id: Option<String>,
}

impl From<JobRow> for Job {
    fn from(row: JobRow) -> Self {
        let metadata = serde_json::from_value(row.metadata).unwrap_or_default();

        Job {
            id: row.id,
            name: row.name,
            job_type: row.job_type,
            owner_id: row.owner_id,
            status: string_to_status(&row.status),
            progress: row.progress,
            error_message: row.error_message,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            metadata,
            input: row.input,
            worker_id: row.worker_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_strings_round_trip() {
        for status in [
            JobStatus::Pending,
            JobStatus::Running,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Cancelled,
        ] {
            assert_eq!(string_to_status(status_to_string(status)), status);
            assert_eq!(status_to_string(status), status.to_string());
        }
    }
}
