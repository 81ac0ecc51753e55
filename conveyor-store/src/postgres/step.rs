//! Step Repository
//!
//! Handles all database operations related to job steps.

use conveyor_core::domain::step::{Step, StepStatus};
use sqlx::{PgExecutor, PgPool};

/// Insert a step and return its assigned ID
pub async fn insert(executor: impl PgExecutor<'_>, step: &Step) -> Result<i64, sqlx::Error> {
    let row: (i64,) = sqlx::query_as(
        r#"
        INSERT INTO job_steps (job_id, name, order_index, status, progress, details)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id
        "#,
    )
    .bind(&step.job_id)
    .bind(&step.name)
    .bind(step.order_index)
    .bind(status_to_string(step.status))
    .bind(step.progress)
    .bind(serde_json::to_value(&step.details).unwrap_or_default())
    .fetch_one(executor)
    .await?;

    Ok(row.0)
}

/// Get all steps of a job in execution order
pub async fn find_by_job(pool: &PgPool, job_id: &str) -> Result<Vec<Step>, sqlx::Error> {
    let rows = sqlx::query_as::<_, StepRow>(
        r#"
        SELECT id, job_id, name, order_index, status, progress, details,
               error_message, started_at, completed_at
        FROM job_steps
        WHERE job_id = $1
        ORDER BY order_index ASC
        "#,
    )
    .bind(job_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

/// Update a step record
///
/// Only applies when the stored status accepts the new one; returns `false`
/// for a missing row or a rejected transition.
pub async fn update(pool: &PgPool, step: &Step) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE job_steps
        SET status = $2, progress = $3, details = $4, error_message = $5,
            started_at = $6, completed_at = $7
        WHERE id = $1 AND status = ANY($8)
        "#,
    )
    .bind(step.id)
    .bind(status_to_string(step.status))
    .bind(step.progress)
    .bind(serde_json::to_value(&step.details).unwrap_or_default())
    .bind(&step.error_message)
    .bind(step.started_at)
    .bind(step.completed_at)
    .bind(writable_from(step.status))
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Get the stored status of a step
pub async fn find_status(pool: &PgPool, id: i64) -> Result<Option<StepStatus>, sqlx::Error> {
    let row: Option<(String,)> = sqlx::query_as("SELECT status FROM job_steps WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|(status,)| string_to_status(&status)))
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Stored statuses that may be overwritten with `next`
fn writable_from(next: StepStatus) -> Vec<&'static str> {
    StepStatus::ALL
        .into_iter()
        .filter(|stored| stored.accepts_write(next))
        .map(status_to_string)
        .collect()
}

fn status_to_string(status: StepStatus) -> &'static str {
    match status {
        StepStatus::Pending => "PENDING",
        StepStatus::Running => "RUNNING",
        StepStatus::Completed => "COMPLETED",
        StepStatus::Failed => "FAILED",
        StepStatus::Skipped => "SKIPPED",
    }
}

fn string_to_status(s: &str) -> StepStatus {
    match s {
        "PENDING" => StepStatus::Pending,
        "RUNNING" => StepStatus::Running,
        "COMPLETED" => StepStatus::Completed,
        "FAILED" => StepStatus::Failed,
        "SKIPPED" => StepStatus::Skipped,
        _ => StepStatus::Pending,
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct StepRow {
    id: i64,
    job_id: String,
    name: String,
    order_index: i32,
    status: String,
    progress: i32,
    details: serde_json::Value,
    error_message: Option<String>,
    started_at: Option<chrono::DateTime<chrono::Utc>>,
    completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<StepRow> for Step {
    fn from(row: StepRow) -> Self {
        Step {
            id: row.id,
            job_id: row.job_id,
            name: row.name,
            order_index: row.order_index,
            status: string_to_status(&row.status),
            progress: row.progress,
            details: serde_json::from_value(row.details).unwrap_or_default(),
            error_message: row.error_message,
            started_at: row.started_at,
            completed_at: row.completed_at,
        }
    }
}
