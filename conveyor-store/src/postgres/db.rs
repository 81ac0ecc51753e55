use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Create jobs table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS jobs (
            id VARCHAR(64) PRIMARY KEY,
            name VARCHAR(255) NOT NULL,
            job_type VARCHAR(100) NOT NULL,
            owner_id VARCHAR(255) NOT NULL,
            status VARCHAR(20) NOT NULL,
            progress INTEGER NOT NULL DEFAULT 0,
            error_message TEXT,
            created_at TIMESTAMPTZ NOT NULL,
            started_at TIMESTAMPTZ,
            completed_at TIMESTAMPTZ,
            metadata JSONB NOT NULL DEFAULT '{}',
            input JSONB NOT NULL DEFAULT 'null',
            worker_id VARCHAR(255)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create steps table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS job_steps (
            id BIGSERIAL PRIMARY KEY,
            job_id VARCHAR(64) NOT NULL REFERENCES jobs(id),
            name VARCHAR(255) NOT NULL,
            order_index INTEGER NOT NULL,
            status VARCHAR(20) NOT NULL,
            progress INTEGER NOT NULL DEFAULT 0,
            details JSONB NOT NULL DEFAULT '{}',
            error_message TEXT,
            started_at TIMESTAMPTZ,
            completed_at TIMESTAMPTZ,
            UNIQUE (job_id, order_index)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Queue lookups scan pending, unclaimed jobs by age
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status, created_at)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_created_at ON jobs(created_at DESC)")
        .execute(pool)
        .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
