//! Job command handlers
//!
//! Handles creating, listing, inspecting and cancelling jobs.

use anyhow::{Context, Result, anyhow};
use clap::Subcommand;
use colored::*;
use conveyor_client::ServerClient;
use conveyor_core::domain::job::{Job, JobStatus};
use conveyor_core::domain::step::{Step, StepStatus};
use conveyor_core::dto::job::{CreateJob, JobDetails};
use std::collections::HashMap;

use crate::config::Config;
use crate::id_resolver::resolve_job_id;

/// Job subcommands
#[derive(Subcommand)]
pub enum JobCommands {
    /// Create a job
    Create {
        /// Human-readable job name
        #[arg(long)]
        name: String,

        /// Job type
        #[arg(long = "type", default_value = "document")]
        job_type: String,

        /// Owner of the job
        #[arg(long)]
        owner: String,

        /// Step names in execution order (repeatable)
        #[arg(short, long = "step", required = true)]
        steps: Vec<String>,

        /// Initial input as JSON
        #[arg(short, long)]
        input: Option<String>,

        /// Metadata entries as key=value (repeatable)
        #[arg(short, long = "meta")]
        metadata: Vec<String>,
    },
    /// List all jobs
    List,
    /// Get job details
    Get {
        /// Job ID or unambiguous prefix
        id: String,
    },
    /// Cancel a pending or running job
    Cancel {
        /// Job ID or unambiguous prefix
        id: String,
    },
}

pub async fn handle_job_command(command: JobCommands, config: &Config) -> Result<()> {
    let client = ServerClient::new(config.server_url.clone());

    match command {
        JobCommands::Create {
            name,
            job_type,
            owner,
            steps,
            input,
            metadata,
        } => {
            let req = CreateJob {
                name,
                job_type,
                owner_id: owner,
                input: parse_input(input.as_deref())?,
                steps,
                metadata: parse_metadata(&metadata)?,
            };
            create_job(&client, req).await
        }
        JobCommands::List => list_jobs(&client).await,
        JobCommands::Get { id } => get_job(&client, &id).await,
        JobCommands::Cancel { id } => cancel_job(&client, &id).await,
    }
}

async fn create_job(client: &ServerClient, req: CreateJob) -> Result<()> {
    let job = client.create_job(req).await?;

    println!("{} Job created", "✓".green());
    println!("  ID: {}", job.id.cyan());
    Ok(())
}

async fn list_jobs(client: &ServerClient) -> Result<()> {
    let jobs = client.list_jobs().await?;

    if jobs.is_empty() {
        println!("{}", "No jobs found.".yellow());
    } else {
        println!("{}", format!("Found {} job(s):", jobs.len()).bold());
        println!();
        for job in jobs {
            print_job_summary(&job);
        }
    }

    Ok(())
}

async fn get_job(client: &ServerClient, id: &str) -> Result<()> {
    let id = resolve_job_id(client, id).await?;
    let details = match client.get_job(&id).await {
        Ok(details) => details,
        Err(e) if e.is_not_found() => return Err(anyhow!("Job {} not found", id)),
        Err(e) => return Err(e.into()),
    };

    print_job_details(&details);
    Ok(())
}

async fn cancel_job(client: &ServerClient, id: &str) -> Result<()> {
    let id = resolve_job_id(client, id).await?;
    let job = client.cancel_job(&id).await?;

    println!(
        "{} Job {} is now {}",
        "✓".green(),
        job.id.cyan(),
        colorize_status(job.status)
    );
    Ok(())
}

fn parse_input(input: Option<&str>) -> Result<serde_json::Value> {
    match input {
        Some(raw) => serde_json::from_str(raw).context("--input must be valid JSON"),
        None => Ok(serde_json::Value::Null),
    }
}

fn parse_metadata(entries: &[String]) -> Result<HashMap<String, serde_json::Value>> {
    entries
        .iter()
        .map(|entry| {
            let (key, value) = entry
                .split_once('=')
                .ok_or_else(|| anyhow!("metadata '{}' must be key=value", entry))?;
            // JSON values pass through; anything else is kept as a string
            let value = serde_json::from_str(value)
                .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
            Ok((key.to_string(), value))
        })
        .collect()
}

fn print_job_summary(job: &Job) {
    println!("  {} Job {} ({})", "▸".cyan(), job.id.dimmed(), job.name);
    println!("    Status:   {} {}%", colorize_status(job.status), job.progress);
    println!("    Created:  {}", job.created_at.format("%Y-%m-%d %H:%M:%S"));
    println!();
}

fn print_job_details(details: &JobDetails) {
    let job = &details.job;

    println!("{}", "Job Details:".bold());
    println!("  ID:        {}", job.id.cyan());
    println!("  Name:      {} ({})", job.name, job.job_type);
    println!("  Owner:     {}", job.owner_id);
    println!("  Status:    {} {}%", colorize_status(job.status), job.progress);
    println!("  Created:   {}", job.created_at.format("%Y-%m-%d %H:%M:%S"));
    if let Some(completed) = job.completed_at {
        println!("  Completed: {}", completed.format("%Y-%m-%d %H:%M:%S"));
    }
    if let Some(error) = &job.error_message {
        println!("  Error:     {}", error.red());
    }

    println!("\n{}", "Steps:".bold());
    for step in &details.steps {
        print_step(step);
    }
}

fn print_step(step: &Step) {
    let status = step.status.to_string();
    let status = match step.status {
        StepStatus::Pending => status.yellow(),
        StepStatus::Running => status.cyan(),
        StepStatus::Completed => status.green(),
        StepStatus::Failed => status.red(),
        StepStatus::Skipped => status.dimmed(),
    };

    println!("  {}. {:<20} {} {}%", step.order_index + 1, step.name, status, step.progress);
    if let Some(error) = &step.error_message {
        println!("     {}", error.red());
    }
}

/// Colorize job status for display
fn colorize_status(status: JobStatus) -> colored::ColoredString {
    let status_str = status.to_string();
    match status {
        JobStatus::Pending => status_str.yellow(),
        JobStatus::Running => status_str.cyan(),
        JobStatus::Completed => status_str.green(),
        JobStatus::Failed => status_str.red(),
        JobStatus::Cancelled => status_str.dimmed(),
    }
}
