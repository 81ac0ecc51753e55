//! ID resolver module
//!
//! Lets users pass a short, unambiguous prefix instead of a full job ID.

use anyhow::{Context, Result, anyhow};
use conveyor_client::ServerClient;

/// Full job IDs are hyphenated UUIDs
const FULL_ID_LEN: usize = 36;

/// Resolve a job ID or prefix to a full job ID
///
/// Full IDs are returned as-is. Otherwise all jobs are fetched and the single
/// one whose ID starts with the prefix is returned.
///
/// # Errors
/// Returns an error if no job or more than one job matches, or if the API
/// call fails
pub async fn resolve_job_id(client: &ServerClient, id_or_prefix: &str) -> Result<String> {
    if id_or_prefix.len() == FULL_ID_LEN {
        return Ok(id_or_prefix.to_string());
    }

    let jobs = client
        .list_jobs()
        .await
        .context("Failed to fetch jobs for ID resolution")?;

    match_prefix(jobs.iter().map(|j| j.id.as_str()), id_or_prefix)
}

fn match_prefix<'a>(ids: impl Iterator<Item = &'a str>, prefix: &str) -> Result<String> {
    let prefix = prefix.to_lowercase();
    let matches: Vec<&str> = ids
        .filter(|id| id.to_lowercase().starts_with(&prefix))
        .collect();

    match matches.as_slice() {
        [] => Err(anyhow!("No job found with ID starting with '{}'", prefix)),
        [id] => Ok(id.to_string()),
        _ => Err(anyhow!(
            "Ambiguous prefix '{}' matches multiple jobs: {}",
            prefix,
            matches.join(", ")
        )),
    }
}
