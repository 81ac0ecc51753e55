//! Document ingestion handlers
//!
//! `extract_text` -> `chunk_text` -> `summarize` form the demo ingestion
//! pipeline. Each consumes the previous handler's JSON output.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::time::Duration;

use crate::pipeline::{StepContext, StepHandler};

/// Pulls `text` out of the job input and normalises whitespace
pub struct ExtractText;

#[async_trait]
impl StepHandler for ExtractText {
    async fn run(&self, _ctx: &StepContext, input: Value) -> Result<Value> {
        let raw = input
            .get("text")
            .and_then(Value::as_str)
            .context("input has no 'text' field")?;

        let text = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        if text.is_empty() {
            bail!("document is empty");
        }

        Ok(json!({
            "text": text,
            "characters": text.chars().count(),
        }))
    }
}

/// Splits text into chunks of at most `words_per_chunk` words
pub struct ChunkText {
    pub words_per_chunk: usize,
}

impl Default for ChunkText {
    fn default() -> Self {
        Self {
            words_per_chunk: 200,
        }
    }
}

#[async_trait]
impl StepHandler for ChunkText {
    async fn run(&self, _ctx: &StepContext, input: Value) -> Result<Value> {
        let text = input
            .get("text")
            .and_then(Value::as_str)
            .context("input has no 'text' field")?;

        let words: Vec<&str> = text.split_whitespace().collect();
        let chunks: Vec<String> = words
            .chunks(self.words_per_chunk.max(1))
            .map(|c| c.join(" "))
            .collect();

        Ok(json!({
            "count": chunks.len(),
            "chunks": chunks,
        }))
    }
}

/// Builds a summary from the leading sentence of every chunk
pub struct Summarize {
    pub max_chars: usize,
}

impl Default for Summarize {
    fn default() -> Self {
        Self { max_chars: 500 }
    }
}

#[async_trait]
impl StepHandler for Summarize {
    async fn run(&self, ctx: &StepContext, input: Value) -> Result<Value> {
        let chunks = input
            .get("chunks")
            .and_then(Value::as_array)
            .context("input has no 'chunks' array")?;

        let mut summary = String::new();
        for (i, chunk) in chunks.iter().enumerate() {
            let Some(chunk) = chunk.as_str() else {
                continue;
            };
            let lead = match chunk.find(['.', '!', '?']) {
                Some(end) => &chunk[..=end],
                None => chunk,
            };
            if !summary.is_empty() {
                summary.push(' ');
            }
            summary.push_str(lead.trim());

            let progress = ((i + 1) * 100 / chunks.len()) as i32;
            ctx.report_progress(progress, HashMap::new()).await?;

            if summary.chars().count() >= self.max_chars {
                break;
            }
        }

        let summary: String = summary.chars().take(self.max_chars).collect();
        Ok(json!({
            "summary": summary,
            "chunks": chunks.len(),
        }))
    }
}

/// Sleeps for `input.delay_ms` milliseconds and passes the input through
pub struct Delay;

#[async_trait]
impl StepHandler for Delay {
    async fn run(&self, ctx: &StepContext, input: Value) -> Result<Value> {
        let delay_ms = input.get("delay_ms").and_then(Value::as_u64).unwrap_or(0);
        let half = Duration::from_millis(delay_ms / 2);

        tokio::time::sleep(half).await;
        ctx.report_progress(50, HashMap::new()).await?;
        tokio::time::sleep(Duration::from_millis(delay_ms) - half).await;

        Ok(input)
    }
}
