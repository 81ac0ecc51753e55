//! Built-in step handlers

mod ingest;

pub use ingest::{ChunkText, Delay, ExtractText, Summarize};

use std::sync::Arc;

use crate::pipeline::HandlerRegistry;

/// Registers the document ingestion handlers and `delay`
pub fn register_builtin(registry: &mut HandlerRegistry) {
    registry.register("extract_text", Arc::new(ExtractText));
    registry.register("chunk_text", Arc::new(ChunkText::default()));
    registry.register("summarize", Arc::new(Summarize::default()));
    registry.register("delay", Arc::new(Delay));
}
