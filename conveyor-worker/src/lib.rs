//! Conveyor Worker
//!
//! Claims queued jobs, runs their steps through registered handlers and
//! pushes status snapshots to the server after every step transition.
//!
//! Architecture:
//! - Configuration: settings from environment or defaults
//! - Pipeline: step handlers, handler registry, sequential executor
//! - Notify: best-effort snapshot delivery with retry and backoff
//! - Scheduler: queue polling and job lifecycle

pub mod config;
pub mod context;
pub mod handlers;
pub mod notify;
pub mod pipeline;
pub mod scheduler;

pub use config::Config;
pub use context::WorkerContext;
