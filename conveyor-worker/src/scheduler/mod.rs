//! Scheduler layer for the worker
//!
//! Claims queued jobs from the store and runs each one through the pipeline
//! executor, bounded by the configured parallelism.

pub mod poller;

pub use poller::JobPoller;
