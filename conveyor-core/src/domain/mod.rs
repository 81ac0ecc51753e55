//! Core domain types
//!
//! These types are shared between the server (persists and serves them) and
//! the workers (mutate them while executing a pipeline).

pub mod job;
pub mod snapshot;
pub mod step;
