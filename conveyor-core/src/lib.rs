//! Conveyor Core
//!
//! Core types and abstractions shared by the Conveyor server and workers.
//!
//! This crate contains:
//! - Domain types: Jobs, Steps and the derived status snapshot
//! - Aggregation: the pure rules that derive a job's status from its steps
//! - DTOs: Data transfer objects for the HTTP API and the observer protocol

pub mod aggregate;
pub mod domain;
pub mod dto;
pub mod error;

pub use aggregate::{Aggregate, ProgressWeighting, aggregate, aggregate_with};
pub use error::TransitionError;
