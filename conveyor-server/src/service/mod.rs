//! Service Module
//!
//! Business logic layer for the server.

pub mod job;

pub use job as job_service;
