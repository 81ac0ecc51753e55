//! Data Transfer Objects
//!
//! DTOs exchanged over the HTTP API (callers, workers) and over the observer
//! WebSocket protocol.

pub mod job;
pub mod observer;
