//! Observer WebSocket infrastructure
//!
//! Connection registry, access policy, heartbeat task and the HTTP upgrade
//! handler.

pub mod access;
mod handler;
mod heartbeat;
pub mod registry;

pub use access::{AccessPolicy, Credentials, OwnerAccessPolicy};
pub use handler::ws_handler;
pub use heartbeat::start_heartbeat;
pub use registry::{AttachError, Attached, ConnectionRegistry, ConnectionState, RegistryConfig};
