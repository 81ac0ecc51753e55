//! Conveyor Server
//!
//! Serves the job lifecycle API, accepts snapshots from workers on the
//! internal push bridge and fans them out to observer WebSockets.

pub mod api;
pub mod config;
pub mod service;
pub mod state;
pub mod ws;

pub use api::create_router;
pub use config::Config;
pub use state::AppState;
