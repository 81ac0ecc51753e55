//! Pipeline layer
//!
//! Step handlers, the registry that maps step names to handlers, and the
//! executor that runs a job's steps in order.

pub mod executor;
pub mod handler;

pub use executor::{ExecutionError, ExecutionOutcome, PipelineExecutor};
pub use handler::{HandlerRegistry, StepContext, StepDescriptor, StepHandler};
