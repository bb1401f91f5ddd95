//! Job coordination module
//!
//! Handles the life of a submitted job:
//! - Bounded-parallel dispatch of its tasks
//! - The per-task state machine
//! - Waiting, cancellation and result aggregation
//! - Task log upload

mod job;
mod result;

pub use job::*;
pub use result::*;
