//! Task executor module
//!
//! Handles the per-task lifecycle:
//! - Creating the task workspace
//! - Localizing inputs
//! - Running the command
//! - Delocalizing outputs
//! - Tracking execution state

mod delocalizer;
mod localizer;
mod runner;
mod state;
mod workspace;

pub use delocalizer::*;
pub use localizer::*;
pub use runner::*;
pub use state::*;
pub use workspace::*;
