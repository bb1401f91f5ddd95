//! Type definitions for batchwork
//!
//! This module contains the data model shared by the parser, the executor
//! and the coordinator: locations, parameter bindings and task descriptors.

mod location;
mod param;
mod task;

pub use location::*;
pub use param::*;
pub use task::*;
