//! Task definitions
//!
//! Parses tasks files and command-line parameter flags into task
//! descriptors. Everything here is a pure transform; nothing touches a store.

mod args;
mod builder;
mod parser;
mod range;

pub use args::*;
pub use builder::*;
pub use parser::*;
pub use range::*;
