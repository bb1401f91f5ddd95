//! Parameter location resolution
//!
//! Classifies raw parameter values by provider, validates them and computes
//! the in-task layout for file parameters.

mod path;
mod uri;

pub use path::*;
pub use uri::{directory_fmt, lexical_normalize, split_basename};
