//! Object stores
//!
//! Transfers between providers and the local task directories:
//! - Local filesystem ([`LocalStore`])
//! - Cloud storage through gsutil ([`GsutilStore`])
//! - In-memory store for tests ([`MemoryStore`])

mod gsutil;
mod local;
mod memory;
mod registry;
mod traits;

pub use gsutil::*;
pub use local::*;
pub(crate) use local::walk_files;
pub use memory::*;
pub use registry::*;
pub use traits::*;
