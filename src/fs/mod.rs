//! File System Module
//!
//! Filesystem probing is a collaborator of the device layer: the search
//! command and the wildcard translator ask an [`FsProbe`] what a device
//! holds. [`InMemoryFs`] is the implementation used by the CLI and tests.

pub mod types;
pub mod in_memory_fs;

pub use types::*;
pub use in_memory_fs::InMemoryFs;
