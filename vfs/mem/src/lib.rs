//! In-memory filesystem backend.
//!
//! Directories, regular files, symbolic links and device nodes live entirely
//! in memory. Each [`MemFs`] is one mountable filesystem with its own
//! superblock.

mod config;
mod fs;
mod handle;
mod node;

pub use config::MemFsConfig;
pub use fs::MemFs;
