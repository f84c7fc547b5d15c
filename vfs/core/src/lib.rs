//! Pathname resolution, `open` and per-process descriptor tables for a small
//! POSIX-style virtual filesystem layer.
//!
//! Storage backends plug in through [`FsNode`]; everything above them (name
//! lookup, link following, permission checks, mount crossing, open-file
//! objects, descriptor tables) lives here.

pub mod context;
mod error;
pub mod fd_table;
pub mod file;
pub mod flags;
pub mod ids;
pub mod inode;
pub mod mode;
pub mod mount;
pub mod node;
mod open;
pub mod path_walker;
pub mod perm;
pub mod process;
mod vfs;

pub use context::{VfsConfig, VfsContext, VfsCred, VfsGid, VfsUid};
pub use error::{VfsError, VfsErrorKind, VfsResult};
pub use fd_table::{FcntlCmd, FdTable};
pub use file::{FileRef, FileSlot, FileTable, OpenFile};
pub use flags::{AccessMask, FdFlags, OpenFlags, OpenIntent};
pub use ids::{BackendInodeId, MountId, Pid, RawFd, VfsInodeId};
pub use inode::{InodeMeta, InodeRef, MountFlags, Superblock, VfsInode};
pub use mode::{VfsFileMode, VfsFileType};
pub use node::{FileOps, FsNode, NodeCapabilities};
pub use path_walker::{Nameidata, ResolvedPath};
pub use process::{FsContext, Mapping, Process, ProcessImage, ProcessRegistry, ProcessTable};
pub use vfs::{Vfs, VfsStat};
