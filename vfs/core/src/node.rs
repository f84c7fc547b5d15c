//! Backend-facing node interfaces.
//!
//! Each backend attaches one [`FsNode`] object to every inode it creates. The
//! object carries the backend's private state for that node and the
//! operations the resolver dispatches through it.

use crate::context::VfsCred;
use crate::file::OpenFile;
use crate::flags::{AccessMask, OpenIntent};
use crate::inode::{InodeRef, VfsInode};
use crate::mode::VfsFileMode;
use crate::path_walker::Nameidata;
use crate::{VfsError, VfsErrorKind, VfsResult};
use bitflags::bitflags;
use std::any::Any;
use std::sync::Arc;

bitflags! {
    /// Which optional node operations the resolver may call.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct NodeCapabilities: u32 {
        /// Directory: `lookup` works and the node can be traversed.
        const LOOKUP = 1 << 0;
        const CREATE = 1 << 1;
        /// Symbolic link: `follow_link` resolves it.
        const FOLLOW_LINK = 1 << 2;
        /// `permission` replaces the mode-bit check.
        const PERMISSION = 1 << 3;
        const TRUNCATE = 1 << 4;
    }
}

pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
}

impl<T> AsAny for T
where
    T: Any,
{
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Per-node operation table.
///
/// Every method has a default so a backend only implements what the node's
/// [`NodeCapabilities`] advertise.
pub trait FsNode: Send + Sync + 'static + AsAny {
    fn capabilities(&self) -> NodeCapabilities {
        NodeCapabilities::empty()
    }

    /// Look `name` up in the directory `dir` (the inode owning `self`).
    ///
    /// Backends resolve `.` and `..` themselves; the resolver only intercepts
    /// `..` at the process root and at mount roots.
    fn lookup(&self, _dir: &InodeRef, _name: &[u8]) -> VfsResult<InodeRef> {
        Err(VfsError::new(VfsErrorKind::NotADirectory, "node.lookup"))
    }

    /// Create a regular file `name` in `dir` with the fully computed `mode`.
    fn create(
        &self,
        _dir: &InodeRef,
        _name: &[u8],
        _mode: VfsFileMode,
        _cred: &VfsCred,
    ) -> VfsResult<InodeRef> {
        Err(VfsError::new(VfsErrorKind::NotSupported, "node.create"))
    }

    /// Resolve the link `entry` found in `dir`. Consumes both handles.
    ///
    /// Implementations usually hand their target to
    /// [`Nameidata::open_namei`] with `dir` as the base, passing `intent` and
    /// `mode` through so creation through a dangling link works.
    fn follow_link(
        &self,
        _nd: &mut Nameidata<'_>,
        dir: InodeRef,
        entry: InodeRef,
        _intent: OpenIntent,
        _mode: VfsFileMode,
    ) -> VfsResult<InodeRef> {
        drop(dir);
        Ok(entry)
    }

    /// Custom access check, consulted only with [`NodeCapabilities::PERMISSION`].
    fn permission(&self, _inode: &VfsInode, _cred: &VfsCred, _mask: AccessMask) -> bool {
        false
    }

    /// Drop the contents of a regular file (`O_TRUNC`).
    fn truncate(&self, inode: &VfsInode) -> VfsResult<()> {
        inode.set_size(0);
        Ok(())
    }

    /// File operations installed on open files of this node.
    fn file_ops(&self) -> Option<Arc<dyn FileOps>> {
        None
    }
}

/// Hooks invoked on an open file.
pub trait FileOps: Send + Sync + 'static {
    /// Called once after the open file object is built; an error aborts the open.
    fn open(&self, _file: &OpenFile) -> VfsResult<()> {
        Ok(())
    }

    fn read(&self, _file: &OpenFile, _pos: &mut u64, _buf: &mut [u8]) -> VfsResult<usize> {
        Err(VfsError::new(VfsErrorKind::InvalidArgument, "file.read"))
    }

    fn write(&self, _file: &OpenFile, _pos: &mut u64, _buf: &[u8]) -> VfsResult<usize> {
        Err(VfsError::new(VfsErrorKind::InvalidArgument, "file.write"))
    }

    /// Called when the last reference to the open file goes away.
    fn release(&self, _file: &OpenFile) {}
}
