//! Open file objects and the system-wide file table.

use crate::flags::{AccessMask, OpenFlags};
use crate::inode::InodeRef;
use crate::node::FileOps;
use crate::{VfsError, VfsErrorKind, VfsResult};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Bounded pool of open file objects shared by every process.
#[derive(Debug)]
pub struct FileTable {
    capacity: usize,
    in_use: AtomicUsize,
}

impl FileTable {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            capacity,
            in_use: AtomicUsize::new(0),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Acquire)
    }

    /// Reserve one entry. The reservation is returned when the slot drops.
    pub fn reserve(self: &Arc<Self>) -> VfsResult<FileSlot> {
        self.in_use
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                (used < self.capacity).then_some(used + 1)
            })
            .map_err(|_| VfsError::new(VfsErrorKind::NoFileTableSpace, "file_table.reserve"))?;
        Ok(FileSlot {
            table: self.clone(),
        })
    }
}

/// One reserved entry in a [`FileTable`].
#[derive(Debug)]
pub struct FileSlot {
    table: Arc<FileTable>,
}

impl Drop for FileSlot {
    fn drop(&mut self) {
        self.table.in_use.fetch_sub(1, Ordering::AcqRel);
    }
}

/// An open file: the target node plus per-open state shared by every
/// descriptor duplicated from the same `open`.
pub struct OpenFile {
    inode: InodeRef,
    access: AccessMask,
    flags: AtomicU32,
    offset: AtomicU64,
    read_ahead: AtomicBool,
    io_lock: Mutex<()>,
    ops: Option<Arc<dyn FileOps>>,
    _slot: FileSlot,
}

pub type FileRef = Arc<OpenFile>;

impl OpenFile {
    /// Build the open file for `inode` and run the node's `open` hook.
    ///
    /// `flags` are stored minus the open-time directives. If the hook fails
    /// the object is discarded without a `release` call, and the inode and
    /// slot are given back.
    pub fn open(inode: InodeRef, flags: OpenFlags, slot: FileSlot) -> VfsResult<FileRef> {
        let ops = inode.node().file_ops();
        let mut file = OpenFile {
            inode,
            access: AccessMask::from_access_mode(flags),
            flags: AtomicU32::new((flags - OpenFlags::ONE_SHOT).bits()),
            offset: AtomicU64::new(0),
            read_ahead: AtomicBool::new(false),
            io_lock: Mutex::new(()),
            ops: None,
            _slot: slot,
        };
        if let Some(ops) = ops {
            ops.open(&file)?;
            file.ops = Some(ops);
        }
        Ok(Arc::new(file))
    }

    pub fn inode(&self) -> &InodeRef {
        &self.inode
    }

    pub fn access(&self) -> AccessMask {
        self.access
    }

    pub fn flags(&self) -> OpenFlags {
        OpenFlags::from_bits_retain(self.flags.load(Ordering::Acquire))
    }

    /// Replace the `F_SETFL`-changeable bits, leaving the rest untouched.
    pub fn set_status_flags(&self, requested: OpenFlags) {
        let keep = self.flags() - OpenFlags::SETFL_MASK;
        let next = keep | (requested & OpenFlags::SETFL_MASK);
        self.flags.store(next.bits(), Ordering::Release);
    }

    pub fn offset(&self) -> u64 {
        self.offset.load(Ordering::Acquire)
    }

    pub fn set_offset(&self, offset: u64) {
        self.offset.store(offset, Ordering::Release);
    }

    pub fn read_ahead(&self) -> bool {
        self.read_ahead.load(Ordering::Relaxed)
    }

    pub fn set_read_ahead(&self, enabled: bool) {
        self.read_ahead.store(enabled, Ordering::Relaxed);
    }

    pub fn read(&self, buf: &mut [u8]) -> VfsResult<usize> {
        if !self.access.contains(AccessMask::READ) {
            return Err(VfsError::new(VfsErrorKind::BadFileDescriptor, "file.read.mode"));
        }
        let ops = self.require_ops("file.read")?;

        let _guard = self.io_lock.lock();
        let mut pos = self.offset();
        let read = ops.read(self, &mut pos, buf)?;
        self.set_offset(pos);
        Ok(read)
    }

    pub fn write(&self, buf: &[u8]) -> VfsResult<usize> {
        if !self.access.contains(AccessMask::WRITE) {
            return Err(VfsError::new(VfsErrorKind::BadFileDescriptor, "file.write.mode"));
        }
        let ops = self.require_ops("file.write")?;

        let _guard = self.io_lock.lock();
        let mut pos = if self.flags().contains(OpenFlags::APPEND) {
            self.inode.size()
        } else {
            self.offset()
        };
        let written = ops.write(self, &mut pos, buf)?;
        self.set_offset(pos);
        Ok(written)
    }

    fn require_ops(&self, context: &'static str) -> VfsResult<&Arc<dyn FileOps>> {
        self.ops
            .as_ref()
            .ok_or_else(|| VfsError::new(VfsErrorKind::InvalidArgument, context))
    }
}

impl Drop for OpenFile {
    fn drop(&mut self) {
        if let Some(ops) = self.ops.take() {
            ops.release(self);
        }
    }
}

impl fmt::Debug for OpenFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenFile")
            .field("inode", &self.inode)
            .field("access", &self.access)
            .field("flags", &self.flags())
            .field("offset", &self.offset())
            .finish_non_exhaustive()
    }
}
