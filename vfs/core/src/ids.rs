//! Core identifier types.

use core::num::{NonZeroU32, NonZeroU64};
use std::sync::atomic::{AtomicU32, Ordering};

/// One per superblock. Allocated from a process-wide counter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct MountId(NonZeroU32);

static NEXT_MOUNT_ID: AtomicU32 = AtomicU32::new(1);

impl MountId {
    #[inline]
    pub fn new(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }

    pub fn next() -> Self {
        let raw = NEXT_MOUNT_ID.fetch_add(1, Ordering::Relaxed);
        Self(NonZeroU32::new(raw).unwrap_or(NonZeroU32::MIN))
    }

    #[inline]
    pub fn get(self) -> u32 {
        self.0.get()
    }
}

/// Inode number chosen by the backend; unique within its superblock.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct BackendInodeId(NonZeroU64);

impl BackendInodeId {
    pub const MIN: Self = Self(NonZeroU64::MIN);

    #[inline]
    pub fn new(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    #[inline]
    pub fn get(self) -> u64 {
        self.0.get()
    }
}

/// Inode identity across mounts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VfsInodeId {
    pub mount: MountId,
    pub backend: BackendInodeId,
}

#[inline]
pub fn make_vfs_inode(mount: MountId, backend: BackendInodeId) -> VfsInodeId {
    VfsInodeId { mount, backend }
}

/// Process identifier as seen by the process registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Pid(pub u32);

/// Per-process file descriptor number.
pub type RawFd = u32;
