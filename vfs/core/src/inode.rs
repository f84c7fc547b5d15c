//! In-core inodes, counted inode handles and superblocks.
//!
//! A [`VfsInode`] is created by a backend and kept alive by the backend's own
//! directory structures through plain `Arc`s. Everyone else holds an
//! [`InodeRef`]: constructing or cloning one bumps the inode's use count and
//! dropping it releases the count again, so every exit path of the resolver
//! releases exactly what it acquired.

use crate::context::{VfsGid, VfsUid};
use crate::ids::{BackendInodeId, MountId, VfsInodeId, make_vfs_inode};
use crate::mode::{VfsFileMode, VfsFileType};
use crate::node::{FsNode, NodeCapabilities};
use bitflags::bitflags;
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct MountFlags: u32 {
        const READ_ONLY = 1 << 0;
        /// Device special files on this mount may not be opened.
        const NODEV = 1 << 2;
    }
}

/// Per-mount state shared by every inode of one filesystem instance.
pub struct Superblock {
    id: MountId,
    flags: MountFlags,
    root_ino: BackendInodeId,
    /// Directory this filesystem is mounted on (`None` for the root filesystem
    /// or a detached one).
    covered: Mutex<Option<InodeRef>>,
}

impl Superblock {
    pub fn new(flags: MountFlags, root_ino: BackendInodeId) -> Arc<Self> {
        Arc::new(Self {
            id: MountId::next(),
            flags,
            root_ino,
            covered: Mutex::new(None),
        })
    }

    pub fn id(&self) -> MountId {
        self.id
    }

    pub fn flags(&self) -> MountFlags {
        self.flags
    }

    pub fn root_ino(&self) -> BackendInodeId {
        self.root_ino
    }

    pub fn is_read_only(&self) -> bool {
        self.flags.contains(MountFlags::READ_ONLY)
    }

    pub fn is_nodev(&self) -> bool {
        self.flags.contains(MountFlags::NODEV)
    }

    /// A fresh handle on the covered directory, if mounted.
    pub fn covered(&self) -> Option<InodeRef> {
        self.covered.lock().clone()
    }

    pub(crate) fn set_covered(&self, dir: Option<InodeRef>) -> Option<InodeRef> {
        std::mem::replace(&mut *self.covered.lock(), dir)
    }
}

impl fmt::Debug for Superblock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Superblock")
            .field("id", &self.id)
            .field("flags", &self.flags)
            .field("root_ino", &self.root_ino)
            .finish_non_exhaustive()
    }
}

/// Attributes the resolver inspects.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InodeMeta {
    pub mode: VfsFileMode,
    pub uid: VfsUid,
    pub gid: VfsGid,
    pub size: u64,
}

impl InodeMeta {
    pub fn new(mode: VfsFileMode, uid: VfsUid, gid: VfsGid) -> Self {
        Self {
            mode,
            uid,
            gid,
            size: 0,
        }
    }
}

pub struct VfsInode {
    id: VfsInodeId,
    sb: Arc<Superblock>,
    meta: RwLock<InodeMeta>,
    count: AtomicUsize,
    /// Serializes check-then-create on this directory.
    dir_lock: Mutex<()>,
    /// Root of the filesystem mounted on this directory.
    mounted: Mutex<Option<InodeRef>>,
    node: Box<dyn FsNode>,
}

impl VfsInode {
    pub fn new(
        sb: &Arc<Superblock>,
        ino: BackendInodeId,
        meta: InodeMeta,
        node: impl FsNode,
    ) -> Arc<Self> {
        Arc::new(Self::build(sb, ino, meta, Box::new(node)))
    }

    /// Like [`VfsInode::new`], for backends whose node state needs a weak
    /// reference to its own inode (e.g. a root directory that is its own parent).
    pub fn new_cyclic<N, F>(
        sb: &Arc<Superblock>,
        ino: BackendInodeId,
        meta: InodeMeta,
        f: F,
    ) -> Arc<Self>
    where
        N: FsNode,
        F: FnOnce(&std::sync::Weak<VfsInode>) -> N,
    {
        Arc::new_cyclic(|weak| Self::build(sb, ino, meta, Box::new(f(weak))))
    }

    fn build(
        sb: &Arc<Superblock>,
        ino: BackendInodeId,
        meta: InodeMeta,
        node: Box<dyn FsNode>,
    ) -> Self {
        Self {
            id: make_vfs_inode(sb.id(), ino),
            sb: sb.clone(),
            meta: RwLock::new(meta),
            count: AtomicUsize::new(0),
            dir_lock: Mutex::new(()),
            mounted: Mutex::new(None),
            node,
        }
    }

    pub fn id(&self) -> VfsInodeId {
        self.id
    }

    pub fn ino(&self) -> BackendInodeId {
        self.id.backend
    }

    pub fn superblock(&self) -> &Arc<Superblock> {
        &self.sb
    }

    pub fn node(&self) -> &dyn FsNode {
        &*self.node
    }

    pub fn capabilities(&self) -> NodeCapabilities {
        self.node.capabilities()
    }

    pub fn meta(&self) -> InodeMeta {
        *self.meta.read()
    }

    pub fn mode(&self) -> VfsFileMode {
        self.meta.read().mode
    }

    pub fn file_type(&self) -> VfsFileType {
        self.mode().file_type()
    }

    pub fn uid(&self) -> VfsUid {
        self.meta.read().uid
    }

    pub fn gid(&self) -> VfsGid {
        self.meta.read().gid
    }

    pub fn size(&self) -> u64 {
        self.meta.read().size
    }

    pub fn set_perm(&self, perm: u32) {
        let mut meta = self.meta.write();
        meta.mode = VfsFileMode::new(meta.mode.file_type(), perm);
    }

    pub fn set_size(&self, size: u64) {
        self.meta.write().size = size;
    }

    /// Number of live [`InodeRef`]s.
    pub fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    pub fn is_read_only(&self) -> bool {
        self.sb.is_read_only()
    }

    /// True for the root directory of its filesystem.
    pub fn is_mount_root(&self) -> bool {
        self.id.backend == self.sb.root_ino()
    }

    /// Root of the filesystem mounted here, if any.
    pub fn mounted(&self) -> Option<InodeRef> {
        self.mounted.lock().clone()
    }

    pub fn is_mountpoint(&self) -> bool {
        self.mounted.lock().is_some()
    }

    pub(crate) fn set_mounted(&self, root: Option<InodeRef>) -> Option<InodeRef> {
        std::mem::replace(&mut *self.mounted.lock(), root)
    }

    /// Directory-level mutual exclusion for lookup+create.
    pub fn lock_dir(&self) -> MutexGuard<'_, ()> {
        self.dir_lock.lock()
    }
}

impl fmt::Debug for VfsInode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VfsInode")
            .field("id", &self.id)
            .field("meta", &self.meta())
            .field("count", &self.count())
            .finish_non_exhaustive()
    }
}

/// Counted handle on a [`VfsInode`].
pub struct InodeRef(Arc<VfsInode>);

impl InodeRef {
    /// Take a counted reference on `inode`.
    pub fn new(inode: Arc<VfsInode>) -> Self {
        inode.count.fetch_add(1, Ordering::AcqRel);
        Self(inode)
    }

    pub fn same(a: &InodeRef, b: &InodeRef) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    pub fn is(&self, inode: &Arc<VfsInode>) -> bool {
        Arc::ptr_eq(&self.0, inode)
    }

    pub fn inode(&self) -> &Arc<VfsInode> {
        &self.0
    }

    /// Step onto the root of whatever is mounted here (repeatedly, for
    /// stacked mounts), releasing the covered directory.
    pub fn follow_mount(self) -> InodeRef {
        let mut current = self;
        while let Some(root) = current.mounted() {
            current = root;
        }
        current
    }
}

impl Clone for InodeRef {
    fn clone(&self) -> Self {
        InodeRef::new(self.0.clone())
    }
}

impl Drop for InodeRef {
    fn drop(&mut self) {
        let prev = self.0.count.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "inode {:?} released more often than acquired", self.0.id);
    }
}

impl Deref for InodeRef {
    type Target = VfsInode;

    fn deref(&self) -> &VfsInode {
        &self.0
    }
}

impl fmt::Debug for InodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("InodeRef").field(&self.0.id).finish()
    }
}
