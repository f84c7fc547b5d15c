use crate::config::MemFsConfig;
use crate::handle::MemFileOps;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use vfs_namei::{
    BackendInodeId, FileOps, FsNode, InodeMeta, InodeRef, Nameidata, NodeCapabilities,
    OpenIntent, VfsCred, VfsError, VfsErrorKind, VfsFileMode, VfsInode, VfsResult,
};

/// Allocation state shared by every node of one filesystem.
#[derive(Debug)]
pub(crate) struct MemFsState {
    pub(crate) config: MemFsConfig,
    next_ino: AtomicU64,
    inodes: AtomicU64,
    bytes: AtomicU64,
}

impl MemFsState {
    pub(crate) const ROOT_INO: u64 = 1;

    pub(crate) fn new(config: MemFsConfig) -> Self {
        Self {
            config,
            next_ino: AtomicU64::new(Self::ROOT_INO + 1),
            inodes: AtomicU64::new(1),
            bytes: AtomicU64::new(0),
        }
    }

    /// Take one unit of the inode quota and a fresh inode number.
    pub(crate) fn charge_inode(self: &Arc<Self>) -> VfsResult<InodeCharge> {
        let limit = self.config.max_inodes.unwrap_or(u64::MAX);
        self.inodes
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                (used < limit).then_some(used + 1)
            })
            .map_err(|_| VfsError::new(VfsErrorKind::Io, "memfs.max_inodes"))?;
        let raw = self.next_ino.fetch_add(1, Ordering::Relaxed);
        let Some(ino) = BackendInodeId::new(raw) else {
            self.inodes.fetch_sub(1, Ordering::AcqRel);
            return Err(VfsError::new(VfsErrorKind::Io, "memfs.ino"));
        };
        Ok(InodeCharge {
            state: self.clone(),
            ino,
        })
    }

    /// The charge held by the root directory, counted from the start.
    pub(crate) fn root_charge(self: &Arc<Self>) -> InodeCharge {
        InodeCharge {
            state: self.clone(),
            ino: BackendInodeId::new(Self::ROOT_INO).unwrap_or(BackendInodeId::MIN),
        }
    }

    /// Account for file data growing or shrinking by the given amounts.
    pub(crate) fn resize(&self, old_len: u64, new_len: u64) -> VfsResult<()> {
        if new_len <= old_len {
            self.release_bytes(old_len - new_len);
            return Ok(());
        }
        let grow = new_len - old_len;
        let limit = self.config.max_bytes.unwrap_or(u64::MAX);
        self.bytes
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                used.checked_add(grow).filter(|total| *total <= limit)
            })
            .map(drop)
            .map_err(|_| VfsError::new(VfsErrorKind::Io, "memfs.max_bytes"))
    }

    pub(crate) fn release_bytes(&self, len: u64) {
        self.bytes.fetch_sub(len, Ordering::AcqRel);
    }

    pub(crate) fn bytes_used(&self) -> u64 {
        self.bytes.load(Ordering::Acquire)
    }

    pub(crate) fn inodes_used(&self) -> u64 {
        self.inodes.load(Ordering::Acquire)
    }
}

/// One unit of the inode quota, held by the node it was charged for and
/// given back when that node is destroyed.
#[derive(Debug)]
pub(crate) struct InodeCharge {
    state: Arc<MemFsState>,
    ino: BackendInodeId,
}

impl InodeCharge {
    pub(crate) fn ino(&self) -> BackendInodeId {
        self.ino
    }

    pub(crate) fn state(&self) -> &Arc<MemFsState> {
        &self.state
    }
}

impl Drop for InodeCharge {
    fn drop(&mut self) {
        self.state.inodes.fetch_sub(1, Ordering::AcqRel);
    }
}

pub(crate) struct MemDir {
    charge: InodeCharge,
    /// The root directory is its own parent.
    parent: Weak<VfsInode>,
    children: RwLock<BTreeMap<Vec<u8>, Arc<VfsInode>>>,
}

impl MemDir {
    pub(crate) fn new(charge: InodeCharge, parent: Weak<VfsInode>) -> Self {
        Self {
            charge,
            parent,
            children: RwLock::new(BTreeMap::new()),
        }
    }

    pub(crate) fn state(&self) -> &Arc<MemFsState> {
        self.charge.state()
    }

    /// Whether `name` could be linked here right now.
    pub(crate) fn check_free(&self, name: &[u8]) -> VfsResult<()> {
        if name.is_empty() || name == b"." || name == b".." || name.contains(&b'/') {
            return Err(VfsError::new(VfsErrorKind::InvalidArgument, "memfs.name"));
        }
        if self.children.read().contains_key(name) {
            return Err(VfsError::new(VfsErrorKind::AlreadyExists, "memfs.insert"));
        }
        Ok(())
    }

    /// Link `child` under `name`. On failure `child` is dropped, which gives
    /// its quota back unless someone else still holds it.
    pub(crate) fn insert(&self, name: &[u8], child: Arc<VfsInode>) -> VfsResult<()> {
        self.check_free(name)?;
        let mut children = self.children.write();
        if children.contains_key(name) {
            return Err(VfsError::new(VfsErrorKind::AlreadyExists, "memfs.insert"));
        }
        children.insert(name.to_vec(), child);
        Ok(())
    }

    pub(crate) fn remove(&self, name: &[u8]) -> Option<Arc<VfsInode>> {
        self.children.write().remove(name)
    }

    pub(crate) fn names(&self) -> Vec<Vec<u8>> {
        self.children.read().keys().cloned().collect()
    }
}

impl FsNode for MemDir {
    fn capabilities(&self) -> NodeCapabilities {
        NodeCapabilities::LOOKUP | NodeCapabilities::CREATE
    }

    fn lookup(&self, dir: &InodeRef, name: &[u8]) -> VfsResult<InodeRef> {
        match name {
            b"." => Ok(dir.clone()),
            b".." => self
                .parent
                .upgrade()
                .map(InodeRef::new)
                .ok_or_else(|| VfsError::new(VfsErrorKind::NotFound, "memfs.lookup.parent")),
            _ => self
                .children
                .read()
                .get(name)
                .cloned()
                .map(InodeRef::new)
                .ok_or_else(|| VfsError::new(VfsErrorKind::NotFound, "memfs.lookup")),
        }
    }

    fn create(
        &self,
        dir: &InodeRef,
        name: &[u8],
        mode: VfsFileMode,
        cred: &VfsCred,
    ) -> VfsResult<InodeRef> {
        self.check_free(name)?;
        let charge = self.state().charge_inode()?;
        let inode = VfsInode::new(
            dir.superblock(),
            charge.ino(),
            InodeMeta::new(mode, cred.euid, cred.egid),
            MemFile::new(charge, Vec::new()),
        );
        self.insert(name, inode.clone())?;
        Ok(InodeRef::new(inode))
    }
}

/// Regular file. `data` must already be charged to the byte quota; it is
/// refunded when the contents are dropped.
pub(crate) struct MemFile {
    _charge: InodeCharge,
    ops: Arc<MemFileOps>,
}

impl MemFile {
    pub(crate) fn new(charge: InodeCharge, data: Vec<u8>) -> Self {
        Self {
            ops: Arc::new(MemFileOps::new(charge.state().clone(), data)),
            _charge: charge,
        }
    }

    pub(crate) fn ops(&self) -> &Arc<MemFileOps> {
        &self.ops
    }
}

impl FsNode for MemFile {
    fn capabilities(&self) -> NodeCapabilities {
        NodeCapabilities::TRUNCATE
    }

    fn truncate(&self, inode: &VfsInode) -> VfsResult<()> {
        self.ops.truncate()?;
        inode.set_size(0);
        Ok(())
    }

    fn file_ops(&self) -> Option<Arc<dyn FileOps>> {
        Some(self.ops.clone())
    }
}

pub(crate) struct MemSymlink {
    _charge: InodeCharge,
    target: Vec<u8>,
}

impl MemSymlink {
    pub(crate) fn new(charge: InodeCharge, target: Vec<u8>) -> Self {
        Self {
            _charge: charge,
            target,
        }
    }
}

impl FsNode for MemSymlink {
    fn capabilities(&self) -> NodeCapabilities {
        NodeCapabilities::FOLLOW_LINK
    }

    /// Relative targets resolve from the directory holding the link.
    fn follow_link(
        &self,
        nd: &mut Nameidata<'_>,
        dir: InodeRef,
        entry: InodeRef,
        intent: OpenIntent,
        mode: VfsFileMode,
    ) -> VfsResult<InodeRef> {
        drop(entry);
        if self.target.is_empty() {
            return Err(VfsError::new(VfsErrorKind::NotFound, "memfs.symlink.empty"));
        }
        nd.open_namei(&self.target, intent, mode.bits(), Some(dir))
    }
}

/// Character and block device nodes. Opening one succeeds subject to the
/// usual checks; there is no driver behind it.
pub(crate) struct MemSpecial {
    _charge: InodeCharge,
}

impl MemSpecial {
    pub(crate) fn new(charge: InodeCharge) -> Self {
        Self { _charge: charge }
    }
}

impl FsNode for MemSpecial {}
