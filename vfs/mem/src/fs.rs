use crate::config::MemFsConfig;
use crate::node::{MemDir, MemFile, MemFsState, MemSpecial, MemSymlink};
use std::sync::Arc;
use vfs_namei::{
    BackendInodeId, FsNode, InodeMeta, InodeRef, Superblock, VfsError, VfsErrorKind,
    VfsFileMode, VfsFileType, VfsInode, VfsResult,
};

/// One in-memory filesystem instance.
///
/// The seeding helpers (`mkdir`, `add_file`, ...) build a tree directly, with
/// no permission checks; they are how tests and callers lay out a
/// filesystem before resolving paths in it.
pub struct MemFs {
    sb: Arc<Superblock>,
    root: Arc<VfsInode>,
    state: Arc<MemFsState>,
}

impl Default for MemFs {
    fn default() -> Self {
        Self::new()
    }
}

impl MemFs {
    pub fn new() -> Self {
        Self::with_config(MemFsConfig::default())
    }

    pub fn with_config(config: MemFsConfig) -> Self {
        let root_ino = BackendInodeId::new(MemFsState::ROOT_INO).unwrap_or(BackendInodeId::MIN);
        let sb = Superblock::new(config.mount_flags, root_ino);
        let meta = InodeMeta::new(
            VfsFileMode::new(VfsFileType::Directory, config.root_perm),
            config.root_uid,
            config.root_gid,
        );
        let state = Arc::new(MemFsState::new(config));
        let root = VfsInode::new_cyclic(&sb, root_ino, meta, |this| {
            MemDir::new(state.root_charge(), this.clone())
        });
        Self { sb, root, state }
    }

    pub fn superblock(&self) -> &Arc<Superblock> {
        &self.sb
    }

    pub fn config(&self) -> &MemFsConfig {
        &self.state.config
    }

    /// A counted handle on the root directory.
    pub fn root(&self) -> InodeRef {
        InodeRef::new(self.root.clone())
    }

    pub fn mkdir(
        &self,
        parent: &InodeRef,
        name: &[u8],
        perm: u32,
        uid: u32,
        gid: u32,
    ) -> VfsResult<InodeRef> {
        let dir = self.dir(parent)?;
        dir.check_free(name)?;
        let charge = self.state.charge_inode()?;
        let meta = InodeMeta::new(VfsFileMode::new(VfsFileType::Directory, perm), uid, gid);
        let inode = VfsInode::new(
            &self.sb,
            charge.ino(),
            meta,
            MemDir::new(charge, Arc::downgrade(parent.inode())),
        );
        self.link(dir, name, inode)
    }

    pub fn add_file(
        &self,
        parent: &InodeRef,
        name: &[u8],
        perm: u32,
        uid: u32,
        gid: u32,
        contents: &[u8],
    ) -> VfsResult<InodeRef> {
        let dir = self.dir(parent)?;
        dir.check_free(name)?;
        let charge = self.state.charge_inode()?;
        self.state.resize(0, contents.len() as u64)?;
        // From here on the file owns both charges and refunds them if linking fails.
        let mut meta = InodeMeta::new(VfsFileMode::new(VfsFileType::RegularFile, perm), uid, gid);
        meta.size = contents.len() as u64;
        let inode = VfsInode::new(
            &self.sb,
            charge.ino(),
            meta,
            MemFile::new(charge, contents.to_vec()),
        );
        self.link(dir, name, inode)
    }

    pub fn symlink(&self, parent: &InodeRef, name: &[u8], target: &[u8]) -> VfsResult<InodeRef> {
        let dir = self.dir(parent)?;
        dir.check_free(name)?;
        let charge = self.state.charge_inode()?;
        let mut meta = InodeMeta::new(VfsFileMode::new(VfsFileType::Symlink, 0o777), 0, 0);
        meta.size = target.len() as u64;
        let inode = VfsInode::new(
            &self.sb,
            charge.ino(),
            meta,
            MemSymlink::new(charge, target.to_vec()),
        );
        self.link(dir, name, inode)
    }

    /// Create a character or block device node.
    pub fn mknod(
        &self,
        parent: &InodeRef,
        name: &[u8],
        file_type: VfsFileType,
        perm: u32,
    ) -> VfsResult<InodeRef> {
        if !matches!(file_type, VfsFileType::CharDevice | VfsFileType::BlockDevice) {
            return Err(VfsError::new(VfsErrorKind::InvalidArgument, "memfs.mknod.type"));
        }
        let dir = self.dir(parent)?;
        dir.check_free(name)?;
        let charge = self.state.charge_inode()?;
        let meta = InodeMeta::new(VfsFileMode::new(file_type, perm), 0, 0);
        let inode = VfsInode::new(&self.sb, charge.ino(), meta, MemSpecial::new(charge));
        self.link(dir, name, inode)
    }

    /// Remove `name` from `parent`. Nodes still held elsewhere stay alive and
    /// keep their quota until the last holder lets go.
    pub fn unlink(&self, parent: &InodeRef, name: &[u8]) -> VfsResult<()> {
        self.dir(parent)?
            .remove(name)
            .map(drop)
            .ok_or_else(|| VfsError::new(VfsErrorKind::NotFound, "memfs.unlink"))
    }

    /// Entry names of `dir`, sorted.
    pub fn list(&self, dir: &InodeRef) -> VfsResult<Vec<Vec<u8>>> {
        Ok(self.dir(dir)?.names())
    }

    /// Current contents of a regular file.
    pub fn contents(&self, file: &InodeRef) -> VfsResult<Vec<u8>> {
        Ok(Self::file(file)?.ops().contents())
    }

    /// Number of open files on a regular file (opened and not yet released).
    pub fn open_count(&self, file: &InodeRef) -> VfsResult<usize> {
        Ok(Self::file(file)?.ops().open_files())
    }

    pub fn bytes_used(&self) -> u64 {
        self.state.bytes_used()
    }

    pub fn inodes_used(&self) -> u64 {
        self.state.inodes_used()
    }

    fn dir<'a>(&self, inode: &'a InodeRef) -> VfsResult<&'a MemDir> {
        if !Arc::ptr_eq(inode.superblock(), &self.sb) {
            return Err(VfsError::new(VfsErrorKind::InvalidArgument, "memfs.foreign_node"));
        }
        downcast::<MemDir>(inode)
            .ok_or_else(|| VfsError::new(VfsErrorKind::NotADirectory, "memfs.dir"))
    }

    fn file(inode: &InodeRef) -> VfsResult<&MemFile> {
        downcast::<MemFile>(inode)
            .ok_or_else(|| VfsError::new(VfsErrorKind::InvalidArgument, "memfs.not_regular"))
    }

    fn link(&self, dir: &MemDir, name: &[u8], inode: Arc<VfsInode>) -> VfsResult<InodeRef> {
        dir.insert(name, inode.clone())?;
        Ok(InodeRef::new(inode))
    }
}

fn downcast<T: FsNode>(inode: &InodeRef) -> Option<&T> {
    inode.node().as_any().downcast_ref::<T>()
}

impl std::fmt::Debug for MemFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemFs")
            .field("sb", &self.sb)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
