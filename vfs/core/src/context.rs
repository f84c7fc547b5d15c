use crate::inode::InodeRef;
use crate::process::ProcessRegistry;
use smallvec::SmallVec;
use std::sync::Arc;

pub type VfsUid = u32;
pub type VfsGid = u32;

#[derive(Clone, Debug)]
pub struct VfsConfig {
    /// Maximum nesting of symbolic link resolution.
    pub max_symlinks: u16,
    pub max_path_len: usize,
    pub max_name_len: usize,
    /// Per-process descriptor table capacity.
    pub max_fds: usize,
    /// System-wide open file object capacity.
    pub max_files: usize,
}

impl Default for VfsConfig {
    fn default() -> Self {
        Self {
            max_symlinks: 8,
            max_path_len: 4096,
            max_name_len: 255,
            max_fds: 256,
            max_files: 1024,
        }
    }
}

/// Identity of the acting principal.
#[derive(Clone, Debug)]
pub struct VfsCred {
    pub uid: VfsUid,
    pub euid: VfsUid,
    pub gid: VfsGid,
    pub egid: VfsGid,
    pub groups: SmallVec<[VfsGid; 8]>,
    pub umask: u32,
}

impl VfsCred {
    pub fn root() -> Self {
        Self::user(0, 0)
    }

    pub fn user(uid: VfsUid, gid: VfsGid) -> Self {
        Self {
            uid,
            euid: uid,
            gid,
            egid: gid,
            groups: SmallVec::new(),
            umask: 0o022,
        }
    }

    pub fn with_umask(mut self, umask: u32) -> Self {
        self.umask = umask & 0o777;
        self
    }

    pub fn with_groups(mut self, groups: impl IntoIterator<Item = VfsGid>) -> Self {
        self.groups = groups.into_iter().collect();
        self
    }

    pub fn is_superuser(&self) -> bool {
        self.euid == 0
    }

    pub fn in_group(&self, gid: VfsGid) -> bool {
        self.egid == gid || self.groups.contains(&gid)
    }
}

/// Per-call context: who is acting, where `/` and `.` are, and which
/// processes to consult for text-busy checks.
#[derive(Clone)]
pub struct VfsContext {
    pub cred: VfsCred,
    pub root: InodeRef,
    pub cwd: InodeRef,
    pub config: Arc<VfsConfig>,
    pub registry: Arc<dyn ProcessRegistry>,
}

impl VfsContext {
    pub fn new(
        cred: VfsCred,
        root: InodeRef,
        cwd: InodeRef,
        config: Arc<VfsConfig>,
        registry: Arc<dyn ProcessRegistry>,
    ) -> Self {
        Self {
            cred,
            root,
            cwd,
            config,
            registry,
        }
    }
}
