//! Processes as far as the filesystem layer sees them.

use crate::context::{VfsConfig, VfsContext, VfsCred};
use crate::fd_table::FdTable;
use crate::ids::Pid;
use crate::inode::{InodeRef, VfsInode};
use parking_lot::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Answers whether a node is in use as program text by some process.
pub trait ProcessRegistry: Send + Sync {
    fn is_text_busy(&self, inode: &VfsInode) -> bool;
}

/// Root and working directory of a process.
#[derive(Debug, Clone)]
pub struct FsContext {
    pub root: InodeRef,
    pub cwd: InodeRef,
}

#[derive(Debug)]
pub struct Mapping {
    pub inode: InodeRef,
    pub writable: bool,
}

/// The running program and its file-backed mappings.
#[derive(Debug, Default)]
pub struct ProcessImage {
    pub executable: Option<InodeRef>,
    pub mappings: Vec<Mapping>,
}

impl ProcessImage {
    /// True if `inode` is the executable or backs a read-only mapping.
    pub fn uses_as_text(&self, inode: &VfsInode) -> bool {
        let same = |held: &InodeRef| std::ptr::eq(held.inode().as_ref(), inode);
        self.executable.as_ref().is_some_and(same)
            || self
                .mappings
                .iter()
                .any(|mapping| !mapping.writable && same(&mapping.inode))
    }
}

#[derive(Debug)]
pub struct Process {
    pid: Pid,
    cred: RwLock<VfsCred>,
    fs: RwLock<FsContext>,
    files: Mutex<FdTable>,
    image: RwLock<ProcessImage>,
}

impl Process {
    pub fn new(pid: Pid, cred: VfsCred, fs: FsContext, max_fds: usize) -> Self {
        Self {
            pid,
            cred: RwLock::new(cred),
            fs: RwLock::new(fs),
            files: Mutex::new(FdTable::new(max_fds)),
            image: RwLock::new(ProcessImage::default()),
        }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn cred(&self) -> VfsCred {
        self.cred.read().clone()
    }

    pub fn fs(&self) -> FsContext {
        self.fs.read().clone()
    }

    pub fn files(&self) -> MutexGuard<'_, FdTable> {
        self.files.lock()
    }

    pub fn image(&self) -> RwLockReadGuard<'_, ProcessImage> {
        self.image.read()
    }

    pub fn image_mut(&self) -> RwLockWriteGuard<'_, ProcessImage> {
        self.image.write()
    }

    /// Resolution context acting as this process.
    pub fn context(
        &self,
        config: Arc<VfsConfig>,
        registry: Arc<dyn ProcessRegistry>,
    ) -> VfsContext {
        let FsContext { root, cwd } = self.fs();
        VfsContext::new(self.cred(), root, cwd, config, registry)
    }
}

/// The set of running processes.
#[derive(Debug)]
pub struct ProcessTable {
    next_pid: AtomicU32,
    procs: RwLock<BTreeMap<Pid, Arc<Process>>>,
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self {
            next_pid: AtomicU32::new(1),
            procs: RwLock::new(BTreeMap::new()),
        }
    }
}

impl ProcessTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate_pid(&self) -> Pid {
        Pid(self.next_pid.fetch_add(1, Ordering::Relaxed))
    }

    pub fn insert(&self, process: Arc<Process>) {
        self.procs.write().insert(process.pid(), process);
    }

    pub fn remove(&self, pid: Pid) -> Option<Arc<Process>> {
        self.procs.write().remove(&pid)
    }

    pub fn get(&self, pid: Pid) -> Option<Arc<Process>> {
        self.procs.read().get(&pid).cloned()
    }

    pub fn len(&self) -> usize {
        self.procs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.procs.read().is_empty()
    }
}

impl ProcessRegistry for ProcessTable {
    fn is_text_busy(&self, inode: &VfsInode) -> bool {
        self.procs
            .read()
            .values()
            .any(|process| process.image().uses_as_text(inode))
    }
}
