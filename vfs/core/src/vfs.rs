//! System-call level entry points.

use crate::context::{VfsConfig, VfsContext, VfsCred, VfsGid, VfsUid};
use crate::fd_table::FcntlCmd;
use crate::file::{FileRef, FileTable, OpenFile};
use crate::flags::{AccessMask, OpenFlags, OpenIntent};
use crate::ids::{RawFd, VfsInodeId};
use crate::inode::InodeRef;
use crate::mode::{VfsFileMode, VfsFileType};
use crate::mount;
use crate::path_walker::Nameidata;
use crate::perm::check_permission;
use crate::process::{FsContext, Mapping, Process, ProcessImage, ProcessTable};
use crate::{VfsError, VfsErrorKind, VfsResult};
use std::sync::Arc;

/// Attributes reported by [`Vfs::fstat`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VfsStat {
    pub inode: VfsInodeId,
    pub file_type: VfsFileType,
    pub mode: VfsFileMode,
    pub uid: VfsUid,
    pub gid: VfsGid,
    pub size: u64,
}

pub struct Vfs {
    config: Arc<VfsConfig>,
    files: Arc<FileTable>,
    processes: Arc<ProcessTable>,
}

impl Vfs {
    pub fn new(config: VfsConfig) -> Self {
        let files = FileTable::new(config.max_files);
        Self {
            config: Arc::new(config),
            files,
            processes: Arc::new(ProcessTable::new()),
        }
    }

    pub fn config(&self) -> &Arc<VfsConfig> {
        &self.config
    }

    pub fn file_table(&self) -> &Arc<FileTable> {
        &self.files
    }

    pub fn processes(&self) -> &Arc<ProcessTable> {
        &self.processes
    }

    /// Resolution context for calls made by `proc`.
    pub fn context(&self, proc: &Process) -> VfsContext {
        proc.context(self.config.clone(), self.processes.clone())
    }

    pub fn spawn(&self, cred: VfsCred, root: InodeRef, cwd: InodeRef) -> Arc<Process> {
        let pid = self.processes.allocate_pid();
        let process = Arc::new(Process::new(
            pid,
            cred,
            FsContext { root, cwd },
            self.config.max_fds,
        ));
        self.processes.insert(process.clone());
        tracing::debug!(?pid, "spawned");
        process
    }

    /// `open(2)`: resolve `path` and bind the result to the lowest free
    /// descriptor of `proc`.
    pub fn open(
        &self,
        proc: &Process,
        path: &[u8],
        flags: OpenFlags,
        mode: u32,
    ) -> VfsResult<RawFd> {
        let mut fds = proc.files();
        let fd = fds.allocate_slot()?;
        let slot = self.files.reserve()?;

        let ctx = self.context(proc);
        let intent = OpenIntent::from_open_flags(flags);
        let inode = Nameidata::new(&ctx)
            .open_namei(path, intent, mode, None)
            .inspect_err(|err| {
                tracing::debug!(
                    path = %String::from_utf8_lossy(path),
                    ?flags,
                    kind = err.kind().as_str(),
                    error = %err,
                    "open failed"
                );
            })?;

        let file = OpenFile::open(inode, flags, slot)?;
        tracing::debug!(
            pid = ?proc.pid(),
            fd,
            inode = ?file.inode().id(),
            path = %String::from_utf8_lossy(path),
            "opened"
        );
        fds.bind(fd, file);
        Ok(fd)
    }

    pub fn dup(&self, proc: &Process, fd: RawFd) -> VfsResult<RawFd> {
        proc.files().dup(fd, 0)
    }

    pub fn dup2(&self, proc: &Process, old_fd: RawFd, new_fd: RawFd) -> VfsResult<RawFd> {
        proc.files().dup2(old_fd, new_fd)
    }

    /// `fcntl(2)` with a raw command number. A bad descriptor is reported
    /// before an unknown command.
    pub fn fcntl(&self, proc: &Process, fd: RawFd, cmd: u32, arg: u32) -> VfsResult<u32> {
        let mut fds = proc.files();
        fds.get(fd)?;
        let cmd = FcntlCmd::try_from(cmd)?;
        fds.control(fd, cmd, arg)
    }

    pub fn close(&self, proc: &Process, fd: RawFd) -> VfsResult<()> {
        proc.files().close(fd)
    }

    pub fn file(&self, proc: &Process, fd: RawFd) -> VfsResult<FileRef> {
        proc.files().get(fd).cloned()
    }

    pub fn read(&self, proc: &Process, fd: RawFd, buf: &mut [u8]) -> VfsResult<usize> {
        self.file(proc, fd)?.read(buf)
    }

    pub fn write(&self, proc: &Process, fd: RawFd, buf: &[u8]) -> VfsResult<usize> {
        self.file(proc, fd)?.write(buf)
    }

    pub fn fstat(&self, proc: &Process, fd: RawFd) -> VfsResult<VfsStat> {
        let file = self.file(proc, fd)?;
        let inode = file.inode();
        let meta = inode.meta();
        Ok(VfsStat {
            inode: inode.id(),
            file_type: meta.mode.file_type(),
            mode: meta.mode,
            uid: meta.uid,
            gid: meta.gid,
            size: meta.size,
        })
    }

    /// Replace the program image of `proc`: close close-on-exec descriptors
    /// and make `path` its executable.
    pub fn exec(&self, proc: &Process, path: &[u8]) -> VfsResult<()> {
        let ctx = self.context(proc);
        let image = Nameidata::new(&ctx).namei(path, None)?;
        if !image.mode().is_reg() {
            return Err(VfsError::new(VfsErrorKind::PermissionDenied, "exec.not_regular"));
        }
        check_permission(&image, &ctx.cred, AccessMask::EXEC, "exec.perm")?;

        let closed = proc.files().close_on_exec();
        tracing::debug!(pid = ?proc.pid(), inode = ?image.id(), closed, "exec");
        *proc.image_mut() = ProcessImage {
            executable: Some(image),
            mappings: Vec::new(),
        };
        Ok(())
    }

    /// Record a file-backed mapping of `fd` in `proc`.
    pub fn mmap(&self, proc: &Process, fd: RawFd, writable: bool) -> VfsResult<()> {
        let file = self.file(proc, fd)?;
        if !file.access().contains(AccessMask::READ)
            || (writable && !file.access().contains(AccessMask::WRITE))
        {
            return Err(VfsError::new(VfsErrorKind::PermissionDenied, "mmap.access"));
        }
        proc.image_mut().mappings.push(Mapping {
            inode: file.inode().clone(),
            writable,
        });
        Ok(())
    }

    /// Tear down `proc`: every descriptor is closed and its image dropped.
    pub fn exit(&self, proc: &Process) {
        proc.files().close_all();
        *proc.image_mut() = ProcessImage::default();
        self.processes.remove(proc.pid());
        tracing::debug!(pid = ?proc.pid(), "exited");
    }

    /// Mount the filesystem rooted at `root` on the directory `path`.
    pub fn mount(&self, proc: &Process, path: &[u8], root: &InodeRef) -> VfsResult<()> {
        let ctx = self.context(proc);
        let target = Nameidata::new(&ctx).namei(path, None)?;
        mount::attach(&target, root)
    }

    /// Detach whatever is mounted on `path`.
    pub fn unmount(&self, proc: &Process, path: &[u8]) -> VfsResult<()> {
        let ctx = self.context(proc);
        let root = Nameidata::new(&ctx).namei(path, None)?;
        mount::detach(&root).map(drop)
    }
}

impl std::fmt::Debug for Vfs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vfs")
            .field("config", &self.config)
            .field("files", &self.files)
            .field("processes", &self.processes.len())
            .finish()
    }
}
