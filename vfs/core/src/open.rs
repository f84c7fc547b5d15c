//! Resolve the target of an `open(2)` request.

use crate::flags::{AccessMask, OpenFlags, OpenIntent};
use crate::inode::InodeRef;
use crate::mode::VfsFileMode;
use crate::node::NodeCapabilities;
use crate::path_walker::{Nameidata, ResolvedPath};
use crate::perm::check_permission;
use crate::{VfsError, VfsErrorKind, VfsResult};

impl Nameidata<'_> {
    /// Resolve `path` for an open with `intent`, creating the final entry
    /// under `O_CREAT`.
    ///
    /// `mode` is the permission requested for a created file; the umask is
    /// applied here. On success the caller owns one counted reference to the
    /// target. On failure nothing stays acquired.
    pub fn open_namei(
        &mut self,
        path: &[u8],
        intent: OpenIntent,
        mode: u32,
        base: Option<InodeRef>,
    ) -> VfsResult<InodeRef> {
        let mode = VfsFileMode::for_create(mode, self.context().cred.umask);
        let ResolvedPath { dir, name } = self.resolve_directory(path, base)?;

        // "/usr/" and friends name the directory itself.
        if name.is_empty() {
            if intent.wants_write() {
                return Err(VfsError::new(VfsErrorKind::IsADirectory, "open.dir_path"));
            }
            check_permission(&dir, &self.context().cred, intent.access, "open.dir_path.perm")?;
            return Ok(dir);
        }

        let entry = if intent.flags.contains(OpenFlags::CREAT) {
            let _guard = dir.lock_dir();
            match self.lookup(dir.clone(), &name) {
                Ok(entry) => {
                    if intent.flags.contains(OpenFlags::EXCL) {
                        tracing::debug!(dir = ?dir.id(), "exclusive create of an existing entry");
                        return Err(VfsError::new(VfsErrorKind::AlreadyExists, "open.create.excl"));
                    }
                    entry
                }
                Err(err) if err.kind() == VfsErrorKind::NotFound => {
                    return self.create_entry(&dir, &name, mode);
                }
                Err(err) => return Err(err),
            }
        } else {
            self.lookup(dir.clone(), &name)?
        };

        let inode = self.follow_links(dir, entry, intent, mode)?;
        self.check_target(&inode, intent)?;

        if intent.flags.contains(OpenFlags::TRUNC)
            && intent.wants_write()
            && inode.mode().is_reg()
            && inode.capabilities().contains(NodeCapabilities::TRUNCATE)
        {
            tracing::trace!(inode = ?inode.id(), "truncating on open");
            inode.node().truncate(&inode)?;
        }

        Ok(inode)
    }

    fn create_entry(
        &self,
        dir: &InodeRef,
        name: &[u8],
        mode: VfsFileMode,
    ) -> VfsResult<InodeRef> {
        let cred = &self.context().cred;
        check_permission(
            dir,
            cred,
            AccessMask::WRITE | AccessMask::EXEC,
            "open.create.perm",
        )?;
        if !dir.capabilities().contains(NodeCapabilities::CREATE) {
            return Err(VfsError::new(VfsErrorKind::PermissionDenied, "open.create.unsupported"));
        }
        if dir.is_read_only() {
            return Err(VfsError::new(VfsErrorKind::ReadOnlyFilesystem, "open.create.rofs"));
        }

        let created = dir.node().create(dir, name, mode, cred)?;
        tracing::debug!(
            dir = ?dir.id(),
            inode = ?created.id(),
            name = %String::from_utf8_lossy(name),
            mode = mode.bits(),
            "created"
        );
        Ok(created)
    }

    /// Checks on an existing (possibly link-resolved) target.
    fn check_target(&self, inode: &InodeRef, intent: OpenIntent) -> VfsResult<()> {
        let ctx = self.context();
        let file_mode = inode.mode();

        if intent.flags.contains(OpenFlags::DIRECTORY) && !file_mode.is_dir() {
            return Err(VfsError::new(VfsErrorKind::NotADirectory, "open.o_directory"));
        }
        if file_mode.is_dir() && intent.wants_write() {
            return Err(VfsError::new(VfsErrorKind::IsADirectory, "open.write_dir"));
        }
        check_permission(inode, &ctx.cred, intent.access, "open.perm")?;

        if file_mode.is_device() {
            if inode.superblock().is_nodev() {
                return Err(VfsError::new(VfsErrorKind::PermissionDenied, "open.nodev"));
            }
        } else if inode.is_read_only() && intent.wants_write() {
            return Err(VfsError::new(VfsErrorKind::ReadOnlyFilesystem, "open.rofs"));
        }

        if intent.wants_write() && inode.count() > 1 && ctx.registry.is_text_busy(inode) {
            tracing::debug!(inode = ?inode.id(), "write open of a running image");
            return Err(VfsError::new(VfsErrorKind::TextBusy, "open.text_busy"));
        }
        Ok(())
    }
}
