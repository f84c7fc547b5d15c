//! Grafting filesystem roots onto directories.
//!
//! A mount links two inodes: the covered directory points forward at the
//! mounted root (used by lookup to step onto it) and the mounted
//! superblock points back at the covered directory (used by `..`).

use crate::inode::InodeRef;
use crate::{VfsError, VfsErrorKind, VfsResult};

/// Mount the filesystem whose root is `root` on `target`.
///
/// `target` is the node a path resolved to, so an occupied mount point shows
/// up as the root of the filesystem already mounted there.
pub fn attach(target: &InodeRef, root: &InodeRef) -> VfsResult<()> {
    if !target.mode().is_dir() {
        return Err(VfsError::new(VfsErrorKind::NotADirectory, "mount.target"));
    }
    if !root.is_mount_root() || !root.mode().is_dir() {
        return Err(VfsError::new(VfsErrorKind::InvalidArgument, "mount.root"));
    }
    if target.is_mount_root() || target.is_mountpoint() {
        return Err(VfsError::new(VfsErrorKind::AlreadyExists, "mount.busy"));
    }
    if root.superblock().covered().is_some() {
        return Err(VfsError::new(VfsErrorKind::AlreadyExists, "mount.root.busy"));
    }

    root.superblock().set_covered(Some(target.clone()));
    target.set_mounted(Some(root.clone()));
    tracing::debug!(target = ?target.id(), mount = ?root.superblock().id(), "mounted");
    Ok(())
}

/// Undo [`attach`]. `root` is the mounted root a path resolved to; the
/// directory it covered is returned.
pub fn detach(root: &InodeRef) -> VfsResult<InodeRef> {
    if !root.is_mount_root() {
        return Err(VfsError::new(VfsErrorKind::InvalidArgument, "unmount.not_mounted"));
    }
    let covered = root
        .superblock()
        .set_covered(None)
        .ok_or_else(|| VfsError::new(VfsErrorKind::InvalidArgument, "unmount.not_mounted"))?;
    drop(covered.set_mounted(None));
    tracing::debug!(covered = ?covered.id(), mount = ?root.superblock().id(), "unmounted");
    Ok(covered)
}
