//! Permission checks against mode bits or a backend callback.

use crate::context::VfsCred;
use crate::flags::AccessMask;
use crate::inode::VfsInode;
use crate::node::NodeCapabilities;
use crate::{VfsError, VfsErrorKind, VfsResult};

/// Whether `cred` may access `inode` with every right in `mask`.
///
/// Owner bits apply when the effective uid owns the node, group bits when the
/// principal is in the node's group, other bits otherwise. The superuser
/// passes every check. An empty mask always passes.
pub fn permission(inode: &VfsInode, cred: &VfsCred, mask: AccessMask) -> bool {
    if inode.capabilities().contains(NodeCapabilities::PERMISSION) {
        return inode.node().permission(inode, cred, mask);
    }

    let meta = inode.meta();
    let mut mode = meta.mode.bits();
    if cred.euid == meta.uid {
        mode >>= 6;
    } else if cred.in_group(meta.gid) {
        mode >>= 3;
    }
    let wanted = mask.bits();
    (mode & wanted & 0o7) == wanted || cred.is_superuser()
}

pub fn check_permission(
    inode: &VfsInode,
    cred: &VfsCred,
    mask: AccessMask,
    context: &'static str,
) -> VfsResult<()> {
    if permission(inode, cred, mask) {
        Ok(())
    } else {
        tracing::trace!(inode = ?inode.id(), ?mask, uid = cred.euid, "permission denied");
        Err(VfsError::new(VfsErrorKind::PermissionDenied, context))
    }
}
