//! Path resolution.
//!
//! A [`Nameidata`] walks byte paths one component at a time from the process
//! root (absolute paths), an explicit base directory, or the working
//! directory. It crosses mount points in both directions and follows links
//! through the owning backend, bounding how deeply link resolution may nest.
//!
//! Every method takes ownership of the [`InodeRef`]s it is handed and returns
//! ownership of what it produces, so counted references are released on every
//! error path simply by going out of scope.

use crate::context::VfsContext;
use crate::flags::{AccessMask, OpenIntent};
use crate::inode::InodeRef;
use crate::mode::VfsFileMode;
use crate::node::NodeCapabilities;
use crate::perm::permission;
use crate::{VfsError, VfsErrorKind, VfsResult};

/// The directory holding the final component of a path, and that component.
///
/// `name` is empty when the path ends in `/` (or is `/` itself), in which case
/// `dir` is the node the path denotes.
#[derive(Debug)]
pub struct ResolvedPath {
    pub dir: InodeRef,
    pub name: Vec<u8>,
}

impl ResolvedPath {
    pub fn names_directory(&self) -> bool {
        self.name.is_empty()
    }
}

/// State of one path resolution.
pub struct Nameidata<'a> {
    ctx: &'a VfsContext,
    link_count: u16,
}

impl<'a> Nameidata<'a> {
    pub fn new(ctx: &'a VfsContext) -> Self {
        Self { ctx, link_count: 0 }
    }

    pub fn context(&self) -> &'a VfsContext {
        self.ctx
    }

    /// Current link nesting depth.
    pub fn link_depth(&self) -> u16 {
        self.link_count
    }

    /// Walk every component but the last.
    ///
    /// Intermediate links are followed with no access intent. The returned
    /// directory is guaranteed to support lookup.
    pub fn resolve_directory(
        &mut self,
        path: &[u8],
        base: Option<InodeRef>,
    ) -> VfsResult<ResolvedPath> {
        if path.is_empty() {
            return Err(VfsError::new(VfsErrorKind::NotFound, "path.resolve.empty"));
        }
        if path.len() > self.ctx.config.max_path_len {
            return Err(VfsError::new(VfsErrorKind::NameTooLong, "path.resolve.len"));
        }

        let mut rest = path;
        let mut dir = match rest.strip_prefix(b"/") {
            Some(stripped) => {
                rest = stripped;
                drop(base);
                self.ctx.root.clone()
            }
            None => base.unwrap_or_else(|| self.ctx.cwd.clone()),
        };

        while let Some(end) = rest.iter().position(|&c| c == b'/') {
            let name = &rest[..end];
            rest = &rest[end + 1..];
            let entry = self.lookup(dir.clone(), name)?;
            dir = self.follow_links(dir, entry, OpenIntent::LOOKUP, VfsFileMode::default())?;
        }

        if !dir.capabilities().contains(NodeCapabilities::LOOKUP) {
            return Err(VfsError::new(VfsErrorKind::NotADirectory, "path.resolve.dir"));
        }

        Ok(ResolvedPath {
            dir,
            name: rest.to_vec(),
        })
    }

    /// Look up one component in `dir`, consuming the handle.
    ///
    /// `..` never leaves the process root and, at the root of a mounted
    /// filesystem, continues from the directory it covers. A non-`..` result
    /// that is a mount point is replaced by the root mounted on it. The
    /// result is not link-followed.
    pub fn lookup(&mut self, dir: InodeRef, name: &[u8]) -> VfsResult<InodeRef> {
        let may_search = permission(&dir, &self.ctx.cred, AccessMask::EXEC);
        let mut dir = dir;

        if name == b".." {
            if InodeRef::same(&dir, &self.ctx.root) {
                return Ok(dir);
            }
            if dir.is_mount_root() {
                // The root filesystem covers nothing and is its own parent.
                if let Some(covered) = dir.superblock().covered() {
                    tracing::trace!(from = ?dir.id(), to = ?covered.id(), "crossing mount upwards");
                    dir = covered;
                }
            }
        }

        if !dir.capabilities().contains(NodeCapabilities::LOOKUP) {
            return Err(VfsError::new(VfsErrorKind::NotADirectory, "path.lookup.dir"));
        }
        if !may_search {
            return Err(VfsError::new(VfsErrorKind::PermissionDenied, "path.lookup.search"));
        }
        if name.is_empty() {
            return Ok(dir);
        }
        if name.len() > self.ctx.config.max_name_len {
            return Err(VfsError::new(VfsErrorKind::NameTooLong, "path.lookup.name"));
        }

        tracing::trace!(dir = ?dir.id(), name = %String::from_utf8_lossy(name), "lookup");
        let entry = dir.node().lookup(&dir, name)?;
        drop(dir);
        Ok(entry.follow_mount())
    }

    /// Resolve `entry` if it is a link, consuming both handles.
    ///
    /// Non-links are returned unchanged. Links are handed to their backend
    /// with `dir` as the base for relative targets.
    pub fn follow_links(
        &mut self,
        dir: InodeRef,
        entry: InodeRef,
        intent: OpenIntent,
        mode: VfsFileMode,
    ) -> VfsResult<InodeRef> {
        if !entry.capabilities().contains(NodeCapabilities::FOLLOW_LINK) {
            return Ok(entry);
        }
        if self.link_count >= self.ctx.config.max_symlinks {
            tracing::debug!(link = ?entry.id(), depth = self.link_count, "link nesting limit hit");
            return Err(VfsError::new(VfsErrorKind::TooManyLinks, "path.follow_links"));
        }

        let link = entry.inode().clone();
        self.link_count += 1;
        let result = link.node().follow_link(self, dir, entry, intent, mode);
        self.link_count -= 1;
        result
    }

    /// Resolve a full path, following a trailing link.
    pub fn namei(&mut self, path: &[u8], base: Option<InodeRef>) -> VfsResult<InodeRef> {
        self.resolve(path, base, true)
    }

    /// Resolve a full path without following a trailing link.
    pub fn lnamei(&mut self, path: &[u8], base: Option<InodeRef>) -> VfsResult<InodeRef> {
        self.resolve(path, base, false)
    }

    fn resolve(
        &mut self,
        path: &[u8],
        base: Option<InodeRef>,
        follow: bool,
    ) -> VfsResult<InodeRef> {
        let ResolvedPath { dir, name } = self.resolve_directory(path, base)?;
        if name.is_empty() {
            return Ok(dir);
        }
        let entry = self.lookup(dir.clone(), &name)?;
        if follow {
            self.follow_links(dir, entry, OpenIntent::LOOKUP, VfsFileMode::default())
        } else {
            Ok(entry)
        }
    }
}
