//! Open flags, permission masks and the internal open intent.

use bitflags::bitflags;

bitflags! {
    /// `open(2)` flags, using the Linux numeric values.
    ///
    /// The read-only access mode is the absence of `WRONLY` and `RDWR`.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct OpenFlags: u32 {
        const WRONLY = 0o1;
        const RDWR = 0o2;
        const ACCMODE = 0o3;
        const CREAT = 0o100;
        const EXCL = 0o200;
        const NOCTTY = 0o400;
        const TRUNC = 0o1000;
        const APPEND = 0o2000;
        const NONBLOCK = 0o4000;
        const SYNC = 0o10000;
        const DIRECTORY = 0o200000;
    }
}

impl OpenFlags {
    pub const RDONLY: OpenFlags = OpenFlags::empty();

    /// Open-time directives that are not kept on the open file.
    pub const ONE_SHOT: OpenFlags = OpenFlags::CREAT
        .union(OpenFlags::EXCL)
        .union(OpenFlags::NOCTTY)
        .union(OpenFlags::TRUNC);

    /// The only bits `F_SETFL` may change after open.
    pub const SETFL_MASK: OpenFlags = OpenFlags::APPEND.union(OpenFlags::NONBLOCK);

    /// Raw access-mode field (`0` rdonly, `1` wronly, `2` rdwr, `3` special).
    #[inline]
    pub fn access_mode(self) -> u32 {
        self.bits() & OpenFlags::ACCMODE.bits()
    }
}

bitflags! {
    /// Permission request mask (`MAY_EXEC`, `MAY_WRITE`, `MAY_READ`), laid out
    /// like one rwx triplet of a mode.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct AccessMask: u32 {
        const EXEC = 0o1;
        const WRITE = 0o2;
        const READ = 0o4;
    }
}

impl AccessMask {
    /// Translate the user access mode into the permissions an open file
    /// carries: `00` read, `01` write, `10` read+write, `11` nothing.
    pub fn from_access_mode(flags: OpenFlags) -> Self {
        let mut access = AccessMask::empty();
        let mode = (flags.access_mode() + 1) & OpenFlags::ACCMODE.bits();
        if mode & 0o1 != 0 {
            access |= AccessMask::READ;
        }
        if mode & 0o2 != 0 {
            access |= AccessMask::WRITE;
        }
        access
    }
}

bitflags! {
    /// Per-descriptor flags (`F_GETFD` / `F_SETFD`).
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct FdFlags: u32 {
        const CLOEXEC = 0o1;
    }
}

/// What an open request needs from the resolved node.
///
/// `access` is the permission the caller must hold on the target; `flags`
/// carries the open directives (`CREAT`, `EXCL`, `TRUNC`, `DIRECTORY`, ...).
/// An empty `access` asks for no permission at all, which is what link
/// resolution in the middle of a path uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OpenIntent {
    pub flags: OpenFlags,
    pub access: AccessMask,
}

impl OpenIntent {
    pub const LOOKUP: OpenIntent = OpenIntent {
        flags: OpenFlags::empty(),
        access: AccessMask::empty(),
    };

    pub fn from_open_flags(flags: OpenFlags) -> Self {
        let mut access = AccessMask::from_access_mode(flags);
        if flags.intersects(OpenFlags::TRUNC | OpenFlags::CREAT) {
            access |= AccessMask::WRITE;
        }
        Self { flags, access }
    }

    #[inline]
    pub fn wants_write(&self) -> bool {
        self.access.contains(AccessMask::WRITE)
    }
}
