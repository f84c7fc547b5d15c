//! File type and permission bits.

pub const S_IFMT: u32 = 0o170000;
pub const S_IFSOCK: u32 = 0o140000;
pub const S_IFLNK: u32 = 0o120000;
pub const S_IFREG: u32 = 0o100000;
pub const S_IFBLK: u32 = 0o060000;
pub const S_IFDIR: u32 = 0o040000;
pub const S_IFCHR: u32 = 0o020000;
pub const S_IFIFO: u32 = 0o010000;

/// Set-id, sticky and rwx bits for user, group and other.
pub const S_IALLUGO: u32 = 0o7777;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VfsFileType {
    RegularFile,
    Directory,
    Symlink,
    CharDevice,
    BlockDevice,
    Fifo,
    Socket,
    Unknown,
}

impl VfsFileType {
    pub fn type_bits(self) -> u32 {
        match self {
            VfsFileType::RegularFile => S_IFREG,
            VfsFileType::Directory => S_IFDIR,
            VfsFileType::Symlink => S_IFLNK,
            VfsFileType::CharDevice => S_IFCHR,
            VfsFileType::BlockDevice => S_IFBLK,
            VfsFileType::Fifo => S_IFIFO,
            VfsFileType::Socket => S_IFSOCK,
            VfsFileType::Unknown => 0,
        }
    }
}

/// Raw `st_mode` value: type bits plus permission bits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct VfsFileMode(pub u32);

impl VfsFileMode {
    pub fn new(file_type: VfsFileType, perm: u32) -> Self {
        Self(file_type.type_bits() | (perm & S_IALLUGO))
    }

    #[inline]
    pub fn bits(self) -> u32 {
        self.0
    }

    #[inline]
    pub fn perm(self) -> u32 {
        self.0 & S_IALLUGO
    }

    pub fn file_type(self) -> VfsFileType {
        match self.0 & S_IFMT {
            S_IFREG => VfsFileType::RegularFile,
            S_IFDIR => VfsFileType::Directory,
            S_IFLNK => VfsFileType::Symlink,
            S_IFCHR => VfsFileType::CharDevice,
            S_IFBLK => VfsFileType::BlockDevice,
            S_IFIFO => VfsFileType::Fifo,
            S_IFSOCK => VfsFileType::Socket,
            _ => VfsFileType::Unknown,
        }
    }

    pub fn is_dir(self) -> bool {
        self.0 & S_IFMT == S_IFDIR
    }

    pub fn is_reg(self) -> bool {
        self.0 & S_IFMT == S_IFREG
    }

    /// Character or block special file.
    pub fn is_device(self) -> bool {
        matches!(self.0 & S_IFMT, S_IFCHR | S_IFBLK)
    }

    /// Mode for a file created by `open(O_CREAT)`: permission bits with the
    /// umask cleared, typed as a regular file.
    pub fn for_create(requested: u32, umask: u32) -> Self {
        Self((requested & S_IALLUGO & !umask) | S_IFREG)
    }
}
