use vfs_namei::MountFlags;

#[derive(Clone, Debug)]
pub struct MemFsConfig {
    /// Optional max bytes allowed for all file data in this FS instance.
    pub max_bytes: Option<u64>,
    /// Optional max inode count allowed in this FS instance (root included).
    pub max_inodes: Option<u64>,
    pub mount_flags: MountFlags,
    /// Permission bits, owner and group of the root directory.
    pub root_perm: u32,
    pub root_uid: u32,
    pub root_gid: u32,
}

impl MemFsConfig {
    pub fn read_only(mut self) -> Self {
        self.mount_flags |= MountFlags::READ_ONLY;
        self
    }

    pub fn nodev(mut self) -> Self {
        self.mount_flags |= MountFlags::NODEV;
        self
    }
}

impl Default for MemFsConfig {
    fn default() -> Self {
        Self {
            max_bytes: None,
            max_inodes: None,
            mount_flags: MountFlags::empty(),
            root_perm: 0o755,
            root_uid: 0,
            root_gid: 0,
        }
    }
}
