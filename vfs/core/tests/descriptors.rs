use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use pretty_assertions::assert_eq;
use vfs_memfs::MemFs;
use vfs_namei::mode::S_IFREG;
use vfs_namei::{
    BackendInodeId, FileOps, FileTable, FsNode, InodeMeta, InodeRef, MountFlags, Nameidata,
    OpenFile, OpenFlags, Process, Superblock, Vfs, VfsConfig, VfsCred, VfsError, VfsErrorKind,
    VfsFileMode, VfsFileType, VfsInode, VfsResult,
};

const F_DUPFD: u32 = 0;
const F_GETFD: u32 = 1;
const F_SETFD: u32 = 2;
const F_GETFL: u32 = 3;
const F_SETFL: u32 = 4;
const F_GETLK: u32 = 5;
const F_SETLKW: u32 = 7;

struct Fixture {
    vfs: Vfs,
    fs: MemFs,
    root: InodeRef,
}

impl Fixture {
    fn spawn(&self, cred: VfsCred) -> Arc<Process> {
        self.vfs.spawn(cred, self.root.clone(), self.root.clone())
    }

    fn lookup(&self, path: &[u8]) -> InodeRef {
        let proc = self.spawn(VfsCred::root());
        let ctx = self.vfs.context(&proc);
        let inode = Nameidata::new(&ctx).namei(path, None).expect("lookup");
        self.vfs.exit(&proc);
        inode
    }
}

fn setup() -> Fixture {
    let fs = MemFs::new();
    let root = fs.root();

    let etc = fs.mkdir(&root, b"etc", 0o755, 0, 0).expect("etc");
    fs.add_file(&etc, b"passwd", 0o644, 0, 0, b"root:x:0:0\n").expect("passwd");
    fs.add_file(&etc, b"motd", 0o644, 0, 0, b"welcome").expect("motd");

    let bin = fs.mkdir(&root, b"bin", 0o755, 0, 0).expect("bin");
    fs.add_file(&bin, b"sh", 0o755, 0, 0, b"#!").expect("sh");

    fs.mkdir(&root, b"tmp", 0o777, 0, 0).expect("tmp");
    fs.mkdir(&root, b"mnt", 0o755, 0, 0).expect("mnt");

    let home = fs.mkdir(&root, b"home", 0o755, 1000, 1000).expect("home");
    fs.add_file(&home, b"notes", 0o644, 1000, 1000, b"hello").expect("notes");

    Fixture {
        vfs: Vfs::new(VfsConfig {
            max_fds: 16,
            ..VfsConfig::default()
        }),
        fs,
        root,
    }
}

#[test]
fn duplicates_share_the_offset() -> VfsResult<()> {
    let fx = setup();
    let proc = fx.spawn(VfsCred::root());

    let fd = fx.vfs.open(&proc, b"/etc/passwd", OpenFlags::RDONLY, 0)?;
    let dup = fx.vfs.dup(&proc, fd)?;
    assert_eq!(dup, 1);

    let mut buf = [0u8; 4];
    assert_eq!(fx.vfs.read(&proc, fd, &mut buf)?, 4);
    assert_eq!(&buf, b"root");
    let mut buf = [0u8; 2];
    fx.vfs.read(&proc, dup, &mut buf)?;
    assert_eq!(&buf, b":x");
    assert_eq!(fx.vfs.file(&proc, fd)?.offset(), 6);

    // An independent open starts at zero.
    let other = fx.vfs.open(&proc, b"/etc/passwd", OpenFlags::RDONLY, 0)?;
    assert_eq!(fx.vfs.file(&proc, other)?.offset(), 0);
    Ok(())
}

#[test]
fn dup_takes_the_lowest_free_descriptor() -> VfsResult<()> {
    let fx = setup();
    let proc = fx.spawn(VfsCred::root());

    for _ in 0..3 {
        fx.vfs.open(&proc, b"/etc/motd", OpenFlags::RDONLY, 0)?;
    }
    fx.vfs.close(&proc, 1)?;
    assert_eq!(fx.vfs.dup(&proc, 2)?, 1);
    assert_eq!(fx.vfs.dup(&proc, 0)?, 3);

    let err = fx.vfs.dup(&proc, 9).expect_err("unbound");
    assert_eq!(err.kind(), VfsErrorKind::BadFileDescriptor);
    Ok(())
}

#[test]
fn dup_fails_when_the_table_is_full() -> VfsResult<()> {
    let fx = setup();
    let proc = fx.spawn(VfsCred::root());

    let fd = fx.vfs.open(&proc, b"/etc/motd", OpenFlags::RDONLY, 0)?;
    for _ in 1..16 {
        fx.vfs.dup(&proc, fd)?;
    }
    let err = fx.vfs.dup(&proc, fd).expect_err("full");
    assert_eq!(err.kind(), VfsErrorKind::TooManyOpenFiles);
    assert_eq!(fx.vfs.file_table().in_use(), 1);
    Ok(())
}

#[test]
fn dup2_replaces_the_target() -> VfsResult<()> {
    let fx = setup();
    let proc = fx.spawn(VfsCred::root());
    let motd = fx.lookup(b"/etc/motd");
    let passwd = fx.lookup(b"/etc/passwd");

    let a = fx.vfs.open(&proc, b"/etc/motd", OpenFlags::RDONLY, 0)?;
    let b = fx.vfs.open(&proc, b"/etc/passwd", OpenFlags::RDONLY, 0)?;
    fx.vfs.fcntl(&proc, b, F_SETFD, 1)?;
    assert_eq!(fx.fs.open_count(&passwd)?, 1);

    assert_eq!(fx.vfs.dup2(&proc, a, b)?, b);
    assert_eq!(fx.fs.open_count(&passwd)?, 0);
    assert_eq!(fx.fs.open_count(&motd)?, 1);
    assert!(InodeRef::same(fx.vfs.file(&proc, b)?.inode(), &motd));
    assert_eq!(fx.vfs.fcntl(&proc, b, F_GETFD, 0)?, 0);

    // Onto itself is a no-op that keeps the descriptor flags.
    fx.vfs.fcntl(&proc, a, F_SETFD, 1)?;
    assert_eq!(fx.vfs.dup2(&proc, a, a)?, a);
    assert_eq!(fx.vfs.fcntl(&proc, a, F_GETFD, 0)?, 1);

    assert_eq!(fx.vfs.dup2(&proc, a, 9)?, 9);
    let err = fx.vfs.dup2(&proc, 7, 8).expect_err("unbound source");
    assert_eq!(err.kind(), VfsErrorKind::BadFileDescriptor);
    let err = fx.vfs.dup2(&proc, a, 16).expect_err("target out of range");
    assert_eq!(err.kind(), VfsErrorKind::BadFileDescriptor);
    Ok(())
}

#[test]
fn fcntl_descriptor_flags() -> VfsResult<()> {
    let fx = setup();
    let proc = fx.spawn(VfsCred::root());

    let fd = fx.vfs.open(&proc, b"/etc/motd", OpenFlags::RDONLY, 0)?;
    assert_eq!(fx.vfs.fcntl(&proc, fd, F_GETFD, 0)?, 0);
    assert_eq!(fx.vfs.fcntl(&proc, fd, F_SETFD, 0o3)?, 0);
    assert_eq!(fx.vfs.fcntl(&proc, fd, F_GETFD, 0)?, 1);

    // Duplicates start without close-on-exec.
    let dup = fx.vfs.fcntl(&proc, fd, F_DUPFD, 5)?;
    assert_eq!(dup, 5);
    assert_eq!(fx.vfs.fcntl(&proc, dup, F_GETFD, 0)?, 0);
    assert_eq!(fx.vfs.fcntl(&proc, fd, F_DUPFD, 5)?, 6);

    let err = fx.vfs.fcntl(&proc, fd, F_DUPFD, 16).expect_err("out of range");
    assert_eq!(err.kind(), VfsErrorKind::InvalidArgument);
    Ok(())
}

#[test]
fn fcntl_status_flags() -> VfsResult<()> {
    let fx = setup();
    let proc = fx.spawn(VfsCred::root());

    let fd = fx.vfs.open(
        &proc,
        b"/tmp/log",
        OpenFlags::RDWR | OpenFlags::CREAT | OpenFlags::EXCL | OpenFlags::APPEND,
        0o644,
    )?;
    let flags = fx.vfs.fcntl(&proc, fd, F_GETFL, 0)?;
    assert_eq!(
        OpenFlags::from_bits_retain(flags),
        OpenFlags::RDWR | OpenFlags::APPEND
    );

    // Only APPEND and NONBLOCK can change; the access mode stays.
    let requested = OpenFlags::WRONLY | OpenFlags::NONBLOCK | OpenFlags::DIRECTORY;
    fx.vfs.fcntl(&proc, fd, F_SETFL, requested.bits())?;
    let flags = fx.vfs.fcntl(&proc, fd, F_GETFL, 0)?;
    assert_eq!(
        OpenFlags::from_bits_retain(flags),
        OpenFlags::RDWR | OpenFlags::NONBLOCK
    );

    // Status flags live on the open file, so duplicates see them.
    let dup = fx.vfs.dup(&proc, fd)?;
    assert_eq!(fx.vfs.fcntl(&proc, dup, F_GETFL, 0)?, flags);
    Ok(())
}

#[test]
fn fcntl_rejects_unknown_and_lock_commands() -> VfsResult<()> {
    let fx = setup();
    let proc = fx.spawn(VfsCred::root());
    let fd = fx.vfs.open(&proc, b"/etc/motd", OpenFlags::RDONLY, 0)?;

    let err = fx.vfs.fcntl(&proc, fd, 99, 0).expect_err("unknown command");
    assert_eq!(err.kind(), VfsErrorKind::InvalidArgument);
    let err = fx.vfs.fcntl(&proc, 3, 99, 0).expect_err("bad descriptor wins");
    assert_eq!(err.kind(), VfsErrorKind::BadFileDescriptor);

    for cmd in [F_GETLK, F_SETLKW] {
        let err = fx.vfs.fcntl(&proc, fd, cmd, 0).expect_err("locks");
        assert_eq!(err.kind(), VfsErrorKind::NotSupported);
    }
    Ok(())
}

#[test]
fn read_write_and_append() -> VfsResult<()> {
    let fx = setup();
    let proc = fx.spawn(VfsCred::user(1000, 1000));
    let notes = fx.lookup(b"/home/notes");

    let rw = fx.vfs.open(&proc, b"/home/notes", OpenFlags::RDWR, 0)?;
    assert_eq!(fx.vfs.write(&proc, rw, b"HE")?, 2);
    let mut buf = [0u8; 8];
    let n = fx.vfs.read(&proc, rw, &mut buf)?;
    assert_eq!(&buf[..n], b"llo");
    assert_eq!(fx.vfs.read(&proc, rw, &mut buf)?, 0);

    let append = fx
        .vfs
        .open(&proc, b"/home/notes", OpenFlags::WRONLY | OpenFlags::APPEND, 0)?;
    fx.vfs.write(&proc, append, b"!!")?;
    assert_eq!(fx.fs.contents(&notes)?, b"HEllo!!".to_vec());
    assert_eq!(notes.size(), 7);
    assert_eq!(fx.vfs.file(&proc, append)?.offset(), 7);
    Ok(())
}

#[test]
fn io_against_the_access_mode() -> VfsResult<()> {
    let fx = setup();
    let proc = fx.spawn(VfsCred::root());
    let mut buf = [0u8; 4];

    let ro = fx.vfs.open(&proc, b"/etc/motd", OpenFlags::RDONLY, 0)?;
    let err = fx.vfs.write(&proc, ro, b"x").expect_err("read-only");
    assert_eq!(err.kind(), VfsErrorKind::BadFileDescriptor);

    let wo = fx.vfs.open(&proc, b"/etc/motd", OpenFlags::WRONLY, 0)?;
    let err = fx.vfs.read(&proc, wo, &mut buf).expect_err("write-only");
    assert_eq!(err.kind(), VfsErrorKind::BadFileDescriptor);

    let dir = fx.vfs.open(&proc, b"/etc", OpenFlags::RDONLY, 0)?;
    let err = fx.vfs.read(&proc, dir, &mut buf).expect_err("no file operations");
    assert_eq!(err.kind(), VfsErrorKind::InvalidArgument);

    let err = fx.vfs.read(&proc, 12, &mut buf).expect_err("unbound");
    assert_eq!(err.kind(), VfsErrorKind::BadFileDescriptor);
    Ok(())
}

#[test]
fn fstat_reports_the_node() -> VfsResult<()> {
    let fx = setup();
    let proc = fx.spawn(VfsCred::root());
    let passwd = fx.lookup(b"/etc/passwd");

    let fd = fx.vfs.open(&proc, b"/etc/passwd", OpenFlags::RDONLY, 0)?;
    let stat = fx.vfs.fstat(&proc, fd)?;
    assert_eq!(stat.inode, passwd.id());
    assert_eq!(stat.file_type, VfsFileType::RegularFile);
    assert_eq!(stat.mode.bits(), S_IFREG | 0o644);
    assert_eq!((stat.uid, stat.gid, stat.size), (0, 0, 11));

    let err = fx.vfs.fstat(&proc, 4).expect_err("unbound");
    assert_eq!(err.kind(), VfsErrorKind::BadFileDescriptor);
    Ok(())
}

#[test_log::test]
fn exec_closes_close_on_exec_descriptors() -> VfsResult<()> {
    let fx = setup();
    let proc = fx.spawn(VfsCred::root());

    for _ in 0..3 {
        fx.vfs.open(&proc, b"/etc/motd", OpenFlags::RDONLY, 0)?;
    }
    fx.vfs.fcntl(&proc, 1, F_SETFD, 1)?;
    fx.vfs.exec(&proc, b"/bin/sh")?;

    let open: Vec<_> = proc.files().iter().map(|(fd, _)| fd).collect();
    assert_eq!(open, vec![0, 2]);
    assert_eq!(fx.vfs.open(&proc, b"/etc/motd", OpenFlags::RDONLY, 0)?, 1);
    assert_eq!(fx.vfs.fcntl(&proc, 1, F_GETFD, 0)?, 0);

    let sh = fx.lookup(b"/bin/sh");
    assert!(proc.image().uses_as_text(&sh));
    Ok(())
}

#[test]
fn exec_needs_an_executable_regular_file() -> VfsResult<()> {
    let fx = setup();
    let proc = fx.spawn(VfsCred::user(1000, 1000));
    let fd = fx.vfs.open(&proc, b"/etc/motd", OpenFlags::RDONLY, 0)?;
    fx.vfs.fcntl(&proc, fd, F_SETFD, 1)?;

    let err = fx.vfs.exec(&proc, b"/etc").expect_err("directory");
    assert_eq!(err.kind(), VfsErrorKind::PermissionDenied);
    let err = fx.vfs.exec(&proc, b"/etc/passwd").expect_err("not executable");
    assert_eq!(err.kind(), VfsErrorKind::PermissionDenied);
    let err = fx.vfs.exec(&proc, b"/bin/missing").expect_err("missing");
    assert_eq!(err.kind(), VfsErrorKind::NotFound);

    // Failed execs leave the descriptor table alone.
    assert_eq!(proc.files().len(), 1);
    Ok(())
}

#[test]
fn open_files_are_released_once() -> VfsResult<()> {
    let fx = setup();
    let proc = fx.spawn(VfsCred::root());
    let motd = fx.lookup(b"/etc/motd");

    let fd = fx.vfs.open(&proc, b"/etc/motd", OpenFlags::RDONLY, 0)?;
    fx.vfs.dup(&proc, fd)?;
    fx.vfs.dup2(&proc, fd, 9)?;
    assert_eq!(fx.fs.open_count(&motd)?, 1);
    assert_eq!(fx.vfs.file_table().in_use(), 1);

    fx.vfs.close(&proc, fd)?;
    fx.vfs.close(&proc, 9)?;
    assert_eq!(fx.fs.open_count(&motd)?, 1);
    let err = fx.vfs.close(&proc, 9).expect_err("already closed");
    assert_eq!(err.kind(), VfsErrorKind::BadFileDescriptor);

    fx.vfs.close(&proc, 1)?;
    assert_eq!(fx.fs.open_count(&motd)?, 0);
    assert_eq!(fx.vfs.file_table().in_use(), 0);
    Ok(())
}

#[test]
fn exit_closes_everything() -> VfsResult<()> {
    let fx = setup();
    let proc = fx.spawn(VfsCred::root());
    let motd = fx.lookup(b"/etc/motd");
    let baseline = motd.count();

    let fd = fx.vfs.open(&proc, b"/etc/motd", OpenFlags::RDONLY, 0)?;
    fx.vfs.dup(&proc, fd)?;
    fx.vfs.open(&proc, b"/etc/passwd", OpenFlags::RDONLY, 0)?;
    assert_eq!(fx.vfs.processes().len(), 1);

    fx.vfs.exit(&proc);
    assert!(proc.files().is_empty());
    assert!(fx.vfs.processes().get(proc.pid()).is_none());
    assert_eq!(fx.vfs.file_table().in_use(), 0);
    assert_eq!(fx.fs.open_count(&motd)?, 0);
    assert_eq!(motd.count(), baseline);
    Ok(())
}

#[test]
fn mount_and_unmount_through_paths() -> VfsResult<()> {
    let fx = setup();
    let proc = fx.spawn(VfsCred::root());
    let other = MemFs::new();
    other.add_file(&other.root(), b"data", 0o644, 0, 0, b"42")?;

    fx.vfs.mount(&proc, b"/mnt", &other.root())?;
    let fd = fx.vfs.open(&proc, b"/mnt/data", OpenFlags::RDONLY, 0)?;
    assert_eq!(fx.vfs.fstat(&proc, fd)?.size, 2);

    let again = MemFs::new();
    let err = fx.vfs.mount(&proc, b"/mnt", &again.root()).expect_err("occupied");
    assert_eq!(err.kind(), VfsErrorKind::AlreadyExists);
    let err = fx
        .vfs
        .mount(&proc, b"/etc/passwd", &again.root())
        .expect_err("not a directory");
    assert_eq!(err.kind(), VfsErrorKind::NotADirectory);
    let err = fx.vfs.mount(&proc, b"/tmp", &other.root()).expect_err("already mounted");
    assert_eq!(err.kind(), VfsErrorKind::AlreadyExists);

    let err = fx.vfs.unmount(&proc, b"/tmp").expect_err("nothing mounted");
    assert_eq!(err.kind(), VfsErrorKind::InvalidArgument);
    let err = fx.vfs.unmount(&proc, b"/").expect_err("the root is not mounted");
    assert_eq!(err.kind(), VfsErrorKind::InvalidArgument);

    fx.vfs.unmount(&proc, b"/mnt")?;
    let err = fx
        .vfs
        .open(&proc, b"/mnt/data", OpenFlags::RDONLY, 0)
        .expect_err("unmounted");
    assert_eq!(err.kind(), VfsErrorKind::NotFound);
    Ok(())
}

#[derive(Default)]
struct Refusing {
    released: AtomicUsize,
}

impl FileOps for Refusing {
    fn open(&self, _file: &OpenFile) -> VfsResult<()> {
        Err(VfsError::new(VfsErrorKind::PermissionDenied, "refusing.open"))
    }

    fn release(&self, _file: &OpenFile) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

struct RefusingNode(Arc<Refusing>);

impl FsNode for RefusingNode {
    fn file_ops(&self) -> Option<Arc<dyn FileOps>> {
        Some(self.0.clone())
    }
}

#[test]
fn refused_open_hook_is_not_released() {
    let ops = Arc::new(Refusing::default());
    let ino = BackendInodeId::new(1).expect("non-zero");
    let sb = Superblock::new(MountFlags::empty(), ino);
    let inode = InodeRef::new(VfsInode::new(
        &sb,
        ino,
        InodeMeta::new(VfsFileMode::new(VfsFileType::CharDevice, 0o666), 0, 0),
        RefusingNode(ops.clone()),
    ));
    let table = FileTable::new(4);

    let slot = table.reserve().expect("slot");
    let err = OpenFile::open(inode.clone(), OpenFlags::RDWR, slot).expect_err("hook refuses");
    assert_eq!(err.kind(), VfsErrorKind::PermissionDenied);
    assert_eq!(table.in_use(), 0);
    assert_eq!(inode.count(), 1);
    assert_eq!(ops.released.load(Ordering::SeqCst), 0);
}
