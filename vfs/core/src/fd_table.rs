//! Per-process file descriptor table.
//!
//! Slots are handed out lowest-first. Each bound slot holds one [`FileRef`];
//! duplicated descriptors share the same open file (and with it the offset
//! and status flags). Close-on-exec is per slot and kept in a bitmap.

use crate::file::FileRef;
use crate::flags::{FdFlags, OpenFlags};
use crate::ids::RawFd;
use crate::{VfsError, VfsErrorKind, VfsResult};

/// `fcntl(2)` commands, numbered as on Linux.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FcntlCmd {
    DupFd,
    GetFd,
    SetFd,
    GetFl,
    SetFl,
    GetLk,
    SetLk,
    SetLkw,
}

impl TryFrom<u32> for FcntlCmd {
    type Error = VfsError;

    fn try_from(raw: u32) -> Result<Self, Self::Error> {
        Ok(match raw {
            0 => FcntlCmd::DupFd,
            1 => FcntlCmd::GetFd,
            2 => FcntlCmd::SetFd,
            3 => FcntlCmd::GetFl,
            4 => FcntlCmd::SetFl,
            5 => FcntlCmd::GetLk,
            6 => FcntlCmd::SetLk,
            7 => FcntlCmd::SetLkw,
            _ => return Err(VfsError::new(VfsErrorKind::InvalidArgument, "fcntl.cmd")),
        })
    }
}

pub struct FdTable {
    slots: Vec<Option<FileRef>>,
    close_on_exec: Vec<u64>,
}

impl FdTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
            close_on_exec: vec![0; capacity.div_ceil(64)],
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of bound descriptors.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    pub fn get(&self, fd: RawFd) -> VfsResult<&FileRef> {
        self.slots
            .get(fd as usize)
            .and_then(Option::as_ref)
            .ok_or_else(|| VfsError::new(VfsErrorKind::BadFileDescriptor, "fd.get"))
    }

    /// Lowest empty slot.
    pub fn allocate_slot(&self) -> VfsResult<RawFd> {
        self.lowest_free_from(0)
            .ok_or_else(|| VfsError::new(VfsErrorKind::TooManyOpenFiles, "fd.allocate"))
    }

    /// Store `file` in `fd` (an empty slot from [`FdTable::allocate_slot`])
    /// and clear its close-on-exec bit.
    pub(crate) fn bind(&mut self, fd: RawFd, file: FileRef) {
        let idx = fd as usize;
        debug_assert!(self.slots[idx].is_none(), "fd {fd} bound twice");
        self.set_cloexec(idx, false);
        self.slots[idx] = Some(file);
    }

    pub fn install(&mut self, file: FileRef) -> VfsResult<RawFd> {
        let fd = self.allocate_slot()?;
        self.bind(fd, file);
        Ok(fd)
    }

    /// Duplicate `fd` onto the lowest empty slot at or above `at_or_above`.
    pub fn dup(&mut self, fd: RawFd, at_or_above: RawFd) -> VfsResult<RawFd> {
        let file = self.get(fd)?.clone();
        let start = at_or_above as usize;
        if start >= self.capacity() {
            return Err(VfsError::new(VfsErrorKind::InvalidArgument, "fd.dup.arg"));
        }
        let new_fd = self
            .lowest_free_from(start)
            .ok_or_else(|| VfsError::new(VfsErrorKind::TooManyOpenFiles, "fd.dup"))?;
        self.bind(new_fd, file);
        tracing::debug!(fd, new_fd, "dup");
        Ok(new_fd)
    }

    /// Make `new_fd` refer to the same open file as `old_fd`, closing
    /// whatever `new_fd` held.
    pub fn dup2(&mut self, old_fd: RawFd, new_fd: RawFd) -> VfsResult<RawFd> {
        let file = self.get(old_fd)?.clone();
        if new_fd as usize >= self.capacity() {
            return Err(VfsError::new(VfsErrorKind::BadFileDescriptor, "fd.dup2.target"));
        }
        if old_fd == new_fd {
            return Ok(new_fd);
        }
        let previous = self.slots[new_fd as usize].take();
        self.bind(new_fd, file);
        drop(previous);
        tracing::debug!(old_fd, new_fd, "dup2");
        Ok(new_fd)
    }

    /// `fcntl(2)` on `fd`. Returns the command's result value.
    pub fn control(&mut self, fd: RawFd, cmd: FcntlCmd, arg: u32) -> VfsResult<u32> {
        let file = self.get(fd)?.clone();
        match cmd {
            FcntlCmd::DupFd => self.dup(fd, arg),
            FcntlCmd::GetFd => Ok(self.fd_flags(fd).bits()),
            FcntlCmd::SetFd => {
                let flags = FdFlags::from_bits_truncate(arg);
                self.set_cloexec(fd as usize, flags.contains(FdFlags::CLOEXEC));
                Ok(0)
            }
            FcntlCmd::GetFl => Ok(file.flags().bits()),
            FcntlCmd::SetFl => {
                file.set_status_flags(OpenFlags::from_bits_truncate(arg));
                Ok(0)
            }
            FcntlCmd::GetLk | FcntlCmd::SetLk | FcntlCmd::SetLkw => {
                Err(VfsError::new(VfsErrorKind::NotSupported, "fcntl.lock"))
            }
        }
    }

    pub fn fd_flags(&self, fd: RawFd) -> FdFlags {
        if (fd as usize) < self.capacity() && self.cloexec(fd as usize) {
            FdFlags::CLOEXEC
        } else {
            FdFlags::empty()
        }
    }

    pub fn close(&mut self, fd: RawFd) -> VfsResult<()> {
        let file = self
            .slots
            .get_mut(fd as usize)
            .and_then(Option::take)
            .ok_or_else(|| VfsError::new(VfsErrorKind::BadFileDescriptor, "fd.close"))?;
        self.set_cloexec(fd as usize, false);
        tracing::debug!(fd, inode = ?file.inode().id(), "close");
        drop(file);
        Ok(())
    }

    /// Close every descriptor marked close-on-exec. Returns how many closed.
    pub fn close_on_exec(&mut self) -> usize {
        let mut closed = 0;
        for idx in 0..self.slots.len() {
            if self.cloexec(idx) {
                self.set_cloexec(idx, false);
                if self.slots[idx].take().is_some() {
                    closed += 1;
                }
            }
        }
        closed
    }

    pub fn close_all(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.close_on_exec.iter_mut().for_each(|word| *word = 0);
    }

    /// Bound descriptors in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = (RawFd, &FileRef)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(idx, slot)| slot.as_ref().map(|file| (idx as RawFd, file)))
    }

    fn lowest_free_from(&self, start: usize) -> Option<RawFd> {
        self.slots
            .iter()
            .enumerate()
            .skip(start)
            .find(|(_, slot)| slot.is_none())
            .map(|(idx, _)| idx as RawFd)
    }

    #[inline]
    fn cloexec(&self, idx: usize) -> bool {
        self.close_on_exec[idx / 64] & (1u64 << (idx % 64)) != 0
    }

    #[inline]
    fn set_cloexec(&mut self, idx: usize, on: bool) {
        let word = &mut self.close_on_exec[idx / 64];
        if on {
            *word |= 1u64 << (idx % 64);
        } else {
            *word &= !(1u64 << (idx % 64));
        }
    }
}

impl std::fmt::Debug for FdTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}
