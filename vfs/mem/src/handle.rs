use crate::node::MemFsState;
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use vfs_namei::{FileOps, OpenFile, VfsResult};

/// Contents of a regular file, shared by every open file on it.
pub(crate) struct MemFileOps {
    state: Arc<MemFsState>,
    data: RwLock<Vec<u8>>,
    open_files: AtomicUsize,
}

impl MemFileOps {
    pub(crate) fn new(state: Arc<MemFsState>, data: Vec<u8>) -> Self {
        Self {
            state,
            data: RwLock::new(data),
            open_files: AtomicUsize::new(0),
        }
    }

    pub(crate) fn contents(&self) -> Vec<u8> {
        self.data.read().clone()
    }

    pub(crate) fn open_files(&self) -> usize {
        self.open_files.load(Ordering::Acquire)
    }

    pub(crate) fn truncate(&self) -> VfsResult<()> {
        let mut data = self.data.write();
        self.state.resize(data.len() as u64, 0)?;
        data.clear();
        Ok(())
    }
}

impl Drop for MemFileOps {
    fn drop(&mut self) {
        self.state.release_bytes(self.data.get_mut().len() as u64);
    }
}

impl FileOps for MemFileOps {
    fn open(&self, _file: &OpenFile) -> VfsResult<()> {
        self.open_files.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn read(&self, _file: &OpenFile, pos: &mut u64, buf: &mut [u8]) -> VfsResult<usize> {
        let data = self.data.read();
        let start = usize::try_from(*pos).unwrap_or(usize::MAX).min(data.len());
        let len = buf.len().min(data.len() - start);
        buf[..len].copy_from_slice(&data[start..start + len]);
        *pos += len as u64;
        Ok(len)
    }

    fn write(&self, file: &OpenFile, pos: &mut u64, buf: &[u8]) -> VfsResult<usize> {
        let mut data = self.data.write();
        let start = usize::try_from(*pos).unwrap_or(usize::MAX);
        let end = start.saturating_add(buf.len());
        if end > data.len() {
            self.state.resize(data.len() as u64, end as u64)?;
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(buf);
        *pos = end as u64;
        file.inode().set_size(data.len() as u64);
        Ok(buf.len())
    }

    fn release(&self, _file: &OpenFile) {
        self.open_files.fetch_sub(1, Ordering::AcqRel);
    }
}
