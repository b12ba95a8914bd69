//! Tree nodes and the open-file object of the in-memory driver.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use linden_abi::stat::{NewStat, StatFs, S_IFDIR, S_IFLNK, S_IFREG};
use linden_abi::time::Timespec;
use linden_abi::{DirentKind, OpenFlags};
use vfs_core::{DirEntry, GuestFile, SeekWhence, VfsError, VfsResult};

use crate::MemFs;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum NodeKind {
    File,
    Dir,
    Symlink,
}

enum Content {
    File(Mutex<Vec<u8>>),
    Dir(Mutex<BTreeMap<Vec<u8>, Arc<MemNode>>>),
    Symlink(Vec<u8>),
}

struct Meta {
    nlink: u32,
    atime: Timespec,
    mtime: Timespec,
}

pub(crate) struct MemNode {
    ino: u64,
    content: Content,
    meta: Mutex<Meta>,
}

impl MemNode {
    fn new(ino: u64, content: Content) -> Arc<Self> {
        Arc::new(Self {
            ino,
            content,
            meta: Mutex::new(Meta {
                nlink: 1,
                atime: Timespec::default(),
                mtime: Timespec::default(),
            }),
        })
    }

    pub(crate) fn new_dir(ino: u64) -> Arc<Self> {
        Self::new(ino, Content::Dir(Mutex::new(BTreeMap::new())))
    }

    pub(crate) fn ino(&self) -> u64 {
        self.ino
    }

    pub(crate) fn kind(&self) -> NodeKind {
        match self.content {
            Content::File(_) => NodeKind::File,
            Content::Dir(_) => NodeKind::Dir,
            Content::Symlink(_) => NodeKind::Symlink,
        }
    }

    fn children(&self) -> VfsResult<&Mutex<BTreeMap<Vec<u8>, Arc<MemNode>>>> {
        match &self.content {
            Content::Dir(children) => Ok(children),
            _ => Err(VfsError::NotDir),
        }
    }

    pub(crate) fn expect_dir(&self) -> VfsResult<()> {
        self.children().map(|_| ())
    }

    pub(crate) fn child(&self, name: &[u8]) -> VfsResult<Option<Arc<MemNode>>> {
        Ok(self.children()?.lock().get(name).cloned())
    }

    pub(crate) fn create_file(&self, name: &[u8], ino: u64, _mode: u32) -> VfsResult<Arc<MemNode>> {
        let mut children = self.children()?.lock();
        if children.contains_key(name) {
            return Err(VfsError::AlreadyExists);
        }
        let node = MemNode::new(ino, Content::File(Mutex::new(Vec::new())));
        children.insert(name.to_vec(), node.clone());
        Ok(node)
    }

    pub(crate) fn create_dir(&self, name: &[u8], ino: u64) -> VfsResult<()> {
        let mut children = self.children()?.lock();
        if children.contains_key(name) {
            return Err(VfsError::AlreadyExists);
        }
        children.insert(name.to_vec(), MemNode::new_dir(ino));
        Ok(())
    }

    pub(crate) fn create_symlink(&self, name: &[u8], ino: u64, target: &[u8]) -> VfsResult<()> {
        let mut children = self.children()?.lock();
        if children.contains_key(name) {
            return Err(VfsError::AlreadyExists);
        }
        children.insert(
            name.to_vec(),
            MemNode::new(ino, Content::Symlink(target.to_vec())),
        );
        Ok(())
    }

    /// Hard-link `node` under `name`.
    pub(crate) fn attach(&self, name: &[u8], node: Arc<MemNode>) -> VfsResult<()> {
        let mut children = self.children()?.lock();
        if children.contains_key(name) {
            return Err(VfsError::AlreadyExists);
        }
        node.meta.lock().nlink += 1;
        children.insert(name.to_vec(), node);
        Ok(())
    }

    /// Rename-install `node` under `name`, displacing a prior file or
    /// symlink. Displacing a directory is refused.
    pub(crate) fn attach_replacing(&self, name: &[u8], node: Arc<MemNode>) -> VfsResult<()> {
        let mut children = self.children()?.lock();
        if let Some(existing) = children.get(name) {
            if existing.kind() == NodeKind::Dir {
                return Err(VfsError::IsDir);
            }
        }
        children.insert(name.to_vec(), node);
        Ok(())
    }

    pub(crate) fn detach(&self, name: &[u8], expect_dir: bool) -> VfsResult<()> {
        let mut children = self.children()?.lock();
        let node = children.get(name).ok_or(VfsError::NotFound)?;
        match (node.kind() == NodeKind::Dir, expect_dir) {
            (true, false) => return Err(VfsError::IsDir),
            (false, true) => return Err(VfsError::NotDir),
            (true, true) => {
                if !node.children()?.lock().is_empty() {
                    return Err(VfsError::NotEmpty);
                }
            }
            (false, false) => {}
        }
        let node = children.remove(name).unwrap();
        let mut meta = node.meta.lock();
        meta.nlink = meta.nlink.saturating_sub(1);
        Ok(())
    }

    /// Rename cleanup: remove `name` only while it still maps to `node`.
    pub(crate) fn detach_if_same(&self, name: &[u8], node: &Arc<MemNode>) -> VfsResult<()> {
        let mut children = self.children()?.lock();
        if children.get(name).is_some_and(|n| Arc::ptr_eq(n, node)) {
            children.remove(name);
        }
        Ok(())
    }

    pub(crate) fn readlink(&self) -> VfsResult<Vec<u8>> {
        match &self.content {
            Content::Symlink(target) => Ok(target.clone()),
            _ => Err(VfsError::InvalidInput),
        }
    }

    pub(crate) fn truncate(&self) -> VfsResult<()> {
        match &self.content {
            Content::File(data) => {
                data.lock().clear();
                Ok(())
            }
            _ => Err(VfsError::IsDir),
        }
    }

    fn size(&self) -> u64 {
        match &self.content {
            Content::File(data) => data.lock().len() as u64,
            Content::Symlink(target) => target.len() as u64,
            Content::Dir(_) => 0,
        }
    }

    fn stat(&self) -> NewStat {
        let meta = self.meta.lock();
        let mode = match self.kind() {
            NodeKind::File => S_IFREG | 0o644,
            NodeKind::Dir => S_IFDIR | 0o755,
            NodeKind::Symlink => S_IFLNK | 0o777,
        };
        NewStat {
            st_ino: self.ino,
            st_mode: mode,
            st_nlink: meta.nlink,
            st_size: self.size() as i64,
            st_blksize: 4096,
            st_blocks: self.size().div_ceil(512),
            st_atime: meta.atime.tv_sec,
            st_atime_nsec: meta.atime.tv_nsec,
            st_mtime: meta.mtime.tv_sec,
            st_mtime_nsec: meta.mtime.tv_nsec,
            ..Default::default()
        }
    }
}

/// An open handle onto a [`MemNode`].
pub struct MemFile {
    node: Arc<MemNode>,
    /// Parent directory and entry name at open time; rename needs them.
    origin: Option<(Arc<MemNode>, Vec<u8>)>,
    flags: OpenFlags,
    pos: Mutex<u64>,
    fs_stat: StatFs,
}

impl MemFile {
    pub(crate) fn open(
        fs: &MemFs,
        node: Arc<MemNode>,
        subpath: &[u8],
        flags: OpenFlags,
    ) -> Arc<MemFile> {
        Arc::new(MemFile {
            origin: fs.lookup_parent(subpath).ok(),
            node,
            flags,
            pos: Mutex::new(0),
            fs_stat: fs.statfs(),
        })
    }

    pub(crate) fn node(&self) -> &Arc<MemNode> {
        &self.node
    }

    pub(crate) fn origin(&self) -> Option<(Arc<MemNode>, Vec<u8>)> {
        self.origin.clone()
    }

    fn check_io(&self, write: bool) -> VfsResult<()> {
        if self.flags.contains(OpenFlags::PATH) {
            return Err(VfsError::BadHandle);
        }
        let allowed = if write {
            self.flags.writable()
        } else {
            self.flags.readable()
        };
        if !allowed {
            return Err(VfsError::BadHandle);
        }
        Ok(())
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> VfsResult<usize> {
        match &self.node.content {
            Content::File(data) => {
                let data = data.lock();
                let start = (offset as usize).min(data.len());
                let n = buf.len().min(data.len() - start);
                buf[..n].copy_from_slice(&data[start..start + n]);
                Ok(n)
            }
            Content::Dir(_) => Err(VfsError::IsDir),
            Content::Symlink(_) => Err(VfsError::InvalidInput),
        }
    }

    fn write_at(&self, buf: &[u8], offset: u64) -> VfsResult<usize> {
        match &self.node.content {
            Content::File(data) => {
                let mut data = data.lock();
                let end = offset as usize + buf.len();
                if data.len() < end {
                    data.resize(end, 0);
                }
                data[offset as usize..end].copy_from_slice(buf);
                Ok(buf.len())
            }
            Content::Dir(_) => Err(VfsError::IsDir),
            Content::Symlink(_) => Err(VfsError::InvalidInput),
        }
    }
}

impl GuestFile for MemFile {
    fn flags(&self) -> OpenFlags {
        self.flags
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn read(&self, buf: &mut [u8]) -> VfsResult<usize> {
        self.check_io(false)?;
        let mut pos = self.pos.lock();
        let n = self.read_at(buf, *pos)?;
        *pos += n as u64;
        Ok(n)
    }

    fn write(&self, buf: &[u8]) -> VfsResult<usize> {
        self.check_io(true)?;
        let mut pos = self.pos.lock();
        if self.flags.contains(OpenFlags::APPEND) {
            *pos = self.node.size();
        }
        let n = self.write_at(buf, *pos)?;
        *pos += n as u64;
        Ok(n)
    }

    fn pread(&self, buf: &mut [u8], offset: u64) -> VfsResult<usize> {
        self.check_io(false)?;
        self.read_at(buf, offset)
    }

    fn pwrite(&self, buf: &[u8], offset: u64) -> VfsResult<usize> {
        self.check_io(true)?;
        self.write_at(buf, offset)
    }

    fn llseek(&self, offset: i64, whence: SeekWhence) -> VfsResult<i64> {
        let mut pos = self.pos.lock();
        let base = match whence {
            SeekWhence::Set => 0,
            SeekWhence::Cur => *pos as i64,
            SeekWhence::End => self.node.size() as i64,
        };
        let next = base.checked_add(offset).ok_or(VfsError::InvalidInput)?;
        if next < 0 {
            return Err(VfsError::InvalidInput);
        }
        *pos = next as u64;
        Ok(next)
    }

    fn stat(&self) -> VfsResult<NewStat> {
        Ok(self.node.stat())
    }

    fn statfs(&self) -> VfsResult<StatFs> {
        Ok(self.fs_stat)
    }

    fn getdents(&self, emit: &mut dyn FnMut(&DirEntry) -> bool) -> VfsResult<()> {
        let children = self.node.children()?;
        let parent_ino = self
            .origin
            .as_ref()
            .map_or(self.node.ino(), |(parent, _)| parent.ino());
        let mut entries = vec![
            DirEntry {
                ino: self.node.ino(),
                name: b".".to_vec(),
                kind: DirentKind::Dir,
            },
            DirEntry {
                ino: parent_ino,
                name: b"..".to_vec(),
                kind: DirentKind::Dir,
            },
        ];
        for (name, node) in children.lock().iter() {
            entries.push(DirEntry {
                ino: node.ino(),
                name: name.clone(),
                kind: match node.kind() {
                    NodeKind::File => DirentKind::Regular,
                    NodeKind::Dir => DirentKind::Dir,
                    NodeKind::Symlink => DirentKind::Symlink,
                },
            });
        }
        let mut pos = self.pos.lock();
        while (*pos as usize) < entries.len() {
            if !emit(&entries[*pos as usize]) {
                break;
            }
            *pos += 1;
        }
        Ok(())
    }

    fn utimens(&self, times: Option<[Timespec; 2]>) -> VfsResult<()> {
        let mut meta = self.node.meta.lock();
        let [atime, mtime] = times.unwrap_or_default();
        meta.atime = atime;
        meta.mtime = mtime;
        Ok(())
    }
}
