//! In-memory filesystem driver.
//!
//! Backs tests and synthetic mounts with a tree of directories, regular
//! files and symlinks. Like any conforming driver it never follows a
//! symlink sitting at a non-leaf component; it reports not-found and lets
//! the resolver's component probe take over.

mod node;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use linden_abi::stat::StatFs;
use linden_abi::OpenFlags;
use vfs_core::{FileSystem, GuestFile, OpenOutcome, VfsError, VfsResult};

pub use node::MemFile;
use node::{MemNode, NodeKind};

/// Synthetic `f_type` reported by [`MemFs`] (the tmpfs magic).
pub const MEMFS_MAGIC: u32 = 0x0102_1994;

pub struct MemFs {
    root: Arc<MemNode>,
    next_ino: AtomicU64,
}

impl Default for MemFs {
    fn default() -> Self {
        Self::new()
    }
}

impl MemFs {
    pub fn new() -> Self {
        Self {
            root: MemNode::new_dir(1),
            next_ino: AtomicU64::new(2),
        }
    }

    fn alloc_ino(&self) -> u64 {
        self.next_ino.fetch_add(1, Ordering::Relaxed)
    }

    pub fn statfs(&self) -> StatFs {
        StatFs {
            f_type: MEMFS_MAGIC,
            f_bsize: 4096,
            f_blocks: 1 << 20,
            f_bfree: 1 << 19,
            f_bavail: 1 << 19,
            f_files: 1 << 16,
            f_ffree: 1 << 15,
            f_namelen: 255,
            f_frsize: 4096,
            ..Default::default()
        }
    }

    /// Walk every component of `subpath` without following any symlink.
    /// A symlink or missing entry along the way reports `NotFound`; a
    /// non-directory reports `NotDir`.
    fn lookup(&self, subpath: &[u8]) -> VfsResult<Arc<MemNode>> {
        let mut node = self.root.clone();
        let mut components = components(subpath).peekable();
        while let Some(name) = components.next() {
            if name == b"." {
                continue;
            }
            let is_leaf = components.peek().is_none();
            let child = node.child(name)?.ok_or(VfsError::NotFound)?;
            if !is_leaf {
                match child.kind() {
                    NodeKind::Dir => {}
                    // The resolver owns symlink traversal.
                    NodeKind::Symlink => return Err(VfsError::NotFound),
                    NodeKind::File => return Err(VfsError::NotDir),
                }
            }
            node = child;
        }
        Ok(node)
    }

    /// Walk to the parent directory of the leaf of `subpath`.
    fn lookup_parent(&self, subpath: &[u8]) -> VfsResult<(Arc<MemNode>, Vec<u8>)> {
        let parts: Vec<&[u8]> = components(subpath).collect();
        let (leaf, dirs) = parts.split_last().ok_or(VfsError::InvalidInput)?;
        if *leaf == b"." {
            return Err(VfsError::InvalidInput);
        }
        let mut node = self.root.clone();
        for name in dirs {
            if *name == b"." {
                continue;
            }
            let child = node.child(name)?.ok_or(VfsError::NotFound)?;
            match child.kind() {
                NodeKind::Dir => node = child,
                NodeKind::Symlink => return Err(VfsError::NotFound),
                NodeKind::File => return Err(VfsError::NotDir),
            }
        }
        node.expect_dir()?;
        Ok((node, leaf.to_vec()))
    }
}

fn components(subpath: &[u8]) -> impl Iterator<Item = &[u8]> {
    subpath.split(|&b| b == b'/').filter(|c| !c.is_empty())
}

impl FileSystem for MemFs {
    fn name(&self) -> &'static str {
        "mem"
    }

    fn open(&self, subpath: &[u8], flags: OpenFlags, mode: u32) -> VfsResult<OpenOutcome> {
        let node = match self.lookup(subpath) {
            Ok(node) => {
                if flags.contains(OpenFlags::CREAT) && flags.contains(OpenFlags::EXCL) {
                    return Err(VfsError::AlreadyExists);
                }
                node
            }
            Err(VfsError::NotFound) if flags.contains(OpenFlags::CREAT) => {
                let (parent, leaf) = self.lookup_parent(subpath)?;
                parent.create_file(&leaf, self.alloc_ino(), mode)?
            }
            Err(err) => return Err(err),
        };

        match node.kind() {
            NodeKind::Symlink => {
                if flags.contains(OpenFlags::NOFOLLOW) {
                    if flags.contains(OpenFlags::PATH) {
                        // Open the link itself, not its target.
                        return Ok(OpenOutcome::File(MemFile::open(
                            self, node, subpath, flags,
                        )));
                    }
                    return Err(VfsError::TooManySymlinks);
                }
                Ok(OpenOutcome::Symlink(node.readlink()?))
            }
            NodeKind::Dir => {
                if flags.writable() {
                    return Err(VfsError::IsDir);
                }
                Ok(OpenOutcome::File(MemFile::open(self, node, subpath, flags)))
            }
            NodeKind::File => {
                if flags.contains(OpenFlags::DIRECTORY) {
                    return Err(VfsError::NotDir);
                }
                if flags.contains(OpenFlags::TRUNC) && flags.writable() {
                    node.truncate()?;
                }
                Ok(OpenOutcome::File(MemFile::open(self, node, subpath, flags)))
            }
        }
    }

    fn link(&self, source: &Arc<dyn GuestFile>, subpath: &[u8]) -> VfsResult<()> {
        let file = source
            .as_any()
            .downcast_ref::<MemFile>()
            .ok_or(VfsError::NotPermitted)?;
        if matches!(file.node().kind(), NodeKind::Dir) {
            return Err(VfsError::NotPermitted);
        }
        let (parent, leaf) = self.lookup_parent(subpath)?;
        parent.attach(&leaf, file.node().clone())
    }

    fn unlink(&self, subpath: &[u8]) -> VfsResult<()> {
        let (parent, leaf) = self.lookup_parent(subpath)?;
        parent.detach(&leaf, false)
    }

    fn symlink(&self, target: &[u8], subpath: &[u8]) -> VfsResult<()> {
        let (parent, leaf) = self.lookup_parent(subpath)?;
        parent.create_symlink(&leaf, self.alloc_ino(), target)
    }

    fn readlink(&self, subpath: &[u8]) -> VfsResult<Vec<u8>> {
        let node = self.lookup(subpath)?;
        node.readlink()
    }

    fn mkdir(&self, subpath: &[u8], _mode: u32) -> VfsResult<()> {
        let (parent, leaf) = self.lookup_parent(subpath)?;
        parent.create_dir(&leaf, self.alloc_ino())
    }

    fn rmdir(&self, subpath: &[u8]) -> VfsResult<()> {
        let (parent, leaf) = self.lookup_parent(subpath)?;
        parent.detach(&leaf, true)
    }

    fn rename(&self, source: &Arc<dyn GuestFile>, subpath: &[u8]) -> VfsResult<()> {
        let file = source
            .as_any()
            .downcast_ref::<MemFile>()
            .ok_or(VfsError::NotPermitted)?;
        let (old_parent, old_name) = file.origin().ok_or(VfsError::NotPermitted)?;
        let (new_parent, new_name) = self.lookup_parent(subpath)?;
        // No-op rename to the same entry.
        if Arc::ptr_eq(&old_parent, &new_parent) && old_name == new_name {
            return Ok(());
        }
        new_parent.attach_replacing(&new_name, file.node().clone())?;
        old_parent.detach_if_same(&old_name, file.node())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vfs_core::SeekWhence;

    fn open_file(fs: &MemFs, path: &[u8], flags: OpenFlags) -> Arc<dyn GuestFile> {
        match fs.open(path, flags, 0o644).unwrap() {
            OpenOutcome::File(f) => f,
            OpenOutcome::Symlink(_) => panic!("unexpected symlink"),
        }
    }

    #[test]
    fn create_write_read_back() {
        let fs = MemFs::new();
        let f = open_file(&fs, b"hello", OpenFlags::CREAT | OpenFlags::RDWR);
        assert_eq!(f.write(b"abc").unwrap(), 3);
        assert_eq!(f.llseek(0, SeekWhence::Set).unwrap(), 0);
        let mut buf = [0u8; 8];
        assert_eq!(f.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], b"abc");
    }

    #[test]
    fn component_symlink_reports_not_found() {
        let fs = MemFs::new();
        fs.mkdir(b"real", 0o755).unwrap();
        fs.symlink(b"/real", b"link").unwrap();
        let err = fs
            .open(b"link/file", OpenFlags::CREAT | OpenFlags::WRONLY, 0o644)
            .unwrap_err();
        assert_eq!(err, VfsError::NotFound);
        // but the prefix itself answers readlink
        assert_eq!(fs.readlink(b"link").unwrap(), b"/real");
    }

    #[test]
    fn leaf_symlink_is_surfaced_for_the_resolver() {
        let fs = MemFs::new();
        fs.symlink(b"/target", b"l").unwrap();
        match fs.open(b"l", OpenFlags::empty(), 0).unwrap() {
            OpenOutcome::Symlink(t) => assert_eq!(t, b"/target"),
            OpenOutcome::File(_) => panic!("should surface the symlink"),
        }
    }

    #[test]
    fn nofollow_without_path_rejects_symlink_leaf() {
        let fs = MemFs::new();
        fs.symlink(b"/t", b"l").unwrap();
        let err = fs.open(b"l", OpenFlags::NOFOLLOW, 0).unwrap_err();
        assert_eq!(err, VfsError::TooManySymlinks);
        // O_PATH|O_NOFOLLOW opens the link object itself
        assert!(matches!(
            fs.open(b"l", OpenFlags::NOFOLLOW | OpenFlags::PATH, 0).unwrap(),
            OpenOutcome::File(_)
        ));
    }

    #[test]
    fn excl_rejects_existing() {
        let fs = MemFs::new();
        open_file(&fs, b"f", OpenFlags::CREAT | OpenFlags::WRONLY);
        let err = fs
            .open(b"f", OpenFlags::CREAT | OpenFlags::EXCL | OpenFlags::WRONLY, 0)
            .unwrap_err();
        assert_eq!(err, VfsError::AlreadyExists);
    }

    #[test]
    fn unlink_and_rmdir_distinguish_kinds() {
        let fs = MemFs::new();
        fs.mkdir(b"d", 0o755).unwrap();
        open_file(&fs, b"f", OpenFlags::CREAT | OpenFlags::WRONLY);
        assert_eq!(fs.unlink(b"d").unwrap_err(), VfsError::IsDir);
        assert_eq!(fs.rmdir(b"f").unwrap_err(), VfsError::NotDir);
        fs.unlink(b"f").unwrap();
        fs.rmdir(b"d").unwrap();
        assert_eq!(fs.lookup(b"f").unwrap_err(), VfsError::NotFound);
    }

    #[test]
    fn rmdir_requires_empty() {
        let fs = MemFs::new();
        fs.mkdir(b"d", 0o755).unwrap();
        open_file(&fs, b"d/f", OpenFlags::CREAT | OpenFlags::WRONLY);
        assert_eq!(fs.rmdir(b"d").unwrap_err(), VfsError::NotEmpty);
    }

    #[test]
    fn hard_link_shares_the_node() {
        let fs = MemFs::new();
        let f = open_file(&fs, b"a", OpenFlags::CREAT | OpenFlags::RDWR);
        f.write(b"shared").unwrap();
        fs.link(&f, b"b").unwrap();
        let g = open_file(&fs, b"b", OpenFlags::empty());
        let mut buf = [0u8; 16];
        assert_eq!(g.read(&mut buf).unwrap(), 6);
        assert_eq!(&buf[..6], b"shared");
        assert_eq!(g.stat().unwrap().st_nlink, 2);
    }

    #[test]
    fn rename_moves_the_entry() {
        let fs = MemFs::new();
        let f = open_file(
            &fs,
            b"old",
            OpenFlags::CREAT | OpenFlags::WRONLY | OpenFlags::PATH | OpenFlags::NOFOLLOW,
        );
        fs.rename(&f, b"new").unwrap();
        assert_eq!(fs.lookup(b"old").unwrap_err(), VfsError::NotFound);
        assert!(fs.lookup(b"new").is_ok());
    }

    #[test]
    fn getdents_streams_in_order() {
        let fs = MemFs::new();
        fs.mkdir(b"d", 0o755).unwrap();
        open_file(&fs, b"d/zz", OpenFlags::CREAT | OpenFlags::WRONLY);
        open_file(&fs, b"d/aa", OpenFlags::CREAT | OpenFlags::WRONLY);
        let dir = open_file(&fs, b"d", OpenFlags::DIRECTORY);
        let mut names = Vec::new();
        dir.getdents(&mut |entry| {
            names.push(entry.name.clone());
            true
        })
        .unwrap();
        assert_eq!(names, [b".".to_vec(), b"..".to_vec(), b"aa".to_vec(), b"zz".to_vec()]);
        // cursor is exhausted
        let mut again = 0;
        dir.getdents(&mut |_| {
            again += 1;
            true
        })
        .unwrap();
        assert_eq!(again, 0);
    }
}
