//! Mount table.
//!
//! Lookup is first-match on a literal byte prefix in registration order,
//! newest mount first, not longest-prefix. A mount at `/` therefore has to
//! be registered first or it shadows everything after it.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{VfsError, VfsResult};
use crate::fs::FileSystem;
use crate::path::{GuestPath, GuestPathBuf};

struct MountEntry {
    mountpoint: GuestPathBuf,
    fs: Arc<dyn FileSystem>,
}

/// Where a path landed: the owning driver and the subpath below its
/// mountpoint (leading `/` stripped).
pub struct Located {
    pub fs: Arc<dyn FileSystem>,
    pub subpath: Vec<u8>,
    /// Byte offset of `subpath` within the absolute path it was derived
    /// from; the resolver needs it to splice symlink targets back in.
    pub subpath_offset: usize,
}

#[derive(Default)]
pub struct MountTable {
    entries: RwLock<Vec<MountEntry>>,
}

impl MountTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a filesystem. The newest registration is consulted first.
    pub fn add(&self, mountpoint: GuestPathBuf, fs: Arc<dyn FileSystem>) {
        debug_assert!(mountpoint.is_absolute());
        tracing::debug!(
            mountpoint = ?mountpoint,
            fs = fs.name(),
            "registering filesystem"
        );
        self.entries.write().insert(0, MountEntry { mountpoint, fs });
    }

    /// First entry whose mountpoint is a literal prefix of `path`.
    pub fn find(&self, path: &GuestPath) -> VfsResult<Located> {
        let entries = self.entries.read();
        for entry in entries.iter() {
            let mp = entry.mountpoint.as_bytes();
            if let Some(rest) = path.as_bytes().strip_prefix(mp) {
                let skip = usize::from(rest.first() == Some(&b'/'));
                return Ok(Located {
                    fs: entry.fs.clone(),
                    subpath: rest[skip..].to_vec(),
                    subpath_offset: mp.len() + skip,
                });
            }
        }
        Err(VfsError::NotFound)
    }
}
