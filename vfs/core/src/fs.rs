//! Filesystem driver contract.
//!
//! Drivers receive the subpath below their mountpoint, already
//! canonicalised; an empty subpath is presented as `.` by the resolver.
//! Every operation defaults to [`VfsError::NotSupported`], which the
//! resolver treats as "nothing at this component": a driver without
//! `mkdir` simply has no directories to create anywhere under its mount.

use std::sync::Arc;

use linden_abi::OpenFlags;

use crate::error::{VfsError, VfsResult};
use crate::file::GuestFile;

/// What `open` found at the leaf.
pub enum OpenOutcome {
    File(Arc<dyn GuestFile>),
    /// The leaf is a symlink and following it is allowed; the resolver
    /// re-enters with the target.
    Symlink(Vec<u8>),
}

pub trait FileSystem: Send + Sync {
    fn name(&self) -> &'static str;

    fn open(&self, _subpath: &[u8], _flags: OpenFlags, _mode: u32) -> VfsResult<OpenOutcome> {
        Err(VfsError::NotSupported)
    }

    /// Hard-link an already-opened source file at `subpath`.
    fn link(&self, _source: &Arc<dyn GuestFile>, _subpath: &[u8]) -> VfsResult<()> {
        Err(VfsError::NotSupported)
    }

    fn unlink(&self, _subpath: &[u8]) -> VfsResult<()> {
        Err(VfsError::NotSupported)
    }

    fn symlink(&self, _target: &[u8], _subpath: &[u8]) -> VfsResult<()> {
        Err(VfsError::NotSupported)
    }

    fn readlink(&self, _subpath: &[u8]) -> VfsResult<Vec<u8>> {
        Err(VfsError::NotSupported)
    }

    fn mkdir(&self, _subpath: &[u8], _mode: u32) -> VfsResult<()> {
        Err(VfsError::NotSupported)
    }

    fn rmdir(&self, _subpath: &[u8]) -> VfsResult<()> {
        Err(VfsError::NotSupported)
    }

    /// Move an already-opened source file to `subpath`.
    fn rename(&self, _source: &Arc<dyn GuestFile>, _subpath: &[u8]) -> VfsResult<()> {
        Err(VfsError::NotSupported)
    }
}
