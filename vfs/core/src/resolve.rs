//! Symlink-aware path resolution.
//!
//! Every path-taking operation runs the same loop: canonicalise, locate the
//! owning mount, try the operation, and only when the driver reports
//! not-found go looking for a symlink in the ancestor components. The
//! operation-first order is deliberate: testing for symlinks before acting
//! would open a window in the common case, while a component probe after a
//! failed operation can at worst resurrect a path that was just replaced,
//! and the whole operation then simply retries.
//!
//! Component probing walks the subpath's `/` positions right to left,
//! asking the driver to `readlink` each truncation. The first hit splices
//! `target + "/" + remainder` back into the absolute path and the outer
//! loop goes again, up to `MAX_SYMLINK_LEVEL` times in total before the
//! walk gives up with `TooManySymlinks`.

use std::sync::Arc;

use tracing::{trace, warn};

use linden_abi::{OpenFlags, MAX_SYMLINK_LEVEL};

use crate::error::{VfsError, VfsResult};
use crate::file::GuestFile;
use crate::fs::OpenOutcome;
use crate::mount::{Located, MountTable};
use crate::path::{normalize, GuestPath, GuestPathBuf};

enum Step<T> {
    Done(T),
    /// The leaf was an expandable symlink; re-enter with this target.
    Follow(Vec<u8>),
}

pub struct Resolver<'a> {
    mounts: &'a MountTable,
}

impl<'a> Resolver<'a> {
    pub fn new(mounts: &'a MountTable) -> Self {
        Self { mounts }
    }

    pub fn open(
        &self,
        cwd: &GuestPath,
        pathname: &[u8],
        flags: OpenFlags,
        mode: u32,
    ) -> VfsResult<Arc<dyn GuestFile>> {
        self.walk(cwd, pathname, &mut |hit| {
            let sub: &[u8] = if hit.subpath.is_empty() {
                b"."
            } else {
                &hit.subpath
            };
            match hit.fs.open(sub, flags, mode)? {
                OpenOutcome::File(file) => Ok(Step::Done(file)),
                OpenOutcome::Symlink(target) => {
                    trace!(target = ?String::from_utf8_lossy(&target), "leaf is a symlink");
                    Ok(Step::Follow(target))
                }
            }
        })
    }

    pub fn link(
        &self,
        cwd: &GuestPath,
        source: &Arc<dyn GuestFile>,
        newpath: &[u8],
    ) -> VfsResult<()> {
        self.walk(cwd, newpath, &mut |hit| {
            hit.fs.link(source, &hit.subpath).map(Step::Done)
        })
    }

    pub fn unlink(&self, cwd: &GuestPath, pathname: &[u8]) -> VfsResult<()> {
        self.walk(cwd, pathname, &mut |hit| {
            hit.fs.unlink(&hit.subpath).map(Step::Done)
        })
    }

    pub fn symlink(&self, cwd: &GuestPath, target: &[u8], linkpath: &[u8]) -> VfsResult<()> {
        self.walk(cwd, linkpath, &mut |hit| {
            hit.fs.symlink(target, &hit.subpath).map(Step::Done)
        })
    }

    pub fn readlink(&self, cwd: &GuestPath, pathname: &[u8]) -> VfsResult<Vec<u8>> {
        self.walk(cwd, pathname, &mut |hit| {
            hit.fs.readlink(&hit.subpath).map(Step::Done)
        })
    }

    pub fn mkdir(&self, cwd: &GuestPath, pathname: &[u8], mode: u32) -> VfsResult<()> {
        self.walk(cwd, pathname, &mut |hit| {
            hit.fs.mkdir(&hit.subpath, mode).map(Step::Done)
        })
    }

    pub fn rmdir(&self, cwd: &GuestPath, pathname: &[u8]) -> VfsResult<()> {
        self.walk(cwd, pathname, &mut |hit| {
            hit.fs.rmdir(&hit.subpath).map(Step::Done)
        })
    }

    pub fn rename(
        &self,
        cwd: &GuestPath,
        source: &Arc<dyn GuestFile>,
        newpath: &[u8],
    ) -> VfsResult<()> {
        self.walk(cwd, newpath, &mut |hit| {
            hit.fs.rename(source, &hit.subpath).map(Step::Done)
        })
    }

    fn walk<T>(
        &self,
        cwd: &GuestPath,
        pathname: &[u8],
        op: &mut dyn FnMut(&Located) -> VfsResult<Step<T>>,
    ) -> VfsResult<T> {
        let mut path = normalize(cwd, pathname);
        for _ in 0..MAX_SYMLINK_LEVEL {
            trace!(path = ?path, "resolving");
            let hit = self.mounts.find(&path)?;
            match op(&hit) {
                Ok(Step::Done(value)) => return Ok(value),
                Ok(Step::Follow(target)) => {
                    let keep = path.basename_start();
                    let base = GuestPathBuf::from_bytes(path.as_bytes()[..keep].to_vec());
                    path = normalize(&base, &target);
                }
                // Driver absence behaves as not-found at this component.
                Err(VfsError::NotFound | VfsError::NotSupported) => {
                    if !self.probe_component_symlink(&hit, &mut path)? {
                        return Err(VfsError::NotFound);
                    }
                }
                Err(other) => return Err(other),
            }
        }
        Err(VfsError::TooManySymlinks)
    }

    /// Right-to-left scan for a symlink among the ancestor components of
    /// `hit.subpath`. On a hit, rewrites `path` and reports progress; the
    /// caller converts "no progress" into `NotFound`.
    fn probe_component_symlink(&self, hit: &Located, path: &mut GuestPathBuf) -> VfsResult<bool> {
        let sub = &hit.subpath;
        for i in (1..sub.len()).rev() {
            if sub[i] != b'/' {
                continue;
            }
            match hit.fs.readlink(&sub[..i]) {
                Ok(mut target) => {
                    trace!(
                        prefix = ?String::from_utf8_lossy(&sub[..i]),
                        target = ?String::from_utf8_lossy(&target),
                        "component is a symlink"
                    );
                    if target.last() != Some(&b'/') {
                        target.push(b'/');
                    }
                    target.extend_from_slice(&sub[i + 1..]);
                    let comp_start = sub[..i]
                        .iter()
                        .rposition(|&b| b == b'/')
                        .map_or(0, |j| j + 1);
                    let base_len = hit.subpath_offset + comp_start;
                    let base = GuestPathBuf::from_bytes(path.as_bytes()[..base_len].to_vec());
                    *path = normalize(&base, &target);
                    return Ok(true);
                }
                Err(VfsError::NotFound) => continue,
                Err(VfsError::NotSupported) => {
                    warn!(fs = hit.fs.name(), "filesystem does not support symlinks");
                    return Ok(false);
                }
                // A component exists but is not a symlink, or the probe
                // itself failed; stop scanning and let the caller report
                // the original not-found.
                Err(_) => return Ok(false),
            }
        }
        Ok(false)
    }
}
