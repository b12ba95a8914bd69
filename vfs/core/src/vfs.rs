//! `Vfs` service object: the mount table plus per-process descriptor
//! state behind one handle.
//!
//! The descriptor table, cwd and umask share a mutex; path resolution runs
//! against a cwd snapshot taken at entry, matching the single-guest-thread
//! model (only the main thread mutates this state).

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;

use linden_abi::{OpenFlags, DEFAULT_UMASK};

use crate::error::VfsResult;
use crate::fd_table::FdTable;
use crate::file::GuestFile;
use crate::fs::FileSystem;
use crate::mount::MountTable;
use crate::path::{GuestPathBuf, normalize};
use crate::resolve::Resolver;

struct ProcState {
    fds: FdTable,
    cwd: GuestPathBuf,
    umask: u32,
}

#[derive(Clone)]
pub struct Vfs {
    inner: Arc<VfsInner>,
}

struct VfsInner {
    mounts: MountTable,
    state: Mutex<ProcState>,
}

impl Default for Vfs {
    fn default() -> Self {
        Self::new()
    }
}

impl Vfs {
    pub fn new() -> Self {
        info!("vfs subsystem initialising");
        Self {
            inner: Arc::new(VfsInner {
                mounts: MountTable::new(),
                state: Mutex::new(ProcState {
                    fds: FdTable::new(),
                    cwd: GuestPathBuf::root(),
                    umask: DEFAULT_UMASK,
                }),
            }),
        }
    }

    pub fn mounts(&self) -> &MountTable {
        &self.inner.mounts
    }

    pub fn mount(&self, mountpoint: GuestPathBuf, fs: Arc<dyn FileSystem>) {
        self.inner.mounts.add(mountpoint, fs);
    }

    /// Pin stdio files onto descriptors 0, 1 and 2.
    pub fn install_stdio(
        &self,
        stdin: Arc<dyn GuestFile>,
        stdout: Arc<dyn GuestFile>,
        stderr: Arc<dyn GuestFile>,
    ) {
        let mut state = self.inner.state.lock();
        state.fds.install(0, stdin, false);
        state.fds.install(1, stdout, false);
        state.fds.install(2, stderr, false);
    }

    pub fn get(&self, fd: i32) -> Option<Arc<dyn GuestFile>> {
        self.inner.state.lock().fds.get(fd)
    }

    pub fn store(&self, file: Arc<dyn GuestFile>, cloexec: bool) -> VfsResult<i32> {
        self.inner.state.lock().fds.store(file, cloexec)
    }

    pub fn close(&self, fd: i32) -> VfsResult<()> {
        self.inner.state.lock().fds.close(fd)
    }

    pub fn dup(&self, fd: i32, newfd: Option<i32>, cloexec: bool) -> VfsResult<i32> {
        self.inner.state.lock().fds.dup(fd, newfd, cloexec)
    }

    pub fn cloexec(&self, fd: i32) -> Option<bool> {
        self.inner.state.lock().fds.cloexec(fd)
    }

    pub fn set_cloexec(&self, fd: i32, cloexec: bool) -> bool {
        self.inner.state.lock().fds.set_cloexec(fd, cloexec)
    }

    pub fn cwd(&self) -> GuestPathBuf {
        self.inner.state.lock().cwd.clone()
    }

    pub fn set_cwd(&self, cwd: GuestPathBuf) {
        self.inner.state.lock().cwd = cwd;
    }

    pub fn umask(&self) -> u32 {
        self.inner.state.lock().umask
    }

    pub fn swap_umask(&self, new: u32) -> u32 {
        let mut state = self.inner.state.lock();
        std::mem::replace(&mut state.umask, new)
    }

    /// Exec-style reset: close cloexec descriptors, restore the default
    /// umask.
    pub fn reset(&self) {
        let mut state = self.inner.state.lock();
        state.fds.reset_on_exec();
        state.umask = DEFAULT_UMASK;
    }

    pub fn shutdown(&self) {
        self.inner.state.lock().fds.shutdown();
    }

    pub fn open(
        &self,
        pathname: &[u8],
        flags: OpenFlags,
        mode: u32,
    ) -> VfsResult<Arc<dyn GuestFile>> {
        Resolver::new(&self.inner.mounts).open(&self.cwd(), pathname, flags, mode)
    }

    pub fn link(&self, source: &Arc<dyn GuestFile>, newpath: &[u8]) -> VfsResult<()> {
        Resolver::new(&self.inner.mounts).link(&self.cwd(), source, newpath)
    }

    pub fn unlink(&self, pathname: &[u8]) -> VfsResult<()> {
        Resolver::new(&self.inner.mounts).unlink(&self.cwd(), pathname)
    }

    pub fn symlink(&self, target: &[u8], linkpath: &[u8]) -> VfsResult<()> {
        Resolver::new(&self.inner.mounts).symlink(&self.cwd(), target, linkpath)
    }

    pub fn readlink(&self, pathname: &[u8]) -> VfsResult<Vec<u8>> {
        Resolver::new(&self.inner.mounts).readlink(&self.cwd(), pathname)
    }

    pub fn mkdir(&self, pathname: &[u8], mode: u32) -> VfsResult<()> {
        Resolver::new(&self.inner.mounts).mkdir(&self.cwd(), pathname, mode)
    }

    pub fn rmdir(&self, pathname: &[u8]) -> VfsResult<()> {
        Resolver::new(&self.inner.mounts).rmdir(&self.cwd(), pathname)
    }

    pub fn rename(&self, source: &Arc<dyn GuestFile>, newpath: &[u8]) -> VfsResult<()> {
        Resolver::new(&self.inner.mounts).rename(&self.cwd(), source, newpath)
    }

    /// Canonicalise `pathname` against the current cwd.
    pub fn absolute(&self, pathname: &[u8]) -> GuestPathBuf {
        normalize(&self.cwd(), pathname)
    }
}
