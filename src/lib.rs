//! Linden: a user-space Linux personality core: signal delivery and a
//! virtual filesystem multiplexed over pluggable drivers.
//!
//! The heavy lifting lives in the member crates; this crate wires them
//! into a [`Core`] ready for the syscall trampoline. The memory manager,
//! dynamic binary translator and guest main thread are collaborators
//! supplied by the embedder through the `linden-host` contracts.

use std::sync::Arc;

use linden_abi::GuestPtr;
use linden_host::{Dbt, GuestMemory, GuestThread};
use linden_signal::SignalCore;
use vfs_core::{normalize, FileSystem, GuestFile, GuestPath, GuestPathBuf, Vfs};

pub use linden_abi as abi;
pub use linden_host as host;
pub use linden_signal as signal;
pub use linden_syscalls as syscalls;
pub use linden_syscalls::{syscall_ret, Core};
pub use vfs_core;
pub use vfs_mem;

/// Assembles a [`Core`] from collaborator handles, mounts and stdio files.
pub struct CoreBuilder {
    thread: Arc<dyn GuestThread>,
    dbt: Arc<dyn Dbt>,
    mm: Arc<dyn GuestMemory>,
    restorer: GuestPtr,
    mounts: Vec<(GuestPathBuf, Arc<dyn FileSystem>)>,
    stdio: Option<(Arc<dyn GuestFile>, Arc<dyn GuestFile>, Arc<dyn GuestFile>)>,
}

impl CoreBuilder {
    pub fn new(
        thread: Arc<dyn GuestThread>,
        dbt: Arc<dyn Dbt>,
        mm: Arc<dyn GuestMemory>,
    ) -> Self {
        Self {
            thread,
            dbt,
            mm,
            restorer: 0,
            mounts: Vec::new(),
            stdio: None,
        }
    }

    /// Address of the emulator-provided restorer stub, used when a handler
    /// registers without one.
    pub fn restorer(mut self, restorer: GuestPtr) -> Self {
        self.restorer = restorer;
        self
    }

    /// Register a filesystem; later mounts shadow earlier ones, so mount
    /// the root filesystem first.
    pub fn mount(mut self, mountpoint: &[u8], fs: Arc<dyn FileSystem>) -> Self {
        let mountpoint = normalize(GuestPath::new(b"/"), mountpoint);
        self.mounts.push((mountpoint, fs));
        self
    }

    /// Files to pin on descriptors 0, 1 and 2.
    pub fn stdio(
        mut self,
        stdin: Arc<dyn GuestFile>,
        stdout: Arc<dyn GuestFile>,
        stderr: Arc<dyn GuestFile>,
    ) -> Self {
        self.stdio = Some((stdin, stdout, stderr));
        self
    }

    pub fn build(self) -> Core {
        let vfs = Vfs::new();
        for (mountpoint, fs) in self.mounts {
            vfs.mount(mountpoint, fs);
        }
        if let Some((stdin, stdout, stderr)) = self.stdio {
            vfs.install_stdio(stdin, stdout, stderr);
        }
        let signal = SignalCore::new(self.thread, self.dbt, self.mm.clone(), self.restorer);
        Core::new(vfs, signal, self.mm)
    }
}
