//! The guest-facing syscall surface.
//!
//! Each entry point takes the [`Core`] handle plus raw guest arguments,
//! validates every pointer through the memory-manager contract before
//! touching any state, and returns `Result<i32, Errno>`; the trampoline
//! folds that into the guest's return register with [`syscall_ret`].

pub mod errno;
pub mod fd;
pub mod io;
pub mod path;
pub mod poll;
pub mod signal;
pub mod stat;

use std::sync::Arc;

use tracing::info;

use linden_abi::{Errno, GuestPtr};
use linden_host::GuestMemory;
use linden_signal::SignalCore;
use vfs_core::{GuestFile, Vfs};

pub type SysResult = Result<i32, Errno>;

/// Fold a syscall result into the guest ABI: non-negative value or negated
/// errno.
pub fn syscall_ret(result: SysResult) -> i32 {
    match result {
        Ok(value) => value,
        Err(err) => err.as_ret(),
    }
}

/// Everything a syscall needs: the VFS, the signal core and the guest
/// address space. One handle, threaded through every entry point;
/// process-wide statics have no place here.
#[derive(Clone)]
pub struct Core {
    vfs: Vfs,
    signal: SignalCore,
    mm: Arc<dyn GuestMemory>,
}

impl Core {
    pub fn new(vfs: Vfs, signal: SignalCore, mm: Arc<dyn GuestMemory>) -> Self {
        Self { vfs, signal, mm }
    }

    pub fn vfs(&self) -> &Vfs {
        &self.vfs
    }

    pub fn signal(&self) -> &SignalCore {
        &self.signal
    }

    pub fn mm(&self) -> &dyn GuestMemory {
        &*self.mm
    }

    /// Exec-style reset: cloexec sweep plus umask default.
    pub fn reset(&self) {
        self.vfs.reset();
    }

    pub fn shutdown(&self) {
        info!("core shutting down");
        self.vfs.shutdown();
        self.signal.shutdown();
    }

    pub(crate) fn file(&self, fd: i32) -> Result<Arc<dyn GuestFile>, Errno> {
        self.vfs.get(fd).ok_or(Errno::BadF)
    }

    pub(crate) fn read_user(&self, ptr: GuestPtr, len: usize) -> Result<Vec<u8>, Errno> {
        if !self.mm.check_read(ptr, len) {
            return Err(Errno::Fault);
        }
        self.mm.read_vec(ptr, len).map_err(|_| Errno::Fault)
    }

    pub(crate) fn write_user(&self, ptr: GuestPtr, bytes: &[u8]) -> Result<(), Errno> {
        if !self.mm.check_write(ptr, bytes.len()) {
            return Err(Errno::Fault);
        }
        self.mm.write_bytes(ptr, bytes).map_err(|_| Errno::Fault)
    }

    pub(crate) fn read_user_string(&self, ptr: GuestPtr) -> Result<Vec<u8>, Errno> {
        if !self.mm.check_read_string(ptr) {
            return Err(Errno::Fault);
        }
        self.mm.read_c_string(ptr).map_err(|_| Errno::Fault)
    }

    pub(crate) fn check_write(&self, ptr: GuestPtr, len: usize) -> Result<(), Errno> {
        if self.mm.check_write(ptr, len) {
            Ok(())
        } else {
            Err(Errno::Fault)
        }
    }

    pub(crate) fn check_read(&self, ptr: GuestPtr, len: usize) -> Result<(), Errno> {
        if self.mm.check_read(ptr, len) {
            Ok(())
        } else {
            Err(Errno::Fault)
        }
    }
}
