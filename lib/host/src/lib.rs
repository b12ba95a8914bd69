//! Contracts the personality core consumes from its collaborators, plus the
//! portable synchronisation primitives the signal machinery is built on.
//!
//! The memory manager, the dynamic binary translator and the guest main
//! thread all live outside this workspace; the core only sees them through
//! the traits defined here. The one inherently unsafe operation (rewriting
//! a running thread's register context) is confined to
//! [`GuestThread::with_suspended`], so everything above this crate is safe
//! code.

pub mod event;
pub mod mock;

use linden_abi::{CpuContext, GuestPtr, SigContext, FPSTATE_SIZE};

pub use event::{wait_any, Event, Semaphore, WaitOutcome};

/// A guest pointer range was not mapped with the required access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("guest pointer range is not accessible")]
pub struct BadAddress;

/// Guest address-space oracle and accessor.
///
/// The `check_*` family mirrors the memory manager's validation entry
/// points; the byte accessors are the copying interface the syscall layer
/// uses once a range has been validated.
pub trait GuestMemory: Send + Sync {
    fn check_read(&self, ptr: GuestPtr, len: usize) -> bool;
    fn check_write(&self, ptr: GuestPtr, len: usize) -> bool;

    /// Whether `ptr` points at a readable NUL-terminated string.
    fn check_read_string(&self, ptr: GuestPtr) -> bool;

    fn read_bytes(&self, ptr: GuestPtr, out: &mut [u8]) -> Result<(), BadAddress>;
    fn write_bytes(&self, ptr: GuestPtr, bytes: &[u8]) -> Result<(), BadAddress>;

    /// Read a NUL-terminated string, excluding the terminator.
    fn read_c_string(&self, ptr: GuestPtr) -> Result<Vec<u8>, BadAddress>;

    fn read_vec(&self, ptr: GuestPtr, len: usize) -> Result<Vec<u8>, BadAddress> {
        let mut buf = vec![0u8; len];
        self.read_bytes(ptr, &mut buf)?;
        Ok(buf)
    }
}

/// Dynamic binary translator boundary.
pub trait Dbt: Send + Sync {
    /// Rewrite a suspended thread's context so that, on resume, it lands in
    /// the emulator's signal-setup trampoline. Must only be called while the
    /// thread is suspended.
    fn deliver_signal(&self, context: &mut CpuContext);

    /// Resume guest execution from a restored machine context. Production
    /// translators never return from this; test doubles record the context
    /// and do.
    fn sigreturn(&self, mcontext: &SigContext);

    /// Save the host FPU state into a 512-byte FXSAVE image.
    fn fpu_save(&self, area: &mut [u8; FPSTATE_SIZE]);

    /// Restore the host FPU state from a 512-byte FXSAVE image.
    fn fpu_restore(&self, area: &[u8; FPSTATE_SIZE]);
}

/// Handle to the emulated main thread.
///
/// `with_suspended` is the bounded unsafe boundary: the realisation suspends
/// the thread, materialises its integer/control context, lets `f` mutate it,
/// writes the result back and resumes. Only the signal worker may call it.
pub trait GuestThread: Send + Sync {
    fn with_suspended(&self, f: &mut dyn FnMut(&mut CpuContext));
}
