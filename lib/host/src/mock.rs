//! In-process collaborator doubles.
//!
//! Unit and integration tests across the workspace need a guest address
//! space, a main thread and a translator they can observe; these live here
//! rather than being re-written per test module.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use linden_abi::{CpuContext, GuestPtr, SigContext, FPSTATE_SIZE};

use crate::{BadAddress, Dbt, GuestMemory, GuestThread};

/// Flat guest memory backed by a `Vec`, mapped at a fixed base address.
pub struct VecMemory {
    base: GuestPtr,
    bytes: Mutex<Vec<u8>>,
}

impl VecMemory {
    pub fn new(base: GuestPtr, size: usize) -> Self {
        Self {
            base,
            bytes: Mutex::new(vec![0u8; size]),
        }
    }

    pub fn base(&self) -> GuestPtr {
        self.base
    }

    /// Highest mapped address plus one.
    pub fn end(&self) -> GuestPtr {
        self.base + self.bytes.lock().len() as GuestPtr
    }

    fn range(&self, ptr: GuestPtr, len: usize) -> Option<(usize, usize)> {
        let len = len as u64;
        let ptr = ptr as u64;
        let base = self.base as u64;
        let size = self.bytes.lock().len() as u64;
        if ptr < base || ptr + len > base + size {
            return None;
        }
        let start = (ptr - base) as usize;
        Some((start, start + len as usize))
    }
}

impl GuestMemory for VecMemory {
    fn check_read(&self, ptr: GuestPtr, len: usize) -> bool {
        self.range(ptr, len).is_some()
    }

    fn check_write(&self, ptr: GuestPtr, len: usize) -> bool {
        self.range(ptr, len).is_some()
    }

    fn check_read_string(&self, ptr: GuestPtr) -> bool {
        self.read_c_string(ptr).is_ok()
    }

    fn read_bytes(&self, ptr: GuestPtr, out: &mut [u8]) -> Result<(), BadAddress> {
        let (start, end) = self.range(ptr, out.len()).ok_or(BadAddress)?;
        out.copy_from_slice(&self.bytes.lock()[start..end]);
        Ok(())
    }

    fn write_bytes(&self, ptr: GuestPtr, bytes: &[u8]) -> Result<(), BadAddress> {
        let (start, end) = self.range(ptr, bytes.len()).ok_or(BadAddress)?;
        self.bytes.lock()[start..end].copy_from_slice(bytes);
        Ok(())
    }

    fn read_c_string(&self, ptr: GuestPtr) -> Result<Vec<u8>, BadAddress> {
        let (start, _) = self.range(ptr, 0).ok_or(BadAddress)?;
        let bytes = self.bytes.lock();
        let tail = &bytes[start..];
        let nul = tail.iter().position(|&b| b == 0).ok_or(BadAddress)?;
        Ok(tail[..nul].to_vec())
    }
}

/// Main-thread double: a context cell with suspend semantics collapsed to a
/// mutex.
#[derive(Default)]
pub struct MockThread {
    context: Mutex<CpuContext>,
}

impl MockThread {
    pub fn new(context: CpuContext) -> Self {
        Self {
            context: Mutex::new(context),
        }
    }

    pub fn context(&self) -> CpuContext {
        *self.context.lock()
    }

    pub fn set_context(&self, context: CpuContext) {
        *self.context.lock() = context;
    }
}

impl GuestThread for MockThread {
    fn with_suspended(&self, f: &mut dyn FnMut(&mut CpuContext)) {
        let mut context = self.context.lock();
        f(&mut context);
    }
}

/// Translator double that records every boundary crossing.
pub struct RecordingDbt {
    /// Address `deliver_signal` points the thread at, standing in for the
    /// signal-setup trampoline.
    pub trampoline: GuestPtr,
    deliveries: AtomicUsize,
    sigreturns: Mutex<Vec<SigContext>>,
}

impl RecordingDbt {
    pub fn new(trampoline: GuestPtr) -> Self {
        Self {
            trampoline,
            deliveries: AtomicUsize::new(0),
            sigreturns: Mutex::new(Vec::new()),
        }
    }

    pub fn delivery_count(&self) -> usize {
        self.deliveries.load(Ordering::SeqCst)
    }

    pub fn sigreturns(&self) -> Vec<SigContext> {
        self.sigreturns.lock().clone()
    }
}

impl Dbt for RecordingDbt {
    fn deliver_signal(&self, context: &mut CpuContext) {
        self.deliveries.fetch_add(1, Ordering::SeqCst);
        context.eip = self.trampoline;
    }

    fn sigreturn(&self, mcontext: &SigContext) {
        self.sigreturns.lock().push(*mcontext);
    }

    fn fpu_save(&self, area: &mut [u8; FPSTATE_SIZE]) {
        area.fill(0xf1);
    }

    fn fpu_restore(&self, _area: &[u8; FPSTATE_SIZE]) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec_memory_bounds() {
        let mem = VecMemory::new(0x1000, 64);
        assert!(mem.check_write(0x1000, 64));
        assert!(!mem.check_read(0x0fff, 4));
        assert!(!mem.check_read(0x103d, 8));
        mem.write_bytes(0x1008, b"abc\0").unwrap();
        assert_eq!(mem.read_c_string(0x1008).unwrap(), b"abc");
        assert!(mem.check_read_string(0x1008));
        assert!(!mem.check_read_string(0x1040));
    }

    #[test]
    fn mock_thread_round_trips_context() {
        let thread = MockThread::new(CpuContext {
            eip: 0x100,
            ..Default::default()
        });
        thread.with_suspended(&mut |ctx| ctx.eip = 0x200);
        assert_eq!(thread.context().eip, 0x200);
    }
}
