//! Shared test rig: a core wired to an in-memory filesystem, a flat guest
//! address space and recording collaborator doubles.
#![allow(dead_code)]

use std::cell::Cell;
use std::sync::Arc;

use linden::host::mock::{MockThread, RecordingDbt, VecMemory};
use linden::{Core, CoreBuilder};
use linden_abi::{CpuContext, GuestPtr};
use vfs_core::pipe_pair;
use vfs_mem::MemFs;

pub const MEM_BASE: GuestPtr = 0x1000_0000;
pub const MEM_SIZE: usize = 0x40000;
pub const STACK_TOP: GuestPtr = MEM_BASE + MEM_SIZE as GuestPtr;
pub const TRAMPOLINE: GuestPtr = 0x0100_0000;
pub const RESTORER: GuestPtr = 0x0804_9000;

pub struct Guest {
    pub core: Core,
    pub mm: Arc<VecMemory>,
    pub thread: Arc<MockThread>,
    pub dbt: Arc<RecordingDbt>,
    cursor: Cell<GuestPtr>,
    // keep the far ends of the stdio pipes alive
    _stdio: (Arc<vfs_core::PipeWriter>, Arc<vfs_core::PipeReader>),
}

pub fn guest() -> Guest {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let thread = Arc::new(MockThread::new(CpuContext {
        esp: STACK_TOP,
        eip: 0x0804_0000,
        ..Default::default()
    }));
    let dbt = Arc::new(RecordingDbt::new(TRAMPOLINE));
    let mm = Arc::new(VecMemory::new(MEM_BASE, MEM_SIZE));
    let (stdin, stdin_feed) = pipe_pair(Default::default());
    let (stdout_drain, stdout) = pipe_pair(Default::default());
    let core = CoreBuilder::new(thread.clone(), dbt.clone(), mm.clone())
        .restorer(RESTORER)
        .mount(b"/", Arc::new(MemFs::new()))
        .stdio(stdin, stdout.clone(), stdout)
        .build();
    Guest {
        core,
        mm,
        thread,
        dbt,
        cursor: Cell::new(MEM_BASE),
        _stdio: (stdin_feed, stdout_drain),
    }
}

impl Guest {
    /// Bump-allocate guest scratch memory.
    pub fn alloc(&self, len: usize) -> GuestPtr {
        let at = (self.cursor.get() + 7) & !7;
        self.cursor.set(at + len as GuestPtr);
        assert!(self.cursor.get() < STACK_TOP - 0x4000, "guest arena exhausted");
        at
    }

    pub fn put_bytes(&self, bytes: &[u8]) -> GuestPtr {
        use linden::host::GuestMemory;
        let at = self.alloc(bytes.len());
        self.mm.write_bytes(at, bytes).unwrap();
        at
    }

    /// Place a NUL-terminated guest string.
    pub fn put_str(&self, s: &[u8]) -> GuestPtr {
        let mut bytes = s.to_vec();
        bytes.push(0);
        self.put_bytes(&bytes)
    }

    pub fn read_mem(&self, at: GuestPtr, len: usize) -> Vec<u8> {
        use linden::host::GuestMemory;
        self.mm.read_vec(at, len).unwrap()
    }
}
