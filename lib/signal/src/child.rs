//! Child-process death tracking.
//!
//! Every tracked child owns a one-way death pipe: the write end is leaked
//! into the child at spawn time and never held here, so the read end
//! reaches EOF exactly when the child goes away, cleanly or not. A
//! watcher converts that EOF into an ingress packet; everything else
//! (SIGCHLD, the wait semaphore) happens on the worker.

use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

/// Read end of a child's death pipe.
pub type DeathPipe = Box<dyn Read + Send>;

pub struct ChildProcess {
    pid: u32,
    terminated: AtomicBool,
    pipe: Mutex<Option<DeathPipe>>,
}

impl ChildProcess {
    pub fn new(pid: u32, pipe: DeathPipe) -> Self {
        Self {
            pid,
            terminated: AtomicBool::new(false),
            pipe: Mutex::new(Some(pipe)),
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    pub(crate) fn mark_terminated(&self) {
        self.terminated.store(true, Ordering::Release);
    }

    pub(crate) fn take_pipe(&self) -> Option<DeathPipe> {
        self.pipe.lock().take()
    }
}

/// Block until the pipe reports EOF or an error; either means the child is
/// gone.
pub(crate) fn wait_for_death(mut pipe: DeathPipe) {
    let mut buf = [0u8; 1];
    loop {
        match pipe.read(&mut buf) {
            Ok(0) | Err(_) => return,
            Ok(_) => continue,
        }
    }
}
