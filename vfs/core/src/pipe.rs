//! Anonymous pipes.
//!
//! A pipe is a byte queue shared between two file objects. Reads block
//! until data arrives or the write side disappears; writes never block (the
//! queue is unbounded) and fail with `BrokenPipe` once the read side is
//! gone: the syscall layer turns that into EPIPE and a SIGPIPE raise.
//! Both ends expose poll handles so `poll`/`select` can wait on them.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use linden_abi::poll::PollEvents;
use linden_abi::stat::{NewStat, S_IFIFO};
use linden_abi::OpenFlags;
use linden_host::Event;

use crate::error::{VfsError, VfsResult};
use crate::file::{GuestFile, PollHandle};

struct PipeState {
    data: VecDeque<u8>,
    read_closed: bool,
    write_closed: bool,
}

struct PipeShared {
    state: Mutex<PipeState>,
    /// Set while data is queued or the writer is gone.
    readable: Arc<Event>,
    /// Set while writes can proceed or the reader is gone.
    writable: Arc<Event>,
}

impl PipeShared {
    fn pipe_stat(&self) -> NewStat {
        NewStat {
            st_mode: S_IFIFO | 0o600,
            st_nlink: 1,
            st_blksize: 4096,
            ..Default::default()
        }
    }
}

pub struct PipeReader {
    shared: Arc<PipeShared>,
    flags: OpenFlags,
}

pub struct PipeWriter {
    shared: Arc<PipeShared>,
    flags: OpenFlags,
}

/// Allocate a connected pipe pair. `flags` become the guest-visible open
/// flags of both ends, with the access mode fixed up per end.
pub fn pipe_pair(flags: OpenFlags) -> (Arc<PipeReader>, Arc<PipeWriter>) {
    let shared = Arc::new(PipeShared {
        state: Mutex::new(PipeState {
            data: VecDeque::new(),
            read_closed: false,
            write_closed: false,
        }),
        readable: Arc::new(Event::new()),
        writable: Arc::new(Event::new()),
    });
    shared.writable.set();
    let status = flags & !OpenFlags::CLOEXEC;
    (
        Arc::new(PipeReader {
            shared: shared.clone(),
            flags: status & !(OpenFlags::WRONLY | OpenFlags::RDWR),
        }),
        Arc::new(PipeWriter {
            shared,
            flags: (status & !OpenFlags::RDWR) | OpenFlags::WRONLY,
        }),
    )
}

impl GuestFile for PipeReader {
    fn flags(&self) -> OpenFlags {
        self.flags
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn read(&self, buf: &mut [u8]) -> VfsResult<usize> {
        loop {
            {
                let mut state = self.shared.state.lock();
                if !state.data.is_empty() {
                    let n = buf.len().min(state.data.len());
                    for b in buf[..n].iter_mut() {
                        *b = state.data.pop_front().unwrap();
                    }
                    if state.data.is_empty() && !state.write_closed {
                        self.shared.readable.reset();
                    }
                    return Ok(n);
                }
                if state.write_closed {
                    return Ok(0);
                }
            }
            self.shared.readable.wait(None);
        }
    }

    fn stat(&self) -> VfsResult<NewStat> {
        Ok(self.shared.pipe_stat())
    }

    fn poll_status(&self) -> Option<PollEvents> {
        let state = self.shared.state.lock();
        let mut events = PollEvents::empty();
        if !state.data.is_empty() || state.write_closed {
            events |= PollEvents::IN;
        }
        if state.write_closed {
            events |= PollEvents::HUP;
        }
        Some(events)
    }

    fn poll_handle(&self) -> Option<PollHandle> {
        Some(PollHandle {
            event: self.shared.readable.clone(),
            events: PollEvents::IN | PollEvents::HUP,
        })
    }
}

impl Drop for PipeReader {
    fn drop(&mut self) {
        self.shared.state.lock().read_closed = true;
        self.shared.writable.set();
    }
}

impl GuestFile for PipeWriter {
    fn flags(&self) -> OpenFlags {
        self.flags
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn write(&self, buf: &[u8]) -> VfsResult<usize> {
        let mut state = self.shared.state.lock();
        if state.read_closed {
            return Err(VfsError::BrokenPipe);
        }
        state.data.extend(buf.iter().copied());
        if !buf.is_empty() {
            self.shared.readable.set();
        }
        Ok(buf.len())
    }

    fn stat(&self) -> VfsResult<NewStat> {
        Ok(self.shared.pipe_stat())
    }

    fn poll_status(&self) -> Option<PollEvents> {
        let state = self.shared.state.lock();
        let mut events = PollEvents::OUT;
        if state.read_closed {
            events |= PollEvents::ERR;
        }
        Some(events)
    }

    fn poll_handle(&self) -> Option<PollHandle> {
        Some(PollHandle {
            event: self.shared.writable.clone(),
            events: PollEvents::OUT | PollEvents::ERR,
        })
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        self.shared.state.lock().write_closed = true;
        self.shared.readable.set();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn write_then_read() {
        let (r, w) = pipe_pair(OpenFlags::empty());
        assert_eq!(w.write(b"hello").unwrap(), 5);
        let mut buf = [0u8; 3];
        assert_eq!(r.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf, b"hel");
        let mut rest = [0u8; 8];
        assert_eq!(r.read(&mut rest).unwrap(), 2);
        assert_eq!(&rest[..2], b"lo");
    }

    #[test]
    fn eof_after_writer_drop() {
        let (r, w) = pipe_pair(OpenFlags::empty());
        w.write(b"x").unwrap();
        drop(w);
        let mut buf = [0u8; 4];
        assert_eq!(r.read(&mut buf).unwrap(), 1);
        assert_eq!(r.read(&mut buf).unwrap(), 0);
        assert_eq!(r.poll_status().unwrap(), PollEvents::IN | PollEvents::HUP);
    }

    #[test]
    fn broken_pipe_after_reader_drop() {
        let (r, w) = pipe_pair(OpenFlags::empty());
        drop(r);
        assert_eq!(w.write(b"x").unwrap_err(), VfsError::BrokenPipe);
        assert!(w.poll_status().unwrap().contains(PollEvents::ERR));
    }

    #[test]
    fn blocking_read_wakes_on_write() {
        let (r, w) = pipe_pair(OpenFlags::empty());
        let reader = thread::spawn(move || {
            let mut buf = [0u8; 4];
            let n = r.read(&mut buf).unwrap();
            buf[..n].to_vec()
        });
        thread::sleep(Duration::from_millis(20));
        w.write(b"ping").unwrap();
        assert_eq!(reader.join().unwrap(), b"ping");
    }

    #[test]
    fn poll_handle_signals_on_data() {
        let (r, w) = pipe_pair(OpenFlags::empty());
        let handle = r.poll_handle().unwrap();
        assert!(!handle.event.is_set());
        w.write(b"!").unwrap();
        assert!(handle.event.is_set());
        assert_eq!(r.poll_status().unwrap(), PollEvents::IN);
    }

    #[test]
    fn ends_report_access_modes() {
        let (r, w) = pipe_pair(OpenFlags::CLOEXEC);
        assert!(!r.flags().contains(OpenFlags::CLOEXEC));
        assert!(r.flags().readable());
        assert!(w.flags().writable());
    }
}
