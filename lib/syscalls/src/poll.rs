//! `poll` and `select`.
//!
//! Readiness is answered in two steps, the way the drivers expose it: a
//! precise status query where available, otherwise a waitable handle whose
//! firing only means "state may have changed", so every wakeup re-checks
//! the actual status and goes back to sleep (with the timeout budget
//! shrunk) on a spurious one. `select` is a marshalling shim over the same
//! machinery.

use std::time::{Duration, Instant};

use smallvec::SmallVec;
use tracing::{instrument, warn};

use linden_abi::poll::{fdset, PollEvents, PollFd};
use linden_abi::time::Timeval;
use linden_abi::{Errno, GuestPtr};
use linden_host::{wait_any, Event, WaitOutcome};
use vfs_core::PollHandle;

use crate::{Core, SysResult};

fn status_of(file: &dyn vfs_core::GuestFile, handle: Option<&PollHandle>) -> PollEvents {
    match file.poll_status() {
        Some(events) => events,
        None => handle.map_or(PollEvents::empty(), |h| h.events),
    }
}

/// Shared poll loop. `fds[i].revents` is filled in place; returns the
/// number of descriptors with a non-empty result.
fn poll_inner(core: &Core, fds: &mut [PollFd], timeout_ms: i32) -> Result<i32, Errno> {
    let deadline =
        (timeout_ms >= 0).then(|| Instant::now() + Duration::from_millis(timeout_ms as u64));

    for fd in fds.iter_mut() {
        fd.revents = PollEvents::empty();
    }

    let mut num_result = 0;
    let mut waiters: SmallVec<[(usize, PollHandle); 8]> = SmallVec::new();
    for (index, pollfd) in fds.iter_mut().enumerate() {
        if pollfd.fd < 0 {
            continue;
        }
        let Some(file) = core.vfs().get(pollfd.fd) else {
            pollfd.revents = PollEvents::NVAL;
            num_result += 1;
            continue;
        };
        if let Some(status) = file.poll_status() {
            let ready = status & pollfd.events;
            if !ready.is_empty() {
                pollfd.revents = ready;
                num_result += 1;
                continue;
            }
        }
        match file.poll_handle() {
            Some(handle) => {
                if !(pollfd.events & handle.events).is_empty() {
                    waiters.push((index, handle));
                }
            }
            None => {
                warn!(fd = pollfd.fd, "file does not support polling");
            }
        }
    }

    if num_result > 0 || waiters.is_empty() || timeout_ms == 0 {
        return Ok(num_result);
    }

    loop {
        let remaining = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return Ok(0);
                }
                Some(deadline - now)
            }
            None => None,
        };
        let events: SmallVec<[&Event; 8]> =
            waiters.iter().map(|(_, handle)| &*handle.event).collect();
        let fired = match wait_any(&events, remaining) {
            WaitOutcome::Object(i) => i,
            WaitOutcome::Timeout => return Ok(0),
        };
        let (index, handle) = &waiters[fired];
        let file = core.vfs().get(fds[*index].fd).ok_or(Errno::BadF)?;
        let ready = status_of(&*file, Some(handle)) & fds[*index].events;
        if ready.is_empty() {
            // Signalled but not actually ready for what was asked; wait
            // again with whatever budget is left.
            continue;
        }
        fds[*index].revents = ready;
        return Ok(1);
    }
}

#[instrument(level = "trace", skip(core))]
pub fn sys_poll(core: &Core, fds_ptr: GuestPtr, nfds: i32, timeout_ms: i32) -> SysResult {
    if nfds < 0 {
        return Err(Errno::Inval);
    }
    let byte_len = nfds as usize * PollFd::SIZE;
    core.check_write(fds_ptr, byte_len)?;
    let raw = core.read_user(fds_ptr, byte_len)?;
    let mut fds: Vec<PollFd> = raw.chunks_exact(PollFd::SIZE).map(PollFd::decode).collect();

    let result = poll_inner(core, &mut fds, timeout_ms)?;

    let mut out = vec![0u8; byte_len];
    for (chunk, fd) in out.chunks_exact_mut(PollFd::SIZE).zip(&fds) {
        fd.encode(chunk);
    }
    core.write_user(fds_ptr, &out)?;
    Ok(result)
}

#[instrument(level = "trace", skip(core))]
pub fn sys_select(
    core: &Core,
    nfds: i32,
    readfds: GuestPtr,
    writefds: GuestPtr,
    exceptfds: GuestPtr,
    timeout: GuestPtr,
) -> SysResult {
    if nfds < 0 {
        return Err(Errno::Inval);
    }
    let set_len = fdset::byte_len(nfds as usize);
    let mut read_set = read_fdset(core, readfds, set_len)?;
    let mut write_set = read_fdset(core, writefds, set_len)?;
    let mut except_set = read_fdset(core, exceptfds, set_len)?;
    let timeout_ms = if timeout == 0 {
        -1
    } else {
        let raw = core.read_user(timeout, Timeval::SIZE)?;
        let tv = Timeval::decode(&raw);
        (tv.tv_sec * 1000 + tv.tv_usec / 1000) as i32
    };

    let mut fds = Vec::new();
    for fd in 0..nfds as usize {
        let mut events = PollEvents::empty();
        if read_set.as_deref().is_some_and(|s| fdset::is_set(s, fd)) {
            events |= PollEvents::IN;
        }
        if write_set.as_deref().is_some_and(|s| fdset::is_set(s, fd)) {
            events |= PollEvents::OUT;
        }
        if except_set.as_deref().is_some_and(|s| fdset::is_set(s, fd)) {
            events |= PollEvents::ERR;
        }
        if !events.is_empty() {
            fds.push(PollFd {
                fd: fd as i32,
                events,
                revents: PollEvents::empty(),
            });
        }
    }

    let result = poll_inner(core, &mut fds, timeout_ms)?;
    if result <= 0 {
        return Ok(result);
    }

    for set in [&mut read_set, &mut write_set, &mut except_set].into_iter().flatten() {
        fdset::zero(set);
    }
    for fd in &fds {
        if fd.revents.contains(PollEvents::IN) {
            if let Some(set) = read_set.as_deref_mut() {
                fdset::set(set, fd.fd as usize);
            }
        }
        if fd.revents.contains(PollEvents::OUT) {
            if let Some(set) = write_set.as_deref_mut() {
                fdset::set(set, fd.fd as usize);
            }
        }
        if fd.revents.contains(PollEvents::ERR) {
            if let Some(set) = except_set.as_deref_mut() {
                fdset::set(set, fd.fd as usize);
            }
        }
    }
    write_fdset(core, readfds, read_set.as_deref())?;
    write_fdset(core, writefds, write_set.as_deref())?;
    write_fdset(core, exceptfds, except_set.as_deref())?;
    Ok(result)
}

fn read_fdset(core: &Core, ptr: GuestPtr, len: usize) -> Result<Option<Vec<u8>>, Errno> {
    if ptr == 0 {
        return Ok(None);
    }
    core.check_write(ptr, len)?;
    core.read_user(ptr, len).map(Some)
}

fn write_fdset(core: &Core, ptr: GuestPtr, set: Option<&[u8]>) -> Result<(), Errno> {
    match set {
        Some(bytes) => core.write_user(ptr, bytes),
        None => Ok(()),
    }
}
