//! The open-file object and its operation surface.
//!
//! Every method defaults to [`VfsError::NotSupported`]; drivers override
//! what they actually implement and the syscall boundary maps the gaps to
//! per-operation errno values (`ESPIPE` for seeking a pipe, `ENOTTY` for a
//! stray ioctl, and so on). Closing is `Drop`: the last strong reference
//! releases the underlying resource exactly once.

use std::any::Any;
use std::sync::Arc;

use linden_abi::poll::PollEvents;
use linden_abi::stat::{NewStat, StatFs};
use linden_abi::time::Timespec;
use linden_abi::{DirentKind, OpenFlags};
use linden_host::Event;

use crate::error::{VfsError, VfsResult};

/// `llseek` origin.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SeekWhence {
    Set,
    Cur,
    End,
}

impl SeekWhence {
    pub fn from_raw(whence: i32) -> Option<Self> {
        match whence {
            0 => Some(Self::Set),
            1 => Some(Self::Cur),
            2 => Some(Self::End),
            _ => None,
        }
    }
}

/// One directory entry as a driver reports it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntry {
    pub ino: u64,
    pub name: Vec<u8>,
    pub kind: DirentKind,
}

/// A waitable handle plus the event bits its signalled state stands for.
#[derive(Clone)]
pub struct PollHandle {
    pub event: Arc<Event>,
    pub events: PollEvents,
}

pub trait GuestFile: Send + Sync {
    /// Guest-visible open flags (`F_GETFL`).
    fn flags(&self) -> OpenFlags;

    /// Concrete-type escape hatch; drivers use it to recognise their own
    /// files when a `link`/`rename` source crosses the trait boundary.
    fn as_any(&self) -> &dyn Any;

    fn read(&self, _buf: &mut [u8]) -> VfsResult<usize> {
        Err(VfsError::NotSupported)
    }

    fn write(&self, _buf: &[u8]) -> VfsResult<usize> {
        Err(VfsError::NotSupported)
    }

    fn pread(&self, _buf: &mut [u8], _offset: u64) -> VfsResult<usize> {
        Err(VfsError::NotSupported)
    }

    fn pwrite(&self, _buf: &[u8], _offset: u64) -> VfsResult<usize> {
        Err(VfsError::NotSupported)
    }

    fn llseek(&self, _offset: i64, _whence: SeekWhence) -> VfsResult<i64> {
        Err(VfsError::NotSupported)
    }

    fn stat(&self) -> VfsResult<NewStat> {
        Err(VfsError::NotSupported)
    }

    fn statfs(&self) -> VfsResult<StatFs> {
        Err(VfsError::NotSupported)
    }

    /// Stream directory entries from the file's cursor. `emit` returns
    /// `false` once the caller's buffer is full; entries already emitted
    /// stay consumed, the rest are picked up by the next call.
    fn getdents(&self, _emit: &mut dyn FnMut(&DirEntry) -> bool) -> VfsResult<()> {
        Err(VfsError::NotSupported)
    }

    fn ioctl(&self, _cmd: u32, _arg: u32) -> VfsResult<i32> {
        Err(VfsError::NotSupported)
    }

    /// `None` means "set both times to now".
    fn utimens(&self, _times: Option<[Timespec; 2]>) -> VfsResult<()> {
        Err(VfsError::NotSupported)
    }

    /// Events ready right now, when the driver can answer precisely.
    fn poll_status(&self) -> Option<PollEvents> {
        None
    }

    /// Waitable object covering this file's readiness transitions.
    fn poll_handle(&self) -> Option<PollHandle> {
        None
    }
}
