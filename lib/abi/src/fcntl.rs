//! Guest open flags and fcntl commands (IA-32 Linux values).

use bitflags::bitflags;

bitflags! {
    /// `open(2)` flag bits as the guest passes them.
    ///
    /// The access mode occupies the low two bits and is not a simple bit
    /// test; use [`OpenFlags::access_mode`].
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct OpenFlags: u32 {
        const WRONLY = 0o1;
        const RDWR = 0o2;
        const CREAT = 0o100;
        const EXCL = 0o200;
        const NOCTTY = 0o400;
        const TRUNC = 0o1000;
        const APPEND = 0o2000;
        const NONBLOCK = 0o4000;
        const DSYNC = 0o10000;
        const ASYNC = 0o20000;
        const DIRECT = 0o40000;
        const LARGEFILE = 0o100000;
        const DIRECTORY = 0o200000;
        const NOFOLLOW = 0o400000;
        const NOATIME = 0o1000000;
        const CLOEXEC = 0o2000000;
        const SYNC = 0o4010000;
        const PATH = 0o10000000;
        const TMPFILE = 0o20200000;
    }
}

pub const O_ACCMODE: u32 = 0o3;

/// Access-mode component of an open flag word.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl OpenFlags {
    pub fn access_mode(self) -> Option<AccessMode> {
        match self.bits() & O_ACCMODE {
            0o0 => Some(AccessMode::ReadOnly),
            0o1 => Some(AccessMode::WriteOnly),
            0o2 => Some(AccessMode::ReadWrite),
            _ => None,
        }
    }

    pub fn readable(self) -> bool {
        matches!(
            self.access_mode(),
            Some(AccessMode::ReadOnly | AccessMode::ReadWrite)
        )
    }

    pub fn writable(self) -> bool {
        matches!(
            self.access_mode(),
            Some(AccessMode::WriteOnly | AccessMode::ReadWrite)
        )
    }
}

/// `fcntl(2)` commands the personality serves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FcntlCmd {
    DupFd,
    GetFd,
    SetFd,
    GetFl,
}

impl FcntlCmd {
    pub fn from_raw(cmd: i32) -> Option<Self> {
        match cmd {
            0 => Some(Self::DupFd),
            1 => Some(Self::GetFd),
            2 => Some(Self::SetFd),
            3 => Some(Self::GetFl),
            _ => None,
        }
    }
}

/// `F_SETFD`/`F_GETFD` close-on-exec bit.
pub const FD_CLOEXEC: i32 = 1;

/// Special dirfd meaning "relative to the process cwd".
pub const AT_FDCWD: i32 = -100;

/// `lseek` whence values.
pub const SEEK_SET: i32 = 0;
pub const SEEK_CUR: i32 = 1;
pub const SEEK_END: i32 = 2;

/// `posix_fadvise` advice values.
pub const POSIX_FADV_NORMAL: i32 = 0;
pub const POSIX_FADV_RANDOM: i32 = 1;
pub const POSIX_FADV_SEQUENTIAL: i32 = 2;
pub const POSIX_FADV_WILLNEED: i32 = 3;
pub const POSIX_FADV_DONTNEED: i32 = 4;
pub const POSIX_FADV_NOREUSE: i32 = 5;
