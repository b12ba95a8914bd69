//! Guest errno values.
//!
//! These are the IA-32 Linux numbers, not the host's. Syscalls report
//! failure as the negated raw value; [`Errno::as_ret`] performs that
//! negation in exactly one place.

/// Errno codes the personality actually produces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, thiserror::Error)]
#[repr(i32)]
pub enum Errno {
    #[error("operation not permitted")]
    Perm = 1,
    #[error("no such file or directory")]
    NoEnt = 2,
    #[error("no such process")]
    Srch = 3,
    #[error("interrupted system call")]
    Intr = 4,
    #[error("i/o error")]
    Io = 5,
    #[error("no such device or address")]
    NxIo = 6,
    #[error("bad file descriptor")]
    BadF = 9,
    #[error("no child processes")]
    Child = 10,
    #[error("try again")]
    Again = 11,
    #[error("out of memory")]
    NoMem = 12,
    #[error("permission denied")]
    Access = 13,
    #[error("bad address")]
    Fault = 14,
    #[error("device or resource busy")]
    Busy = 16,
    #[error("file exists")]
    Exist = 17,
    #[error("cross-device link")]
    XDev = 18,
    #[error("no such device")]
    NoDev = 19,
    #[error("not a directory")]
    NotDir = 20,
    #[error("is a directory")]
    IsDir = 21,
    #[error("invalid argument")]
    Inval = 22,
    #[error("file table overflow")]
    NFile = 23,
    #[error("too many open files")]
    MFile = 24,
    #[error("not a typewriter")]
    NotTy = 25,
    #[error("file too large")]
    FBig = 27,
    #[error("no space left on device")]
    NoSpc = 28,
    #[error("illegal seek")]
    SPipe = 29,
    #[error("read-only file system")]
    RoFs = 30,
    #[error("broken pipe")]
    Pipe = 32,
    #[error("math result not representable")]
    Range = 34,
    #[error("file name too long")]
    NameTooLong = 36,
    #[error("function not implemented")]
    NoSys = 38,
    #[error("directory not empty")]
    NotEmpty = 39,
    #[error("too many symbolic links encountered")]
    Loop = 40,
    #[error("value too large for defined data type")]
    Overflow = 75,
}

impl Errno {
    /// Raw guest errno number.
    pub const fn raw(self) -> i32 {
        self as i32
    }

    /// Syscall return encoding: the negated errno.
    pub const fn as_ret(self) -> i32 {
        -(self as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_values_match_linux() {
        assert_eq!(Errno::NoEnt.raw(), 2);
        assert_eq!(Errno::Fault.raw(), 14);
        assert_eq!(Errno::Loop.raw(), 40);
        assert_eq!(Errno::Overflow.raw(), 75);
        assert_eq!(Errno::MFile.as_ret(), -24);
    }
}
