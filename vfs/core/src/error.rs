//! Core VFS error surface.
//!
//! This is intentionally "errno-like": it represents semantic failure modes
//! that can be mapped to guest errno values in a single place
//! (`linden-syscalls`). Driver absence is its own variant so the resolver
//! and the syscall boundary can give it different meanings (not-found at a
//! path component vs. a per-operation errno).

use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VfsError {
    NotFound,         // ENOENT
    NotDir,           // ENOTDIR
    IsDir,            // EISDIR
    AlreadyExists,    // EEXIST
    NotEmpty,         // ENOTEMPTY
    PermissionDenied, // EACCES
    NotPermitted,     // EPERM
    InvalidInput,     // EINVAL
    Interrupted,      // EINTR
    BrokenPipe,       // EPIPE
    WouldBlock,       // EAGAIN
    NoSpace,          // ENOSPC
    ReadOnlyFs,       // EROFS
    TooManyOpenFiles, // EMFILE
    NameTooLong,      // ENAMETOOLONG
    NotSeekable,      // ESPIPE
    NotTty,           // ENOTTY
    CrossDeviceLink,  // EXDEV
    TooManySymlinks,  // ELOOP
    Overflow,         // EOVERFLOW
    BadHandle,        // EBADF
    Io,               // EIO
    /// The driver does not implement the operation at all.
    NotSupported,
}

impl fmt::Display for VfsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            VfsError::NotFound => "not found",
            VfsError::NotDir => "not a directory",
            VfsError::IsDir => "is a directory",
            VfsError::AlreadyExists => "already exists",
            VfsError::NotEmpty => "directory not empty",
            VfsError::PermissionDenied => "permission denied",
            VfsError::NotPermitted => "operation not permitted",
            VfsError::InvalidInput => "invalid input",
            VfsError::Interrupted => "interrupted",
            VfsError::BrokenPipe => "broken pipe",
            VfsError::WouldBlock => "operation would block",
            VfsError::NoSpace => "no space left on device",
            VfsError::ReadOnlyFs => "read-only filesystem",
            VfsError::TooManyOpenFiles => "too many open files",
            VfsError::NameTooLong => "name too long",
            VfsError::NotSeekable => "illegal seek",
            VfsError::NotTty => "inappropriate ioctl",
            VfsError::CrossDeviceLink => "cross-device link",
            VfsError::TooManySymlinks => "too many symlinks",
            VfsError::Overflow => "value too large",
            VfsError::BadHandle => "bad handle",
            VfsError::Io => "i/o error",
            VfsError::NotSupported => "operation not supported",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for VfsError {}

pub type VfsResult<T> = Result<T, VfsError>;
