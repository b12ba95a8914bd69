//! VFS error to guest errno normalisation.
//!
//! This is the single place internal error kinds become wire numbers.
//! `NotSupported` has no one answer: a missing file operation earns a
//! different errno per call site (`ESPIPE` for seeking a pipe, `ENOTTY`
//! for a stray ioctl, `EBADF` for plain I/O), so the per-op helpers pin
//! that mapping down and everything else funnels through [`errno_from_vfs`].

use linden_abi::Errno;
use vfs_core::VfsError;

pub fn errno_from_vfs(err: VfsError) -> Errno {
    match err {
        VfsError::NotFound => Errno::NoEnt,
        VfsError::NotDir => Errno::NotDir,
        VfsError::IsDir => Errno::IsDir,
        VfsError::AlreadyExists => Errno::Exist,
        VfsError::NotEmpty => Errno::NotEmpty,
        VfsError::PermissionDenied => Errno::Access,
        VfsError::NotPermitted => Errno::Perm,
        VfsError::InvalidInput => Errno::Inval,
        VfsError::Interrupted => Errno::Intr,
        VfsError::BrokenPipe => Errno::Pipe,
        VfsError::WouldBlock => Errno::Again,
        VfsError::NoSpace => Errno::NoSpc,
        VfsError::ReadOnlyFs => Errno::RoFs,
        VfsError::TooManyOpenFiles => Errno::MFile,
        VfsError::NameTooLong => Errno::NameTooLong,
        VfsError::NotSeekable => Errno::SPipe,
        VfsError::NotTty => Errno::NotTy,
        VfsError::CrossDeviceLink => Errno::XDev,
        VfsError::TooManySymlinks => Errno::Loop,
        VfsError::Overflow => Errno::Overflow,
        VfsError::BadHandle => Errno::BadF,
        VfsError::Io => Errno::Io,
        // Callers with a better per-op answer use the helpers below.
        VfsError::NotSupported => Errno::BadF,
    }
}

/// Plain I/O through an absent driver op reads as a bad descriptor.
pub fn io_errno(err: VfsError) -> Errno {
    errno_from_vfs(err)
}

pub fn seek_errno(err: VfsError) -> Errno {
    match err {
        VfsError::NotSupported => Errno::SPipe,
        other => errno_from_vfs(other),
    }
}

pub fn ioctl_errno(err: VfsError) -> Errno {
    match err {
        VfsError::NotSupported => Errno::NotTy,
        other => errno_from_vfs(other),
    }
}

pub fn getdents_errno(err: VfsError) -> Errno {
    match err {
        VfsError::NotSupported | VfsError::NotDir => Errno::NotDir,
        other => errno_from_vfs(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_op_not_supported_mappings() {
        assert_eq!(io_errno(VfsError::NotSupported), Errno::BadF);
        assert_eq!(seek_errno(VfsError::NotSupported), Errno::SPipe);
        assert_eq!(ioctl_errno(VfsError::NotSupported), Errno::NotTy);
        assert_eq!(getdents_errno(VfsError::NotSupported), Errno::NotDir);
    }

    #[test]
    fn common_kinds_map_to_linux_numbers() {
        assert_eq!(errno_from_vfs(VfsError::NotFound).raw(), 2);
        assert_eq!(errno_from_vfs(VfsError::TooManySymlinks).raw(), 40);
        assert_eq!(errno_from_vfs(VfsError::TooManyOpenFiles).raw(), 24);
    }
}
