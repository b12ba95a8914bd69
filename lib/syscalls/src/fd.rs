//! Descriptor-table syscalls: open/close, duplication, fcntl, pipes and
//! the fd-scoped odds and ends.

use tracing::{debug, instrument, warn};

use linden_abi::fcntl::{
    FcntlCmd, OpenFlags, AT_FDCWD, FD_CLOEXEC, POSIX_FADV_DONTNEED, POSIX_FADV_NOREUSE,
    POSIX_FADV_NORMAL, POSIX_FADV_RANDOM, POSIX_FADV_SEQUENTIAL, POSIX_FADV_WILLNEED,
};
use linden_abi::{Errno, GuestPtr};
use vfs_core::pipe_pair;

use crate::errno::{errno_from_vfs, ioctl_errno};
use crate::{Core, SysResult};

pub(crate) fn open_flags(flags: u32) -> OpenFlags {
    OpenFlags::from_bits_retain(flags)
}

#[instrument(level = "trace", skip(core), fields(path = tracing::field::Empty))]
pub fn sys_open(core: &Core, pathname: GuestPtr, flags: u32, mode: u32) -> SysResult {
    let path = core.read_user_string(pathname)?;
    tracing::Span::current().record("path", String::from_utf8_lossy(&path).as_ref());
    let flags = open_flags(flags);
    // TMPFILE embeds the DIRECTORY bit, so it needs a full-containment test.
    if flags.intersects(OpenFlags::DIRECT | OpenFlags::DSYNC | OpenFlags::NOATIME)
        || flags.contains(OpenFlags::TMPFILE)
    {
        debug!(?flags, "open flags outside the supported set");
    }
    let mode = mode & !core.vfs().umask();
    let file = core.vfs().open(&path, flags, mode).map_err(errno_from_vfs)?;
    core.vfs()
        .store(file, flags.contains(OpenFlags::CLOEXEC))
        .map_err(errno_from_vfs)
}

#[instrument(level = "trace", skip(core))]
pub fn sys_openat(core: &Core, dirfd: i32, pathname: GuestPtr, flags: u32, mode: u32) -> SysResult {
    if dirfd == AT_FDCWD {
        return sys_open(core, pathname, flags, mode);
    }
    core.read_user_string(pathname)?;
    warn!(dirfd, "openat with a real dirfd is not supported");
    Err(Errno::NoEnt)
}

#[instrument(level = "trace", skip(core))]
pub fn sys_close(core: &Core, fd: i32) -> SysResult {
    core.vfs().close(fd).map_err(errno_from_vfs)?;
    Ok(0)
}

#[instrument(level = "trace", skip(core))]
pub fn sys_dup(core: &Core, fd: i32) -> SysResult {
    core.vfs().dup(fd, None, false).map_err(errno_from_vfs)
}

#[instrument(level = "trace", skip(core))]
pub fn sys_dup2(core: &Core, fd: i32, newfd: i32) -> SysResult {
    core.vfs().dup(fd, Some(newfd), false).map_err(errno_from_vfs)
}

#[instrument(level = "trace", skip(core))]
pub fn sys_dup3(core: &Core, fd: i32, newfd: i32, flags: u32) -> SysResult {
    let cloexec = open_flags(flags).contains(OpenFlags::CLOEXEC);
    core.vfs()
        .dup(fd, Some(newfd), cloexec)
        .map_err(errno_from_vfs)
}

#[instrument(level = "trace", skip(core))]
pub fn sys_pipe2(core: &Core, pipefd: GuestPtr, flags: u32) -> SysResult {
    let flags = open_flags(flags);
    if flags.intersects(OpenFlags::DIRECT | OpenFlags::NONBLOCK) {
        warn!(?flags, "unsupported pipe2 flag combination");
        return Err(Errno::Inval);
    }
    core.check_write(pipefd, 8)?;
    let cloexec = flags.contains(OpenFlags::CLOEXEC);
    let (reader, writer) = pipe_pair(flags);
    let rfd = core.vfs().store(reader, cloexec).map_err(errno_from_vfs)?;
    let wfd = match core.vfs().store(writer, cloexec) {
        Ok(wfd) => wfd,
        Err(err) => {
            let _ = core.vfs().close(rfd);
            return Err(errno_from_vfs(err));
        }
    };
    let mut out = [0u8; 8];
    out[..4].copy_from_slice(&rfd.to_le_bytes());
    out[4..].copy_from_slice(&wfd.to_le_bytes());
    core.write_user(pipefd, &out)?;
    Ok(0)
}

#[instrument(level = "trace", skip(core))]
pub fn sys_pipe(core: &Core, pipefd: GuestPtr) -> SysResult {
    sys_pipe2(core, pipefd, 0)
}

#[instrument(level = "trace", skip(core))]
pub fn sys_fcntl(core: &Core, fd: i32, cmd: i32, arg: i32) -> SysResult {
    core.file(fd)?;
    match FcntlCmd::from_raw(cmd) {
        Some(FcntlCmd::DupFd) => sys_dup(core, fd),
        Some(FcntlCmd::GetFd) => {
            let cloexec = core.vfs().cloexec(fd).ok_or(Errno::BadF)?;
            Ok(if cloexec { FD_CLOEXEC } else { 0 })
        }
        Some(FcntlCmd::SetFd) => {
            if core.vfs().set_cloexec(fd, arg & FD_CLOEXEC != 0) {
                Ok(0)
            } else {
                Err(Errno::BadF)
            }
        }
        Some(FcntlCmd::GetFl) => {
            let file = core.file(fd)?;
            Ok(file.flags().bits() as i32)
        }
        None => {
            warn!(cmd, "unsupported fcntl command");
            Err(Errno::Inval)
        }
    }
}

#[instrument(level = "trace", skip(core))]
pub fn sys_fcntl64(core: &Core, fd: i32, cmd: i32) -> SysResult {
    sys_fcntl(core, fd, cmd, 0)
}

#[instrument(level = "trace", skip(core))]
pub fn sys_ioctl(core: &Core, fd: i32, cmd: u32, arg: u32) -> SysResult {
    let file = core.file(fd)?;
    file.ioctl(cmd, arg).map_err(ioctl_errno)
}

#[instrument(level = "trace", skip(core))]
pub fn sys_fadvise64_64(core: &Core, fd: i32, _offset: i64, _len: i64, advice: i32) -> SysResult {
    // No host analogue; validate and succeed.
    core.file(fd)?;
    match advice {
        POSIX_FADV_NORMAL | POSIX_FADV_RANDOM | POSIX_FADV_SEQUENTIAL | POSIX_FADV_WILLNEED
        | POSIX_FADV_DONTNEED | POSIX_FADV_NOREUSE => Ok(0),
        _ => Err(Errno::Inval),
    }
}

#[instrument(level = "trace", skip(core))]
pub fn sys_fadvise64(core: &Core, fd: i32, offset: i64, len: i64, advice: i32) -> SysResult {
    sys_fadvise64_64(core, fd, offset, len, advice)
}
