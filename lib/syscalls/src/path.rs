//! Path-taking syscalls: namespace edits, cwd handling and the
//! metadata-touching no-ops the guest expects to succeed.

use tracing::{debug, error, instrument, warn};

use linden_abi::fcntl::{OpenFlags, AT_FDCWD};
use linden_abi::time::{Timespec, Timeval, Utimbuf};
use linden_abi::{Errno, GuestPtr, PATH_MAX};

use crate::errno::errno_from_vfs;
use crate::{Core, SysResult};

/// `unlinkat` flag selecting rmdir semantics.
const AT_REMOVEDIR: i32 = 0x200;

#[instrument(level = "trace", skip(core))]
pub fn sys_link(core: &Core, oldpath: GuestPtr, newpath: GuestPtr) -> SysResult {
    let old = core.read_user_string(oldpath)?;
    let new = core.read_user_string(newpath)?;
    let source = core
        .vfs()
        .open(&old, OpenFlags::PATH | OpenFlags::NOFOLLOW, 0)
        .map_err(errno_from_vfs)?;
    core.vfs().link(&source, &new).map_err(errno_from_vfs)?;
    Ok(0)
}

#[instrument(level = "trace", skip(core))]
pub fn sys_unlink(core: &Core, pathname: GuestPtr) -> SysResult {
    let path = core.read_user_string(pathname)?;
    core.vfs().unlink(&path).map_err(errno_from_vfs)?;
    Ok(0)
}

#[instrument(level = "trace", skip(core))]
pub fn sys_unlinkat(core: &Core, dirfd: i32, pathname: GuestPtr, flags: i32) -> SysResult {
    if dirfd != AT_FDCWD {
        core.read_user_string(pathname)?;
        warn!(dirfd, "unlinkat with a real dirfd is not supported");
        return Err(Errno::NoEnt);
    }
    if flags & AT_REMOVEDIR != 0 {
        sys_rmdir(core, pathname)
    } else {
        sys_unlink(core, pathname)
    }
}

#[instrument(level = "trace", skip(core))]
pub fn sys_symlink(core: &Core, target: GuestPtr, linkpath: GuestPtr) -> SysResult {
    let target = core.read_user_string(target)?;
    let linkpath = core.read_user_string(linkpath)?;
    core.vfs()
        .symlink(&target, &linkpath)
        .map_err(errno_from_vfs)?;
    Ok(0)
}

#[instrument(level = "trace", skip(core))]
pub fn sys_readlink(core: &Core, pathname: GuestPtr, buf: GuestPtr, bufsize: i32) -> SysResult {
    let path = core.read_user_string(pathname)?;
    if bufsize <= 0 {
        return Err(Errno::Inval);
    }
    core.check_write(buf, bufsize as usize)?;
    let target = core.vfs().readlink(&path).map_err(errno_from_vfs)?;
    let n = target.len().min(bufsize as usize);
    core.write_user(buf, &target[..n])?;
    Ok(n as i32)
}

#[instrument(level = "trace", skip(core))]
pub fn sys_rename(core: &Core, oldpath: GuestPtr, newpath: GuestPtr) -> SysResult {
    let old = core.read_user_string(oldpath)?;
    let new = core.read_user_string(newpath)?;
    let source = core
        .vfs()
        .open(&old, OpenFlags::PATH | OpenFlags::NOFOLLOW, 0)
        .map_err(errno_from_vfs)?;
    core.vfs().rename(&source, &new).map_err(errno_from_vfs)?;
    Ok(0)
}

#[instrument(level = "trace", skip(core))]
pub fn sys_mkdir(core: &Core, pathname: GuestPtr, mode: u32) -> SysResult {
    let path = core.read_user_string(pathname)?;
    let mode = mode & !core.vfs().umask();
    core.vfs().mkdir(&path, mode).map_err(errno_from_vfs)?;
    Ok(0)
}

#[instrument(level = "trace", skip(core))]
pub fn sys_rmdir(core: &Core, pathname: GuestPtr) -> SysResult {
    let path = core.read_user_string(pathname)?;
    core.vfs().rmdir(&path).map_err(errno_from_vfs)?;
    Ok(0)
}

#[instrument(level = "trace", skip(core))]
pub fn sys_mknod(core: &Core, pathname: GuestPtr, mode: u32, dev: u32) -> SysResult {
    core.read_user_string(pathname)?;
    debug!(mode, dev, "mknod accepted as a no-op");
    Ok(0)
}

#[instrument(level = "trace", skip(core))]
pub fn sys_access(core: &Core, pathname: GuestPtr, mode: i32) -> SysResult {
    let path = core.read_user_string(pathname)?;
    // Emulated by probing for existence; mode bits are not enforceable
    // against the host.
    let _probe = core
        .vfs()
        .open(&path, OpenFlags::PATH, mode as u32)
        .map_err(errno_from_vfs)?;
    Ok(0)
}

#[instrument(level = "trace", skip(core))]
pub fn sys_faccessat(core: &Core, dirfd: i32, pathname: GuestPtr, mode: i32, flags: i32) -> SysResult {
    if dirfd == AT_FDCWD {
        return sys_access(core, pathname, mode);
    }
    core.read_user_string(pathname)?;
    warn!(dirfd, flags, "faccessat with a real dirfd is not supported");
    Err(Errno::NoEnt)
}

#[instrument(level = "trace", skip(core))]
pub fn sys_chmod(core: &Core, pathname: GuestPtr, mode: u32) -> SysResult {
    core.read_user_string(pathname)?;
    debug!(mode, "chmod accepted as a no-op");
    Ok(0)
}

#[instrument(level = "trace", skip(core))]
pub fn sys_fchmodat(core: &Core, dirfd: i32, pathname: GuestPtr, mode: u32, flags: i32) -> SysResult {
    core.read_user_string(pathname)?;
    debug!(dirfd, mode, flags, "fchmodat accepted as a no-op");
    Ok(0)
}

#[instrument(level = "trace", skip(core))]
pub fn sys_chown(core: &Core, pathname: GuestPtr, owner: u32, group: u32) -> SysResult {
    core.read_user_string(pathname)?;
    error!(owner, group, "chown not implemented");
    Ok(0)
}

#[instrument(level = "trace", skip(core))]
pub fn sys_fchown(core: &Core, fd: i32, owner: u32, group: u32) -> SysResult {
    error!(fd, owner, group, "fchown not implemented");
    Ok(0)
}

#[instrument(level = "trace", skip(core))]
pub fn sys_chdir(core: &Core, pathname: GuestPtr) -> SysResult {
    let path = core.read_user_string(pathname)?;
    // Probe the target the way open does so symlinks and missing
    // directories fail here, not on the next relative lookup.
    let fd = crate::fd::sys_open(core, pathname, OpenFlags::PATH.bits(), 0)?;
    let _ = core.vfs().close(fd);
    let mut cwd = core.vfs().absolute(&path).into_bytes();
    // chdir("x/.") must leave a directory, not a trailing dot
    if cwd.ends_with(b"/.") {
        if cwd.len() == 2 {
            cwd.truncate(1);
        } else {
            cwd.truncate(cwd.len() - 2);
        }
    }
    if cwd.len() + 1 > PATH_MAX {
        return Err(Errno::NameTooLong);
    }
    core.vfs()
        .set_cwd(vfs_core::GuestPathBuf::from_bytes(cwd));
    Ok(0)
}

#[instrument(level = "trace", skip(core))]
pub fn sys_getcwd(core: &Core, buf: GuestPtr, size: u32) -> SysResult {
    core.check_write(buf, size as usize)?;
    let cwd = core.vfs().cwd();
    let bytes = cwd.as_bytes();
    if (size as usize) < bytes.len() + 1 {
        return Err(Errno::Range);
    }
    let mut out = bytes.to_vec();
    out.push(0);
    core.write_user(buf, &out)?;
    Ok(buf as i32)
}

#[instrument(level = "trace", skip(core))]
pub fn sys_umask(core: &Core, mask: u32) -> SysResult {
    Ok(core.vfs().swap_umask(mask & 0o777) as i32)
}

fn utimens_fd(core: &Core, path: &[u8], times: Option<[Timespec; 2]>) -> SysResult {
    let file = core
        .vfs()
        .open(path, OpenFlags::WRONLY, 0)
        .map_err(errno_from_vfs)?;
    file.utimens(times).map_err(errno_from_vfs)?;
    Ok(0)
}

#[instrument(level = "trace", skip(core))]
pub fn sys_utime(core: &Core, filename: GuestPtr, times: GuestPtr) -> SysResult {
    let path = core.read_user_string(filename)?;
    let times = if times == 0 {
        None
    } else {
        let raw = core.read_user(times, Utimbuf::SIZE)?;
        let buf = Utimbuf::decode(&raw);
        Some([
            Timespec {
                tv_sec: buf.actime,
                tv_nsec: 0,
            },
            Timespec {
                tv_sec: buf.modtime,
                tv_nsec: 0,
            },
        ])
    };
    utimens_fd(core, &path, times)
}

#[instrument(level = "trace", skip(core))]
pub fn sys_utimes(core: &Core, filename: GuestPtr, times: GuestPtr) -> SysResult {
    let path = core.read_user_string(filename)?;
    let times = if times == 0 {
        None
    } else {
        let raw = core.read_user(times, 2 * Timeval::SIZE)?;
        Some([
            Timeval::decode(&raw[..Timeval::SIZE]).to_timespec(),
            Timeval::decode(&raw[Timeval::SIZE..]).to_timespec(),
        ])
    };
    utimens_fd(core, &path, times)
}

#[instrument(level = "trace", skip(core))]
pub fn sys_utimensat(
    core: &Core,
    dirfd: i32,
    pathname: GuestPtr,
    times: GuestPtr,
    flags: i32,
) -> SysResult {
    let times = if times == 0 {
        None
    } else {
        let raw = core.read_user(times, 2 * Timespec::SIZE)?;
        Some([
            Timespec::decode(&raw[..Timespec::SIZE]),
            Timespec::decode(&raw[Timespec::SIZE..]),
        ])
    };
    if pathname == 0 {
        // Linux extension: a NULL path means "the file dirfd refers to".
        let file = core.file(dirfd)?;
        file.utimens(times).map_err(errno_from_vfs)?;
        return Ok(0);
    }
    let path = core.read_user_string(pathname)?;
    if dirfd != AT_FDCWD {
        warn!(dirfd, "utimensat with a real dirfd is not supported");
        return Err(Errno::NoEnt);
    }
    if flags != 0 {
        debug!(flags, "utimensat flags ignored");
    }
    utimens_fd(core, &path, times)
}
