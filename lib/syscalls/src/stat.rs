//! The stat/statfs families and directory enumeration.
//!
//! Drivers produce one wide record; everything here is layout selection
//! and checked narrowing. Paths resolve through a transient `O_PATH` open
//! so symlink handling matches `open` exactly.

use tracing::instrument;

use linden_abi::dirent::{encode_dirent, encode_dirent64};
use linden_abi::fcntl::OpenFlags;
use linden_abi::stat::{NewStat, StatFs};
use linden_abi::{Errno, GuestPtr};

use crate::errno::{errno_from_vfs, getdents_errno, io_errno};
use crate::{Core, SysResult};

fn fstat_wide(core: &Core, fd: i32) -> Result<NewStat, Errno> {
    let file = core.file(fd)?;
    file.stat().map_err(io_errno)
}

fn stat_wide(core: &Core, pathname: GuestPtr, follow: bool) -> Result<NewStat, Errno> {
    let path = core.read_user_string(pathname)?;
    let mut flags = OpenFlags::PATH;
    if !follow {
        flags |= OpenFlags::NOFOLLOW;
    }
    let file = core.vfs().open(&path, flags, 0).map_err(errno_from_vfs)?;
    file.stat().map_err(io_errno)
}

#[instrument(level = "trace", skip(core))]
pub fn sys_newfstat(core: &Core, fd: i32, buf: GuestPtr) -> SysResult {
    let stat = fstat_wide(core, fd)?;
    core.write_user(buf, &stat.encode_newstat())?;
    Ok(0)
}

#[instrument(level = "trace", skip(core))]
pub fn sys_newstat(core: &Core, pathname: GuestPtr, buf: GuestPtr) -> SysResult {
    let stat = stat_wide(core, pathname, true)?;
    core.write_user(buf, &stat.encode_newstat())?;
    Ok(0)
}

#[instrument(level = "trace", skip(core))]
pub fn sys_newlstat(core: &Core, pathname: GuestPtr, buf: GuestPtr) -> SysResult {
    let stat = stat_wide(core, pathname, false)?;
    core.write_user(buf, &stat.encode_newstat())?;
    Ok(0)
}

#[instrument(level = "trace", skip(core))]
pub fn sys_fstat64(core: &Core, fd: i32, buf: GuestPtr) -> SysResult {
    let stat = fstat_wide(core, fd)?;
    core.write_user(buf, &stat.encode_stat64())?;
    Ok(0)
}

#[instrument(level = "trace", skip(core))]
pub fn sys_stat64(core: &Core, pathname: GuestPtr, buf: GuestPtr) -> SysResult {
    let stat = stat_wide(core, pathname, true)?;
    core.write_user(buf, &stat.encode_stat64())?;
    Ok(0)
}

#[instrument(level = "trace", skip(core))]
pub fn sys_lstat64(core: &Core, pathname: GuestPtr, buf: GuestPtr) -> SysResult {
    let stat = stat_wide(core, pathname, false)?;
    core.write_user(buf, &stat.encode_stat64())?;
    Ok(0)
}

#[instrument(level = "trace", skip(core))]
pub fn sys_fstat(core: &Core, fd: i32, buf: GuestPtr) -> SysResult {
    let stat = fstat_wide(core, fd)?;
    core.write_user(buf, &stat.encode_stat()?)?;
    Ok(0)
}

#[instrument(level = "trace", skip(core))]
pub fn sys_stat(core: &Core, pathname: GuestPtr, buf: GuestPtr) -> SysResult {
    let stat = stat_wide(core, pathname, true)?;
    core.write_user(buf, &stat.encode_stat()?)?;
    Ok(0)
}

#[instrument(level = "trace", skip(core))]
pub fn sys_lstat(core: &Core, pathname: GuestPtr, buf: GuestPtr) -> SysResult {
    let stat = stat_wide(core, pathname, false)?;
    core.write_user(buf, &stat.encode_stat()?)?;
    Ok(0)
}

#[instrument(level = "trace", skip(core))]
pub fn sys_fstatat64(core: &Core, dirfd: i32, pathname: GuestPtr, buf: GuestPtr, flags: i32) -> SysResult {
    if dirfd == linden_abi::AT_FDCWD {
        return sys_stat64(core, pathname, buf);
    }
    core.read_user_string(pathname)?;
    tracing::warn!(dirfd, flags, "fstatat64 with a real dirfd is not supported");
    Err(Errno::NoEnt)
}

fn fstatfs_wide(core: &Core, fd: i32) -> Result<StatFs, Errno> {
    let file = core.file(fd)?;
    file.statfs().map_err(io_errno)
}

fn statfs_wide(core: &Core, pathname: GuestPtr) -> Result<StatFs, Errno> {
    let path = core.read_user_string(pathname)?;
    let file = core
        .vfs()
        .open(&path, OpenFlags::PATH, 0)
        .map_err(errno_from_vfs)?;
    file.statfs().map_err(io_errno)
}

#[instrument(level = "trace", skip(core))]
pub fn sys_fstatfs(core: &Core, fd: i32, buf: GuestPtr) -> SysResult {
    let statfs = fstatfs_wide(core, fd)?;
    core.write_user(buf, &statfs.encode_statfs()?)?;
    Ok(0)
}

#[instrument(level = "trace", skip(core))]
pub fn sys_statfs(core: &Core, pathname: GuestPtr, buf: GuestPtr) -> SysResult {
    let statfs = statfs_wide(core, pathname)?;
    core.write_user(buf, &statfs.encode_statfs()?)?;
    Ok(0)
}

#[instrument(level = "trace", skip(core))]
pub fn sys_fstatfs64(core: &Core, fd: i32, size: u32, buf: GuestPtr) -> SysResult {
    if size as usize != StatFs::STATFS64_SIZE {
        return Err(Errno::Inval);
    }
    let statfs = fstatfs_wide(core, fd)?;
    core.write_user(buf, &statfs.encode_statfs64())?;
    Ok(0)
}

#[instrument(level = "trace", skip(core))]
pub fn sys_statfs64(core: &Core, pathname: GuestPtr, size: u32, buf: GuestPtr) -> SysResult {
    if size as usize != StatFs::STATFS64_SIZE {
        return Err(Errno::Inval);
    }
    let statfs = statfs_wide(core, pathname)?;
    core.write_user(buf, &statfs.encode_statfs64())?;
    Ok(0)
}

/// Record layout selector for the two getdents flavours.
enum DirentLayout {
    Narrow,
    Wide,
}

fn getdents_common(
    core: &Core,
    fd: i32,
    dirent: GuestPtr,
    count: u32,
    layout: DirentLayout,
) -> SysResult {
    let file = core.file(fd)?;
    core.check_write(dirent, count as usize)?;
    let mut buf = vec![0u8; count as usize];
    let mut used = 0usize;
    let mut failed = None;
    let mut truncated = false;
    file.getdents(&mut |entry| {
        let room = &mut buf[used..];
        let encoded = match layout {
            DirentLayout::Narrow => {
                match encode_dirent(room, entry.ino, &entry.name, entry.kind) {
                    Ok(len) => len,
                    Err(err) => {
                        failed = Some(err);
                        return false;
                    }
                }
            }
            DirentLayout::Wide => encode_dirent64(room, entry.ino, &entry.name, entry.kind),
        };
        match encoded {
            Some(len) => {
                used += len;
                true
            }
            None => {
                truncated = true;
                false
            }
        }
    })
    .map_err(getdents_errno)?;
    if let Some(err) = failed {
        return Err(err);
    }
    if used == 0 && truncated {
        // Not even one record fits the caller's buffer.
        return Err(Errno::Inval);
    }
    core.write_user(dirent, &buf[..used])?;
    Ok(used as i32)
}

#[instrument(level = "trace", skip(core))]
pub fn sys_getdents(core: &Core, fd: i32, dirent: GuestPtr, count: u32) -> SysResult {
    getdents_common(core, fd, dirent, count, DirentLayout::Narrow)
}

#[instrument(level = "trace", skip(core))]
pub fn sys_getdents64(core: &Core, fd: i32, dirent: GuestPtr, count: u32) -> SysResult {
    getdents_common(core, fd, dirent, count, DirentLayout::Wide)
}
