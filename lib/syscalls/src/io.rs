//! Byte I/O: read/write and their positioned and vectored forms, plus
//! seeking.

use tracing::instrument;

use linden_abi::fcntl::{SEEK_CUR, SEEK_END, SEEK_SET};
use linden_abi::signal::{SigInfo, SIGPIPE};
use linden_abi::time::IoVec;
use linden_abi::{Errno, GuestPtr};
use vfs_core::{SeekWhence, VfsError};

use crate::errno::{io_errno, seek_errno};
use crate::{Core, SysResult};

/// A write that hit a torn pipe raises SIGPIPE alongside EPIPE.
fn write_err(core: &Core, err: VfsError) -> Errno {
    if err == VfsError::BrokenPipe {
        core.signal().raise(SigInfo::user(SIGPIPE));
    }
    io_errno(err)
}

#[instrument(level = "trace", skip(core))]
pub fn sys_read(core: &Core, fd: i32, buf: GuestPtr, count: u32) -> SysResult {
    let file = core.file(fd)?;
    core.check_write(buf, count as usize)?;
    let mut data = vec![0u8; count as usize];
    let n = file.read(&mut data).map_err(io_errno)?;
    core.write_user(buf, &data[..n])?;
    Ok(n as i32)
}

#[instrument(level = "trace", skip(core))]
pub fn sys_write(core: &Core, fd: i32, buf: GuestPtr, count: u32) -> SysResult {
    let file = core.file(fd)?;
    let data = core.read_user(buf, count as usize)?;
    let n = file.write(&data).map_err(|e| write_err(core, e))?;
    Ok(n as i32)
}

#[instrument(level = "trace", skip(core))]
pub fn sys_pread64(core: &Core, fd: i32, buf: GuestPtr, count: u32, offset: i64) -> SysResult {
    let file = core.file(fd)?;
    core.check_write(buf, count as usize)?;
    if offset < 0 {
        return Err(Errno::Inval);
    }
    let mut data = vec![0u8; count as usize];
    let n = file.pread(&mut data, offset as u64).map_err(io_errno)?;
    core.write_user(buf, &data[..n])?;
    Ok(n as i32)
}

#[instrument(level = "trace", skip(core))]
pub fn sys_pwrite64(core: &Core, fd: i32, buf: GuestPtr, count: u32, offset: i64) -> SysResult {
    let file = core.file(fd)?;
    let data = core.read_user(buf, count as usize)?;
    if offset < 0 {
        return Err(Errno::Inval);
    }
    let n = file
        .pwrite(&data, offset as u64)
        .map_err(|e| write_err(core, e))?;
    Ok(n as i32)
}

fn read_iovecs(core: &Core, iov: GuestPtr, iovcnt: i32) -> Result<Vec<IoVec>, Errno> {
    if iovcnt < 0 {
        return Err(Errno::Inval);
    }
    let raw = core.read_user(iov, iovcnt as usize * IoVec::SIZE)?;
    Ok(raw.chunks_exact(IoVec::SIZE).map(IoVec::decode).collect())
}

#[instrument(level = "trace", skip(core))]
pub fn sys_readv(core: &Core, fd: i32, iov: GuestPtr, iovcnt: i32) -> SysResult {
    let file = core.file(fd)?;
    let iovecs = read_iovecs(core, iov, iovcnt)?;
    for v in &iovecs {
        core.check_write(v.base, v.len as usize)?;
    }
    let mut total = 0usize;
    for v in &iovecs {
        let mut data = vec![0u8; v.len as usize];
        let n = file.read(&mut data).map_err(io_errno)?;
        core.write_user(v.base, &data[..n])?;
        total += n;
        if n < v.len as usize {
            break;
        }
    }
    Ok(total as i32)
}

#[instrument(level = "trace", skip(core))]
pub fn sys_writev(core: &Core, fd: i32, iov: GuestPtr, iovcnt: i32) -> SysResult {
    let file = core.file(fd)?;
    let iovecs = read_iovecs(core, iov, iovcnt)?;
    for v in &iovecs {
        core.check_read(v.base, v.len as usize)?;
    }
    let mut total = 0usize;
    for v in &iovecs {
        let data = core.read_user(v.base, v.len as usize)?;
        let n = file.write(&data).map_err(|e| write_err(core, e))?;
        total += n;
        if n < v.len as usize {
            break;
        }
    }
    Ok(total as i32)
}

#[instrument(level = "trace", skip(core))]
pub fn sys_preadv(core: &Core, fd: i32, iov: GuestPtr, iovcnt: i32, offset: i64) -> SysResult {
    let file = core.file(fd)?;
    let iovecs = read_iovecs(core, iov, iovcnt)?;
    for v in &iovecs {
        core.check_write(v.base, v.len as usize)?;
    }
    if offset < 0 {
        return Err(Errno::Inval);
    }
    let mut offset = offset as u64;
    let mut total = 0usize;
    for v in &iovecs {
        let mut data = vec![0u8; v.len as usize];
        let n = file.pread(&mut data, offset).map_err(io_errno)?;
        core.write_user(v.base, &data[..n])?;
        total += n;
        offset += n as u64;
        if n < v.len as usize {
            break;
        }
    }
    Ok(total as i32)
}

#[instrument(level = "trace", skip(core))]
pub fn sys_pwritev(core: &Core, fd: i32, iov: GuestPtr, iovcnt: i32, offset: i64) -> SysResult {
    let file = core.file(fd)?;
    let iovecs = read_iovecs(core, iov, iovcnt)?;
    for v in &iovecs {
        core.check_read(v.base, v.len as usize)?;
    }
    if offset < 0 {
        return Err(Errno::Inval);
    }
    let mut offset = offset as u64;
    let mut total = 0usize;
    for v in &iovecs {
        let data = core.read_user(v.base, v.len as usize)?;
        let n = file.pwrite(&data, offset).map_err(|e| write_err(core, e))?;
        total += n;
        offset += n as u64;
        if n < v.len as usize {
            break;
        }
    }
    Ok(total as i32)
}

fn whence_from_raw(whence: i32) -> Result<SeekWhence, Errno> {
    match whence {
        SEEK_SET => Ok(SeekWhence::Set),
        SEEK_CUR => Ok(SeekWhence::Cur),
        SEEK_END => Ok(SeekWhence::End),
        _ => Err(Errno::Inval),
    }
}

#[instrument(level = "trace", skip(core))]
pub fn sys_lseek(core: &Core, fd: i32, offset: i32, whence: i32) -> SysResult {
    let file = core.file(fd)?;
    let n = file
        .llseek(offset as i64, whence_from_raw(whence)?)
        .map_err(seek_errno)?;
    if n >= i32::MAX as i64 {
        return Err(Errno::Overflow);
    }
    Ok(n as i32)
}

#[instrument(level = "trace", skip(core))]
pub fn sys_llseek(
    core: &Core,
    fd: i32,
    offset_high: u32,
    offset_low: u32,
    result: GuestPtr,
    whence: i32,
) -> SysResult {
    let file = core.file(fd)?;
    core.check_write(result, 8)?;
    let offset = ((offset_high as u64) << 32 | offset_low as u64) as i64;
    let n = file
        .llseek(offset, whence_from_raw(whence)?)
        .map_err(seek_errno)?;
    core.write_user(result, &(n as u64).to_le_bytes())?;
    Ok(0)
}
