//! Guest `stat` family encodings.
//!
//! Drivers fill one wide record ([`NewStat`]); the syscall layer narrows it
//! to whichever layout the guest asked for, checking every narrowed field
//! and failing with `EOVERFLOW` when truncation would lose bits.

use crate::errno::Errno;

/// File-type bits of `st_mode`.
pub const S_IFMT: u32 = 0o170000;
pub const S_IFSOCK: u32 = 0o140000;
pub const S_IFLNK: u32 = 0o120000;
pub const S_IFREG: u32 = 0o100000;
pub const S_IFBLK: u32 = 0o060000;
pub const S_IFDIR: u32 = 0o040000;
pub const S_IFCHR: u32 = 0o020000;
pub const S_IFIFO: u32 = 0o010000;

pub const S_IWGRP: u32 = 0o020;
pub const S_IWOTH: u32 = 0o002;

/// Wide stat record, the only one drivers produce.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NewStat {
    pub st_dev: u64,
    pub st_ino: u64,
    pub st_mode: u32,
    pub st_nlink: u32,
    pub st_uid: u32,
    pub st_gid: u32,
    pub st_rdev: u64,
    pub st_size: i64,
    pub st_blksize: u32,
    pub st_blocks: u64,
    pub st_atime: i64,
    pub st_atime_nsec: i64,
    pub st_mtime: i64,
    pub st_mtime_nsec: i64,
    pub st_ctime: i64,
    pub st_ctime_nsec: i64,
}

impl NewStat {
    /// Encode as the legacy 32-bit `struct stat` (64 bytes). Fields that do
    /// not fit report `EOVERFLOW`.
    pub fn encode_stat(&self) -> Result<Vec<u8>, Errno> {
        let ino: u32 = narrow(self.st_ino)?;
        let size: i32 = narrow_i(self.st_size)?;
        let blocks: u32 = narrow(self.st_blocks)?;
        let mut out = vec![0u8; 64];
        put_u32(&mut out, 0, narrow(self.st_dev)?);
        put_u32(&mut out, 4, ino);
        put_u32(&mut out, 8, self.st_mode);
        put_u32(&mut out, 12, self.st_nlink);
        put_u32(&mut out, 16, self.st_uid);
        put_u32(&mut out, 20, self.st_gid);
        put_u32(&mut out, 24, narrow(self.st_rdev)?);
        put_u32(&mut out, 28, size as u32);
        put_u32(&mut out, 32, self.st_blksize);
        put_u32(&mut out, 36, blocks);
        put_u32(&mut out, 40, narrow_time(self.st_atime)?);
        put_u32(&mut out, 44, narrow_time(self.st_atime_nsec)?);
        put_u32(&mut out, 48, narrow_time(self.st_mtime)?);
        put_u32(&mut out, 52, narrow_time(self.st_mtime_nsec)?);
        put_u32(&mut out, 56, narrow_time(self.st_ctime)?);
        put_u32(&mut out, 60, narrow_time(self.st_ctime_nsec)?);
        Ok(out)
    }

    /// Encode as `struct stat64` (96 bytes, IA-32 layout with the packed
    /// leading dev/ino fields widened).
    pub fn encode_stat64(&self) -> Vec<u8> {
        let mut out = vec![0u8; 96];
        put_u64(&mut out, 0, self.st_dev);
        // bytes 8..12 are the __st_ino compatibility field
        put_u32(&mut out, 8, self.st_ino as u32);
        put_u32(&mut out, 12, self.st_mode);
        put_u32(&mut out, 16, self.st_nlink);
        put_u32(&mut out, 20, self.st_uid);
        put_u32(&mut out, 24, self.st_gid);
        put_u64(&mut out, 28, self.st_rdev);
        put_u64(&mut out, 36, self.st_size as u64);
        put_u32(&mut out, 44, self.st_blksize);
        put_u64(&mut out, 48, self.st_blocks);
        put_u32(&mut out, 56, self.st_atime as u32);
        put_u32(&mut out, 60, self.st_atime_nsec as u32);
        put_u32(&mut out, 64, self.st_mtime as u32);
        put_u32(&mut out, 68, self.st_mtime_nsec as u32);
        put_u32(&mut out, 72, self.st_ctime as u32);
        put_u32(&mut out, 76, self.st_ctime_nsec as u32);
        put_u64(&mut out, 80, self.st_ino);
        out
    }

    /// Encode as the 64-bit-clean `struct newstat` the wide syscalls use
    /// (natural 8-byte layout, 144 bytes).
    pub fn encode_newstat(&self) -> Vec<u8> {
        let mut out = vec![0u8; 144];
        put_u64(&mut out, 0, self.st_dev);
        put_u64(&mut out, 8, self.st_ino);
        put_u32(&mut out, 16, self.st_mode);
        put_u32(&mut out, 20, self.st_nlink);
        put_u32(&mut out, 24, self.st_uid);
        put_u32(&mut out, 28, self.st_gid);
        put_u64(&mut out, 32, self.st_rdev);
        put_u64(&mut out, 40, self.st_size as u64);
        put_u32(&mut out, 48, self.st_blksize);
        put_u64(&mut out, 56, self.st_blocks);
        put_u64(&mut out, 64, self.st_atime as u64);
        put_u64(&mut out, 72, self.st_atime_nsec as u64);
        put_u64(&mut out, 80, self.st_mtime as u64);
        put_u64(&mut out, 88, self.st_mtime_nsec as u64);
        put_u64(&mut out, 96, self.st_ctime as u64);
        put_u64(&mut out, 104, self.st_ctime_nsec as u64);
        out
    }
}

/// Wide statfs record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatFs {
    pub f_type: u32,
    pub f_bsize: u32,
    pub f_blocks: u64,
    pub f_bfree: u64,
    pub f_bavail: u64,
    pub f_files: u64,
    pub f_ffree: u64,
    pub f_fsid: u64,
    pub f_namelen: u32,
    pub f_frsize: u32,
    pub f_flags: u32,
}

impl StatFs {
    /// Narrow `struct statfs` (64 bytes). Block counts that lost bits
    /// report `EOVERFLOW`.
    pub fn encode_statfs(&self) -> Result<Vec<u8>, Errno> {
        let mut out = vec![0u8; 64];
        put_u32(&mut out, 0, self.f_type);
        put_u32(&mut out, 4, self.f_bsize);
        put_u32(&mut out, 8, narrow(self.f_blocks)?);
        put_u32(&mut out, 12, narrow(self.f_bfree)?);
        put_u32(&mut out, 16, narrow(self.f_bavail)?);
        put_u32(&mut out, 20, narrow(self.f_files)?);
        put_u32(&mut out, 24, narrow(self.f_ffree)?);
        put_u64(&mut out, 28, self.f_fsid);
        put_u32(&mut out, 36, self.f_namelen);
        put_u32(&mut out, 40, self.f_frsize);
        put_u32(&mut out, 44, self.f_flags);
        Ok(out)
    }

    /// `struct statfs64` (84 bytes, IA-32 layout).
    pub fn encode_statfs64(&self) -> Vec<u8> {
        let mut out = vec![0u8; 84];
        put_u32(&mut out, 0, self.f_type);
        put_u32(&mut out, 4, self.f_bsize);
        put_u64(&mut out, 8, self.f_blocks);
        put_u64(&mut out, 16, self.f_bfree);
        put_u64(&mut out, 24, self.f_bavail);
        put_u64(&mut out, 32, self.f_files);
        put_u64(&mut out, 40, self.f_ffree);
        put_u64(&mut out, 48, self.f_fsid);
        put_u32(&mut out, 56, self.f_namelen);
        put_u32(&mut out, 60, self.f_frsize);
        put_u32(&mut out, 64, self.f_flags);
        out
    }

    /// Wire size of `struct statfs64` for the explicit-size syscalls.
    pub const STATFS64_SIZE: usize = 84;
}

fn put_u32(out: &mut [u8], at: usize, v: u32) {
    out[at..at + 4].copy_from_slice(&v.to_le_bytes());
}

fn put_u64(out: &mut [u8], at: usize, v: u64) {
    out[at..at + 8].copy_from_slice(&v.to_le_bytes());
}

fn narrow(v: u64) -> Result<u32, Errno> {
    u32::try_from(v).map_err(|_| Errno::Overflow)
}

fn narrow_i(v: i64) -> Result<i32, Errno> {
    i32::try_from(v).map_err(|_| Errno::Overflow)
}

fn narrow_time(v: i64) -> Result<u32, Errno> {
    u32::try_from(v).map_err(|_| Errno::Overflow)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stat_narrowing_detects_overflow() {
        let wide = NewStat {
            st_ino: u64::from(u32::MAX) + 1,
            ..Default::default()
        };
        assert_eq!(wide.encode_stat().unwrap_err(), Errno::Overflow);
        // stat64 keeps the full ino
        let out = wide.encode_stat64();
        assert_eq!(
            u64::from_le_bytes(out[80..88].try_into().unwrap()),
            wide.st_ino
        );
    }

    #[test]
    fn stat_narrowing_checks_time_fields_too() {
        let post_2106 = NewStat {
            st_mtime: i64::from(u32::MAX) + 1,
            ..Default::default()
        };
        assert_eq!(post_2106.encode_stat().unwrap_err(), Errno::Overflow);
        let pre_epoch = NewStat {
            st_atime: -1,
            ..Default::default()
        };
        assert_eq!(pre_epoch.encode_stat().unwrap_err(), Errno::Overflow);
        let epoch = NewStat::default();
        assert_eq!(epoch.encode_stat().unwrap().len(), 64);
    }

    #[test]
    fn statfs_narrowing_detects_overflow() {
        let wide = StatFs {
            f_blocks: u64::from(u32::MAX) + 7,
            ..Default::default()
        };
        assert_eq!(wide.encode_statfs().unwrap_err(), Errno::Overflow);
        assert_eq!(wide.encode_statfs64().len(), StatFs::STATFS64_SIZE);
    }
}
