//! `linux_dirent` / `linux_dirent64` record encoding.
//!
//! Both layouts round `d_reclen` up to a multiple of 8. The 32-bit record
//! has no `d_type` field; the file-type byte sits immediately after the NUL
//! terminator of `d_name`, inside the reserved tail.

use crate::errno::Errno;

/// `d_type` values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum DirentKind {
    Unknown = 0,
    Fifo = 1,
    Char = 2,
    Dir = 4,
    Block = 6,
    Regular = 8,
    Symlink = 10,
    Socket = 12,
}

/// Fixed header bytes before `d_name` in `linux_dirent`
/// (`d_ino: u32, d_off: u32, d_reclen: u16`).
pub const LINUX_DIRENT_HEADER: usize = 10;

/// Fixed header bytes before `d_name` in `linux_dirent64`
/// (`d_ino: u64, d_off: u64, d_reclen: u16, d_type: u8`).
pub const LINUX_DIRENT64_HEADER: usize = 19;

fn round_reclen(unpadded: usize) -> usize {
    (unpadded + 7) & !7
}

/// Encode one `linux_dirent` into `out`. Returns the record length, `None`
/// if the record does not fit, or `EOVERFLOW` if the inode number does not
/// survive narrowing to 32 bits.
pub fn encode_dirent(
    out: &mut [u8],
    ino: u64,
    name: &[u8],
    kind: DirentKind,
) -> Result<Option<usize>, Errno> {
    let ino32 = u32::try_from(ino).map_err(|_| Errno::Overflow)?;
    // NUL terminator plus the trailing type byte
    let reclen = round_reclen(LINUX_DIRENT_HEADER + name.len() + 2);
    if reclen > out.len() {
        return Ok(None);
    }
    out[..reclen].fill(0);
    out[0..4].copy_from_slice(&ino32.to_le_bytes());
    out[8..10].copy_from_slice(&(reclen as u16).to_le_bytes());
    out[10..10 + name.len()].copy_from_slice(name);
    out[10 + name.len()] = 0;
    out[10 + name.len() + 1] = kind as u8;
    Ok(Some(reclen))
}

/// Encode one `linux_dirent64` into `out`. Returns the record length or
/// `None` if the record does not fit.
pub fn encode_dirent64(out: &mut [u8], ino: u64, name: &[u8], kind: DirentKind) -> Option<usize> {
    let reclen = round_reclen(LINUX_DIRENT64_HEADER + name.len() + 1);
    if reclen > out.len() {
        return None;
    }
    out[..reclen].fill(0);
    out[0..8].copy_from_slice(&ino.to_le_bytes());
    out[16..18].copy_from_slice(&(reclen as u16).to_le_bytes());
    out[18] = kind as u8;
    out[19..19 + name.len()].copy_from_slice(name);
    out[19 + name.len()] = 0;
    Some(reclen)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dirent_reclen_is_multiple_of_eight() {
        let mut buf = [0u8; 64];
        let len = encode_dirent(&mut buf, 7, b"a", DirentKind::Regular)
            .unwrap()
            .unwrap();
        assert_eq!(len % 8, 0);
        // type byte right after the NUL
        assert_eq!(buf[10 + 1], 0);
        assert_eq!(buf[10 + 2], DirentKind::Regular as u8);
    }

    #[test]
    fn dirent_wide_ino_overflows() {
        let mut buf = [0u8; 64];
        let err = encode_dirent(&mut buf, u64::from(u32::MAX) + 1, b"x", DirentKind::Dir)
            .unwrap_err();
        assert_eq!(err, Errno::Overflow);
    }

    #[test]
    fn dirent64_keeps_wide_ino() {
        let mut buf = [0u8; 64];
        let ino = u64::from(u32::MAX) + 1;
        let len = encode_dirent64(&mut buf, ino, b"x", DirentKind::Dir).unwrap();
        assert_eq!(len % 8, 0);
        assert_eq!(u64::from_le_bytes(buf[0..8].try_into().unwrap()), ino);
        assert_eq!(buf[18], DirentKind::Dir as u8);
    }

    #[test]
    fn dirent_rejects_full_buffer() {
        let mut buf = [0u8; 8];
        assert_eq!(
            encode_dirent(&mut buf, 1, b"longname", DirentKind::Regular).unwrap(),
            None
        );
        assert!(encode_dirent64(&mut buf, 1, b"longname", DirentKind::Regular).is_none());
    }
}
