//! Guest time records used by the utime family and select.

/// `struct timespec` (32-bit layout: two i32 fields).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Timespec {
    pub tv_sec: i64,
    pub tv_nsec: i64,
}

impl Timespec {
    /// Wire size on the 32-bit personality.
    pub const SIZE: usize = 8;

    pub fn decode(raw: &[u8]) -> Self {
        debug_assert!(raw.len() >= Self::SIZE);
        Self {
            tv_sec: i32::from_le_bytes(raw[0..4].try_into().unwrap()) as i64,
            tv_nsec: i32::from_le_bytes(raw[4..8].try_into().unwrap()) as i64,
        }
    }
}

/// `struct timeval` (32-bit layout).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Timeval {
    pub tv_sec: i64,
    pub tv_usec: i64,
}

impl Timeval {
    pub const SIZE: usize = 8;

    pub fn decode(raw: &[u8]) -> Self {
        debug_assert!(raw.len() >= Self::SIZE);
        Self {
            tv_sec: i32::from_le_bytes(raw[0..4].try_into().unwrap()) as i64,
            tv_usec: i32::from_le_bytes(raw[4..8].try_into().unwrap()) as i64,
        }
    }

    pub fn to_timespec(self) -> Timespec {
        Timespec {
            tv_sec: self.tv_sec,
            tv_nsec: self.tv_usec * 1000,
        }
    }
}

/// `struct utimbuf` (two 32-bit time_t fields).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Utimbuf {
    pub actime: i64,
    pub modtime: i64,
}

impl Utimbuf {
    pub const SIZE: usize = 8;

    pub fn decode(raw: &[u8]) -> Self {
        debug_assert!(raw.len() >= Self::SIZE);
        Self {
            actime: i32::from_le_bytes(raw[0..4].try_into().unwrap()) as i64,
            modtime: i32::from_le_bytes(raw[4..8].try_into().unwrap()) as i64,
        }
    }
}

/// One guest `struct iovec` (`iov_base: u32, iov_len: u32`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IoVec {
    pub base: u32,
    pub len: u32,
}

impl IoVec {
    pub const SIZE: usize = 8;

    pub fn decode(raw: &[u8]) -> Self {
        debug_assert!(raw.len() >= Self::SIZE);
        Self {
            base: u32::from_le_bytes(raw[0..4].try_into().unwrap()),
            len: u32::from_le_bytes(raw[4..8].try_into().unwrap()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeval_to_timespec_scales() {
        let tv = Timeval {
            tv_sec: 3,
            tv_usec: 500,
        };
        assert_eq!(
            tv.to_timespec(),
            Timespec {
                tv_sec: 3,
                tv_nsec: 500_000
            }
        );
    }
}
