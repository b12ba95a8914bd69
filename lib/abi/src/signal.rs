//! Signal numbers, masks and the guest-visible `sigaction`/`siginfo`
//! records.
//!
//! `sigset_t` is 64 bits for the rt_* syscall family even on the 32-bit
//! personality; `sigsetsize` arguments are validated against
//! [`SIGSET_SIZE`].

use crate::GuestPtr;

pub const SIGHUP: i32 = 1;
pub const SIGINT: i32 = 2;
pub const SIGQUIT: i32 = 3;
pub const SIGILL: i32 = 4;
pub const SIGTRAP: i32 = 5;
pub const SIGABRT: i32 = 6;
pub const SIGBUS: i32 = 7;
pub const SIGFPE: i32 = 8;
pub const SIGKILL: i32 = 9;
pub const SIGUSR1: i32 = 10;
pub const SIGSEGV: i32 = 11;
pub const SIGUSR2: i32 = 12;
pub const SIGPIPE: i32 = 13;
pub const SIGALRM: i32 = 14;
pub const SIGTERM: i32 = 15;
pub const SIGSTKFLT: i32 = 16;
pub const SIGCHLD: i32 = 17;
pub const SIGCONT: i32 = 18;
pub const SIGSTOP: i32 = 19;
pub const SIGTSTP: i32 = 20;
pub const SIGTTIN: i32 = 21;
pub const SIGTTOU: i32 = 22;
pub const SIGURG: i32 = 23;
pub const SIGXCPU: i32 = 24;
pub const SIGXFSZ: i32 = 25;
pub const SIGVTALRM: i32 = 26;
pub const SIGPROF: i32 = 27;
pub const SIGWINCH: i32 = 28;
pub const SIGIO: i32 = 29;
pub const SIGPWR: i32 = 30;
pub const SIGSYS: i32 = 31;

/// Number of signal slots (`1..NSIG` are valid signo values).
pub const NSIG: i32 = 64;

/// Size in bytes of the rt_* `sigset_t`.
pub const SIGSET_SIZE: usize = 8;

/// `sigprocmask` how values.
pub const SIG_BLOCK: i32 = 0;
pub const SIG_UNBLOCK: i32 = 1;
pub const SIG_SETMASK: i32 = 2;

/// Special handler addresses.
pub const SIG_DFL: GuestPtr = 0;
pub const SIG_IGN: GuestPtr = 1;

/// `si_code` for user-originated signals.
pub const SI_USER: i32 = 0;

pub const fn signo_is_valid(signo: i32) -> bool {
    signo > 0 && signo < NSIG
}

/// A 64-bit signal mask.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SigSet(pub u64);

impl SigSet {
    pub const EMPTY: SigSet = SigSet(0);

    pub const fn contains(self, signo: i32) -> bool {
        signo_is_valid(signo) && self.0 & (1u64 << (signo - 1)) != 0
    }

    pub fn add(&mut self, signo: i32) {
        if signo_is_valid(signo) {
            self.0 |= 1u64 << (signo - 1);
        }
    }

    pub fn remove(&mut self, signo: i32) {
        if signo_is_valid(signo) {
            self.0 &= !(1u64 << (signo - 1));
        }
    }

    pub const fn union(self, other: SigSet) -> SigSet {
        SigSet(self.0 | other.0)
    }

    pub const fn difference(self, other: SigSet) -> SigSet {
        SigSet(self.0 & !other.0)
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Lowest-numbered signal in the set, if any.
    pub fn first(self) -> Option<i32> {
        if self.0 == 0 {
            None
        } else {
            Some(self.0.trailing_zeros() as i32 + 1)
        }
    }
}

/// Guest `siginfo_t`. 128 bytes on the wire; only the leading three fields
/// carry meaning for the deliveries this personality generates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SigInfo {
    pub si_signo: i32,
    pub si_errno: i32,
    pub si_code: i32,
}

impl SigInfo {
    /// Wire size of `siginfo_t`.
    pub const SIZE: usize = 128;

    pub fn user(signo: i32) -> Self {
        Self {
            si_signo: signo,
            si_errno: 0,
            si_code: SI_USER,
        }
    }

    pub fn encode(&self, out: &mut [u8]) {
        debug_assert!(out.len() >= Self::SIZE);
        out[..Self::SIZE].fill(0);
        out[0..4].copy_from_slice(&self.si_signo.to_le_bytes());
        out[4..8].copy_from_slice(&self.si_errno.to_le_bytes());
        out[8..12].copy_from_slice(&self.si_code.to_le_bytes());
    }
}

/// `SA_*` flag bits this personality understands.
pub const SA_SIGINFO: u32 = 0x0000_0004;
pub const SA_RESTORER: u32 = 0x0400_0000;
pub const SA_RESTART: u32 = 0x1000_0000;

/// One slot of the signal action table.
///
/// The wire encoding is the IA-32 rt `struct sigaction`:
/// `{ sa_handler: u32, sa_flags: u32, sa_restorer: u32, sa_mask: u64 }`,
/// 20 bytes, fields little-endian.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SigAction {
    pub handler: GuestPtr,
    pub flags: u32,
    pub restorer: GuestPtr,
    pub mask: SigSet,
}

impl SigAction {
    /// Wire size of the rt `struct sigaction`.
    pub const SIZE: usize = 20;

    pub fn decode(raw: &[u8]) -> Self {
        debug_assert!(raw.len() >= Self::SIZE);
        let word = |at: usize| u32::from_le_bytes(raw[at..at + 4].try_into().unwrap());
        Self {
            handler: word(0),
            flags: word(4),
            restorer: word(8),
            mask: SigSet(u64::from_le_bytes(raw[12..20].try_into().unwrap())),
        }
    }

    pub fn encode(&self, out: &mut [u8]) {
        debug_assert!(out.len() >= Self::SIZE);
        out[0..4].copy_from_slice(&self.handler.to_le_bytes());
        out[4..8].copy_from_slice(&self.flags.to_le_bytes());
        out[8..12].copy_from_slice(&self.restorer.to_le_bytes());
        out[12..20].copy_from_slice(&self.mask.0.to_le_bytes());
    }

    pub const fn is_ignore(&self) -> bool {
        self.handler == SIG_IGN
    }

    pub const fn is_default(&self) -> bool {
        self.handler == SIG_DFL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sigset_bit_positions() {
        let mut set = SigSet::EMPTY;
        set.add(SIGHUP);
        set.add(SIGUSR1);
        assert_eq!(set.0, (1 << 0) | (1 << 9));
        assert!(set.contains(SIGHUP));
        assert!(!set.contains(SIGINT));
        set.remove(SIGHUP);
        assert_eq!(set.first(), Some(SIGUSR1));
    }

    #[test]
    fn sigset_ignores_invalid_signo() {
        let mut set = SigSet::EMPTY;
        set.add(0);
        set.add(NSIG);
        set.add(-3);
        assert!(set.is_empty());
    }

    #[test]
    fn sigaction_round_trip() {
        let act = SigAction {
            handler: 0x0804_8000,
            flags: SA_SIGINFO | SA_RESTORER,
            restorer: 0x0804_9000,
            mask: SigSet(0x8001),
        };
        let mut raw = [0u8; SigAction::SIZE];
        act.encode(&mut raw);
        assert_eq!(SigAction::decode(&raw), act);
    }
}
