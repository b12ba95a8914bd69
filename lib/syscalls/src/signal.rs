//! Signal syscalls.

use tracing::{debug, error, instrument, warn};

use linden_abi::signal::{signo_is_valid, SigAction, SigInfo, SigSet, SIGSET_SIZE};
use linden_abi::{Errno, GuestPtr};
use linden_signal::{MaskHow, SigWait};

use crate::{Core, SysResult};

#[instrument(level = "trace", skip(core))]
pub fn sys_rt_sigaction(
    core: &Core,
    signum: i32,
    act: GuestPtr,
    oldact: GuestPtr,
    sigsetsize: u32,
) -> SysResult {
    if sigsetsize as usize != SIGSET_SIZE {
        return Err(Errno::Inval);
    }
    if act != 0 {
        core.check_read(act, SigAction::SIZE)?;
    }
    if oldact != 0 {
        core.check_write(oldact, SigAction::SIZE)?;
    }
    let new = if act != 0 {
        let raw = core.read_user(act, SigAction::SIZE)?;
        Some(SigAction::decode(&raw))
    } else {
        None
    };
    let old = core.signal().sigaction(signum, new)?;
    if oldact != 0 {
        let mut raw = [0u8; SigAction::SIZE];
        old.encode(&mut raw);
        core.write_user(oldact, &raw)?;
    }
    Ok(0)
}

#[instrument(level = "trace", skip(core))]
pub fn sys_rt_sigprocmask(
    core: &Core,
    how: i32,
    set: GuestPtr,
    oldset: GuestPtr,
    sigsetsize: u32,
) -> SysResult {
    if sigsetsize as usize != SIGSET_SIZE {
        return Err(Errno::Inval);
    }
    let how = MaskHow::from_raw(how).ok_or(Errno::Inval)?;
    if set != 0 {
        core.check_read(set, SIGSET_SIZE)?;
    }
    if oldset != 0 {
        core.check_write(oldset, SIGSET_SIZE)?;
    }
    let new = if set != 0 {
        let raw = core.read_user(set, SIGSET_SIZE)?;
        Some(SigSet(u64::from_le_bytes(raw.try_into().unwrap())))
    } else {
        None
    };
    let old = core.signal().sigprocmask(how, new);
    if oldset != 0 {
        core.write_user(oldset, &old.0.to_le_bytes())?;
    }
    Ok(0)
}

/// Entered from the restorer; the translator resumes guest execution from
/// the restored context, so a success return value is never observed by
/// the guest.
#[instrument(level = "trace", skip(core))]
pub fn sys_rt_sigreturn(core: &Core, sp: GuestPtr) -> SysResult {
    core.signal().sigreturn(sp)?;
    Ok(0)
}

#[instrument(level = "trace", skip(core))]
pub fn sys_rt_sigsuspend(core: &Core, mask: GuestPtr) -> SysResult {
    let raw = core.read_user(mask, SIGSET_SIZE)?;
    let temporary = SigSet(u64::from_le_bytes(raw.try_into().unwrap()));
    let saved = core.signal().replace_mask(temporary);
    let woke = core.signal().signal_wait(&[], None);
    debug_assert_eq!(woke, SigWait::Interrupted);
    core.signal().replace_mask(saved);
    Err(Errno::Intr)
}

#[instrument(level = "trace", skip(_core))]
pub fn sys_sigaltstack(_core: &Core, ss: GuestPtr, oss: GuestPtr) -> SysResult {
    error!(ss, oss, "sigaltstack not implemented");
    Err(Errno::NoSys)
}

#[instrument(level = "trace", skip(core))]
pub fn sys_kill(core: &Core, pid: i32, sig: i32) -> SysResult {
    if pid <= 0 {
        // No process groups to signal.
        return Err(Errno::Srch);
    }
    if sig == 0 {
        // Existence probe only.
        return if pid as u32 == core.signal().pid() {
            Ok(0)
        } else {
            Err(Errno::Srch)
        };
    }
    if !signo_is_valid(sig) {
        return Err(Errno::Inval);
    }
    core.signal().kill(pid as u32, SigInfo::user(sig))?;
    Ok(0)
}

#[instrument(level = "trace", skip(core))]
pub fn sys_tgkill(core: &Core, tgid: i32, pid: i32, sig: i32) -> SysResult {
    if tgid != pid {
        // Single-threaded personality: the only thread id is the pid.
        return Err(Errno::Srch);
    }
    sys_kill(core, pid, sig)
}

#[instrument(level = "trace", skip(_core))]
pub fn sys_alarm(_core: &Core, seconds: u32) -> SysResult {
    error!(seconds, "alarm not implemented");
    Ok(0)
}

#[instrument(level = "trace", skip(core))]
pub fn sys_pause(core: &Core) -> SysResult {
    let woke = core.signal().signal_wait(&[], None);
    debug_assert_eq!(woke, SigWait::Interrupted);
    Err(Errno::Intr)
}

#[instrument(level = "trace", skip(_core))]
pub fn sys_personality(_core: &Core, persona: u32) -> SysResult {
    debug!(persona, "personality");
    if persona != 0 && persona != 0xffff_ffff {
        warn!(persona, "unsupported persona");
        return Err(Errno::Inval);
    }
    Ok(0)
}
