//! Signal syscall surface end to end: action-table edits through guest
//! memory, mask-then-deliver, the full handler round trip, sigsuspend.

mod common;

use std::time::{Duration, Instant};

use common::{guest, Guest, RESTORER, TRAMPOLINE};
use linden::syscalls::signal::{
    sys_alarm, sys_kill, sys_personality, sys_rt_sigaction, sys_rt_sigprocmask, sys_rt_sigreturn,
    sys_rt_sigsuspend, sys_sigaltstack, sys_tgkill,
};
use linden_abi::signal::{
    SigAction, SigSet, SIGKILL, SIGSTOP, SIGUSR1, SIG_BLOCK, SIG_SETMASK, SIG_UNBLOCK,
};
use linden_abi::{Errno, GuestPtr, RtSigFrame};

const HANDLER: GuestPtr = 0x0804_8100;

fn wait_until(mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        std::thread::sleep(Duration::from_millis(1));
    }
}

fn put_action(g: &Guest, action: SigAction) -> GuestPtr {
    let mut raw = [0u8; SigAction::SIZE];
    action.encode(&mut raw);
    g.put_bytes(&raw)
}

fn put_sigset(g: &Guest, set: SigSet) -> GuestPtr {
    g.put_bytes(&set.0.to_le_bytes())
}

fn install(g: &Guest, signo: i32) {
    let act = put_action(
        g,
        SigAction {
            handler: HANDLER,
            flags: 0,
            restorer: 0,
            mask: SigSet::EMPTY,
        },
    );
    assert_eq!(sys_rt_sigaction(&g.core, signo, act, 0, 8).unwrap(), 0);
}

#[test]
fn sigaction_round_trips_through_guest_memory() {
    let g = guest();
    install(&g, SIGUSR1);
    // replace it and read the old action back
    let act = put_action(
        &g,
        SigAction {
            handler: HANDLER + 4,
            flags: 0,
            restorer: RESTORER,
            mask: SigSet(0x10),
        },
    );
    let oldact = g.alloc(SigAction::SIZE);
    assert_eq!(sys_rt_sigaction(&g.core, SIGUSR1, act, oldact, 8).unwrap(), 0);
    let old = SigAction::decode(&g.read_mem(oldact, SigAction::SIZE));
    assert_eq!(old.handler, HANDLER);
    g.core.shutdown();
}

#[test]
fn sigaction_rejects_kill_stop_and_bad_sizes() {
    let g = guest();
    let act = put_action(&g, SigAction::default());
    assert_eq!(
        sys_rt_sigaction(&g.core, SIGKILL, act, 0, 8).unwrap_err(),
        Errno::Inval
    );
    assert_eq!(
        sys_rt_sigaction(&g.core, SIGSTOP, act, 0, 8).unwrap_err(),
        Errno::Inval
    );
    assert_eq!(
        sys_rt_sigaction(&g.core, SIGUSR1, act, 0, 4).unwrap_err(),
        Errno::Inval
    );
    assert_eq!(
        sys_rt_sigaction(&g.core, 0, act, 0, 8).unwrap_err(),
        Errno::Inval
    );
    // table slots stayed default
    assert_eq!(
        g.core.signal().sigaction(SIGUSR1, None).unwrap(),
        SigAction::default()
    );
    g.core.shutdown();
}

#[test]
fn mask_then_deliver_through_the_syscall_surface() {
    let g = guest();
    install(&g, SIGUSR1);

    let mut usr1 = SigSet::EMPTY;
    usr1.add(SIGUSR1);
    let set = put_sigset(&g, usr1);
    let oldset = g.alloc(8);
    assert_eq!(
        sys_rt_sigprocmask(&g.core, SIG_BLOCK, set, oldset, 8).unwrap(),
        0
    );
    assert_eq!(g.read_mem(oldset, 8), 0u64.to_le_bytes());

    let pid = g.core.signal().pid() as i32;
    assert_eq!(sys_kill(&g.core, pid, SIGUSR1).unwrap(), 0);
    wait_until(|| g.core.signal().pending().contains(SIGUSR1));
    assert_eq!(g.dbt.delivery_count(), 0);

    assert_eq!(
        sys_rt_sigprocmask(&g.core, SIG_UNBLOCK, set, 0, 8).unwrap(),
        0
    );
    wait_until(|| g.dbt.delivery_count() == 1);
    assert_eq!(g.thread.context().eip, TRAMPOLINE);
    g.core.shutdown();
}

#[test]
fn full_handler_round_trip() {
    let g = guest();
    install(&g, SIGUSR1);
    let pid = g.core.signal().pid() as i32;
    sys_kill(&g.core, pid, SIGUSR1).unwrap();
    wait_until(|| g.dbt.delivery_count() == 1);

    // trampoline: hand the interrupted context to the setup path
    let mut ctx = g.thread.context();
    ctx.eip = 0x0804_0040;
    g.core.signal().setup_handler(&mut ctx).unwrap();
    assert_eq!(ctx.eip, HANDLER);
    assert_eq!(ctx.eax, SIGUSR1 as u32);
    assert!(g.core.signal().mask().contains(SIGUSR1));

    // handler returns through the restorer; esp sits just above the frame
    let frame = g.read_mem(ctx.esp, RtSigFrame::SIZE);
    let decoded = RtSigFrame::decode(&frame);
    assert_eq!(decoded.pretcode, RESTORER);
    assert_eq!(sys_rt_sigreturn(&g.core, ctx.esp + 4).unwrap(), 0);
    assert_eq!(g.core.signal().mask(), SigSet::EMPTY);
    assert_eq!(g.dbt.sigreturns().len(), 1);
    assert_eq!(g.dbt.sigreturns()[0].ip, 0x0804_0040);
    g.core.shutdown();
}

#[test]
fn sigreturn_with_a_junk_stack_pointer_faults() {
    let g = guest();
    assert_eq!(sys_rt_sigreturn(&g.core, 0x44).unwrap_err(), Errno::Fault);
    g.core.shutdown();
}

#[test]
fn sigsuspend_waits_for_a_delivery_and_reports_eintr() {
    let g = guest();
    install(&g, SIGUSR1);
    // block USR1 outside the suspend window
    let mut usr1 = SigSet::EMPTY;
    usr1.add(SIGUSR1);
    let set = put_sigset(&g, usr1);
    sys_rt_sigprocmask(&g.core, SIG_SETMASK, set, 0, 8).unwrap();

    let raiser = {
        let core = g.core.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            let pid = core.signal().pid() as i32;
            sys_kill(&core, pid, SIGUSR1).unwrap();
        })
    };
    let empty = put_sigset(&g, SigSet::EMPTY);
    assert_eq!(sys_rt_sigsuspend(&g.core, empty).unwrap_err(), Errno::Intr);
    raiser.join().unwrap();
    assert_eq!(g.dbt.delivery_count(), 1);
    // the pre-suspend mask is back in force
    assert!(g.core.signal().mask().contains(SIGUSR1));
    g.core.shutdown();
}

#[test]
fn kill_surface_validation() {
    let g = guest();
    let pid = g.core.signal().pid() as i32;
    assert_eq!(sys_kill(&g.core, pid, 0).unwrap(), 0);
    assert_eq!(sys_kill(&g.core, pid + 1, 0).unwrap_err(), Errno::Srch);
    assert_eq!(sys_kill(&g.core, -1, SIGUSR1).unwrap_err(), Errno::Srch);
    assert_eq!(sys_kill(&g.core, pid, 99).unwrap_err(), Errno::Inval);
    assert_eq!(sys_tgkill(&g.core, pid, pid, 0).unwrap(), 0);
    assert_eq!(sys_tgkill(&g.core, pid, pid + 1, 0).unwrap_err(), Errno::Srch);
    g.core.shutdown();
}

#[test]
fn leftover_stubs_answer_like_the_original() {
    let g = guest();
    assert_eq!(sys_alarm(&g.core, 5).unwrap(), 0);
    assert_eq!(sys_personality(&g.core, 0).unwrap(), 0);
    assert_eq!(sys_personality(&g.core, 0xffff_ffff).unwrap(), 0);
    assert_eq!(sys_personality(&g.core, 8).unwrap_err(), Errno::Inval);
    assert_eq!(sys_sigaltstack(&g.core, 0, 0).unwrap_err(), Errno::NoSys);
    g.core.shutdown();
}
