//! Signal core for the Linux personality.
//!
//! Owns the per-process action table, signal mask and pending set, and the
//! delivery machinery that lands execution inside a user-installed handler:
//! a worker thread consumes ingress packets, decides deliverability under
//! the signal mutex, and rewrites the suspended main thread's context
//! through the translator boundary. The main thread finishes the job in
//! [`SignalCore::setup_handler`] by laying out an `rt_sigframe` on the
//! guest stack, and unwinds it again in [`SignalCore::sigreturn`].
//!
//! `can_accept_signal` closes the window between deciding a delivery and
//! the handler frame being in place: while it is false every new signal
//! parks in the pending set, whatever its number.

mod child;
mod worker;

use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::{debug, error, info, warn};

use linden_abi::frame::{align_fpstate, align_frame};
use linden_abi::signal::{
    signo_is_valid, SigAction, SigInfo, SigSet, NSIG, SIGABRT, SIGALRM, SIGFPE, SIGHUP, SIGILL,
    SIGINT, SIGKILL, SIGPIPE, SIGQUIT, SIGSEGV, SIGSTOP, SIGTERM, SIGUSR1, SIGUSR2, SIG_BLOCK,
    SIG_SETMASK, SIG_UNBLOCK,
};
use linden_abi::{
    CpuContext, Errno, GuestPtr, RtSigFrame, SigContext, UContext, FPSTATE_SIZE,
};
use linden_host::{wait_any, BadAddress, Dbt, Event, GuestMemory, GuestThread, Semaphore,
    WaitOutcome};

pub use child::{ChildProcess, DeathPipe};
use worker::SignalPacket;

/// `rt_sigprocmask` how argument.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MaskHow {
    Block,
    Unblock,
    SetMask,
}

impl MaskHow {
    pub fn from_raw(how: i32) -> Option<Self> {
        match how {
            SIG_BLOCK => Some(Self::Block),
            SIG_UNBLOCK => Some(Self::Unblock),
            SIG_SETMASK => Some(Self::SetMask),
            _ => None,
        }
    }
}

/// Result of [`SignalCore::signal_wait`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SigWait {
    /// The caller's handle at this index fired.
    Object(usize),
    /// The signal-ready event fired instead.
    Interrupted,
    Timeout,
}

struct SignalState {
    actions: [SigAction; NSIG as usize],
    mask: SigSet,
    pending: SigSet,
    /// Retained siginfo per pending signo; first instance wins.
    info: [SigInfo; NSIG as usize],
    current: SigInfo,
    can_accept_signal: bool,
}

pub(crate) struct SignalInner {
    state: Mutex<SignalState>,
    /// Signalled between a delivery decision and handler setup; folded into
    /// multi-object waits so blocked syscalls notice.
    sigevent: Event,
    pub(crate) child_wait: Semaphore,
    tx: Sender<SignalPacket>,
    thread: Arc<dyn GuestThread>,
    dbt: Arc<dyn Dbt>,
    mm: Arc<dyn GuestMemory>,
    restorer: GuestPtr,
    pid: u32,
}

impl SignalInner {
    pub(crate) fn sender(&self) -> Sender<SignalPacket> {
        self.tx.clone()
    }

    pub(crate) fn handle_kill(&self, info: &SigInfo) {
        let signo = info.si_signo;
        if !signo_is_valid(signo) {
            return;
        }
        let mut state = self.state.lock();
        if state.pending.contains(signo) {
            // First pending instance wins; later ones are dropped.
            return;
        }
        if state.mask.contains(signo) || !state.can_accept_signal {
            state.pending.add(signo);
            state.info[signo as usize] = *info;
        } else {
            self.deliver(&mut state, info);
        }
    }

    pub(crate) fn handle_deliver_prompt(&self) {
        let mut state = self.state.lock();
        for signo in 1..NSIG {
            if state.pending.contains(signo)
                && !state.mask.contains(signo)
                && state.can_accept_signal
            {
                state.pending.remove(signo);
                let info = state.info[signo as usize];
                self.deliver(&mut state, &info);
                break;
            }
        }
    }

    /// Deliver to the main thread. Caller holds the signal mutex.
    fn deliver(&self, state: &mut SignalState, info: &SigInfo) {
        let action = state.actions[info.si_signo as usize];
        if action.is_ignore() {
            return;
        }
        if action.is_default() {
            default_action(info);
            return;
        }
        state.can_accept_signal = false;
        let mut rewrite = |ctx: &mut CpuContext| {
            self.dbt.deliver_signal(ctx);
            state.current = *info;
            self.sigevent.set();
        };
        self.thread.with_suspended(&mut rewrite);
    }

    /// Re-arm delivery when something deliverable is pending. Caller holds
    /// the signal mutex.
    fn send_pending(&self, state: &SignalState) {
        if !state.pending.difference(state.mask).is_empty() {
            let _ = self.tx.send(SignalPacket::Deliver);
        }
    }
}

/// Default dispositions, applied when no handler is installed.
fn default_action(info: &SigInfo) {
    match info.si_signo {
        SIGHUP | SIGINT | SIGQUIT | SIGILL | SIGABRT | SIGFPE | SIGKILL | SIGSEGV | SIGPIPE
        | SIGALRM | SIGTERM | SIGUSR1 | SIGUSR2 => {
            debug!(signo = info.si_signo, "fatal signal with default action");
            std::process::exit(0);
        }
        _ => {}
    }
}

#[derive(Clone)]
pub struct SignalCore {
    inner: Arc<SignalInner>,
    worker: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl SignalCore {
    /// Bring up the signal subsystem: state, ready event, wait semaphore
    /// and the worker thread. A worker spawn failure is logged and leaves
    /// the subsystem degraded (signals park as pending forever) rather
    /// than fatal.
    pub fn new(
        thread: Arc<dyn GuestThread>,
        dbt: Arc<dyn Dbt>,
        mm: Arc<dyn GuestMemory>,
        restorer: GuestPtr,
    ) -> Self {
        let (tx, rx) = mpsc::channel();
        let inner = Arc::new(SignalInner {
            state: Mutex::new(SignalState {
                actions: [SigAction::default(); NSIG as usize],
                mask: SigSet::EMPTY,
                pending: SigSet::EMPTY,
                info: [SigInfo::default(); NSIG as usize],
                current: SigInfo::default(),
                can_accept_signal: true,
            }),
            sigevent: Event::new(),
            child_wait: Semaphore::new(),
            tx,
            thread,
            dbt,
            mm,
            restorer,
            pid: std::process::id(),
        });
        let worker = {
            let inner = inner.clone();
            std::thread::Builder::new()
                .name("signal".into())
                .spawn(move || worker::run(inner, rx))
        };
        let worker = match worker {
            Ok(handle) => Some(handle),
            Err(err) => {
                error!(?err, "signal worker creation failed");
                None
            }
        };
        info!("signal subsystem initialised");
        Self {
            inner,
            worker: Arc::new(Mutex::new(worker)),
        }
    }

    /// The pid signals may be addressed to.
    pub fn pid(&self) -> u32 {
        self.inner.pid
    }

    /// Queue a signal for this process. Anything else is `ESRCH`: there is
    /// no cross-process delivery.
    pub fn kill(&self, pid: u32, info: SigInfo) -> Result<(), Errno> {
        if pid != self.inner.pid {
            error!(pid, "killing other processes is not supported");
            return Err(Errno::Srch);
        }
        self.raise(info);
        Ok(())
    }

    /// Queue a self-directed signal.
    pub fn raise(&self, info: SigInfo) {
        let _ = self.inner.tx.send(SignalPacket::Kill(info));
    }

    /// Examine and/or replace one action-table slot. `SIGKILL` and
    /// `SIGSTOP` are immutable.
    pub fn sigaction(&self, signo: i32, new: Option<SigAction>) -> Result<SigAction, Errno> {
        if !signo_is_valid(signo) || signo == SIGKILL || signo == SIGSTOP {
            return Err(Errno::Inval);
        }
        let mut state = self.inner.state.lock();
        let old = state.actions[signo as usize];
        if let Some(new) = new {
            state.actions[signo as usize] = new;
        }
        Ok(old)
    }

    /// Apply a mask change and re-arm delivery for anything it unblocked.
    /// Returns the previous mask.
    pub fn sigprocmask(&self, how: MaskHow, set: Option<SigSet>) -> SigSet {
        let mut state = self.inner.state.lock();
        let old = state.mask;
        if let Some(set) = set {
            state.mask = match how {
                MaskHow::Block => state.mask.union(set),
                MaskHow::Unblock => state.mask.difference(set),
                MaskHow::SetMask => set,
            };
        }
        self.inner.send_pending(&state);
        old
    }

    /// Wholesale mask replacement for `rt_sigsuspend`.
    pub fn replace_mask(&self, mask: SigSet) -> SigSet {
        self.sigprocmask(MaskHow::SetMask, Some(mask))
    }

    pub fn mask(&self) -> SigSet {
        self.inner.state.lock().mask
    }

    pub fn pending(&self) -> SigSet {
        self.inner.state.lock().pending
    }

    /// Build the signal frame on the guest stack and redirect `ctx` into
    /// the user handler. Runs on the main thread, entered from the
    /// translator's signal-setup trampoline.
    pub fn setup_handler(&self, ctx: &mut CpuContext) -> Result<(), BadAddress> {
        // Snapshot everything the frame needs in one critical section;
        // guest memory is only touched after the lock is dropped.
        let (info, action, premask) = {
            let state = self.inner.state.lock();
            let info = state.current;
            (info, state.actions[info.si_signo as usize], state.mask)
        };
        let signo = info.si_signo;

        let fpstate = align_fpstate(ctx.esp);
        let mut fpu = [0u8; FPSTATE_SIZE];
        self.inner.dbt.fpu_save(&mut fpu);
        self.inner.mm.write_bytes(fpstate, &fpu)?;

        let frame_addr = align_frame(fpstate);
        let frame = RtSigFrame {
            pretcode: if action.restorer != 0 {
                action.restorer
            } else {
                self.inner.restorer
            },
            sig: signo,
            pinfo: frame_addr + RtSigFrame::INFO_OFFSET as GuestPtr,
            puc: frame_addr + RtSigFrame::UC_OFFSET as GuestPtr,
            info,
            uc: UContext {
                uc_flags: 0,
                uc_link: 0,
                uc_stack: [0; 3],
                uc_mcontext: SigContext::from_cpu(ctx, fpstate, premask.0 as u32),
                uc_sigmask: premask,
            },
        };
        self.inner.mm.write_bytes(frame_addr, &frame.encode())?;

        {
            let mut state = self.inner.state.lock();
            state.mask = state.mask.union(action.mask);
            state.mask.add(signo);
            state.can_accept_signal = true;
            self.inner.sigevent.reset();
        }

        ctx.esp = frame_addr;
        ctx.eip = action.handler;
        ctx.eax = signo as u32;
        ctx.edx = frame.pinfo;
        ctx.ecx = frame.puc;
        Ok(())
    }

    /// `rt_sigreturn`: unwind the frame the handler just returned through.
    /// Restores FPU state and the saved mask, re-arms delivery for any
    /// now-unblocked pending signal, and hands the machine context to the
    /// translator. Returns the context for callers whose translator came
    /// back (test doubles); production translators never do.
    pub fn sigreturn(&self, sp: GuestPtr) -> Result<SigContext, Errno> {
        let frame_addr = sp.wrapping_sub(4);
        if !self.inner.mm.check_read(frame_addr, RtSigFrame::SIZE) {
            error!("sigreturn: invalid frame");
            return Err(Errno::Fault);
        }
        let raw = self
            .inner
            .mm
            .read_vec(frame_addr, RtSigFrame::SIZE)
            .map_err(|_| Errno::Fault)?;
        let frame = RtSigFrame::decode(&raw);

        let mut fpu = [0u8; FPSTATE_SIZE];
        self.inner
            .mm
            .read_bytes(frame.uc.uc_mcontext.fpstate, &mut fpu)
            .map_err(|_| Errno::Fault)?;
        self.inner.dbt.fpu_restore(&fpu);

        {
            let mut state = self.inner.state.lock();
            state.mask = frame.uc.uc_sigmask;
            self.inner.send_pending(&state);
        }

        self.inner.dbt.sigreturn(&frame.uc.uc_mcontext);
        Ok(frame.uc.uc_mcontext)
    }

    /// Multi-object wait with the signal-ready event folded in. Returns
    /// [`SigWait::Interrupted`] when a signal delivery is what woke us.
    pub fn signal_wait(&self, handles: &[&Event], timeout: Option<Duration>) -> SigWait {
        let mut set: SmallVec<[&Event; 8]> = SmallVec::from_slice(handles);
        set.push(&self.inner.sigevent);
        match wait_any(&set, timeout) {
            WaitOutcome::Object(i) if i == handles.len() => SigWait::Interrupted,
            WaitOutcome::Object(i) => SigWait::Object(i),
            WaitOutcome::Timeout => SigWait::Timeout,
        }
    }

    /// Track a child process's death pipe; its EOF becomes `SIGCHLD` and a
    /// release of the child-wait semaphore.
    pub fn add_child(&self, child: ChildProcess) -> Arc<ChildProcess> {
        let child = Arc::new(child);
        let _ = self.inner.tx.send(SignalPacket::AddChild(child.clone()));
        child
    }

    /// Semaphore released once per dead child, for `wait`-style syscalls.
    pub fn child_wait(&self) -> &Semaphore {
        &self.inner.child_wait
    }

    /// Stop the worker; no signals are drained afterwards.
    pub fn shutdown(&self) {
        let _ = self.inner.tx.send(SignalPacket::Shutdown);
        if let Some(handle) = self.worker.lock().take() {
            if handle.join().is_err() {
                warn!("signal worker exited abnormally");
            }
        }
    }
}
