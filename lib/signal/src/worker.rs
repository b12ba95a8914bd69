//! The signal worker.
//!
//! All ingress (self-directed kills, deliver prompts after a mask change,
//! child registrations and child deaths) converges on one thread through
//! one packet channel, so packet handling needs no ordering tricks: the
//! order of acceptance is the order of processing. The worker is the only
//! thread allowed to rewrite the main thread's context.
//!
//! Keep logging out of the delivery path: the main thread may be suspended
//! while holding arbitrary host locks inside the logging backend.

use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread;

use linden_abi::signal::{SigInfo, SIGCHLD};

use crate::child::{wait_for_death, ChildProcess};
use crate::SignalInner;

pub(crate) enum SignalPacket {
    Shutdown,
    Kill(SigInfo),
    /// Re-examine pending∧¬mask after a mask change.
    Deliver,
    AddChild(Arc<ChildProcess>),
    ChildDeath(Arc<ChildProcess>),
}

pub(crate) fn run(inner: Arc<SignalInner>, rx: Receiver<SignalPacket>) {
    while let Ok(packet) = rx.recv() {
        match packet {
            SignalPacket::Shutdown => return,
            SignalPacket::Kill(info) => inner.handle_kill(&info),
            SignalPacket::Deliver => inner.handle_deliver_prompt(),
            SignalPacket::AddChild(child) => {
                let Some(pipe) = child.take_pipe() else {
                    continue;
                };
                let tx = inner.sender();
                let spawned = thread::Builder::new()
                    .name(format!("child-watch-{}", child.pid()))
                    .spawn(move || {
                        wait_for_death(pipe);
                        let _ = tx.send(SignalPacket::ChildDeath(child));
                    });
                if spawned.is_err() {
                    tracing::error!("failed to spawn child death watcher");
                }
            }
            SignalPacket::ChildDeath(child) => {
                child.mark_terminated();
                inner.handle_kill(&SigInfo::user(SIGCHLD));
                inner.child_wait.release(1);
            }
        }
    }
}
