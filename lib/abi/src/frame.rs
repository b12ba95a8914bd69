//! Signal frame layout for the IA-32 personality.
//!
//! The frame is written byte-for-byte into the guest stack; the guest's
//! handler and its `rt_sigreturn` path both read it, so every offset here is
//! ABI. All fields are 32-bit little-endian words except `uc_sigmask`
//! (64 bits) and the embedded 128-byte `siginfo`.

use crate::signal::{SigInfo, SigSet};
use crate::GuestPtr;

/// FXSAVE area size. The save area must sit on a 512-byte boundary.
pub const FPSTATE_SIZE: usize = 512;

/// Integer/control register state of the suspended guest thread.
///
/// This is what the context-rewrite boundary hands back and forth; it is a
/// host-side view, not a wire struct.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CpuContext {
    pub eax: u32,
    pub ebx: u32,
    pub ecx: u32,
    pub edx: u32,
    pub esi: u32,
    pub edi: u32,
    pub ebp: u32,
    pub esp: u32,
    pub eip: u32,
    pub eflags: u32,
}

/// Guest `struct sigcontext`: 22 32-bit words.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SigContext {
    pub gs: u32,
    pub fs: u32,
    pub es: u32,
    pub ds: u32,
    pub di: u32,
    pub si: u32,
    pub bp: u32,
    pub sp: u32,
    pub bx: u32,
    pub dx: u32,
    pub cx: u32,
    pub ax: u32,
    pub trapno: u32,
    pub err: u32,
    pub ip: u32,
    pub cs: u32,
    pub flags: u32,
    pub sp_at_signal: u32,
    pub ss: u32,
    pub fpstate: GuestPtr,
    pub oldmask: u32,
    pub cr2: u32,
}

impl SigContext {
    pub const SIZE: usize = 88;

    /// Capture the integer registers of a suspended thread, recording the
    /// FPU save-area pointer and the pre-delivery mask.
    pub fn from_cpu(ctx: &CpuContext, fpstate: GuestPtr, oldmask: u32) -> Self {
        Self {
            di: ctx.edi,
            si: ctx.esi,
            bp: ctx.ebp,
            sp: ctx.esp,
            bx: ctx.ebx,
            dx: ctx.edx,
            cx: ctx.ecx,
            ax: ctx.eax,
            ip: ctx.eip,
            flags: ctx.eflags,
            sp_at_signal: ctx.esp,
            fpstate,
            oldmask,
            ..Default::default()
        }
    }

    /// The register state `rt_sigreturn` resumes from.
    pub fn to_cpu(&self) -> CpuContext {
        CpuContext {
            eax: self.ax,
            ebx: self.bx,
            ecx: self.cx,
            edx: self.dx,
            esi: self.si,
            edi: self.di,
            ebp: self.bp,
            esp: self.sp,
            eip: self.ip,
            eflags: self.flags,
        }
    }

    pub fn encode(&self, out: &mut [u8]) {
        debug_assert!(out.len() >= Self::SIZE);
        let words = [
            self.gs,
            self.fs,
            self.es,
            self.ds,
            self.di,
            self.si,
            self.bp,
            self.sp,
            self.bx,
            self.dx,
            self.cx,
            self.ax,
            self.trapno,
            self.err,
            self.ip,
            self.cs,
            self.flags,
            self.sp_at_signal,
            self.ss,
            self.fpstate,
            self.oldmask,
            self.cr2,
        ];
        for (i, w) in words.iter().enumerate() {
            out[i * 4..i * 4 + 4].copy_from_slice(&w.to_le_bytes());
        }
    }

    pub fn decode(raw: &[u8]) -> Self {
        debug_assert!(raw.len() >= Self::SIZE);
        let word = |i: usize| u32::from_le_bytes(raw[i * 4..i * 4 + 4].try_into().unwrap());
        Self {
            gs: word(0),
            fs: word(1),
            es: word(2),
            ds: word(3),
            di: word(4),
            si: word(5),
            bp: word(6),
            sp: word(7),
            bx: word(8),
            dx: word(9),
            cx: word(10),
            ax: word(11),
            trapno: word(12),
            err: word(13),
            ip: word(14),
            cs: word(15),
            flags: word(16),
            sp_at_signal: word(17),
            ss: word(18),
            fpstate: word(19),
            oldmask: word(20),
            cr2: word(21),
        }
    }
}

/// Guest `struct ucontext`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UContext {
    pub uc_flags: u32,
    pub uc_link: GuestPtr,
    pub uc_stack: [u32; 3],
    pub uc_mcontext: SigContext,
    pub uc_sigmask: SigSet,
}

impl UContext {
    pub const SIZE: usize = 8 + 12 + SigContext::SIZE + 8;
    pub const MCONTEXT_OFFSET: usize = 20;
    pub const SIGMASK_OFFSET: usize = Self::MCONTEXT_OFFSET + SigContext::SIZE;

    pub fn encode(&self, out: &mut [u8]) {
        debug_assert!(out.len() >= Self::SIZE);
        out[0..4].copy_from_slice(&self.uc_flags.to_le_bytes());
        out[4..8].copy_from_slice(&self.uc_link.to_le_bytes());
        for (i, w) in self.uc_stack.iter().enumerate() {
            out[8 + i * 4..12 + i * 4].copy_from_slice(&w.to_le_bytes());
        }
        self.uc_mcontext
            .encode(&mut out[Self::MCONTEXT_OFFSET..Self::MCONTEXT_OFFSET + SigContext::SIZE]);
        out[Self::SIGMASK_OFFSET..Self::SIGMASK_OFFSET + 8]
            .copy_from_slice(&self.uc_sigmask.0.to_le_bytes());
    }

    pub fn decode(raw: &[u8]) -> Self {
        debug_assert!(raw.len() >= Self::SIZE);
        let word = |at: usize| u32::from_le_bytes(raw[at..at + 4].try_into().unwrap());
        Self {
            uc_flags: word(0),
            uc_link: word(4),
            uc_stack: [word(8), word(12), word(16)],
            uc_mcontext: SigContext::decode(&raw[Self::MCONTEXT_OFFSET..]),
            uc_sigmask: SigSet(u64::from_le_bytes(
                raw[Self::SIGMASK_OFFSET..Self::SIGMASK_OFFSET + 8]
                    .try_into()
                    .unwrap(),
            )),
        }
    }
}

/// The complete `struct rt_sigframe` pushed below the FPU save area.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RtSigFrame {
    pub pretcode: GuestPtr,
    pub sig: i32,
    pub pinfo: GuestPtr,
    pub puc: GuestPtr,
    pub info: SigInfo,
    pub uc: UContext,
}

impl RtSigFrame {
    pub const SIZE: usize = 16 + SigInfo::SIZE + UContext::SIZE;
    pub const INFO_OFFSET: usize = 16;
    pub const UC_OFFSET: usize = 16 + SigInfo::SIZE;

    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![0u8; Self::SIZE];
        out[0..4].copy_from_slice(&self.pretcode.to_le_bytes());
        out[4..8].copy_from_slice(&self.sig.to_le_bytes());
        out[8..12].copy_from_slice(&self.pinfo.to_le_bytes());
        out[12..16].copy_from_slice(&self.puc.to_le_bytes());
        self.info
            .encode(&mut out[Self::INFO_OFFSET..Self::INFO_OFFSET + SigInfo::SIZE]);
        self.uc
            .encode(&mut out[Self::UC_OFFSET..Self::UC_OFFSET + UContext::SIZE]);
        out
    }

    /// Decode the fields `rt_sigreturn` needs. The embedded siginfo is not
    /// re-read; the guest may have scribbled on it and nothing downstream
    /// trusts it.
    pub fn decode(raw: &[u8]) -> Self {
        debug_assert!(raw.len() >= Self::SIZE);
        let word = |at: usize| u32::from_le_bytes(raw[at..at + 4].try_into().unwrap());
        Self {
            pretcode: word(0),
            sig: word(4) as i32,
            pinfo: word(8),
            puc: word(12),
            info: SigInfo::default(),
            uc: UContext::decode(&raw[Self::UC_OFFSET..]),
        }
    }
}

/// Round `sp` down to a 512-byte boundary after reserving the FPU area.
pub fn align_fpstate(sp: GuestPtr) -> GuestPtr {
    (sp - FPSTATE_SIZE as u32) & !511
}

/// Reserve the frame below `sp` with the handler-entry alignment rule
/// `(sp + 4) % 16 == 0`.
pub fn align_frame(sp: GuestPtr) -> GuestPtr {
    ((sp - RtSigFrame::SIZE as u32 + 4) & !15) - 4
}
