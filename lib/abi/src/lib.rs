//! Guest-facing ABI surface for the Linux (IA-32) personality.
//!
//! Everything in this crate is *wire truth*: numeric constants, bit layouts
//! and record encodings the emulated program observes. Host-side behaviour
//! lives elsewhere; translation between these types and internal VFS/signal
//! types happens in `linden-syscalls`.

pub mod dirent;
pub mod errno;
pub mod fcntl;
pub mod frame;
pub mod poll;
pub mod signal;
pub mod stat;
pub mod time;

pub use dirent::{DirentKind, LINUX_DIRENT64_HEADER, LINUX_DIRENT_HEADER};
pub use errno::Errno;
pub use fcntl::{FcntlCmd, OpenFlags, AT_FDCWD, FD_CLOEXEC};
pub use frame::{CpuContext, RtSigFrame, SigContext, UContext, FPSTATE_SIZE};
pub use poll::PollEvents;
pub use signal::{SigAction, SigInfo, SigSet, NSIG};
pub use stat::{NewStat, StatFs};

/// Guest virtual address. The emulated personality is IA-32.
pub type GuestPtr = u32;

/// Upper bound on a guest path, including the terminating NUL.
pub const PATH_MAX: usize = 4096;

/// Size of the file-descriptor table.
pub const MAX_FD_COUNT: usize = 1024;

/// Symlink expansions allowed while resolving a single path.
pub const MAX_SYMLINK_LEVEL: usize = 8;

/// Default file-mode creation mask (`S_IWGRP | S_IWOTH`).
pub const DEFAULT_UMASK: u32 = 0o022;
