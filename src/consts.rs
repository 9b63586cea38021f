//! `si_code` values a SIGTRAP can carry. They are deeply nested into the
//! libc headers and not available from nix or the rust bindings of the
//! libc.
//!
//! Source: <https://elixir.bootlin.com/linux/v6.13.1/source/include/uapi/asm-generic/siginfo.h#L227>

#![allow(unused)]

/// Sent by the kernel, used for int3 traps
pub const SI_KERNEL: i32 = 0x80;

// ---------------- SIGTRAP si_codes ---------------------------------------------------------------

/// Process breakpoint
pub const TRAP_BRKPT: i32 = 0x1;
/// Process trace trap (single stepping)
pub const TRAP_TRACE: i32 = 0x2;
/// Process taken branch trap
pub const TRAP_BRANCH: i32 = 0x3;
/// Hardware breakpoint/watchpoint
pub const TRAP_HWBKPT: i32 = 0x4;
/// Undiagnosed trap
pub const TRAP_UNK: i32 = 0x5;

/// Bit or'ed into the stop signal when a syscall stop is reported with
/// `PTRACE_O_TRACESYSGOOD` set
pub const SYSGOOD_BIT: i32 = 0x80;
