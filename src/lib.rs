//! # burrow
//!
//! A native userspace debugger core for Linux/x86-64 ELF binaries.
//!
//! The crate couples four subsystems: process control over ptrace
//! ([`process`]), the stoppoint engine of software and hardware
//! breakpoints and watchpoints ([`breakpoint`], [`watchpoint`],
//! [`stoppoint`]), an ELF loader with a symbol index ([`elf`]), and a
//! lazy DWARF decoder and function index ([`dwarf`]). The [`target`]
//! facade ties a traced process to its debug information and is the
//! surface a front-end drives.
//!
//! All of it is single-threaded by design: the kernel requires every
//! ptrace call to come from the thread that attached.

pub mod addr;
pub mod breakpoint;
pub mod consts;
pub mod dwarf;
pub mod elf;
pub mod errors;
pub(crate) mod pipe;
pub mod process;
pub mod register_info;
pub mod registers;
pub mod stoppoint;
pub mod target;
pub mod watchpoint;

pub use errors::{DebuggerError, Result};
