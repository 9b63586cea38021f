//! # Error Types
//!
//! Defines error types and a result alias used throughout the [crate].
//!
//! Every kernel interaction that can fail carries the underlying errno
//! together with a human readable prefix ([`DebuggerError::Kernel`]); the
//! remaining variants cover the debugger specific failure modes, from
//! stoppoint bookkeeping to debug information parsing.

use nix::errno::Errno;
use nix::unistd::Pid;
use thiserror::Error;

use crate::addr::VirtAddr;

/// Type alias for Results returned by burrow functions
pub type Result<T> = std::result::Result<T, DebuggerError>;

/// Comprehensive error type for the burrow debugger core
///
/// [`DebuggerError`] encapsulates all potential errors that can occur while
/// controlling an inferior or while reading its ELF and DWARF debug
/// information.
#[derive(Error, Debug)]
pub enum DebuggerError {
    #[error("Os error: {0}")]
    Os(#[from] Errno),
    #[error("Io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{context}: {errno}")]
    Kernel {
        context: &'static str,
        #[source]
        errno: Errno,
    },
    #[error("Could not launch inferior: {0}")]
    LaunchFailed(String),
    #[error("Could not attach to process {0}: {1}")]
    AttachFailed(Pid, #[source] Errno),
    #[error("Could not convert to CString: {0}")]
    CStringConv(#[from] std::ffi::NulError),
    #[error("No stoppoint with the given id or address")]
    StoppointNotFound,
    #[error("A stoppoint already exists at {0}")]
    DuplicateAddress(VirtAddr),
    #[error("All four hardware debug registers are in use")]
    NoHardwareSlot,
    #[error("Invalid stoppoint size: {0} (must be 1, 2, 4 or 8)")]
    InvalidStoppointSize(usize),
    #[error("Watchpoint address {0} is not aligned to its size")]
    UnalignedStoppoint(VirtAddr),
    #[error("Watchpoints cannot use execute mode, use a hardware breakpoint")]
    ExecuteModeWatchpoint,
    #[error("Register {register} holds {expected} bytes of {format}, not {requested} bytes")]
    RegisterTypeMismatch {
        register: &'static str,
        format: &'static str,
        expected: usize,
        requested: usize,
    },
    #[error("The object has no load bias yet, the inferior is not loaded")]
    NotLoaded,
    #[error("Address is not backed by a loadable section")]
    NotInLoadableSection,
    #[error("Not a supported ELF image: {0}")]
    UnsupportedElf(&'static str),
    #[error("The inferior's auxiliary vector carries no AT_ENTRY")]
    NoAuxvEntry,
    #[error("Error while reading information from the executable file: {0}")]
    Object(#[from] object::Error),
    #[error("Error while working with the DWARF debug information: {0}")]
    Dwarf(#[from] gimli::Error),
    #[error("Malformed DWARF data: {0}")]
    DwarfMalformed(String),
    #[error("The process is in state {0}, which does not allow this operation")]
    WrongProcessState(&'static str),
}

/// Wraps a failed kernel call with a human readable prefix.
///
/// Used with `map_err` around `ptrace`, `waitpid` and friends:
///
/// ```
/// use burrow::errors::kernel_error;
/// let res: nix::Result<()> = Err(nix::errno::Errno::EPERM);
/// let err = res.map_err(kernel_error("Could not resume")).unwrap_err();
/// assert_eq!(err.to_string(), "Could not resume: EPERM: Operation not permitted");
/// ```
pub fn kernel_error(context: &'static str) -> impl FnOnce(Errno) -> DebuggerError {
    move |errno| DebuggerError::Kernel { context, errno }
}
