//! # Process Controller
//!
//! Owns the tracee pid and drives the tracer/tracee protocol: launching or
//! attaching, resuming and single stepping, waiting for stops and
//! classifying them, syscall tracing, and memory I/O.
//!
//! The controller is a state machine over [`ProcessState`]: every
//! successful [`Process::resume`] or [`Process::step_instruction`] is
//! followed by exactly one [`Process::wait_on_signal`] before the next
//! resume. All ptrace calls must come from the thread that attached.
//!
//! Stepping over an active software breakpoint is handled transparently:
//! the site is disabled, the instruction single stepped, and the site put
//! back before the real resume request goes out.

use std::collections::HashMap;
use std::ffi::CString;
use std::os::fd::{AsRawFd, OwnedFd};
use std::path::Path;

use nix::libc;
use nix::sys::personality::{self, Persona};
use nix::sys::ptrace;
use nix::sys::signal::{kill, Signal};
use nix::sys::uio::{process_vm_readv, RemoteIoVec};
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{execvp, fork, setpgid, ForkResult, Pid};
use syscalls::Sysno;
use tracing::{debug, trace, warn};

use crate::addr::VirtAddr;
use crate::breakpoint::{BreakpointSite, BreakpointSiteId};
use crate::consts::{SI_KERNEL, TRAP_BRKPT, TRAP_HWBKPT, TRAP_TRACE};
use crate::errors::{kernel_error, DebuggerError, Result};
use crate::pipe::Pipe;
use crate::register_info::RegisterId;
use crate::registers::Registers;
use crate::stoppoint::{Stoppoint, StoppointCollection, StoppointMode};
use crate::watchpoint::{Watchpoint, WatchpointId};

/// Lifecycle state of the inferior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Stopped,
    Running,
    Exited,
    Terminated,
}

impl ProcessState {
    fn name(&self) -> &'static str {
        match self {
            ProcessState::Stopped => "stopped",
            ProcessState::Running => "running",
            ProcessState::Exited => "exited",
            ProcessState::Terminated => "terminated",
        }
    }
}

/// Why a SIGTRAP stop happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapType {
    SingleStep,
    SoftwareBreak,
    HardwareBreak,
    Syscall,
    Unknown,
}

/// Syscall boundary details for a syscall trap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallInfo {
    Entry { id: u64, args: [u64; 6] },
    Exit { id: u64, ret: u64 },
}

impl SyscallInfo {
    pub fn id(&self) -> u64 {
        match self {
            SyscallInfo::Entry { id, .. } | SyscallInfo::Exit { id, .. } => *id,
        }
    }

    pub fn is_entry(&self) -> bool {
        matches!(self, SyscallInfo::Entry { .. })
    }
}

/// Which syscalls stop the inferior when it is resumed with syscall
/// tracing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SyscallCatchPolicy {
    #[default]
    None,
    All,
    Some(Vec<Sysno>),
}

/// Everything known about one wait status.
#[derive(Debug, Clone, Copy)]
pub struct StopReason {
    pub state: ProcessState,
    /// Exit code for `Exited`, signal number otherwise.
    pub info: i32,
    pub trap: Option<TrapType>,
    pub syscall: Option<SyscallInfo>,
}

impl StopReason {
    fn from_wait_status(status: &WaitStatus) -> Self {
        let (state, info) = match status {
            WaitStatus::Exited(_, code) => (ProcessState::Exited, *code),
            WaitStatus::Signaled(_, signal, _) => (ProcessState::Terminated, *signal as i32),
            WaitStatus::Stopped(_, signal) => (ProcessState::Stopped, *signal as i32),
            WaitStatus::PtraceSyscall(_) => (ProcessState::Stopped, Signal::SIGTRAP as i32),
            WaitStatus::PtraceEvent(_, signal, _) => (ProcessState::Stopped, *signal as i32),
            WaitStatus::Continued(_) | WaitStatus::StillAlive => (ProcessState::Running, 0),
        };

        Self {
            state,
            info,
            trap: None,
            syscall: None,
        }
    }
}

/// The hardware stoppoint that fired, resolved from DR6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardwareStoppoint {
    Site(BreakpointSiteId),
    Watch(WatchpointId),
}

/// A traced process and the stoppoints installed into it.
#[derive(Debug)]
pub struct Process {
    pid: Pid,
    state: ProcessState,
    is_attached: bool,
    terminate_on_end: bool,
    registers: Registers,
    breakpoint_sites: StoppointCollection<BreakpointSite>,
    watchpoints: StoppointCollection<Watchpoint>,
    next_site_id: BreakpointSiteId,
    next_watchpoint_id: WatchpointId,
    syscall_catch_policy: SyscallCatchPolicy,
    expecting_syscall_exit: bool,
}

impl Process {
    fn new(pid: Pid, state: ProcessState, is_attached: bool, terminate_on_end: bool) -> Self {
        Self {
            pid,
            state,
            is_attached,
            terminate_on_end,
            registers: Registers::new(pid),
            breakpoint_sites: StoppointCollection::new(),
            watchpoints: StoppointCollection::new(),
            next_site_id: 1,
            next_watchpoint_id: 1,
            syscall_catch_policy: SyscallCatchPolicy::None,
            expecting_syscall_exit: false,
        }
    }

    /// Forks and execs `path` (searched in `PATH`), optionally under
    /// tracing and with stdout redirected to `stdout_replacement`.
    ///
    /// Failures of the child between fork and exec travel back over a
    /// close-on-exec pipe and surface as
    /// [`DebuggerError::LaunchFailed`]; no pid leaks in that case.
    pub fn launch(
        path: impl AsRef<Path>,
        args: &[String],
        debug: bool,
        stdout_replacement: Option<OwnedFd>,
    ) -> Result<Self> {
        let path = path.as_ref();
        let prog = CString::new(path.to_string_lossy().as_bytes())?;
        let mut argv = vec![prog.clone()];
        for arg in args {
            argv.push(CString::new(arg.as_str())?);
        }

        let mut channel = Pipe::new(true)?;

        match unsafe { fork() }.map_err(kernel_error("fork failed"))? {
            ForkResult::Child => {
                channel.close_read();
                Self::exec_child(&prog, &argv, debug, stdout_replacement, channel);
            }
            ForkResult::Parent { child } => {
                channel.close_write();
                let data = channel.read_all()?;
                if !data.is_empty() {
                    let _ = waitpid(child, None);
                    return Err(DebuggerError::LaunchFailed(
                        String::from_utf8_lossy(&data).to_string(),
                    ));
                }

                debug!("launched {} as pid {child}", path.display());
                let state = if debug {
                    ProcessState::Stopped
                } else {
                    ProcessState::Running
                };
                let mut proc = Self::new(child, state, debug, true);
                if debug {
                    proc.wait_on_signal()?;
                    set_ptrace_options(child)?;
                }
                Ok(proc)
            }
        }
    }

    /// Child half of [`Self::launch`]; never returns.
    fn exec_child(
        prog: &CString,
        argv: &[CString],
        debug: bool,
        stdout_replacement: Option<OwnedFd>,
        mut channel: Pipe,
    ) -> ! {
        if setpgid(Pid::from_raw(0), Pid::from_raw(0)).is_err() {
            exit_with_error(&mut channel, "Could not set pgid");
        }

        // the inferior keeps its link-time layout
        let _ = personality::set(Persona::ADDR_NO_RANDOMIZE);

        if let Some(fd) = stdout_replacement {
            if unsafe { libc::dup2(fd.as_raw_fd(), libc::STDOUT_FILENO) } < 0 {
                exit_with_error(&mut channel, "stdout replacement failed");
            }
        }

        if debug && ptrace::traceme().is_err() {
            exit_with_error(&mut channel, "Tracing failed");
        }

        let _ = execvp(prog, argv);
        exit_with_error(&mut channel, "exec failed");
    }

    /// Attaches to a running process and waits for the attach stop.
    pub fn attach(pid: Pid) -> Result<Self> {
        if pid.as_raw() == 0 {
            return Err(DebuggerError::AttachFailed(pid, nix::errno::Errno::ESRCH));
        }
        ptrace::attach(pid).map_err(|errno| DebuggerError::AttachFailed(pid, errno))?;

        let mut proc = Self::new(pid, ProcessState::Stopped, true, false);
        proc.wait_on_signal()?;
        set_ptrace_options(pid)?;

        debug!("attached to pid {pid}");
        Ok(proc)
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    pub fn is_attached(&self) -> bool {
        self.is_attached
    }

    pub fn registers(&self) -> &Registers {
        &self.registers
    }

    pub fn registers_mut(&mut self) -> &mut Registers {
        &mut self.registers
    }

    pub fn pc(&self) -> VirtAddr {
        self.registers.pc()
    }

    pub fn set_pc(&mut self, pc: VirtAddr) -> Result<()> {
        self.registers.set_pc(pc)
    }

    pub fn set_syscall_catch_policy(&mut self, policy: SyscallCatchPolicy) {
        self.syscall_catch_policy = policy;
    }

    /// Resumes the inferior.
    ///
    /// If an enabled software breakpoint sits at the current pc, the site
    /// is stepped over first so the original instruction executes. The
    /// final request is `PTRACE_CONT`, or `PTRACE_SYSCALL` when a syscall
    /// catch policy is active.
    pub fn resume(&mut self) -> Result<()> {
        let pc = self.registers.pc();
        if self.breakpoint_sites.enabled_stoppoint_at_address(pc) {
            trace!("stepping over breakpoint site at {pc}");
            self.breakpoint_sites
                .get_by_address_mut(pc)?
                .disable(&mut self.registers)?;
            ptrace::step(self.pid, None).map_err(kernel_error("Failed to single step"))?;
            waitpid(self.pid, None).map_err(kernel_error("waitpid failed"))?;
            self.breakpoint_sites
                .get_by_address_mut(pc)?
                .enable(&mut self.registers)?;
        }

        if self.syscall_catch_policy == SyscallCatchPolicy::None {
            ptrace::cont(self.pid, None).map_err(kernel_error("Could not resume"))?;
        } else {
            ptrace::syscall(self.pid, None).map_err(kernel_error("Could not resume"))?;
        }

        self.state = ProcessState::Running;
        Ok(())
    }

    /// Executes one instruction and reports the resulting stop.
    ///
    /// An enabled software breakpoint at pc is lifted for the duration of
    /// the step and reinstalled afterwards.
    pub fn step_instruction(&mut self) -> Result<StopReason> {
        let mut to_reenable = None;
        let pc = self.registers.pc();
        if self.breakpoint_sites.enabled_stoppoint_at_address(pc) {
            self.breakpoint_sites
                .get_by_address_mut(pc)?
                .disable(&mut self.registers)?;
            to_reenable = Some(pc);
        }

        ptrace::step(self.pid, None).map_err(kernel_error("Could not single step"))?;
        let reason = self.wait_on_signal()?;

        if let Some(addr) = to_reenable {
            self.breakpoint_sites
                .get_by_address_mut(addr)?
                .enable(&mut self.registers)?;
        }

        Ok(reason)
    }

    /// Blocks until the inferior changes state and classifies the result.
    ///
    /// On a stop of an attached inferior the register mirror is refreshed
    /// and the trap reason worked out from the signal info, DR6 and the
    /// syscall flip-flop. Syscall stops filtered out by the catch policy
    /// are resumed silently and waited on again, iteratively.
    pub fn wait_on_signal(&mut self) -> Result<StopReason> {
        loop {
            let status = waitpid(self.pid, None).map_err(kernel_error("waitpid failed"))?;
            let mut reason = StopReason::from_wait_status(&status);
            self.state = reason.state;
            trace!("wait: {status:?} -> {:?}", reason.state);

            if !self.is_attached || self.state != ProcessState::Stopped {
                return Ok(reason);
            }

            self.registers.read_all()?;
            self.augment_stop_reason(&mut reason, &status)?;

            match reason.trap {
                Some(TrapType::SoftwareBreak) => {
                    let instr_begin = self.registers.pc() - 1;
                    if self
                        .breakpoint_sites
                        .enabled_stoppoint_at_address(instr_begin)
                    {
                        self.registers.set_pc(instr_begin)?;
                    }
                }
                Some(TrapType::HardwareBreak) => {
                    if let HardwareStoppoint::Watch(id) = self.current_hardware_stoppoint()? {
                        self.watchpoints.get_by_id_mut(id)?.update_data()?;
                    }
                }
                Some(TrapType::Syscall) => {
                    if self.should_filter_syscall(&reason) {
                        self.resume()?;
                        continue;
                    }
                }
                _ => {}
            }

            return Ok(reason);
        }
    }

    /// Fills trap and syscall details into a stop reason.
    fn augment_stop_reason(&mut self, reason: &mut StopReason, status: &WaitStatus) -> Result<()> {
        if matches!(status, WaitStatus::PtraceSyscall(_)) {
            let id: u64 = self.registers.read_by_id_as(RegisterId::OrigRax)?;

            let info = if self.expecting_syscall_exit {
                self.expecting_syscall_exit = false;
                SyscallInfo::Exit {
                    id,
                    ret: self.registers.read_by_id_as(RegisterId::Rax)?,
                }
            } else {
                self.expecting_syscall_exit = true;
                const ARG_REGISTERS: [RegisterId; 6] = [
                    RegisterId::Rdi,
                    RegisterId::Rsi,
                    RegisterId::Rdx,
                    RegisterId::R10,
                    RegisterId::R8,
                    RegisterId::R9,
                ];
                let mut args = [0u64; 6];
                for (slot, reg) in args.iter_mut().zip(ARG_REGISTERS) {
                    *slot = self.registers.read_by_id_as(reg)?;
                }
                SyscallInfo::Entry { id, args }
            };

            reason.trap = Some(TrapType::Syscall);
            reason.syscall = Some(info);
            return Ok(());
        }

        self.expecting_syscall_exit = false;

        if reason.info != Signal::SIGTRAP as i32 {
            return Ok(());
        }

        let siginfo = ptrace::getsiginfo(self.pid)
            .map_err(kernel_error("Failed to get signal info"))?;
        reason.trap = Some(match siginfo.si_code {
            TRAP_TRACE => TrapType::SingleStep,
            SI_KERNEL | TRAP_BRKPT => TrapType::SoftwareBreak,
            TRAP_HWBKPT => TrapType::HardwareBreak,
            code => {
                warn!("unexpected SIGTRAP si_code {code}");
                TrapType::Unknown
            }
        });

        Ok(())
    }

    fn should_filter_syscall(&self, reason: &StopReason) -> bool {
        match (&self.syscall_catch_policy, &reason.syscall) {
            (SyscallCatchPolicy::Some(to_catch), Some(info)) => {
                !to_catch.contains(&Sysno::from(info.id() as i32))
            }
            _ => false,
        }
    }

    /// Resolves the DR6 status bits to the stoppoint that fired.
    pub fn current_hardware_stoppoint(&self) -> Result<HardwareStoppoint> {
        let slot = self.registers.triggered_hardware_slot()?;
        let addr = self.registers.hardware_stoppoint_address(slot)?;

        if self.breakpoint_sites.contains_address(addr) {
            Ok(HardwareStoppoint::Site(
                self.breakpoint_sites.get_by_address(addr)?.id(),
            ))
        } else {
            Ok(HardwareStoppoint::Watch(
                self.watchpoints.get_by_address(addr)?.id(),
            ))
        }
    }

    /// Stops a running inferior with SIGSTOP and waits for the stop.
    pub fn stop(&mut self) -> Result<StopReason> {
        if self.state != ProcessState::Running {
            return Err(DebuggerError::WrongProcessState(self.state.name()));
        }
        kill(self.pid, Signal::SIGSTOP).map_err(kernel_error("Failed to stop process"))?;
        self.wait_on_signal()
    }

    // ---------------- stoppoints --------------------------------------------------------------

    /// Creates a breakpoint site at `address`. The site starts out
    /// disabled; at most one site may exist per address.
    pub fn create_breakpoint_site(
        &mut self,
        address: VirtAddr,
        hardware: bool,
        internal: bool,
    ) -> Result<&mut BreakpointSite> {
        if self.breakpoint_sites.contains_address(address) {
            return Err(DebuggerError::DuplicateAddress(address));
        }

        let id = self.next_site_id;
        self.next_site_id += 1;
        Ok(self
            .breakpoint_sites
            .push(BreakpointSite::new(id, self.pid, address, hardware, internal)))
    }

    pub fn enable_breakpoint_site(&mut self, id: BreakpointSiteId) -> Result<()> {
        self.breakpoint_sites
            .get_by_id_mut(id)?
            .enable(&mut self.registers)
    }

    pub fn disable_breakpoint_site(&mut self, id: BreakpointSiteId) -> Result<()> {
        self.breakpoint_sites
            .get_by_id_mut(id)?
            .disable(&mut self.registers)
    }

    /// Disables and drops the site with the given id.
    pub fn remove_breakpoint_site(&mut self, id: BreakpointSiteId) -> Result<()> {
        self.disable_breakpoint_site(id)?;
        self.breakpoint_sites.remove_by_id(id)?;
        Ok(())
    }

    pub fn breakpoint_sites(&self) -> &StoppointCollection<BreakpointSite> {
        &self.breakpoint_sites
    }

    /// Creates a watchpoint over `size` bytes at `address`. The watchpoint
    /// starts out disabled; at most one may exist per address.
    pub fn create_watchpoint(
        &mut self,
        address: VirtAddr,
        mode: StoppointMode,
        size: usize,
    ) -> Result<&mut Watchpoint> {
        if self.watchpoints.contains_address(address) {
            return Err(DebuggerError::DuplicateAddress(address));
        }

        let id = self.next_watchpoint_id;
        self.next_watchpoint_id += 1;
        let point = Watchpoint::new(id, self.pid, address, mode, size)?;
        Ok(self.watchpoints.push(point))
    }

    pub fn enable_watchpoint(&mut self, id: WatchpointId) -> Result<()> {
        let point = self.watchpoints.get_by_id_mut(id)?;
        point.enable(&mut self.registers)?;
        // seed the previous value so the first hit reports a real delta
        point.update_data()
    }

    pub fn disable_watchpoint(&mut self, id: WatchpointId) -> Result<()> {
        self.watchpoints
            .get_by_id_mut(id)?
            .disable(&mut self.registers)
    }

    /// Disables and drops the watchpoint with the given id.
    pub fn remove_watchpoint(&mut self, id: WatchpointId) -> Result<()> {
        self.disable_watchpoint(id)?;
        self.watchpoints.remove_by_id(id)?;
        Ok(())
    }

    pub fn watchpoints(&self) -> &StoppointCollection<Watchpoint> {
        &self.watchpoints
    }

    // ---------------- memory ------------------------------------------------------------------

    /// Reads `amount` bytes of inferior memory starting at `address`.
    pub fn read_memory(&self, address: VirtAddr, amount: usize) -> Result<Vec<u8>> {
        read_process_memory(self.pid, address, amount)
    }

    /// Like [`Self::read_memory`], but with every enabled software
    /// breakpoint patch replaced by the instruction byte it saved.
    pub fn read_memory_without_traps(&self, address: VirtAddr, amount: usize) -> Result<Vec<u8>> {
        let mut memory = self.read_memory(address, amount)?;
        let end = address + amount as u64;

        for site in self.breakpoint_sites.get_in_region(address, end) {
            if !site.is_enabled() || site.is_hardware() {
                continue;
            }
            let offset = (site.address() - address) as usize;
            memory[offset] = site.saved_data().expect("enabled software site");
        }

        Ok(memory)
    }

    /// Writes `data` into inferior memory in eight byte words, preserving
    /// the bytes around a partial tail word.
    pub fn write_memory(&mut self, address: VirtAddr, data: &[u8]) -> Result<()> {
        let mut written = 0;
        while written < data.len() {
            let remaining = &data[written..];
            let mut word = [0u8; 8];
            if remaining.len() >= 8 {
                word.copy_from_slice(&remaining[..8]);
            } else {
                let existing = self.read_memory(address + written as u64, 8)?;
                let have = existing.len().min(8);
                word[..have].copy_from_slice(&existing[..have]);
                word[..remaining.len()].copy_from_slice(remaining);
            }

            ptrace::write(
                self.pid,
                (address + written as u64).as_ptr(),
                i64::from_le_bytes(word),
            )
            .map_err(kernel_error("Failed to write memory"))?;
            written += 8;
        }

        Ok(())
    }

    /// Parses `/proc/<pid>/auxv` into an id to value map.
    pub fn get_auxv(&self) -> Result<HashMap<u64, u64>> {
        let raw = std::fs::read(format!("/proc/{}/auxv", self.pid))?;
        let mut auxv = HashMap::new();

        for pair in raw.chunks_exact(16) {
            let id = u64::from_le_bytes(pair[..8].try_into().expect("chunked"));
            let value = u64::from_le_bytes(pair[8..].try_into().expect("chunked"));
            if id == libc::AT_NULL {
                break;
            }
            auxv.insert(id, value);
        }

        Ok(auxv)
    }
}

impl Drop for Process {
    fn drop(&mut self) {
        if self.pid.as_raw() == 0 {
            return;
        }

        if self.is_attached {
            if self.state == ProcessState::Running {
                let _ = kill(self.pid, Signal::SIGSTOP);
                let _ = waitpid(self.pid, None);
            }
            let _ = ptrace::detach(self.pid, None);
            let _ = kill(self.pid, Signal::SIGCONT);
        }

        if self.terminate_on_end {
            let _ = kill(self.pid, Signal::SIGKILL);
            let _ = waitpid(self.pid, None);
        }
    }
}

/// Reports a pre-exec failure over the error channel and exits the forked
/// child without running any atexit handlers.
fn exit_with_error(channel: &mut Pipe, prefix: &str) -> ! {
    let message = format!("{prefix}: {}", nix::errno::Errno::last());
    let _ = channel.write_all(message.as_bytes());
    unsafe { libc::_exit(1) }
}

fn set_ptrace_options(pid: Pid) -> Result<()> {
    ptrace::setoptions(pid, ptrace::Options::PTRACE_O_TRACESYSGOOD)
        .map_err(kernel_error("Failed to set TRACESYSGOOD option"))
}

/// Checks whether a process with the given pid exists.
pub fn process_exists(pid: Pid) -> bool {
    !matches!(kill(pid, None), Err(nix::errno::Errno::ESRCH))
}

/// Cross-process read via `process_vm_readv`, split on page boundaries.
pub(crate) fn read_process_memory(pid: Pid, address: VirtAddr, amount: usize) -> Result<Vec<u8>> {
    let mut remote = Vec::new();
    let mut chunk_start = address;
    let mut left = amount;
    while left > 0 {
        let up_to_next_page = (chunk_start.next_page_boundary() - chunk_start) as usize;
        let chunk = left.min(up_to_next_page);
        remote.push(RemoteIoVec {
            base: chunk_start.addr() as usize,
            len: chunk,
        });
        chunk_start += chunk as u64;
        left -= chunk;
    }

    let mut buf = vec![0u8; amount];
    let read = process_vm_readv(pid, &mut [std::io::IoSliceMut::new(&mut buf)], &remote)
        .map_err(kernel_error("Could not read process memory"))?;
    buf.truncate(read);
    Ok(buf)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_stop_reason_from_wait_status() {
        let pid = Pid::from_raw(42);

        let exited = StopReason::from_wait_status(&WaitStatus::Exited(pid, 3));
        assert_eq!(exited.state, ProcessState::Exited);
        assert_eq!(exited.info, 3);

        let signaled =
            StopReason::from_wait_status(&WaitStatus::Signaled(pid, Signal::SIGKILL, false));
        assert_eq!(signaled.state, ProcessState::Terminated);
        assert_eq!(signaled.info, Signal::SIGKILL as i32);

        let stopped = StopReason::from_wait_status(&WaitStatus::Stopped(pid, Signal::SIGTRAP));
        assert_eq!(stopped.state, ProcessState::Stopped);
        assert!(stopped.trap.is_none(), "trap is filled in later");

        let syscall = StopReason::from_wait_status(&WaitStatus::PtraceSyscall(pid));
        assert_eq!(syscall.state, ProcessState::Stopped);
        assert_eq!(syscall.info, Signal::SIGTRAP as i32);
    }

    #[test]
    fn test_syscall_info_accessors() {
        let entry = SyscallInfo::Entry {
            id: 1,
            args: [9, 8, 7, 6, 5, 4],
        };
        assert!(entry.is_entry());
        assert_eq!(entry.id(), 1);

        let exit = SyscallInfo::Exit { id: 1, ret: 0 };
        assert!(!exit.is_entry());
        assert_eq!(exit.id(), 1);
    }
}
