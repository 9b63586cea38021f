//! # Target Facade
//!
//! Binds a traced [`Process`] to the [`Elf`] (and DWARF) of its main
//! object. The facade owns the logical breakpoints and is the place where
//! their locations are resolved against the debug information, since it is
//! the only component that sees both sides.
//!
//! The load bias of the inferior is discovered here after launch or
//! attach, by subtracting the ELF header's entry point from the `AT_ENTRY`
//! value in `/proc/<pid>/auxv`.

use std::os::fd::OwnedFd;
use std::path::{Path, PathBuf};

use nix::libc;
use nix::unistd::Pid;
use tracing::{debug, warn};

use crate::addr::VirtAddr;
use crate::breakpoint::{Breakpoint, BreakpointId, BreakpointKind};
use crate::dwarf::{FunctionInfo, LineEntry};
use crate::elf::Elf;
use crate::errors::{DebuggerError, Result};
use crate::process::Process;
use crate::stoppoint::Stoppoint;

/// A debugging session over one inferior and its main ELF object.
#[derive(Debug)]
pub struct Target {
    process: Process,
    elf: Elf,
    breakpoints: Vec<Breakpoint>,
    next_breakpoint_id: BreakpointId,
}

impl Target {
    /// Launches `path` under tracing and binds it to its parsed image.
    pub fn launch(
        path: impl AsRef<Path>,
        args: &[String],
        stdout_replacement: Option<OwnedFd>,
    ) -> Result<Self> {
        let process = Process::launch(path, args, true, stdout_replacement)?;
        Self::bind(process)
    }

    /// Attaches to `pid` and binds it to its parsed image.
    pub fn attach(pid: Pid) -> Result<Self> {
        let process = Process::attach(pid)?;
        Self::bind(process)
    }

    fn bind(process: Process) -> Result<Self> {
        // after the exec stop this names the inferior's binary, whatever
        // path the caller used to find it
        let exe = format!("/proc/{}/exe", process.pid());
        let exe = std::fs::canonicalize(&exe).unwrap_or_else(|_| PathBuf::from(exe));
        let mut elf = Elf::open(exe)?;

        let bias = discover_load_bias(&process, &elf)?;
        elf.notify_loaded(bias);

        Ok(Self {
            process,
            elf,
            breakpoints: Vec::new(),
            next_breakpoint_id: 1,
        })
    }

    pub fn process(&self) -> &Process {
        &self.process
    }

    pub fn process_mut(&mut self) -> &mut Process {
        &mut self.process
    }

    pub fn elf(&self) -> &Elf {
        &self.elf
    }

    // ---------------- logical breakpoints -----------------------------------------------------

    /// Creates a breakpoint on every location of the named function.
    pub fn create_function_breakpoint(
        &mut self,
        name: impl Into<String>,
        hardware: bool,
        internal: bool,
    ) -> Result<BreakpointId> {
        self.create_breakpoint(BreakpointKind::Function(name.into()), hardware, internal)
    }

    /// Creates a breakpoint on the first statement of `file:line`.
    pub fn create_line_breakpoint(
        &mut self,
        file: impl Into<PathBuf>,
        line: u64,
        hardware: bool,
        internal: bool,
    ) -> Result<BreakpointId> {
        self.create_breakpoint(
            BreakpointKind::Line {
                file: file.into(),
                line,
            },
            hardware,
            internal,
        )
    }

    /// Creates a breakpoint at a raw virtual address.
    pub fn create_address_breakpoint(
        &mut self,
        address: VirtAddr,
        hardware: bool,
        internal: bool,
    ) -> Result<BreakpointId> {
        self.create_breakpoint(BreakpointKind::Address(address), hardware, internal)
    }

    fn create_breakpoint(
        &mut self,
        kind: BreakpointKind,
        hardware: bool,
        internal: bool,
    ) -> Result<BreakpointId> {
        let id = self.next_breakpoint_id;
        self.next_breakpoint_id += 1;

        debug!("breakpoint {id} on {kind}");
        self.breakpoints
            .push(Breakpoint::new(id, kind, hardware, internal));
        self.resolve_breakpoint(self.breakpoints.len() - 1)?;
        Ok(id)
    }

    pub fn breakpoints(&self) -> &[Breakpoint] {
        &self.breakpoints
    }

    pub fn get_breakpoint(&self, id: BreakpointId) -> Result<&Breakpoint> {
        self.breakpoints
            .iter()
            .find(|bp| bp.id() == id)
            .ok_or(DebuggerError::StoppointNotFound)
    }

    /// Enables a breakpoint and with it every site it resolved to.
    pub fn enable_breakpoint(&mut self, id: BreakpointId) -> Result<()> {
        let idx = self.breakpoint_index(id)?;
        self.breakpoints[idx].enable(&mut self.process)
    }

    /// Disables a breakpoint and every site it resolved to.
    pub fn disable_breakpoint(&mut self, id: BreakpointId) -> Result<()> {
        let idx = self.breakpoint_index(id)?;
        self.breakpoints[idx].disable(&mut self.process)
    }

    /// Disables and removes a breakpoint together with its sites.
    pub fn remove_breakpoint(&mut self, id: BreakpointId) -> Result<()> {
        let idx = self.breakpoint_index(id)?;
        let bp = self.breakpoints.remove(idx);
        for site_id in bp.site_ids() {
            self.process.remove_breakpoint_site(*site_id)?;
        }
        Ok(())
    }

    /// The breakpoint owning a site at `addr`, if any. Used to enrich stop
    /// reports.
    pub fn breakpoint_at_address(&self, addr: VirtAddr) -> Option<&Breakpoint> {
        self.breakpoints
            .iter()
            .find(|bp| bp.at_address(&self.process, addr))
    }

    /// Re-resolves every breakpoint against the current debug information.
    ///
    /// Called after anything that may move or add code, such as a shared
    /// library load.
    pub fn resolve_breakpoints(&mut self) -> Result<()> {
        for idx in 0..self.breakpoints.len() {
            self.resolve_breakpoint(idx)?;
        }
        Ok(())
    }

    /// Brings the site list of one breakpoint in line with where its
    /// location currently resolves to: stale sites go, missing sites are
    /// created (and enabled if the breakpoint is).
    fn resolve_breakpoint(&mut self, idx: usize) -> Result<()> {
        let desired = self.resolve_addresses(self.breakpoints[idx].kind())?;

        let stale: Vec<_> = self.breakpoints[idx]
            .site_ids()
            .iter()
            .copied()
            .filter(|site_id| {
                self.process
                    .breakpoint_sites()
                    .get_by_id(*site_id)
                    .map(|site| !desired.contains(&site.address()))
                    .unwrap_or(true)
            })
            .collect();
        for site_id in stale {
            self.process.remove_breakpoint_site(site_id)?;
            self.breakpoints[idx].release_site(site_id);
        }

        for address in desired {
            if self.breakpoints[idx].at_address(&self.process, address) {
                continue;
            }
            if self.process.breakpoint_sites().contains_address(address) {
                warn!("a site at {address} already exists, not claiming it");
                continue;
            }

            let site_id = self
                .process
                .create_breakpoint_site(address, self.breakpoints[idx].is_hardware(), self.breakpoints[idx].is_internal())?
                .id();
            self.breakpoints[idx].claim_site(site_id);
            if self.breakpoints[idx].is_enabled() {
                self.process.enable_breakpoint_site(site_id)?;
            }
        }

        Ok(())
    }

    /// The virtual addresses a breakpoint kind currently stands for.
    fn resolve_addresses(&self, kind: &BreakpointKind) -> Result<Vec<VirtAddr>> {
        let mut addrs = Vec::new();

        match kind {
            BreakpointKind::Function(name) => {
                for func in self.elf.dwarf().find_functions(name)? {
                    let Some(low_pc) = func.low_pc else { continue };
                    if let Ok(virt) = low_pc.to_virt_addr(&self.elf) {
                        addrs.push(virt);
                    }
                }
                for sym in self.elf.get_symbols_by_name(name) {
                    if !sym.is_function {
                        continue;
                    }
                    if let Ok(virt) = sym.file_addr().to_virt_addr(&self.elf) {
                        addrs.push(virt);
                    }
                }
            }
            BreakpointKind::Line { file, line } => {
                if let Some(file_addr) = self.elf.dwarf().first_line_address(file, *line)? {
                    if let Ok(virt) = file_addr.to_virt_addr(&self.elf) {
                        addrs.push(virt);
                    }
                }
            }
            BreakpointKind::Address(address) => addrs.push(*address),
        }

        // several sources may name the same location
        let mut deduped = Vec::new();
        for addr in addrs {
            if !deduped.contains(&addr) {
                deduped.push(addr);
            }
        }
        Ok(deduped)
    }

    fn breakpoint_index(&self, id: BreakpointId) -> Result<usize> {
        self.breakpoints
            .iter()
            .position(|bp| bp.id() == id)
            .ok_or(DebuggerError::StoppointNotFound)
    }

    // ---------------- source level queries ----------------------------------------------------

    /// The function containing `addr`, from DWARF with the ELF symbol
    /// table as fallback.
    pub fn function_at(&self, addr: VirtAddr) -> Result<Option<FunctionInfo>> {
        let Ok(file) = addr.to_file_addr(&self.elf) else {
            return Ok(None);
        };

        if let Some(func) = self.elf.dwarf().function_containing_address(file)? {
            return Ok(Some(func));
        }

        Ok(self
            .elf
            .get_symbol_containing_address(file)
            .filter(|sym| sym.is_function)
            .map(|sym| FunctionInfo {
                name: Some(sym.demangled_name.clone()),
                low_pc: Some(sym.file_addr()),
                high_pc: Some(sym.file_addr() + sym.size),
            }))
    }

    /// The source location of `addr`, if its unit has line information.
    pub fn line_at(&self, addr: VirtAddr) -> Result<Option<LineEntry>> {
        let Ok(file) = addr.to_file_addr(&self.elf) else {
            return Ok(None);
        };
        self.elf.dwarf().line_entry_at(file)
    }

    /// The virtual address of the first statement of `file:line`.
    pub fn virt_for(&self, file: &Path, line: u64) -> Result<Option<VirtAddr>> {
        let Some(file_addr) = self.elf.dwarf().first_line_address(file, line)? else {
            return Ok(None);
        };
        Ok(file_addr.to_virt_addr(&self.elf).ok())
    }
}

/// `AT_ENTRY` minus the header's entry point is where the image begins.
fn discover_load_bias(process: &Process, elf: &Elf) -> Result<VirtAddr> {
    let auxv = process.get_auxv()?;
    let entry = auxv
        .get(&libc::AT_ENTRY)
        .copied()
        .ok_or(DebuggerError::NoAuxvEntry)?;
    Ok(VirtAddr::new(entry - elf.entry_point().addr()))
}
