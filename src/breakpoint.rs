//! # Breakpoints
//!
//! Two layers live here. A [`BreakpointSite`] is one physical stoppoint at
//! one address, installed either by patching an `int3` into the inferior's
//! text or by claiming one of the four x86 debug registers. A
//! [`Breakpoint`] is the logical thing a user asks for (a function name, a
//! source line or a raw address) and owns the ids of however many sites
//! its resolution produced.
//!
//! Sites are owned by the process; resolution lives on the target, which is
//! the one place that sees the ELF and DWARF data needed for it.

use nix::sys::ptrace;
use nix::unistd::Pid;
use std::path::PathBuf;
use tracing::trace;

use crate::addr::VirtAddr;
use crate::errors::{kernel_error, Result};
use crate::process::Process;
use crate::registers::Registers;
use crate::stoppoint::{Stoppoint, StoppointMode};

pub const INT3: i64 = 0xcc;
pub const INT3_BYTE: u8 = 0xcc;
pub const WORD_MASK: i64 = 0xff;
pub const WORD_MASK_INV: i64 = !WORD_MASK;

pub type BreakpointSiteId = i32;
pub type BreakpointId = i32;

/// A single physical stoppoint at one address of one process.
#[derive(Debug)]
pub struct BreakpointSite {
    id: BreakpointSiteId,
    pid: Pid,
    address: VirtAddr,
    is_enabled: bool,
    saved_data: Option<u8>,
    is_hardware: bool,
    is_internal: bool,
    hardware_slot: Option<usize>,
}

impl BreakpointSite {
    pub(crate) fn new(
        id: BreakpointSiteId,
        pid: Pid,
        address: VirtAddr,
        is_hardware: bool,
        is_internal: bool,
    ) -> Self {
        Self {
            id,
            pid,
            address,
            is_enabled: false,
            saved_data: None,
            is_hardware,
            is_internal,
            hardware_slot: None,
        }
    }

    /// Installs the stoppoint. Enabling an enabled site is a no-op.
    ///
    /// Software sites save the instruction byte they overwrite; hardware
    /// sites claim a debug register slot in execute mode.
    pub fn enable(&mut self, regs: &mut Registers) -> Result<()> {
        if self.is_enabled {
            return Ok(());
        }

        if self.is_hardware {
            self.hardware_slot =
                Some(regs.set_hardware_stoppoint(self.address, StoppointMode::Execute, 1)?);
        } else {
            let word = ptrace::read(self.pid, self.address.as_ptr())
                .map_err(kernel_error("Could not read memory at breakpoint site"))?;
            self.saved_data = Some((word & WORD_MASK) as u8);
            let patched = (word & WORD_MASK_INV) | INT3;
            ptrace::write(self.pid, self.address.as_ptr(), patched)
                .map_err(kernel_error("Could not write int3 at breakpoint site"))?;
        }

        trace!("enabled site {} at {}", self.id, self.address);
        self.is_enabled = true;
        Ok(())
    }

    /// Uninstalls the stoppoint, restoring the saved byte or releasing the
    /// debug register slot. Disabling a disabled site is a no-op.
    pub fn disable(&mut self, regs: &mut Registers) -> Result<()> {
        if !self.is_enabled {
            return Ok(());
        }

        if let Some(slot) = self.hardware_slot.take() {
            regs.clear_hardware_stoppoint(slot)?;
        } else {
            let saved = self.saved_data.take().expect("enabled software site") as i64;
            let word = ptrace::read(self.pid, self.address.as_ptr())
                .map_err(kernel_error("Could not read memory at breakpoint site"))?;
            let restored = (word & WORD_MASK_INV) | saved;
            ptrace::write(self.pid, self.address.as_ptr(), restored)
                .map_err(kernel_error("Could not restore memory at breakpoint site"))?;
        }

        trace!("disabled site {} at {}", self.id, self.address);
        self.is_enabled = false;
        Ok(())
    }

    /// The instruction byte this site overwrote, present while a software
    /// site is enabled.
    pub fn saved_data(&self) -> Option<u8> {
        self.saved_data
    }

    pub fn is_hardware(&self) -> bool {
        self.is_hardware
    }

    pub fn is_internal(&self) -> bool {
        self.is_internal
    }

    pub fn hardware_slot(&self) -> Option<usize> {
        self.hardware_slot
    }
}

impl Stoppoint for BreakpointSite {
    type Id = BreakpointSiteId;

    fn id(&self) -> BreakpointSiteId {
        self.id
    }

    fn address(&self) -> VirtAddr {
        self.address
    }

    fn is_enabled(&self) -> bool {
        self.is_enabled
    }
}

/// What a logical breakpoint is anchored to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreakpointKind {
    Function(String),
    Line { file: PathBuf, line: u64 },
    Address(VirtAddr),
}

impl std::fmt::Display for BreakpointKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BreakpointKind::Function(name) => write!(f, "function {name}"),
            BreakpointKind::Line { file, line } => write!(f, "{}:{line}", file.display()),
            BreakpointKind::Address(addr) => write!(f, "address {addr}"),
        }
    }
}

/// A logical breakpoint resolving to zero or more [`BreakpointSite`]s.
///
/// The sites themselves live in the process's collection; the breakpoint
/// tracks their ids. Re-resolution against fresh ELF/DWARF data may grow or
/// shrink that list.
#[derive(Debug)]
pub struct Breakpoint {
    id: BreakpointId,
    kind: BreakpointKind,
    is_enabled: bool,
    is_hardware: bool,
    is_internal: bool,
    site_ids: Vec<BreakpointSiteId>,
}

impl Breakpoint {
    pub(crate) fn new(
        id: BreakpointId,
        kind: BreakpointKind,
        is_hardware: bool,
        is_internal: bool,
    ) -> Self {
        Self {
            id,
            kind,
            is_enabled: false,
            is_hardware,
            is_internal,
            site_ids: Vec::new(),
        }
    }

    pub fn id(&self) -> BreakpointId {
        self.id
    }

    pub fn kind(&self) -> &BreakpointKind {
        &self.kind
    }

    pub fn is_enabled(&self) -> bool {
        self.is_enabled
    }

    pub fn is_hardware(&self) -> bool {
        self.is_hardware
    }

    pub fn is_internal(&self) -> bool {
        self.is_internal
    }

    pub fn site_ids(&self) -> &[BreakpointSiteId] {
        &self.site_ids
    }

    /// Enables every owned site.
    pub fn enable(&mut self, process: &mut Process) -> Result<()> {
        for id in &self.site_ids {
            process.enable_breakpoint_site(*id)?;
        }
        self.is_enabled = true;
        Ok(())
    }

    /// Disables every owned site.
    pub fn disable(&mut self, process: &mut Process) -> Result<()> {
        for id in &self.site_ids {
            process.disable_breakpoint_site(*id)?;
        }
        self.is_enabled = false;
        Ok(())
    }

    /// Whether one of the owned sites sits at `addr`.
    pub fn at_address(&self, process: &Process, addr: VirtAddr) -> bool {
        self.site_ids.iter().any(|id| {
            process
                .breakpoint_sites()
                .get_by_id(*id)
                .map(|s| s.at_address(addr))
                .unwrap_or(false)
        })
    }

    /// Whether one of the owned sites sits in `[low, high)`.
    pub fn in_range(&self, process: &Process, low: VirtAddr, high: VirtAddr) -> bool {
        self.site_ids.iter().any(|id| {
            process
                .breakpoint_sites()
                .get_by_id(*id)
                .map(|s| s.in_range(low, high))
                .unwrap_or(false)
        })
    }

    pub(crate) fn claim_site(&mut self, id: BreakpointSiteId) {
        self.site_ids.push(id);
    }

    pub(crate) fn release_site(&mut self, id: BreakpointSiteId) {
        self.site_ids.retain(|s| *s != id);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_kind_display() {
        let kind = BreakpointKind::Line {
            file: PathBuf::from("main.c"),
            line: 42,
        };
        assert_eq!(kind.to_string(), "main.c:42");
        assert_eq!(
            BreakpointKind::Function("main".into()).to_string(),
            "function main"
        );
    }

    #[test]
    fn test_site_bookkeeping() {
        let mut bp = Breakpoint::new(1, BreakpointKind::Function("main".into()), false, false);
        bp.claim_site(3);
        bp.claim_site(5);
        assert_eq!(bp.site_ids(), &[3, 5]);
        bp.release_site(3);
        assert_eq!(bp.site_ids(), &[5]);
    }
}
