//! # Watchpoints
//!
//! A watchpoint is a hardware stoppoint with a user chosen access mode and
//! width. It remembers the bytes it watches so that a hit can report what
//! changed.

use nix::unistd::Pid;
use tracing::trace;

use crate::addr::VirtAddr;
use crate::errors::{DebuggerError, Result};
use crate::process;
use crate::registers::Registers;
use crate::stoppoint::{Stoppoint, StoppointMode};

pub type WatchpointId = i32;

/// A hardware watchpoint over `size` bytes at one address.
#[derive(Debug)]
pub struct Watchpoint {
    id: WatchpointId,
    pid: Pid,
    address: VirtAddr,
    mode: StoppointMode,
    size: usize,
    is_enabled: bool,
    hardware_slot: Option<usize>,
    data: u64,
    previous_data: u64,
}

impl Watchpoint {
    pub(crate) fn new(
        id: WatchpointId,
        pid: Pid,
        address: VirtAddr,
        mode: StoppointMode,
        size: usize,
    ) -> Result<Self> {
        if mode == StoppointMode::Execute {
            return Err(DebuggerError::ExecuteModeWatchpoint);
        }
        if !matches!(size, 1 | 2 | 4 | 8) {
            return Err(DebuggerError::InvalidStoppointSize(size));
        }
        if address.addr() & (size as u64 - 1) != 0 {
            return Err(DebuggerError::UnalignedStoppoint(address));
        }

        Ok(Self {
            id,
            pid,
            address,
            mode,
            size,
            is_enabled: false,
            hardware_slot: None,
            data: 0,
            previous_data: 0,
        })
    }

    /// Claims a debug register slot for this watchpoint. Enabling an
    /// enabled watchpoint is a no-op.
    pub fn enable(&mut self, regs: &mut Registers) -> Result<()> {
        if self.is_enabled {
            return Ok(());
        }

        self.hardware_slot = Some(regs.set_hardware_stoppoint(self.address, self.mode, self.size)?);
        self.is_enabled = true;
        trace!("enabled watchpoint {} at {}", self.id, self.address);
        Ok(())
    }

    /// Releases the slot. Disabling a disabled watchpoint is a no-op.
    pub fn disable(&mut self, regs: &mut Registers) -> Result<()> {
        if !self.is_enabled {
            return Ok(());
        }

        if let Some(slot) = self.hardware_slot.take() {
            regs.clear_hardware_stoppoint(slot)?;
        }
        self.is_enabled = false;
        trace!("disabled watchpoint {} at {}", self.id, self.address);
        Ok(())
    }

    /// Re-reads the watched bytes, rotating the current value into
    /// `previous_data`. Called by the process controller after a watch hit
    /// so the stop reason can report `(old, new)`.
    pub fn update_data(&mut self) -> Result<()> {
        let raw = process::read_process_memory(self.pid, self.address, self.size)?;
        let mut word = [0u8; 8];
        word[..raw.len()].copy_from_slice(&raw);

        self.previous_data = self.data;
        self.data = u64::from_le_bytes(word);
        trace!(
            "watchpoint {}: {:#x} -> {:#x}",
            self.id,
            self.previous_data,
            self.data
        );
        Ok(())
    }

    pub fn mode(&self) -> StoppointMode {
        self.mode
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// The watched bytes as of the last refresh.
    pub fn data(&self) -> u64 {
        self.data
    }

    /// The watched bytes one refresh earlier.
    pub fn previous_data(&self) -> u64 {
        self.previous_data
    }

    pub fn hardware_slot(&self) -> Option<usize> {
        self.hardware_slot
    }
}

impl Stoppoint for Watchpoint {
    type Id = WatchpointId;

    fn id(&self) -> WatchpointId {
        self.id
    }

    fn address(&self) -> VirtAddr {
        self.address
    }

    fn is_enabled(&self) -> bool {
        self.is_enabled
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn pid() -> Pid {
        Pid::from_raw(1)
    }

    #[test]
    fn test_rejects_execute_mode() {
        let res = Watchpoint::new(1, pid(), VirtAddr::new(0x1000), StoppointMode::Execute, 4);
        assert!(matches!(res, Err(DebuggerError::ExecuteModeWatchpoint)));
    }

    #[test]
    fn test_rejects_bad_size() {
        let res = Watchpoint::new(1, pid(), VirtAddr::new(0x1000), StoppointMode::Write, 3);
        assert!(matches!(res, Err(DebuggerError::InvalidStoppointSize(3))));
    }

    #[test]
    fn test_rejects_unaligned_address() {
        let res = Watchpoint::new(1, pid(), VirtAddr::new(0x1002), StoppointMode::Write, 4);
        assert!(matches!(res, Err(DebuggerError::UnalignedStoppoint(_))));

        // 1-byte watches have no alignment requirement
        assert!(Watchpoint::new(1, pid(), VirtAddr::new(0x1003), StoppointMode::Write, 1).is_ok());
    }
}
