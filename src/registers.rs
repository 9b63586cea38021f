//! # Register File
//!
//! In-memory mirror of a tracee's general purpose, floating point and
//! debug register blocks, kept in the same `libc::user` layout the kernel
//! reports. The mirror is refreshed as a whole on every stop and every
//! write goes to the mirror first and then straight to the kernel, so the
//! two never disagree for longer than a failed ptrace call.
//!
//! The debug register slot machinery for hardware breakpoints and
//! watchpoints also lives here, since DR0-DR7 are just more registers.

use nix::libc::user;
use nix::sys::ptrace;
use nix::sys::ptrace::regset::NT_PRFPREG;
use nix::unistd::Pid;
use tracing::trace;

use crate::addr::VirtAddr;
use crate::errors::{kernel_error, DebuggerError, Result};
use crate::register_info::{register_info, RegisterFormat, RegisterId, RegisterInfo, RegisterKind};
use crate::stoppoint::StoppointMode;

/// Marker for types that can move in and out of a register slot.
///
/// Implemented for the fixed width integers, floats and the byte arrays
/// used for vector and x87 registers. The width and format of the type is
/// checked against the register descriptor on every access.
pub trait RegisterValue: private::Sealed + Copy {
    const SIZE: usize;
    const FORMATS: &'static [RegisterFormat];

    fn from_reg_bytes(bytes: &[u8]) -> Self;
    fn to_reg_bytes(self) -> [u8; 16];
}

mod private {
    pub trait Sealed {}
}

macro_rules! impl_int_register_value {
    ($($t:ty),+) => {
        $(
            impl private::Sealed for $t {}
            impl RegisterValue for $t {
                const SIZE: usize = std::mem::size_of::<$t>();
                const FORMATS: &'static [RegisterFormat] = &[RegisterFormat::Uint];

                fn from_reg_bytes(bytes: &[u8]) -> Self {
                    <$t>::from_le_bytes(bytes[..Self::SIZE].try_into().expect("descriptor width"))
                }

                fn to_reg_bytes(self) -> [u8; 16] {
                    let mut out = [0u8; 16];
                    out[..Self::SIZE].copy_from_slice(&self.to_le_bytes());
                    out
                }
            }
        )+
    };
}

impl_int_register_value!(u8, u16, u32, u64, i8, i16, i32, i64);

macro_rules! impl_float_register_value {
    ($($t:ty),+) => {
        $(
            impl private::Sealed for $t {}
            impl RegisterValue for $t {
                const SIZE: usize = std::mem::size_of::<$t>();
                const FORMATS: &'static [RegisterFormat] = &[RegisterFormat::DoubleFloat];

                fn from_reg_bytes(bytes: &[u8]) -> Self {
                    <$t>::from_le_bytes(bytes[..Self::SIZE].try_into().expect("descriptor width"))
                }

                fn to_reg_bytes(self) -> [u8; 16] {
                    let mut out = [0u8; 16];
                    out[..Self::SIZE].copy_from_slice(&self.to_le_bytes());
                    out
                }
            }
        )+
    };
}

impl_float_register_value!(f32, f64);

impl private::Sealed for [u8; 8] {}
impl RegisterValue for [u8; 8] {
    const SIZE: usize = 8;
    const FORMATS: &'static [RegisterFormat] = &[RegisterFormat::Vector];

    fn from_reg_bytes(bytes: &[u8]) -> Self {
        bytes[..8].try_into().expect("descriptor width")
    }

    fn to_reg_bytes(self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[..8].copy_from_slice(&self);
        out
    }
}

impl private::Sealed for [u8; 16] {}
impl RegisterValue for [u8; 16] {
    const SIZE: usize = 16;
    const FORMATS: &'static [RegisterFormat] =
        &[RegisterFormat::Vector, RegisterFormat::LongDouble];

    fn from_reg_bytes(bytes: &[u8]) -> Self {
        bytes[..16].try_into().expect("descriptor width")
    }

    fn to_reg_bytes(self) -> [u8; 16] {
        self
    }
}

/// Mirror of one tracee's register state.
pub struct Registers {
    pid: Pid,
    data: user,
}

impl std::fmt::Debug for Registers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registers").field("pid", &self.pid).finish()
    }
}

impl Registers {
    pub(crate) fn new(pid: Pid) -> Self {
        Self {
            pid,
            // the kernel fills this in on the first stop
            data: unsafe { std::mem::zeroed::<user>() },
        }
    }

    /// Refreshes the whole mirror from the kernel: the GPR block, the FPR
    /// block and the eight debug registers.
    pub fn read_all(&mut self) -> Result<()> {
        self.data.regs =
            ptrace::getregs(self.pid).map_err(kernel_error("Could not read GPR registers"))?;
        self.data.i387 = ptrace::getregset::<NT_PRFPREG>(self.pid)
            .map_err(kernel_error("Could not read FPR registers"))?;

        for i in 0..8u8 {
            let info = register_info(RegisterId::Dr(i));
            self.data.u_debugreg[i as usize] =
                ptrace::read_user(self.pid, info.offset as *mut std::ffi::c_void)
                    .map_err(kernel_error("Could not read debug register"))? as u64;
        }

        Ok(())
    }

    /// Reads a register from the mirror as `T`.
    ///
    /// Fails with a type mismatch error if `T`'s width or format disagrees
    /// with the register's descriptor.
    pub fn read_by_id_as<T: RegisterValue>(&self, id: RegisterId) -> Result<T> {
        let info = register_info(id);
        check_value_type::<T>(&info)?;
        let bytes = self.as_bytes();
        Ok(T::from_reg_bytes(&bytes[info.offset..info.offset + info.size]))
    }

    /// Writes a register: mirror first, then the kernel, through the ptrace
    /// request matching the register's block.
    pub fn write_by_id<T: RegisterValue>(&mut self, id: RegisterId, value: T) -> Result<()> {
        let info = register_info(id);
        check_value_type::<T>(&info)?;

        let raw = value.to_reg_bytes();
        let bytes = self.as_bytes_mut();
        bytes[info.offset..info.offset + info.size].copy_from_slice(&raw[..info.size]);

        trace!("write {} ({:?})", info.name, info.kind);
        match info.kind {
            RegisterKind::Gpr => ptrace::setregs(self.pid, self.data.regs)
                .map_err(kernel_error("Could not write GPR registers")),
            RegisterKind::Fpr => ptrace::setregset::<NT_PRFPREG>(self.pid, self.data.i387)
                .map_err(kernel_error("Could not write FPR registers")),
            RegisterKind::Debug => {
                let word = self.data.u_debugreg[(info.offset - dr_base()) / 8];
                ptrace::write_user(
                    self.pid,
                    info.offset as *mut std::ffi::c_void,
                    word as i64,
                )
                .map_err(kernel_error("Could not write debug register"))
            }
        }
    }

    /// Program counter of the mirrored state.
    pub fn pc(&self) -> VirtAddr {
        VirtAddr::new(self.data.regs.rip)
    }

    pub fn set_pc(&mut self, pc: VirtAddr) -> Result<()> {
        self.write_by_id(RegisterId::Rip, pc.addr())
    }

    /// Claims a free debug register slot for a stoppoint at `address` and
    /// programs DR7 accordingly. Returns the slot index 0..=3.
    pub fn set_hardware_stoppoint(
        &mut self,
        address: VirtAddr,
        mode: StoppointMode,
        size: usize,
    ) -> Result<usize> {
        let control: u64 = self.read_by_id_as(RegisterId::Dr(7))?;
        let slot = find_free_stoppoint_register(control)?;

        self.write_by_id(RegisterId::Dr(slot as u8), address.addr())?;
        let masked = dr7_with_stoppoint(control, slot, mode, size)?;
        self.write_by_id(RegisterId::Dr(7), masked)?;

        trace!("hardware stoppoint at {address} in slot {slot}");
        Ok(slot)
    }

    /// Releases a debug register slot, clearing its address register and
    /// its enable, mode and length bits in DR7.
    pub fn clear_hardware_stoppoint(&mut self, slot: usize) -> Result<()> {
        self.write_by_id(RegisterId::Dr(slot as u8), 0u64)?;

        let control: u64 = self.read_by_id_as(RegisterId::Dr(7))?;
        self.write_by_id(RegisterId::Dr(7), dr7_without_stoppoint(control, slot))?;

        trace!("cleared hardware stoppoint slot {slot}");
        Ok(())
    }

    /// The address programmed into the given debug register slot.
    pub fn hardware_stoppoint_address(&self, slot: usize) -> Result<VirtAddr> {
        Ok(VirtAddr::new(
            self.read_by_id_as::<u64>(RegisterId::Dr(slot as u8))?,
        ))
    }

    /// The slot that caused the current hardware debug trap, from the low
    /// four status bits of DR6.
    pub fn triggered_hardware_slot(&self) -> Result<usize> {
        let status: u64 = self.read_by_id_as(RegisterId::Dr(6))?;
        let low = status & 0b1111;
        if low == 0 {
            return Err(DebuggerError::StoppointNotFound);
        }
        Ok(low.trailing_zeros() as usize)
    }

    fn as_bytes(&self) -> &[u8] {
        // user is plain old data written by the kernel
        unsafe {
            std::slice::from_raw_parts(
                (&self.data as *const user).cast::<u8>(),
                std::mem::size_of::<user>(),
            )
        }
    }

    fn as_bytes_mut(&mut self) -> &mut [u8] {
        unsafe {
            std::slice::from_raw_parts_mut(
                (&mut self.data as *mut user).cast::<u8>(),
                std::mem::size_of::<user>(),
            )
        }
    }
}

fn dr_base() -> usize {
    register_info(RegisterId::Dr(0)).offset
}

fn check_value_type<T: RegisterValue>(info: &RegisterInfo) -> Result<()> {
    if T::SIZE != info.size || !T::FORMATS.contains(&info.format) {
        return Err(DebuggerError::RegisterTypeMismatch {
            register: info.name,
            format: info.format.name(),
            expected: info.size,
            requested: T::SIZE,
        });
    }
    Ok(())
}

fn encode_hardware_stoppoint_mode(mode: StoppointMode) -> u64 {
    match mode {
        StoppointMode::Write => 0b01,
        StoppointMode::ReadWrite => 0b11,
        StoppointMode::Execute => 0b00,
    }
}

fn encode_hardware_stoppoint_size(size: usize) -> Result<u64> {
    match size {
        1 => Ok(0b00),
        2 => Ok(0b01),
        4 => Ok(0b11),
        8 => Ok(0b10),
        other => Err(DebuggerError::InvalidStoppointSize(other)),
    }
}

fn find_free_stoppoint_register(control: u64) -> Result<usize> {
    // local/global enable bit pairs sit at 2i..2i+1
    (0..4)
        .find(|i| control & (0b11 << (i * 2)) == 0)
        .ok_or(DebuggerError::NoHardwareSlot)
}

fn dr7_with_stoppoint(
    control: u64,
    slot: usize,
    mode: StoppointMode,
    size: usize,
) -> Result<u64> {
    let mode_flag = encode_hardware_stoppoint_mode(mode);
    let size_flag = encode_hardware_stoppoint_size(size)?;

    let enable_bit = 1u64 << (slot * 2);
    let mode_bits = mode_flag << (slot * 4 + 16);
    let size_bits = size_flag << (slot * 4 + 18);

    Ok((control & !dr7_clear_mask(slot)) | enable_bit | mode_bits | size_bits)
}

fn dr7_without_stoppoint(control: u64, slot: usize) -> u64 {
    control & !dr7_clear_mask(slot)
}

fn dr7_clear_mask(slot: usize) -> u64 {
    (0b11u64 << (slot * 2)) | (0b1111u64 << (slot * 4 + 16))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_mode_and_size_encoding() {
        assert_eq!(encode_hardware_stoppoint_mode(StoppointMode::Write), 0b01);
        assert_eq!(
            encode_hardware_stoppoint_mode(StoppointMode::ReadWrite),
            0b11
        );
        assert_eq!(encode_hardware_stoppoint_mode(StoppointMode::Execute), 0b00);

        assert_eq!(encode_hardware_stoppoint_size(1).unwrap(), 0b00);
        assert_eq!(encode_hardware_stoppoint_size(2).unwrap(), 0b01);
        assert_eq!(encode_hardware_stoppoint_size(4).unwrap(), 0b11);
        assert_eq!(encode_hardware_stoppoint_size(8).unwrap(), 0b10);
        assert!(matches!(
            encode_hardware_stoppoint_size(3),
            Err(DebuggerError::InvalidStoppointSize(3))
        ));
    }

    #[test]
    fn test_free_slot_scan() {
        assert_eq!(find_free_stoppoint_register(0).unwrap(), 0);
        assert_eq!(find_free_stoppoint_register(0b01).unwrap(), 1);
        assert_eq!(find_free_stoppoint_register(0b0101).unwrap(), 2);
        assert_eq!(find_free_stoppoint_register(0b010101).unwrap(), 3);
        assert!(matches!(
            find_free_stoppoint_register(0b01010101),
            Err(DebuggerError::NoHardwareSlot)
        ));
    }

    #[test]
    fn test_dr7_round_trip() {
        // a 4-byte write watch in slot 2
        let dr7 = dr7_with_stoppoint(0, 2, StoppointMode::Write, 4).unwrap();
        assert_eq!(dr7 & (0b11 << 4), 0b01 << 4, "local enable of slot 2");
        assert_eq!((dr7 >> 24) & 0b11, 0b01, "mode bits");
        assert_eq!((dr7 >> 26) & 0b11, 0b11, "length bits");

        // clearing the slot restores the original control word
        assert_eq!(dr7_without_stoppoint(dr7, 2), 0);
    }

    #[test]
    fn test_dr7_execute_length_is_zero() {
        let dr7 = dr7_with_stoppoint(0, 0, StoppointMode::Execute, 1).unwrap();
        assert_eq!((dr7 >> 16) & 0b1111, 0, "execute encodes mode 00 len 00");
        assert_eq!(dr7 & 0b11, 0b01);
    }

    #[test]
    fn test_dr7_slots_do_not_clobber_each_other() {
        let mut dr7 = 0;
        for slot in 0..4 {
            dr7 = dr7_with_stoppoint(dr7, slot, StoppointMode::ReadWrite, 8).unwrap();
        }
        // all four local enable bits set
        assert_eq!(dr7 & 0b01010101, 0b01010101);

        dr7 = dr7_without_stoppoint(dr7, 1);
        assert_eq!(dr7 & 0b01010101, 0b01010001);
        // slot 0 and 2 mode/length fields untouched
        assert_eq!((dr7 >> 16) & 0b1111, 0b1011);
        assert_eq!((dr7 >> 24) & 0b1111, 0b1011);
    }
}
