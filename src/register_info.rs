//! # Register Descriptors
//!
//! Maps every logical register of an x86-64 tracee to its position inside
//! the kernel's `user` area, the block it belongs to and the format of its
//! content. The offsets are computed from the `libc` layouts with
//! [`std::mem::offset_of`], so they stay in sync with whatever the kernel
//! headers say.
//!
//! The descriptor decides which ptrace request is used to move a value:
//! general purpose registers travel as one `PTRACE_SETREGS` block, the
//! floating point block as one `NT_PRFPREG` regset, and the debug registers
//! word by word through the user area.

use std::mem::offset_of;

use nix::libc::{user, user_fpregs_struct, user_regs_struct};

/// Identifier of a single logical register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterId {
    Rax,
    Rbx,
    Rcx,
    Rdx,
    Rsi,
    Rdi,
    Rbp,
    Rsp,
    R8,
    R9,
    R10,
    R11,
    R12,
    R13,
    R14,
    R15,
    Rip,
    Eflags,
    Cs,
    Ss,
    Ds,
    Es,
    Fs,
    Gs,
    OrigRax,
    FsBase,
    GsBase,
    Fcw,
    Fsw,
    Ftw,
    Fop,
    Frip,
    Frdp,
    Mxcsr,
    MxcsrMask,
    /// x87 stack register, 0..=7
    St(u8),
    /// MMX register aliasing the x87 stack, 0..=7
    Mm(u8),
    /// SSE register, 0..=15
    Xmm(u8),
    /// Debug register, 0..=7
    Dr(u8),
}

/// Interpretation of a register's bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterFormat {
    Uint,
    DoubleFloat,
    LongDouble,
    Vector,
}

impl RegisterFormat {
    pub fn name(&self) -> &'static str {
        match self {
            RegisterFormat::Uint => "uint",
            RegisterFormat::DoubleFloat => "double",
            RegisterFormat::LongDouble => "long double",
            RegisterFormat::Vector => "vector",
        }
    }
}

/// The storage block a register lives in, which also selects the ptrace
/// request used to write it back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterKind {
    Gpr,
    Fpr,
    Debug,
}

/// Static description of one register: where it lives in the `user` area,
/// how wide it is and how to interpret it.
#[derive(Debug, Clone, Copy)]
pub struct RegisterInfo {
    pub id: RegisterId,
    pub name: &'static str,
    pub offset: usize,
    pub size: usize,
    pub format: RegisterFormat,
    pub kind: RegisterKind,
}

const GPR_BASE: usize = offset_of!(user, regs);
const FPR_BASE: usize = offset_of!(user, i387);
const DEBUG_BASE: usize = offset_of!(user, u_debugreg);

macro_rules! gpr {
    ($id:expr, $name:expr, $field:ident) => {
        RegisterInfo {
            id: $id,
            name: $name,
            offset: GPR_BASE + offset_of!(user_regs_struct, $field),
            size: 8,
            format: RegisterFormat::Uint,
            kind: RegisterKind::Gpr,
        }
    };
}

macro_rules! fpr_ctl {
    ($id:expr, $name:expr, $field:ident, $size:expr) => {
        RegisterInfo {
            id: $id,
            name: $name,
            offset: FPR_BASE + offset_of!(user_fpregs_struct, $field),
            size: $size,
            format: RegisterFormat::Uint,
            kind: RegisterKind::Fpr,
        }
    };
}

const ST_NAMES: [&str; 8] = ["st0", "st1", "st2", "st3", "st4", "st5", "st6", "st7"];
const MM_NAMES: [&str; 8] = ["mm0", "mm1", "mm2", "mm3", "mm4", "mm5", "mm6", "mm7"];
const XMM_NAMES: [&str; 16] = [
    "xmm0", "xmm1", "xmm2", "xmm3", "xmm4", "xmm5", "xmm6", "xmm7", "xmm8", "xmm9", "xmm10",
    "xmm11", "xmm12", "xmm13", "xmm14", "xmm15",
];
const DR_NAMES: [&str; 8] = ["dr0", "dr1", "dr2", "dr3", "dr4", "dr5", "dr6", "dr7"];

/// Looks up the descriptor for `id`.
///
/// Panics if a parameterized id carries an out of range index, which is a
/// programming error on the caller's side.
pub fn register_info(id: RegisterId) -> RegisterInfo {
    use RegisterId::*;

    match id {
        Rax => gpr!(Rax, "rax", rax),
        Rbx => gpr!(Rbx, "rbx", rbx),
        Rcx => gpr!(Rcx, "rcx", rcx),
        Rdx => gpr!(Rdx, "rdx", rdx),
        Rsi => gpr!(Rsi, "rsi", rsi),
        Rdi => gpr!(Rdi, "rdi", rdi),
        Rbp => gpr!(Rbp, "rbp", rbp),
        Rsp => gpr!(Rsp, "rsp", rsp),
        R8 => gpr!(R8, "r8", r8),
        R9 => gpr!(R9, "r9", r9),
        R10 => gpr!(R10, "r10", r10),
        R11 => gpr!(R11, "r11", r11),
        R12 => gpr!(R12, "r12", r12),
        R13 => gpr!(R13, "r13", r13),
        R14 => gpr!(R14, "r14", r14),
        R15 => gpr!(R15, "r15", r15),
        Rip => gpr!(Rip, "rip", rip),
        Eflags => gpr!(Eflags, "eflags", eflags),
        Cs => gpr!(Cs, "cs", cs),
        Ss => gpr!(Ss, "ss", ss),
        Ds => gpr!(Ds, "ds", ds),
        Es => gpr!(Es, "es", es),
        Fs => gpr!(Fs, "fs", fs),
        Gs => gpr!(Gs, "gs", gs),
        OrigRax => gpr!(OrigRax, "orig_rax", orig_rax),
        FsBase => gpr!(FsBase, "fs_base", fs_base),
        GsBase => gpr!(GsBase, "gs_base", gs_base),
        Fcw => fpr_ctl!(Fcw, "fcw", cwd, 2),
        Fsw => fpr_ctl!(Fsw, "fsw", swd, 2),
        Ftw => fpr_ctl!(Ftw, "ftw", ftw, 2),
        Fop => fpr_ctl!(Fop, "fop", fop, 2),
        Frip => fpr_ctl!(Frip, "frip", rip, 8),
        Frdp => fpr_ctl!(Frdp, "frdp", rdp, 8),
        Mxcsr => fpr_ctl!(Mxcsr, "mxcsr", mxcsr, 4),
        MxcsrMask => fpr_ctl!(MxcsrMask, "mxcsrmask", mxcr_mask, 4),
        St(i) => RegisterInfo {
            id,
            name: ST_NAMES[i as usize],
            offset: FPR_BASE + offset_of!(user_fpregs_struct, st_space) + 16 * i as usize,
            size: 16,
            format: RegisterFormat::LongDouble,
            kind: RegisterKind::Fpr,
        },
        Mm(i) => RegisterInfo {
            id,
            name: MM_NAMES[i as usize],
            offset: FPR_BASE + offset_of!(user_fpregs_struct, st_space) + 16 * i as usize,
            size: 8,
            format: RegisterFormat::Vector,
            kind: RegisterKind::Fpr,
        },
        Xmm(i) => RegisterInfo {
            id,
            name: XMM_NAMES[i as usize],
            offset: FPR_BASE + offset_of!(user_fpregs_struct, xmm_space) + 16 * i as usize,
            size: 16,
            format: RegisterFormat::Vector,
            kind: RegisterKind::Fpr,
        },
        Dr(i) => RegisterInfo {
            id,
            name: DR_NAMES[i as usize],
            offset: DEBUG_BASE + 8 * i as usize,
            size: 8,
            format: RegisterFormat::Uint,
            kind: RegisterKind::Debug,
        },
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_gpr_layout() {
        let rip = register_info(RegisterId::Rip);
        assert_eq!(rip.size, 8);
        assert_eq!(rip.kind, RegisterKind::Gpr);
        assert_eq!(rip.name, "rip");

        // rax and orig_rax occupy distinct slots of the same block
        let rax = register_info(RegisterId::Rax);
        let orig = register_info(RegisterId::OrigRax);
        assert_ne!(rax.offset, orig.offset);
    }

    #[test]
    fn test_fpr_layout() {
        let fcw = register_info(RegisterId::Fcw);
        assert_eq!(fcw.size, 2);
        assert_eq!(fcw.kind, RegisterKind::Fpr);

        let st0 = register_info(RegisterId::St(0));
        let st1 = register_info(RegisterId::St(1));
        assert_eq!(st1.offset - st0.offset, 16);
        assert_eq!(st0.format, RegisterFormat::LongDouble);

        let xmm0 = register_info(RegisterId::Xmm(0));
        assert_eq!(xmm0.size, 16);
        assert_eq!(xmm0.format, RegisterFormat::Vector);
    }

    #[test]
    fn test_debug_layout() {
        let dr0 = register_info(RegisterId::Dr(0));
        let dr7 = register_info(RegisterId::Dr(7));
        assert_eq!(dr7.offset - dr0.offset, 56);
        assert_eq!(dr0.kind, RegisterKind::Debug);
        assert_eq!(dr7.name, "dr7");
    }
}
