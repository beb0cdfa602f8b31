//! AArch64 ISA definitions: registers.
//!
//! Integer registers are numbered 0..=30 (x0..x30); the stack pointer and
//! the zero register get the two encodings above that so they can be told
//! apart from x31-less reality and from each other. Float registers are
//! numbered 0..=31 (v0..v31).

use crate::mir::{DataType, Reg, F64, I64};

/// Register number of the stack pointer.
pub const SP_REG: u32 = 31;
/// Register number of the zero register (wzr/xzr).
pub const ZERO_REG: u32 = 32;

/// Number of integer argument registers (x0..x7).
pub const INT_ARG_REGS: u32 = 8;
/// Number of float argument registers (v0..v7).
pub const FLOAT_ARG_REGS: u32 = 8;

/// First callee-saved integer register (x19).
pub const CALLEE_SAVED_INT_FIRST: u32 = 19;
/// Last callee-saved integer register (x28).
pub const CALLEE_SAVED_INT_LAST: u32 = 28;
/// First callee-saved float register (v8).
pub const CALLEE_SAVED_FLOAT_FIRST: u32 = 8;
/// Last callee-saved float register (v15).
pub const CALLEE_SAVED_FLOAT_LAST: u32 = 15;

/// Get a reference to an X-register (64-bit integer view).
pub fn xreg(num: u32) -> Reg {
    debug_assert!(num <= 30);
    Reg::real(num, I64)
}

/// Get a general purpose register with an explicit type (selects the
/// `wN`/`xN` print form).
pub fn gpr(num: u32, ty: DataType) -> Reg {
    debug_assert!(!ty.is_float());
    Reg::real(num, ty)
}

/// Get a float register with an explicit type (selects the `sN`/`dN`
/// print form).
pub fn fpr(num: u32, ty: DataType) -> Reg {
    debug_assert!(ty.is_float());
    Reg::real(num, ty)
}

/// Get a reference to the stack pointer.
pub fn stack_reg() -> Reg {
    Reg::real(SP_REG, I64)
}

/// Get a reference to the zero register, typed.
pub fn zero_reg(ty: DataType) -> Reg {
    Reg::real(ZERO_REG, ty)
}

/// Get a reference to the frame pointer (x29).
pub fn fp_reg() -> Reg {
    xreg(29)
}

/// Get a reference to the link register (x30).
pub fn link_reg() -> Reg {
    xreg(30)
}

/// Get a reference to the spill/offset temporary (x16, aka IP0). Reserved
/// from allocation; used to materialize frame sizes and large offsets.
pub fn spilltmp_reg() -> Reg {
    xreg(16)
}

/// The registers the integer-bank allocator may hand out, before scratch
/// reservation: x0..x30 minus {x16, x17 (linker veneers), x18 (platform),
/// x29 (FP), x30 (LR)}.
pub fn allocatable_int_regs() -> Vec<u32> {
    (0..=30)
        .filter(|&r| !matches!(r, 16 | 17 | 18 | 29 | 30))
        .collect()
}

/// The registers the float-bank allocator may hand out: all of v0..v31.
pub fn allocatable_float_regs() -> Vec<u32> {
    (0..=31).collect()
}

/// Callee-saved integer registers, ascending.
pub fn callee_saved_int_regs() -> Vec<u32> {
    (CALLEE_SAVED_INT_FIRST..=CALLEE_SAVED_INT_LAST).collect()
}

/// Callee-saved float registers, ascending.
pub fn callee_saved_float_regs() -> Vec<u32> {
    (CALLEE_SAVED_FLOAT_FIRST..=CALLEE_SAVED_FLOAT_LAST).collect()
}

/// Is `num` a callee-saved register of the given bank?
pub fn is_callee_saved(num: u32, float: bool) -> bool {
    if float {
        (CALLEE_SAVED_FLOAT_FIRST..=CALLEE_SAVED_FLOAT_LAST).contains(&num)
    } else {
        (CALLEE_SAVED_INT_FIRST..=CALLEE_SAVED_INT_LAST).contains(&num)
    }
}

/// Render a register in assembly syntax: `wN`/`xN` by width for the
/// integer bank with `sp`, `wzr`, `xzr` special-cased; `sN`/`dN` for the
/// float bank. Virtual registers render as `%vN`, a diagnostic form that
/// the emitter's invariant checking keeps out of real output.
pub fn show_reg(reg: Reg) -> String {
    if reg.is_virtual() {
        return format!("%v{}", reg.num());
    }
    let ty = reg.ty();
    if ty.is_float() {
        if ty == F64 {
            format!("d{}", reg.num())
        } else {
            format!("s{}", reg.num())
        }
    } else if reg.num() == SP_REG {
        "sp".to_string()
    } else if reg.num() == ZERO_REG {
        if ty.is_wide() {
            "xzr".to_string()
        } else {
            "wzr".to_string()
        }
    } else if ty.is_wide() {
        format!("x{}", reg.num())
    } else {
        format!("w{}", reg.num())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mir::{F32, I32};

    #[test]
    fn register_names() {
        assert_eq!(show_reg(gpr(0, I32)), "w0");
        assert_eq!(show_reg(gpr(0, I64)), "x0");
        assert_eq!(show_reg(stack_reg()), "sp");
        assert_eq!(show_reg(zero_reg(I32)), "wzr");
        assert_eq!(show_reg(zero_reg(I64)), "xzr");
        assert_eq!(show_reg(fpr(3, F32)), "s3");
        assert_eq!(show_reg(fpr(3, F64)), "d3");
    }

    #[test]
    fn reserved_regs_are_not_allocatable() {
        let int = allocatable_int_regs();
        for r in [16, 17, 18, 29, 30] {
            assert!(!int.contains(&r));
        }
        assert_eq!(int.len(), 26);
        assert_eq!(allocatable_float_regs().len(), 32);
    }
}
