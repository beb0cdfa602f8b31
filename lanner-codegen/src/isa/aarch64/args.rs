//! AArch64 ISA definitions: instruction arguments.

use crate::ir::{FloatCC, IntCC};
use crate::isa::aarch64::regs::{fp_reg, show_reg, stack_reg};
use crate::mir::Reg;
use core::fmt;

/// Condition for conditional branches and `cset`.
///
/// The discriminants are the machine encodings; `cset`'s integer payload
/// in the mid-end uses the same numbering, so the mapping must stay
/// byte-exact.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Cond {
    Eq = 0,
    Ne = 1,
    Hs = 2,
    Lo = 3,
    Mi = 4,
    Pl = 5,
    Vs = 6,
    Vc = 7,
    Hi = 8,
    Ls = 9,
    Ge = 10,
    Lt = 11,
    Gt = 12,
    Le = 13,
}

impl Cond {
    /// The machine encoding of this condition.
    pub fn bits(self) -> u8 {
        self as u8
    }

    /// Assembly suffix (`b.<cond>`, `cset .., <cond>`).
    pub fn name(self) -> &'static str {
        match self {
            Cond::Eq => "eq",
            Cond::Ne => "ne",
            Cond::Hs => "hs",
            Cond::Lo => "lo",
            Cond::Mi => "mi",
            Cond::Pl => "pl",
            Cond::Vs => "vs",
            Cond::Vc => "vc",
            Cond::Hi => "hi",
            Cond::Ls => "ls",
            Cond::Ge => "ge",
            Cond::Lt => "lt",
            Cond::Gt => "gt",
            Cond::Le => "le",
        }
    }

    /// The condition computed by `icmp cc` after a `cmp`.
    pub fn from_intcc(cc: IntCC) -> Cond {
        match cc {
            IntCC::Equal => Cond::Eq,
            IntCC::NotEqual => Cond::Ne,
            IntCC::UnsignedGreaterThan => Cond::Hi,
            IntCC::UnsignedGreaterThanOrEqual => Cond::Hs,
            IntCC::UnsignedLessThan => Cond::Lo,
            IntCC::UnsignedLessThanOrEqual => Cond::Ls,
            IntCC::SignedGreaterThan => Cond::Gt,
            IntCC::SignedGreaterThanOrEqual => Cond::Ge,
            IntCC::SignedLessThan => Cond::Lt,
            IntCC::SignedLessThanOrEqual => Cond::Le,
        }
    }

    /// The condition computed by `fcmp cc` after an `fcmp`.
    ///
    /// `ult`/`ule` reuse the signed-compare conditions; `ord`/`uno` test
    /// the overflow flag, which AArch64 sets for unordered comparisons.
    pub fn from_floatcc(cc: FloatCC) -> Cond {
        match cc {
            FloatCC::OrderedEqual => Cond::Eq,
            FloatCC::OrderedNotEqual => Cond::Ne,
            FloatCC::OrderedGreaterThan => Cond::Gt,
            FloatCC::OrderedGreaterThanOrEqual => Cond::Ge,
            FloatCC::OrderedLessThan => Cond::Lt,
            FloatCC::OrderedLessThanOrEqual => Cond::Le,
            FloatCC::Ordered => Cond::Vc,
            FloatCC::UnorderedOrEqual => Cond::Eq,
            FloatCC::UnorderedOrGreaterThan => Cond::Hi,
            FloatCC::UnorderedOrGreaterThanOrEqual => Cond::Hs,
            FloatCC::UnorderedOrLessThan => Cond::Lt,
            FloatCC::UnorderedOrLessThanOrEqual => Cond::Le,
            FloatCC::UnorderedOrNotEqual => Cond::Ne,
            FloatCC::Unordered => Cond::Vs,
        }
    }
}

impl fmt::Display for Cond {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A memory operand: a base register plus a byte offset.
///
/// SP- and FP-based modes are split out so frame code reads naturally and
/// so stack-slot rewriting can find them.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AMode {
    /// `[reg, #offset]`.
    RegOffset(Reg, i32),
    /// `[sp, #offset]`.
    SPOffset(i32),
    /// `[x29, #offset]`.
    FPOffset(i32),
}

impl AMode {
    /// The base register of this mode.
    pub fn base(self) -> Reg {
        match self {
            AMode::RegOffset(reg, _) => reg,
            AMode::SPOffset(_) => stack_reg(),
            AMode::FPOffset(_) => fp_reg(),
        }
    }

    /// The byte offset of this mode.
    pub fn offset(self) -> i32 {
        match self {
            AMode::RegOffset(_, offset) | AMode::SPOffset(offset) | AMode::FPOffset(offset) => {
                offset
            }
        }
    }
}

impl fmt::Display for AMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{}, #{}]", show_reg(self.base()), self.offset())
    }
}

/// A register or immediate right-hand operand (`cmp`).
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RegImm {
    Reg(Reg),
    Imm(i32),
}

impl fmt::Display for RegImm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RegImm::Reg(reg) => f.write_str(&show_reg(*reg)),
            RegImm::Imm(imm) => write!(f, "#{imm}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cset_payload_numbering() {
        // The table the emitter depends on; see the module docs.
        assert_eq!(Cond::Eq.bits(), 0);
        assert_eq!(Cond::Ne.bits(), 1);
        assert_eq!(Cond::Hs.bits(), 2);
        assert_eq!(Cond::Lo.bits(), 3);
        assert_eq!(Cond::Hi.bits(), 8);
        assert_eq!(Cond::Ls.bits(), 9);
        assert_eq!(Cond::Ge.bits(), 10);
        assert_eq!(Cond::Lt.bits(), 11);
        assert_eq!(Cond::Gt.bits(), 12);
        assert_eq!(Cond::Le.bits(), 13);
    }

    #[test]
    fn intcc_mapping() {
        assert_eq!(Cond::from_intcc(IntCC::SignedLessThan), Cond::Lt);
        assert_eq!(Cond::from_intcc(IntCC::UnsignedGreaterThan), Cond::Hi);
        assert_eq!(Cond::from_intcc(IntCC::UnsignedLessThan), Cond::Lo);
    }
}
