//! Register allocation.
//!
//! A classic linear scan over live intervals: `liveness` computes per-block
//! use/def sets, runs the backward dataflow to a fixed point and builds the
//! intervals; `linear_scan` assigns physical registers, spills what does
//! not fit, and rewrites the instructions.

mod linear_scan;
mod liveness;

pub use self::linear_scan::allocate;
pub use self::liveness::{analyze, Interval, Liveness, Segment};

/// The register banks of a target, as the allocator sees them.
///
/// Lists are in allocation preference order (ascending register number for
/// AArch64). The allocator reserves the last two registers of each bank as
/// scratch for spill code.
pub struct RegBankInfo {
    /// Allocatable integer registers (reserved registers excluded).
    pub int_regs: Vec<u32>,
    /// Allocatable float registers.
    pub float_regs: Vec<u32>,
    /// The callee-saved subset of `int_regs`.
    pub callee_saved_int: Vec<u32>,
    /// The callee-saved subset of `float_regs`.
    pub callee_saved_float: Vec<u32>,
}
