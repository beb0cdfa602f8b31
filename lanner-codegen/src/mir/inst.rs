//! The interface between target instructions and the target-independent
//! machine passes.
//!
//! Liveness analysis and the linear-scan allocator do not inspect target
//! instructions directly; everything they need (register uses and
//! definitions, call/branch classification, spill code generation) goes
//! through this trait. Each target implements it for its instruction enum.

use crate::ir::Block;
use crate::mir::frame::FrameIndex;
use crate::mir::reg::Reg;
use smallvec::SmallVec;

/// Capabilities a target instruction must expose to the machine passes.
pub trait MachInst: Clone + core::fmt::Debug {
    /// Is this a function call?
    fn is_call(&self) -> bool;

    /// Is this a return?
    fn is_ret(&self) -> bool;

    /// The blocks this instruction can transfer control to. Empty for
    /// non-branches.
    fn branch_targets(&self) -> SmallVec<[Block; 2]>;

    /// Rewrite branch targets equal to `from` into `to`.
    fn retarget_branch(&mut self, from: Block, to: Block);

    /// Visit every register this instruction reads.
    fn each_use(&self, f: &mut dyn FnMut(Reg));

    /// Visit every register this instruction writes.
    fn each_def(&self, f: &mut dyn FnMut(Reg));

    /// Rewrite every use register through `f`.
    fn map_uses(&mut self, f: &mut dyn FnMut(Reg) -> Reg);

    /// Rewrite every def register through `f`.
    fn map_defs(&mut self, f: &mut dyn FnMut(Reg) -> Reg);

    /// If this instruction is a plain register-to-register copy, return
    /// `(dst, src)`.
    fn as_move(&self) -> Option<(Reg, Reg)>;

    /// Generate a reload of `to` from spill slot `from`.
    fn gen_reload(to: Reg, from: FrameIndex) -> Self;

    /// Generate a spill of `from` into spill slot `to`.
    fn gen_spill(from: Reg, to: FrameIndex) -> Self;
}
