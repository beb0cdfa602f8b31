//! AArch64 target backend.
//!
//! The pipeline, per module: instruction selection (direct or DAG-based),
//! phi elimination, linear-scan register allocation, frame lowering,
//! stack-slot lowering, and finally assembly emission.

mod abi;
pub mod args;
mod emit;
mod frame_lowering;
pub mod imms;
pub mod inst;
mod lower;
mod lower_dag;
mod phi_elim;
pub mod regs;
mod stack_lowering;

pub use self::args::{AMode, Cond, RegImm};
pub use self::inst::{ALUOp, FPUOp, Inst, PhiSrc};

use crate::ir::Module;
use crate::isa::{IselLevel, TargetIsa};
use crate::mir::MachFunction;
use crate::regalloc::{self, RegBankInfo};
use crate::CodegenResult;
use log::debug;
use target_lexicon::Triple;

/// The AArch64 backend.
pub struct Aarch64Backend {
    triple: Triple,
    isel: IselLevel,
}

impl Aarch64Backend {
    /// Create a backend instance for `triple` using the given instruction
    /// selection path.
    pub fn new(triple: Triple, isel: IselLevel) -> Self {
        Self { triple, isel }
    }

    fn reg_banks() -> RegBankInfo {
        RegBankInfo {
            int_regs: regs::allocatable_int_regs(),
            float_regs: regs::allocatable_float_regs(),
            callee_saved_int: regs::callee_saved_int_regs(),
            callee_saved_float: regs::callee_saved_float_regs(),
        }
    }
}

impl TargetIsa for Aarch64Backend {
    fn name(&self) -> &'static str {
        "aarch64"
    }

    fn triple(&self) -> &Triple {
        &self.triple
    }

    fn compile_module(&self, module: &Module) -> CodegenResult<String> {
        let banks = Self::reg_banks();

        // Each pass runs over the whole module before the next starts.
        let mut compiled: Vec<MachFunction<Inst>> = Vec::with_capacity(module.functions.len());
        for func in &module.functions {
            debug!("selecting {} ({:?} isel)", func.sig.name, self.isel);
            compiled.push(match self.isel {
                IselLevel::Direct => lower::lower_function(func, module)?,
                IselLevel::Dag => lower_dag::lower_function_dag(func, module)?,
            });
        }
        for mfunc in &mut compiled {
            phi_elim::run(mfunc);
        }
        for mfunc in &mut compiled {
            regalloc::allocate(mfunc, &banks);
        }
        for mfunc in &mut compiled {
            frame_lowering::run(mfunc);
        }
        for mfunc in &mut compiled {
            stack_lowering::run(mfunc);
        }

        let mut out = String::new();
        emit::emit_module(&compiled, module, &mut out);
        Ok(out)
    }
}
