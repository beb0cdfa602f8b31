//! Assembly text emission.
//!
//! A straightforward walk of the compiled module: a `.text` section with
//! one `.globl` symbol and `.<func>_<block>` labels per function, then a
//! `.data` section for the globals, coalescing runs of zero initializer
//! elements into `.zero` directives.

use crate::ir::{GlobalVarData, Module};
use crate::isa::aarch64::inst::Inst;
use crate::mir::{MachFunction, MachInst};
use core::fmt::Write;

/// Emit the whole module: all compiled functions, then the data section.
pub fn emit_module(funcs: &[MachFunction<Inst>], module: &Module, out: &mut String) {
    out.push_str(".text\n");
    out.push_str(".arch armv8-a\n");
    for func in funcs {
        emit_function(func, out);
    }

    if module.globals.is_empty() {
        return;
    }
    out.push_str("\n.data\n");
    for global in module.globals.values() {
        emit_global(global, out);
    }
}

fn emit_function(func: &MachFunction<Inst>, out: &mut String) {
    let _ = write!(out, "\n.globl {}\n{}:\n", func.name, func.name);
    for (block, data) in &func.blocks {
        let _ = write!(out, ".{}_{}:\n", func.name, block.as_u32());
        for inst in &data.insts {
            debug_assert!(
                !inst.is_pseudo(),
                "pseudo instruction reached emission: {}",
                inst.print(&func.name)
            );
            let mut has_vreg = false;
            inst.each_use(&mut |reg| has_vreg |= reg.is_virtual());
            inst.each_def(&mut |reg| has_vreg |= reg.is_virtual());
            debug_assert!(
                !has_vreg,
                "virtual register survived into emission: {}",
                inst.print(&func.name)
            );
            let _ = write!(out, "  {}\n", inst.print(&func.name));
        }
    }
}

fn emit_global(global: &GlobalVarData, out: &mut String) {
    let _ = write!(out, "{}:\n", global.name);
    let wide = global.ty.bytes() == 8;
    let directive = if wide { ".quad" } else { ".word" };

    if global.is_scalar() {
        let value = global.init.first().copied().unwrap_or(0);
        let _ = write!(out, "  {directive} {value}\n");
        return;
    }

    let elem_size = global.ty.bytes() as u64;
    let total = global.elem_count();
    if global.init.is_empty() {
        let _ = write!(out, "  .zero {}\n", total * elem_size);
        return;
    }

    let mut zero_run: u64 = 0;
    for &value in &global.init {
        if value == 0 {
            zero_run += elem_size;
            continue;
        }
        if zero_run > 0 {
            let _ = write!(out, "  .zero {zero_run}\n");
            zero_run = 0;
        }
        let _ = write!(out, "  {directive} {value}\n");
    }
    // Explicit trailing zeros, then whatever the initializer left
    // uncovered.
    zero_run += (total - global.init.len() as u64) * elem_size;
    if zero_run > 0 {
        let _ = write!(out, "  .zero {zero_run}\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Type;

    fn render(global: GlobalVarData) -> String {
        let mut out = String::new();
        emit_global(&global, &mut out);
        out
    }

    #[test]
    fn scalar_global() {
        let text = render(GlobalVarData {
            name: "g".to_string(),
            ty: Type::I32,
            dims: vec![],
            init: vec![7],
        });
        assert_eq!(text, "g:\n  .word 7\n");
    }

    #[test]
    fn zero_array_collapses() {
        let text = render(GlobalVarData {
            name: "a".to_string(),
            ty: Type::I32,
            dims: vec![8],
            init: vec![],
        });
        assert_eq!(text, "a:\n  .zero 32\n");
    }

    #[test]
    fn zero_runs_coalesce() {
        let text = render(GlobalVarData {
            name: "a".to_string(),
            ty: Type::I32,
            dims: vec![6],
            init: vec![1, 0, 0, 2, 0, 0],
        });
        assert_eq!(text, "a:\n  .word 1\n  .zero 8\n  .word 2\n  .zero 8\n");
    }

    #[test]
    fn partial_init_pads_with_zero() {
        let text = render(GlobalVarData {
            name: "a".to_string(),
            ty: Type::I64,
            dims: vec![4],
            init: vec![5],
        });
        assert_eq!(text, "a:\n  .quad 5\n  .zero 24\n");
    }
}
