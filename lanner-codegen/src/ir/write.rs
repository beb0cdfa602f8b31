//! Converting IR modules to text.
//!
//! The format produced here is the same one `lanner-reader` parses, so a
//! printed module can be fed back through the pipeline.

use crate::ir::{Function, GlobalVarData, InstructionData, Module, Operand, Signature, Type};
use core::fmt::{self, Write};

/// Write `module` as text.
pub fn write_module(w: &mut dyn Write, module: &Module) -> fmt::Result {
    for global in module.globals.values() {
        write_global(w, global)?;
    }
    if !module.globals.is_empty() {
        writeln!(w)?;
    }
    for sig in &module.declarations {
        write!(w, "declare {} @{}(", sig.ret, sig.name)?;
        write_type_list(w, &sig.params)?;
        writeln!(w, ")")?;
    }
    for func in &module.functions {
        writeln!(w)?;
        write_function(w, module, func)?;
    }
    Ok(())
}

fn write_global(w: &mut dyn Write, global: &GlobalVarData) -> fmt::Result {
    write!(w, "global @{} : ", global.name)?;
    write_pointee(w, global.ty, &global.dims)?;
    if !global.init.is_empty() {
        if global.is_scalar() {
            write!(w, " = {}", global.init[0])?;
        } else {
            write!(w, " = {{ ")?;
            for (i, v) in global.init.iter().enumerate() {
                if i != 0 {
                    write!(w, ", ")?;
                }
                write!(w, "{v}")?;
            }
            write!(w, " }}")?;
        }
    }
    writeln!(w)
}

fn write_pointee(w: &mut dyn Write, ty: Type, dims: &[u32]) -> fmt::Result {
    if !dims.is_empty() {
        write!(w, "[")?;
        for (i, d) in dims.iter().enumerate() {
            if i != 0 {
                write!(w, " x ")?;
            }
            write!(w, "{d}")?;
        }
        write!(w, "] ")?;
    }
    write!(w, "{ty}")
}

fn write_type_list(w: &mut dyn Write, types: &[Type]) -> fmt::Result {
    for (i, ty) in types.iter().enumerate() {
        if i != 0 {
            write!(w, ", ")?;
        }
        write!(w, "{ty}")?;
    }
    Ok(())
}

fn write_function(w: &mut dyn Write, module: &Module, func: &Function) -> fmt::Result {
    let Signature { name, ret, params } = &func.sig;
    write!(w, "define {ret} @{name}(")?;
    for (i, (ty, val)) in params.iter().zip(&func.params).enumerate() {
        if i != 0 {
            write!(w, ", ")?;
        }
        write!(w, "{ty} %{val}")?;
    }
    writeln!(w, ") {{")?;
    for (block, data) in func.blocks.iter() {
        writeln!(w, "{block}:")?;
        for inst in &data.insts {
            write!(w, "  ")?;
            write_instruction(w, module, inst)?;
            writeln!(w)?;
        }
    }
    writeln!(w, "}}")
}

fn op(module: &Module, operand: Operand) -> String {
    match operand {
        Operand::Value(v) => format!("%{v}"),
        Operand::Iconst(imm) => format!("{imm}"),
        Operand::Fconst(imm) => format!("{imm:?}"),
        Operand::Global(gv) => format!("@{}", module.globals[gv].name),
    }
}

fn write_instruction(w: &mut dyn Write, module: &Module, inst: &InstructionData) -> fmt::Result {
    match inst {
        InstructionData::Alloca { result, ty, dims } => {
            write!(w, "%{result} = alloca ")?;
            write_pointee(w, *ty, dims)
        }
        InstructionData::Load { result, ty, ptr } => {
            write!(w, "%{result} = load {ty}, ptr {}", op(module, *ptr))
        }
        InstructionData::Store { ty, value, ptr } => {
            write!(w, "store {ty} {}, ptr {}", op(module, *value), op(module, *ptr))
        }
        InstructionData::Binary {
            op: binop,
            ty,
            result,
            lhs,
            rhs,
        } => write!(
            w,
            "%{result} = {} {ty} {}, {}",
            binop.mnemonic(),
            op(module, *lhs),
            op(module, *rhs)
        ),
        InstructionData::IntCompare {
            cond,
            result,
            lhs,
            rhs,
        } => write!(
            w,
            "%{result} = icmp {cond} i32 {}, {}",
            op(module, *lhs),
            op(module, *rhs)
        ),
        InstructionData::FloatCompare {
            cond,
            result,
            lhs,
            rhs,
        } => write!(
            w,
            "%{result} = fcmp {cond} f32 {}, {}",
            op(module, *lhs),
            op(module, *rhs)
        ),
        InstructionData::Branch { dest } => write!(w, "br label %{dest}"),
        InstructionData::BranchCond {
            cond,
            then_dest,
            else_dest,
        } => write!(
            w,
            "br i1 {}, label %{then_dest}, label %{else_dest}",
            op(module, *cond)
        ),
        InstructionData::Phi { result, ty, args } => {
            write!(w, "%{result} = phi {ty} ")?;
            for (i, (block, value)) in args.iter().enumerate() {
                if i != 0 {
                    write!(w, ", ")?;
                }
                write!(w, "[ {}, %{block} ]", op(module, *value))?;
            }
            Ok(())
        }
        InstructionData::Call {
            result,
            ret_ty,
            callee,
            args,
        } => {
            if let Some(result) = result {
                write!(w, "%{result} = ")?;
            }
            write!(w, "call {ret_ty} @{callee}(")?;
            for (i, (ty, arg)) in args.iter().enumerate() {
                if i != 0 {
                    write!(w, ", ")?;
                }
                write!(w, "{ty} {}", op(module, *arg))?;
            }
            write!(w, ")")
        }
        InstructionData::Return { value } => match value {
            Some((ty, operand)) => write!(w, "ret {ty} {}", op(module, *operand)),
            None => write!(w, "ret void"),
        },
        InstructionData::GetElementPtr {
            result,
            elem_ty,
            base,
            dims,
            indices,
        } => {
            write!(w, "%{result} = getelementptr ")?;
            write_pointee(w, *elem_ty, dims)?;
            write!(w, ", ptr {}", op(module, *base))?;
            for index in indices {
                write!(w, ", i32 {}", op(module, *index))?;
            }
            Ok(())
        }
        InstructionData::Zext {
            result,
            from,
            to,
            arg,
        } => write!(w, "%{result} = zext {from} {} to {to}", op(module, *arg)),
        InstructionData::SiToFp { result, arg } => {
            write!(w, "%{result} = sitofp i32 {} to f32", op(module, *arg))
        }
        InstructionData::FpToSi { result, arg } => {
            write!(w, "%{result} = fptosi f32 {} to i32", op(module, *arg))
        }
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write_module(f, self)
    }
}
