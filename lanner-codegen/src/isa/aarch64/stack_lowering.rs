//! Stack-slot lowering: frame indices become SP-relative addressing.
//!
//! Frame lowering resolves the spill pseudos it knows about; this pass
//! sweeps up everything that still carries a frame index (`FrameAddr`
//! address materializations from instruction selection and any residual
//! `FILoad`/`FIStore`) and rewrites it against the final offsets.
//! Running it twice is a no-op: the first run leaves no frame-index
//! operands behind.

use crate::isa::aarch64::abi::load_constant;
use crate::isa::aarch64::args::AMode;
use crate::isa::aarch64::imms::{fits_unsigned_imm12, fits_unsigned_scaled_offset};
use crate::isa::aarch64::inst::{ALUOp, Inst};
use crate::isa::aarch64::regs::{spilltmp_reg, stack_reg};
use crate::mir::{FrameInfo, MachFunction, Reg};

/// Rewrite every frame-index-carrying instruction in `func`.
pub fn run(func: &mut MachFunction<Inst>) {
    // Offsets are final by now; recomputing is harmless and keeps this
    // pass self-contained.
    func.frame.calculate_offsets();

    let blocks: Vec<_> = func.blocks.keys().copied().collect();
    for block in blocks {
        let mut rewritten: Vec<Inst> = Vec::new();
        let insts = std::mem::take(&mut func.blocks.get_mut(&block).unwrap().insts);
        for inst in insts {
            match inst {
                Inst::FILoad { .. } | Inst::FIStore { .. } => {
                    expand_spill_access(&func.frame, inst, &mut rewritten);
                }
                Inst::FrameAddr { rd, fi } => {
                    let offset = func
                        .frame
                        .offset(fi)
                        .expect("frame offsets assigned before stack lowering");
                    expand_frame_addr(rd, i64::from(offset), &mut rewritten);
                }
                other => rewritten.push(other),
            }
        }
        func.blocks.get_mut(&block).unwrap().insts = rewritten;
    }
}

/// Emit `rd = sp + offset`, materializing the offset through x16 when it
/// does not fit an `add` immediate.
pub(crate) fn expand_frame_addr(rd: Reg, offset: i64, out: &mut Vec<Inst>) {
    if fits_unsigned_imm12(offset) {
        out.push(Inst::AluRRImm12 {
            op: ALUOp::Add,
            rd,
            rn: stack_reg(),
            imm12: offset as u32,
        });
    } else {
        let tmp = spilltmp_reg();
        load_constant(out, tmp, offset as u32);
        out.push(Inst::AluRRR {
            op: ALUOp::Add,
            rd,
            rn: stack_reg(),
            rm: tmp,
        });
    }
}

/// Expand a spill-slot access pseudo into a concrete `ldr`/`str`,
/// materializing the offset through x16 when it exceeds the scaled
/// immediate range.
pub(crate) fn expand_spill_access(frame: &FrameInfo, inst: Inst, out: &mut Vec<Inst>) {
    let (reg, fi, is_load) = match inst {
        Inst::FILoad { rd, fi } => (rd, fi, true),
        Inst::FIStore { rt, fi } => (rt, fi, false),
        other => {
            out.push(other);
            return;
        }
    };
    let offset = frame
        .offset(fi)
        .expect("spill slot offset assigned before lowering");
    let offset = i64::from(offset);
    let scale = i64::from(reg.ty().bytes().max(4));

    let mem = if fits_unsigned_scaled_offset(offset, scale) {
        AMode::SPOffset(offset as i32)
    } else {
        let tmp = spilltmp_reg();
        load_constant(out, tmp, offset as u32);
        out.push(Inst::AluRRR {
            op: ALUOp::Add,
            rd: tmp,
            rn: stack_reg(),
            rm: tmp,
        });
        AMode::RegOffset(tmp, 0)
    };
    if is_load {
        out.push(Inst::Load { rd: reg, mem });
    } else {
        out.push(Inst::Store { rt: reg, mem });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Value;
    use crate::isa::aarch64::regs::gpr;
    use crate::mir::{MachFunction, I32, I64};

    #[test]
    fn small_offsets_use_immediate_forms() {
        let mut func: MachFunction<Inst> = MachFunction::new("t".to_string());
        let fi = func.frame.create_local(Value::from_u32(0), 4, 16);
        let slot = func.frame.create_spill_slot(8);
        let b0 = func.create_block();
        func.blocks.get_mut(&b0).unwrap().insts = vec![
            Inst::FrameAddr {
                rd: gpr(0, I64),
                fi,
            },
            Inst::FILoad {
                rd: gpr(1, I32),
                fi: slot,
            },
            Inst::Ret,
        ];

        run(&mut func);
        let insts = &func.blocks[&b0].insts;
        assert_eq!(insts[0].print("t"), "add x0, sp, #0");
        // The 4-byte local is padded to the spill slot's 8-byte alignment.
        assert_eq!(insts[1].print("t"), "ldr w1, [sp, #8]");
        // Idempotence: nothing left to rewrite.
        let before: Vec<String> = insts.iter().map(|i| i.print("t")).collect();
        run(&mut func);
        let after: Vec<String> = func.blocks[&b0].insts.iter().map(|i| i.print("t")).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn large_offsets_go_through_x16() {
        let mut func: MachFunction<Inst> = MachFunction::new("t".to_string());
        // A big array pushes the next object past the immediate range.
        let _big = func.frame.create_local(Value::from_u32(0), 40000, 16);
        let slot = func.frame.create_spill_slot(8);
        let b0 = func.create_block();
        func.blocks.get_mut(&b0).unwrap().insts = vec![
            Inst::FILoad {
                rd: gpr(1, I64),
                fi: slot,
            },
            Inst::Ret,
        ];

        run(&mut func);
        let printed: Vec<String> = func.blocks[&b0]
            .insts
            .iter()
            .map(|inst| inst.print("t"))
            .collect();
        assert_eq!(printed[0], "movz x16, #40000");
        assert_eq!(printed[1], "add x16, sp, x16");
        assert_eq!(printed[2], "ldr x1, [x16, #0]");
    }
}
