//! Frame lowering: prologue, epilogue, callee-saved spills and spill
//! pseudo expansion.
//!
//! Runs after register allocation, when the set of callee-saved registers
//! the function actually touches is known. The frame, low to high from the
//! post-prologue SP:
//!
//! ```text
//! [outgoing-args area]        <- sp
//! [locals / spill slots]
//! [callee-saved int regs]
//! [callee-saved float regs]
//! [saved FP, saved LR]        <- x29
//! [caller's frame]
//! ```

use crate::isa::aarch64::abi::load_constant;
use crate::isa::aarch64::args::AMode;
use crate::isa::aarch64::imms::{fits_pair_offset, fits_unsigned_imm12};
use crate::isa::aarch64::inst::{ALUOp, Inst};
use crate::isa::aarch64::regs::{
    fp_reg, gpr, fpr, is_callee_saved, link_reg, spilltmp_reg, stack_reg,
};
use crate::isa::aarch64::stack_lowering::expand_spill_access;
use crate::mir::{MachFunction, MachInst, Reg, F64, I64};
use log::debug;
use std::collections::BTreeSet;

/// Lay out the frame of `func` and insert its prologue and epilogues.
pub fn run(func: &mut MachFunction<Inst>) {
    if func.blocks.is_empty() {
        return;
    }

    // Leaf functions (no calls) skip the FP/LR save unless they address
    // incoming stack parameters through the frame pointer.
    let is_leaf = !func
        .blocks
        .values()
        .any(|data| data.insts.iter().any(|inst| inst.is_call()));

    // Which callee-saved registers did allocation end up using?
    let mut used_cs_int: BTreeSet<u32> = BTreeSet::new();
    let mut used_cs_float: BTreeSet<u32> = BTreeSet::new();
    for data in func.blocks.values() {
        for inst in &data.insts {
            let mut note = |reg: Reg| {
                if reg.is_virtual() {
                    return;
                }
                let float = reg.ty().is_float();
                if is_callee_saved(reg.num(), float) {
                    if float {
                        used_cs_float.insert(reg.num());
                    } else {
                        used_cs_int.insert(reg.num());
                    }
                }
            };
            inst.each_use(&mut note);
            inst.each_def(&mut note);
        }
    }
    let cs_int: Vec<u32> = used_cs_int.into_iter().collect();
    let cs_float: Vec<u32> = used_cs_float.into_iter().collect();
    let cs_size = 8 * (cs_int.len() + cs_float.len()) as u32;

    let mut local_size = func.frame.calculate_offsets();
    // The callee-saved area must start 16-byte aligned so the FP/LR pair
    // lands aligned as the ABI requires.
    if (local_size + cs_size) % 16 != 0 {
        local_size += 16 - (local_size + cs_size) % 16;
    }
    let fp_lr_size: u32 = if is_leaf && !func.has_stack_param { 0 } else { 16 };
    let total = (local_size + cs_size + fp_lr_size + 15) & !15;
    func.stack_size = total;
    debug!(
        "frame {}: locals {} + callee-saved {} + fp/lr {} = {} bytes{}",
        func.name,
        local_size,
        cs_size,
        fp_lr_size,
        total,
        if is_leaf { " (leaf)" } else { "" }
    );

    let fp_lr_offset = local_size + cs_size;
    let has_cs_area = !cs_int.is_empty() || !cs_float.is_empty() || fp_lr_size > 0;

    // ---- Prologue ----
    let mut prologue: Vec<Inst> = Vec::new();
    if total > 0 {
        emit_sp_adjust(&mut prologue, ALUOp::Sub, total);
        let base = if has_cs_area {
            emit_cs_base(&mut prologue, local_size, cs_size)
        } else {
            None
        };
        emit_cs_saves(&mut prologue, &cs_int, &cs_float, local_size, base, true);
        if fp_lr_size > 0 {
            prologue.push(Inst::StorePair {
                rt1: fp_reg(),
                rt2: link_reg(),
                mem: cs_mem(base, local_size, fp_lr_offset),
            });
            // Establish the frame pointer at the saved-FP slot.
            if fp_lr_offset == 0 {
                prologue.push(Inst::Mov {
                    rd: fp_reg(),
                    rm: stack_reg(),
                });
            } else if fits_unsigned_imm12(i64::from(fp_lr_offset)) {
                prologue.push(Inst::AluRRImm12 {
                    op: ALUOp::Add,
                    rd: fp_reg(),
                    rn: stack_reg(),
                    imm12: fp_lr_offset,
                });
            } else {
                load_constant(&mut prologue, spilltmp_reg(), fp_lr_offset);
                prologue.push(Inst::AluRRR {
                    op: ALUOp::Add,
                    rd: fp_reg(),
                    rn: stack_reg(),
                    rm: spilltmp_reg(),
                });
            }
        }
    }
    if let Some(entry) = func.entry_block() {
        let data = func.blocks.get_mut(&entry).unwrap();
        data.insts.splice(0..0, prologue);
    }

    // ---- Epilogues, one before every ret ----
    if total > 0 {
        let blocks: Vec<_> = func.blocks.keys().copied().collect();
        for block in blocks {
            let data = func.blocks.get_mut(&block).unwrap();
            let ret_positions: Vec<usize> = data
                .insts
                .iter()
                .enumerate()
                .filter(|(_, inst)| inst.is_ret())
                .map(|(idx, _)| idx)
                .collect();
            for idx in ret_positions.into_iter().rev() {
                let mut epilogue: Vec<Inst> = Vec::new();
                let base = if has_cs_area {
                    emit_cs_base(&mut epilogue, local_size, cs_size)
                } else {
                    None
                };
                if fp_lr_size > 0 {
                    epilogue.push(Inst::LoadPair {
                        rt1: fp_reg(),
                        rt2: link_reg(),
                        mem: cs_mem(base, local_size, fp_lr_offset),
                    });
                }
                emit_cs_saves(&mut epilogue, &cs_int, &cs_float, local_size, base, false);
                emit_sp_adjust(&mut epilogue, ALUOp::Add, total);
                data.insts.splice(idx..idx, epilogue);
            }
        }
    }

    // ---- Spill pseudos become SP-relative accesses ----
    let blocks: Vec<_> = func.blocks.keys().copied().collect();
    for block in blocks {
        let insts = std::mem::take(&mut func.blocks.get_mut(&block).unwrap().insts);
        let mut rewritten = Vec::with_capacity(insts.len());
        for inst in insts {
            match inst {
                Inst::FILoad { .. } | Inst::FIStore { .. } => {
                    expand_spill_access(&func.frame, inst, &mut rewritten)
                }
                other => rewritten.push(other),
            }
        }
        func.blocks.get_mut(&block).unwrap().insts = rewritten;
    }
}

/// `sp = sp +/- amount`, through x16 when the immediate does not fit.
fn emit_sp_adjust(out: &mut Vec<Inst>, op: ALUOp, amount: u32) {
    if fits_unsigned_imm12(i64::from(amount)) {
        out.push(Inst::AluRRImm12 {
            op,
            rd: stack_reg(),
            rn: stack_reg(),
            imm12: amount,
        });
    } else {
        load_constant(out, spilltmp_reg(), amount);
        out.push(Inst::AluRRR {
            op,
            rd: stack_reg(),
            rn: stack_reg(),
            rm: spilltmp_reg(),
        });
    }
}

/// When the callee-saved area sits beyond the `stp`/`ldp` offset range,
/// point x16 at its bottom and address relative to that. Returns the base
/// register to use, or `None` for plain SP addressing.
fn emit_cs_base(out: &mut Vec<Inst>, local_size: u32, cs_size: u32) -> Option<Reg> {
    if fits_pair_offset(i64::from(local_size + cs_size)) {
        return None;
    }
    let tmp = spilltmp_reg();
    if fits_unsigned_imm12(i64::from(local_size)) {
        out.push(Inst::AluRRImm12 {
            op: ALUOp::Add,
            rd: tmp,
            rn: stack_reg(),
            imm12: local_size,
        });
    } else {
        load_constant(out, tmp, local_size);
        out.push(Inst::AluRRR {
            op: ALUOp::Add,
            rd: tmp,
            rn: stack_reg(),
            rm: tmp,
        });
    }
    Some(tmp)
}

/// The addressing mode for a callee-saved slot at `offset` from SP, given
/// the optional rebased pointer from `emit_cs_base`.
fn cs_mem(base: Option<Reg>, base_offset: u32, offset: u32) -> AMode {
    match base {
        Some(reg) => AMode::RegOffset(reg, (offset - base_offset) as i32),
        None => AMode::SPOffset(offset as i32),
    }
}

/// Save (or restore) the used callee-saved registers, pairing adjacent
/// ones into `stp`/`ldp`.
fn emit_cs_saves(
    out: &mut Vec<Inst>,
    cs_int: &[u32],
    cs_float: &[u32],
    base_offset: u32,
    base: Option<Reg>,
    save: bool,
) {
    let mut offset = base_offset;
    let mut emit_bank = |out: &mut Vec<Inst>, regs: &[u32], float: bool| {
        let mk = |num: u32| if float { fpr(num, F64) } else { gpr(num, I64) };
        let mut idx = 0;
        while idx < regs.len() {
            if idx + 1 < regs.len() {
                let (rt1, rt2) = (mk(regs[idx]), mk(regs[idx + 1]));
                let mem = cs_mem(base, base_offset, offset);
                out.push(if save {
                    Inst::StorePair { rt1, rt2, mem }
                } else {
                    Inst::LoadPair { rt1, rt2, mem }
                });
                offset += 16;
                idx += 2;
            } else {
                let rt = mk(regs[idx]);
                let mem = cs_mem(base, base_offset, offset);
                out.push(if save {
                    Inst::Store { rt, mem }
                } else {
                    Inst::Load { rd: rt, mem }
                });
                offset += 8;
                idx += 1;
            }
        }
    };
    emit_bank(out, cs_int, false);
    emit_bank(out, cs_float, true);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::aarch64::regs::gpr;
    use crate::mir::I32;

    fn printed(func: &MachFunction<Inst>) -> Vec<String> {
        func.blocks
            .values()
            .flat_map(|data| data.insts.iter().map(|inst| inst.print("t")))
            .collect()
    }

    #[test]
    fn leaf_with_no_frame_gets_no_prologue() {
        let mut func: MachFunction<Inst> = MachFunction::new("t".to_string());
        let b0 = func.create_block();
        func.blocks.get_mut(&b0).unwrap().insts = vec![
            Inst::MovZ {
                rd: gpr(0, I32),
                imm16: 42,
            },
            Inst::Ret,
        ];
        run(&mut func);
        assert_eq!(func.stack_size, 0);
        assert_eq!(printed(&func), vec!["movz w0, #42", "ret"]);
    }

    #[test]
    fn non_leaf_saves_fp_lr_and_restores_before_ret() {
        let mut func: MachFunction<Inst> = MachFunction::new("t".to_string());
        let b0 = func.create_block();
        func.blocks.get_mut(&b0).unwrap().insts = vec![
            Inst::Call {
                callee: "g".to_string(),
                uses: Default::default(),
            },
            Inst::Ret,
        ];
        run(&mut func);
        let lines = printed(&func);
        assert_eq!(
            lines,
            vec![
                "sub sp, sp, #16",
                "stp x29, x30, [sp, #0]",
                "mov x29, sp",
                "bl g",
                "ldp x29, x30, [sp, #0]",
                "add sp, sp, #16",
                "ret",
            ]
        );
        assert_eq!(func.stack_size, 16);
    }

    #[test]
    fn used_callee_saved_registers_are_paired() {
        let mut func: MachFunction<Inst> = MachFunction::new("t".to_string());
        let b0 = func.create_block();
        func.blocks.get_mut(&b0).unwrap().insts = vec![
            Inst::MovZ {
                rd: gpr(19, I64),
                imm16: 1,
            },
            Inst::MovZ {
                rd: gpr(20, I64),
                imm16: 2,
            },
            Inst::Call {
                callee: "g".to_string(),
                uses: Default::default(),
            },
            Inst::Ret,
        ];
        run(&mut func);
        let lines = printed(&func);
        assert!(lines.contains(&"stp x19, x20, [sp, #0]".to_string()));
        assert!(lines.contains(&"ldp x19, x20, [sp, #0]".to_string()));
        assert!(lines.contains(&"stp x29, x30, [sp, #16]".to_string()));
        assert_eq!(func.stack_size, 32);
    }

    #[test]
    fn large_frame_materializes_size_in_x16() {
        let mut func: MachFunction<Inst> = MachFunction::new("t".to_string());
        func.frame
            .create_local(crate::ir::Value::from_u32(0), 8192, 16);
        let b0 = func.create_block();
        func.blocks.get_mut(&b0).unwrap().insts = vec![Inst::Ret];
        run(&mut func);
        let lines = printed(&func);
        assert_eq!(lines[0], "movz x16, #8192");
        assert_eq!(lines[1], "sub sp, sp, x16");
        // Epilogue mirrors it.
        assert!(lines.contains(&"add sp, sp, x16".to_string()));
    }
}
