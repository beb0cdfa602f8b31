//! Phi elimination.
//!
//! Runs before register allocation. Each phi turns into explicit copies on
//! its incoming edges: critical edges get a fresh forwarding block so the
//! copies cannot leak onto a sibling path, and the copies for one edge are
//! scheduled as a parallel copy group (a copy must not overwrite a source
//! another pending copy still reads; cycles break through a fresh
//! temporary).

use crate::ir::Block;
use crate::isa::aarch64::abi::load_constant;
use crate::isa::aarch64::inst::{Inst, PhiSrc};
use crate::mir::{MachFunction, MachInst, Reg};
use log::trace;

/// Eliminate all phi pseudo-instructions in `func`.
///
/// Running this twice is a no-op: the second run finds no phis.
pub fn run(func: &mut MachFunction<Inst>) {
    let blocks: Vec<Block> = func.blocks.keys().copied().collect();
    let preds = func.predecessors();

    for &block in &blocks {
        let phis: Vec<(Reg, Vec<(Block, PhiSrc)>)> = func.blocks[&block]
            .insts
            .iter()
            .filter_map(|inst| match inst {
                Inst::Phi { rd, srcs } => Some((*rd, srcs.clone())),
                _ => None,
            })
            .collect();
        if phis.is_empty() {
            continue;
        }
        trace!("phi elimination: {} phis in {block}", phis.len());

        // Where to put the copies for each incoming edge: directly in the
        // predecessor when this block is its only successor, otherwise in
        // a fresh block spliced into the edge.
        let mut edges: Vec<(Block, Block)> = Vec::new(); // (insertion block, original pred)
        for &pred in preds.get(&block).map(|v| v.as_slice()).unwrap_or(&[]) {
            if func.successors(pred).len() > 1 {
                let edge_block = func.create_block();
                for inst in &mut func.blocks.get_mut(&pred).unwrap().insts {
                    inst.retarget_branch(block, edge_block);
                }
                func.blocks
                    .get_mut(&edge_block)
                    .unwrap()
                    .insts
                    .push(Inst::Jump { dest: block });
                edges.push((edge_block, pred));
            } else {
                edges.push((pred, pred));
            }
        }

        for (insert_block, orig_pred) in edges {
            let mut copies: Vec<(Reg, PhiSrc)> = Vec::new();
            for (rd, srcs) in &phis {
                if let Some((_, src)) = srcs.iter().find(|(pred, _)| *pred == orig_pred) {
                    copies.push((*rd, *src));
                }
            }
            if copies.is_empty() {
                continue;
            }
            let seq = sequence_parallel_copies(func, copies);

            // Copies go immediately before the block's first branch.
            let data = func.blocks.get_mut(&insert_block).unwrap();
            let at = data
                .insts
                .iter()
                .position(|inst| !inst.branch_targets().is_empty())
                .unwrap_or(data.insts.len());
            data.insts.splice(at..at, seq);
        }

        func.blocks
            .get_mut(&block)
            .unwrap()
            .insts
            .retain(|inst| !matches!(inst, Inst::Phi { .. }));
    }
}

/// Order a parallel copy group so that no copy clobbers a value a later
/// copy still needs, breaking cycles with a fresh temporary.
fn sequence_parallel_copies(
    func: &mut MachFunction<Inst>,
    mut moves: Vec<(Reg, PhiSrc)>,
) -> Vec<Inst> {
    let mut out: Vec<Inst> = Vec::new();

    while !moves.is_empty() {
        let mut progressed = false;

        let mut i = 0;
        while i < moves.len() {
            let (dst, src) = moves[i];
            // A copy may fire only once no pending copy still reads its
            // destination.
            let dst_still_read = moves.iter().enumerate().any(|(j, (_, pending))| {
                j != i && matches!(pending, PhiSrc::Reg(reg) if reg.same_reg(dst))
            });
            if dst_still_read {
                i += 1;
                continue;
            }
            match src {
                PhiSrc::Reg(src_reg) if src_reg.same_reg(dst) => {}
                PhiSrc::Reg(src_reg) => out.push(Inst::Mov {
                    rd: dst,
                    rm: src_reg,
                }),
                PhiSrc::Imm(imm) => load_constant(&mut out, dst, imm as u32),
            }
            moves.remove(i);
            progressed = true;
        }

        if !progressed && !moves.is_empty() {
            // Only cycles remain. Break one: copy a source aside, then
            // redirect every pending read of it to the temporary.
            let src_reg = moves
                .iter()
                .find_map(|(_, src)| match src {
                    PhiSrc::Reg(reg) => Some(*reg),
                    PhiSrc::Imm(_) => None,
                })
                .expect("a stuck parallel copy group contains a register cycle");
            let tmp = func.make_vreg(src_reg.ty());
            out.push(Inst::Mov {
                rd: tmp,
                rm: src_reg,
            });
            for (_, pending) in &mut moves {
                if let PhiSrc::Reg(reg) = pending {
                    if reg.same_reg(src_reg) {
                        *pending = PhiSrc::Reg(tmp);
                    }
                }
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mir::I32;

    #[test]
    fn two_cycle_breaks_with_one_temp_and_three_moves() {
        let mut func: MachFunction<Inst> = MachFunction::new("t".to_string());
        let a = func.make_vreg(I32);
        let b = func.make_vreg(I32);
        let seq =
            sequence_parallel_copies(&mut func, vec![(a, PhiSrc::Reg(b)), (b, PhiSrc::Reg(a))]);
        assert_eq!(seq.len(), 3);
        // tmp <- src ; then the two cycle members resolve.
        let Inst::Mov { rd: tmp, rm: first_src } = &seq[0] else {
            panic!("expected a move");
        };
        assert!(tmp.is_virtual());
        assert!(first_src.same_reg(b) || first_src.same_reg(a));
    }

    #[test]
    fn chain_orders_before_overwrite() {
        let mut func: MachFunction<Inst> = MachFunction::new("t".to_string());
        let a = func.make_vreg(I32);
        let b = func.make_vreg(I32);
        let c = func.make_vreg(I32);
        // a <- b, b <- c: must emit a <- b first.
        let seq =
            sequence_parallel_copies(&mut func, vec![(b, PhiSrc::Reg(c)), (a, PhiSrc::Reg(b))]);
        assert_eq!(seq.len(), 2);
        let Inst::Mov { rd, .. } = &seq[0] else {
            panic!("expected a move");
        };
        assert!(rd.same_reg(a));
    }

    #[test]
    fn immediate_sources_become_constant_loads() {
        let mut func: MachFunction<Inst> = MachFunction::new("t".to_string());
        let a = func.make_vreg(I32);
        let seq = sequence_parallel_copies(&mut func, vec![(a, PhiSrc::Imm(70000))]);
        // movz + movk for a value above 16 bits.
        assert_eq!(seq.len(), 2);
    }

    #[test]
    fn critical_edge_is_split() {
        use crate::isa::aarch64::args::Cond;
        // block0 conditionally branches to block1 and block2; block1 has a
        // phi with an incoming value from block0, so that edge is critical.
        let mut func: MachFunction<Inst> = MachFunction::new("t".to_string());
        let v = func.make_vreg(I32);
        let x = func.make_vreg(I32);
        let b0 = func.create_block();
        let b1 = func.create_block();
        let b2 = func.create_block();
        func.blocks.get_mut(&b0).unwrap().insts = vec![
            Inst::CondBr {
                cond: Cond::Ne,
                dest: b1,
            },
            Inst::Jump { dest: b2 },
        ];
        func.blocks.get_mut(&b1).unwrap().insts = vec![
            Inst::Phi {
                rd: v,
                srcs: vec![(b0, PhiSrc::Reg(x))],
            },
            Inst::Ret,
        ];
        func.blocks.get_mut(&b2).unwrap().insts = vec![Inst::Ret];

        run(&mut func);

        // A new block was inserted and the conditional branch retargeted.
        assert_eq!(func.blocks.len(), 4);
        let edge_block = *func.blocks.keys().last().unwrap();
        assert!(func.successors(b0).contains(&edge_block));
        assert!(!func.successors(b0).contains(&b1));
        assert!(func.successors(edge_block).contains(&b1));
        // The copy lives in the edge block, before its jump.
        let edge_insts = &func.blocks[&edge_block].insts;
        assert!(matches!(edge_insts[0], Inst::Mov { .. }));
        assert!(matches!(edge_insts[1], Inst::Jump { .. }));
        // No phi remains; a second run changes nothing.
        let before: usize = func.blocks.values().map(|b| b.insts.len()).sum();
        run(&mut func);
        let after: usize = func.blocks.values().map(|b| b.insts.len()).sum();
        assert_eq!(before, after);
    }
}
