//! Linear-scan register allocation and spill-code rewriting.

use crate::mir::{FrameInfo, MachFunction, MachInst, Reg, RegClass};
use crate::regalloc::liveness::{analyze, Interval};
use crate::regalloc::RegBankInfo;
use log::debug;
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;

/// Allocate registers for `func` and rewrite it so no virtual register
/// remains: every use and def becomes a physical register, with spill
/// reloads/stores inserted around instructions that touch spilled values.
pub fn allocate<I: MachInst>(func: &mut MachFunction<I>, banks: &RegBankInfo) {
    if func.blocks.is_empty() {
        return;
    }

    let liveness = analyze(func);
    let mut intervals = liveness.intervals;

    // Reserve the two highest allocatable registers of each bank as
    // scratch for the spill rewriter.
    let mut int_regs = banks.int_regs.clone();
    let mut float_regs = banks.float_regs.clone();
    let mut int_scratch = Vec::new();
    let mut float_scratch = Vec::new();
    for _ in 0..2 {
        if let Some(reg) = int_regs.pop() {
            int_scratch.push(reg);
        }
        if let Some(reg) = float_regs.pop() {
            float_scratch.push(reg);
        }
    }

    // Split the intervals by bank and scan each separately.
    let mut int_keys: Vec<u32> = Vec::new();
    let mut float_keys: Vec<u32> = Vec::new();
    for (&num, interval) in &intervals {
        if interval.segs.is_empty() {
            continue;
        }
        match interval.vreg.class() {
            RegClass::Float => float_keys.push(num),
            RegClass::Int => int_keys.push(num),
        }
    }

    scan_bank(
        &mut intervals,
        int_keys,
        &int_regs,
        &banks.callee_saved_int,
        &mut func.frame,
    );
    scan_bank(
        &mut intervals,
        float_keys,
        &float_regs,
        &banks.callee_saved_float,
        &mut func.frame,
    );

    let spills = intervals
        .values()
        .filter(|interval| interval.spill_slot.is_some())
        .count();
    debug!(
        "regalloc {}: {} intervals, {} spilled",
        func.name,
        intervals.len(),
        spills
    );

    rewrite(func, &intervals, &int_scratch, &float_scratch);
}

/// One linear scan over the intervals of a single register bank.
///
/// `keys` selects the intervals; they are sorted by start position. The
/// `active` list is kept ordered by interval end point.
fn scan_bank(
    intervals: &mut FxHashMap<u32, Interval>,
    mut keys: Vec<u32>,
    allocatable: &[u32],
    callee_saved: &[u32],
    frame: &mut FrameInfo,
) {
    let callee_saved: BTreeSet<u32> = callee_saved.iter().copied().collect();
    keys.sort_by_key(|&num| (intervals[&num].start_point(), num));

    // (end point, vreg num) of intervals currently holding a register.
    let mut active: Vec<(u32, u32)> = Vec::new();
    let mut free_regs: BTreeSet<u32> = allocatable.iter().copied().collect();

    for &num in &keys {
        let cur_start = intervals[&num].start_point();
        let crosses_call = intervals[&num].crosses_call;

        // Expire intervals that ended before this one starts.
        active.retain(|&(end, act)| {
            if end <= cur_start {
                let reg = intervals[&act].assignment.expect("active interval has reg");
                free_regs.insert(reg);
                false
            } else {
                true
            }
        });

        // Pick a register. A call-crossing interval takes only a
        // callee-saved register (or none, and spills below): anything held
        // in a caller-saved register would be clobbered by the call.
        // Everything else prefers caller-saved to keep the prologue small.
        let selected = if crosses_call {
            free_regs
                .iter()
                .copied()
                .find(|reg| callee_saved.contains(reg))
        } else {
            free_regs
                .iter()
                .copied()
                .find(|reg| !callee_saved.contains(reg))
                .or_else(|| free_regs.iter().next().copied())
        };

        if let Some(reg) = selected {
            intervals.get_mut(&num).unwrap().assignment = Some(reg);
            free_regs.remove(&reg);
            let end = intervals[&num].end_point();
            let pos = active.partition_point(|&(e, _)| e < end);
            active.insert(pos, (end, num));
            continue;
        }

        // Nothing free: spill the interval that ends last, but never steal
        // a caller-saved register for a call-crossing interval.
        let mut candidate = num;
        let mut candidate_end = intervals[&num].end_point();
        for &(end, act) in &active {
            let act_reg = intervals[&act].assignment.expect("active interval has reg");
            if crosses_call && !callee_saved.contains(&act_reg) {
                continue;
            }
            if end > candidate_end {
                candidate_end = end;
                candidate = act;
            }
        }

        if candidate == num {
            let slot = frame.create_spill_slot(8);
            intervals.get_mut(&num).unwrap().spill_slot = Some(slot);
        } else {
            let stolen = intervals[&candidate].assignment.expect("candidate has reg");
            let slot = frame.create_spill_slot(8);
            {
                let victim = intervals.get_mut(&candidate).unwrap();
                victim.assignment = None;
                victim.spill_slot = Some(slot);
            }
            intervals.get_mut(&num).unwrap().assignment = Some(stolen);
            active.retain(|&(_, act)| act != candidate);
            let end = intervals[&num].end_point();
            let pos = active.partition_point(|&(e, _)| e < end);
            active.insert(pos, (end, num));
        }
    }
}

/// Rewrite every instruction: substitute assigned physical registers,
/// insert reloads before spilled uses and stores after spilled defs, and
/// drop the self-moves this leaves behind.
fn rewrite<I: MachInst>(
    func: &mut MachFunction<I>,
    intervals: &FxHashMap<u32, Interval>,
    int_scratch: &[u32],
    float_scratch: &[u32],
) {
    let blocks: Vec<_> = func.blocks.keys().copied().collect();
    for block in blocks {
        let data = func.blocks.get_mut(&block).unwrap();
        let mut idx = 0usize;
        while idx < data.insts.len() {
            let mut uses: Vec<Reg> = Vec::new();
            let mut defs: Vec<Reg> = Vec::new();
            data.insts[idx].each_use(&mut |reg| uses.push(reg));
            data.insts[idx].each_def(&mut |reg| defs.push(reg));

            let mut reloads: Vec<I> = Vec::new();
            let mut spills: Vec<I> = Vec::new();
            let mut use_map: FxHashMap<u32, Reg> = FxHashMap::default();
            let mut def_map: FxHashMap<u32, Reg> = FxHashMap::default();
            let mut int_reload_count = 0usize;
            let mut float_reload_count = 0usize;

            for used in uses {
                if !used.is_virtual() || use_map.contains_key(&used.num()) {
                    continue;
                }
                let Some(interval) = intervals.get(&used.num()) else {
                    continue;
                };
                if let Some(phys) = interval.assignment {
                    use_map.insert(used.num(), Reg::real(phys, used.ty()));
                } else if let Some(slot) = interval.spill_slot {
                    // Reload through a scratch register; round-robin so
                    // two spilled uses in one instruction do not collide.
                    let scratch = if used.class() == RegClass::Float {
                        let regs = float_scratch;
                        assert!(!regs.is_empty(), "no float scratch register available");
                        let reg = regs[float_reload_count % regs.len()];
                        float_reload_count += 1;
                        reg
                    } else {
                        let regs = int_scratch;
                        assert!(!regs.is_empty(), "no int scratch register available");
                        let reg = regs[int_reload_count % regs.len()];
                        int_reload_count += 1;
                        reg
                    };
                    let scratch = Reg::real(scratch, used.ty());
                    reloads.push(I::gen_reload(scratch, slot));
                    use_map.insert(used.num(), scratch);
                }
            }

            for def in defs {
                if !def.is_virtual() || def_map.contains_key(&def.num()) {
                    continue;
                }
                let Some(interval) = intervals.get(&def.num()) else {
                    continue;
                };
                if let Some(phys) = interval.assignment {
                    def_map.insert(def.num(), Reg::real(phys, def.ty()));
                } else if let Some(slot) = interval.spill_slot {
                    let scratch = if def.class() == RegClass::Float {
                        assert!(!float_scratch.is_empty(), "no float scratch register");
                        float_scratch[0]
                    } else {
                        assert!(!int_scratch.is_empty(), "no int scratch register");
                        int_scratch[0]
                    };
                    let scratch = Reg::real(scratch, def.ty());
                    def_map.insert(def.num(), scratch);
                    spills.push(I::gen_spill(scratch, slot));
                }
            }

            data.insts[idx].map_uses(&mut |reg| {
                if reg.is_virtual() {
                    use_map.get(&reg.num()).copied().unwrap_or(reg).with_ty(reg.ty())
                } else {
                    reg
                }
            });
            data.insts[idx].map_defs(&mut |reg| {
                if reg.is_virtual() {
                    def_map.get(&reg.num()).copied().unwrap_or(reg).with_ty(reg.ty())
                } else {
                    reg
                }
            });

            let n_reloads = reloads.len();
            let n_spills = spills.len();
            data.insts.splice(idx..idx, reloads);
            idx += n_reloads;
            data.insts.splice(idx + 1..idx + 1, spills);

            // Coalescing fallout: `mov x, x` says nothing, drop it.
            if let Some((dst, src)) = data.insts[idx].as_move() {
                if dst.same_reg(src) {
                    data.insts.remove(idx);
                    idx += n_spills;
                    continue;
                }
            }
            idx += 1 + n_spills;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::aarch64::inst::{ALUOp, Inst};
    use crate::isa::aarch64::regs::gpr;
    use crate::mir::{MachFunction, I32};

    fn banks(int_regs: Vec<u32>, callee: Vec<u32>) -> RegBankInfo {
        RegBankInfo {
            int_regs,
            float_regs: vec![28, 29, 30, 31],
            callee_saved_int: callee,
            callee_saved_float: vec![],
        }
    }

    fn count_vregs(func: &MachFunction<Inst>) -> usize {
        let mut n = 0;
        for data in func.blocks.values() {
            for inst in &data.insts {
                inst.each_use(&mut |reg| {
                    if reg.is_virtual() {
                        n += 1;
                    }
                });
                inst.each_def(&mut |reg| {
                    if reg.is_virtual() {
                        n += 1;
                    }
                });
            }
        }
        n
    }

    #[test]
    fn simple_allocation_removes_vregs() {
        let mut func: MachFunction<Inst> = MachFunction::new("t".to_string());
        let v0 = func.make_vreg(I32);
        let v1 = func.make_vreg(I32);
        let b0 = func.create_block();
        func.blocks.get_mut(&b0).unwrap().insts = vec![
            Inst::MovZ { rd: v0, imm16: 1 },
            Inst::MovZ { rd: v1, imm16: 2 },
            Inst::AluRRR {
                op: ALUOp::Add,
                rd: v0,
                rn: v0,
                rm: v1,
            },
            Inst::Mov {
                rd: gpr(0, I32),
                rm: v0,
            },
            Inst::Ret,
        ];

        // Plenty of registers: nothing spills.
        allocate(&mut func, &banks(vec![0, 1, 2, 3, 4, 5], vec![4, 5]));
        assert_eq!(count_vregs(&func), 0);
        assert_eq!(func.frame.object_count(), 0);
    }

    #[test]
    fn pressure_forces_spill_and_reload() {
        let mut func: MachFunction<Inst> = MachFunction::new("t".to_string());
        // Four values live at once, with only one allocatable register
        // after the two scratch registers are carved from {0, 1, 2}.
        let vregs: Vec<Reg> = (0..4).map(|_| func.make_vreg(I32)).collect();
        let b0 = func.create_block();
        let mut insts: Vec<Inst> = vregs
            .iter()
            .enumerate()
            .map(|(i, &v)| Inst::MovZ {
                rd: v,
                imm16: i as u32,
            })
            .collect();
        // Use them all afterwards so every interval spans the block.
        let mut acc = vregs[0];
        for &v in &vregs[1..] {
            insts.push(Inst::AluRRR {
                op: ALUOp::Add,
                rd: acc,
                rn: acc,
                rm: v,
            });
            acc = v;
        }
        insts.push(Inst::Ret);
        func.blocks.get_mut(&b0).unwrap().insts = insts;

        allocate(&mut func, &banks(vec![0, 1, 2], vec![]));
        assert_eq!(count_vregs(&func), 0);
        // At least one interval spilled to the frame.
        assert!(func.frame.object_count() > 0);
        let has_reload = func.blocks[&b0]
            .insts
            .iter()
            .any(|inst| matches!(inst, Inst::FILoad { .. }));
        let has_spill = func.blocks[&b0]
            .insts
            .iter()
            .any(|inst| matches!(inst, Inst::FIStore { .. }));
        assert!(has_reload && has_spill);
    }

    #[test]
    fn call_crossing_interval_gets_callee_saved_reg() {
        let mut func: MachFunction<Inst> = MachFunction::new("t".to_string());
        let v0 = func.make_vreg(I32);
        let b0 = func.create_block();
        func.blocks.get_mut(&b0).unwrap().insts = vec![
            Inst::MovZ { rd: v0, imm16: 7 },
            Inst::Call {
                callee: "g".to_string(),
                uses: Default::default(),
            },
            Inst::Mov {
                rd: gpr(0, I32),
                rm: v0,
            },
            Inst::Ret,
        ];

        allocate(&mut func, &banks(vec![0, 1, 19, 20, 21, 22], vec![19, 20]));
        let assigned = func.blocks[&b0]
            .insts
            .iter()
            .find_map(|inst| match inst {
                Inst::MovZ { rd, .. } => Some(*rd),
                _ => None,
            })
            .unwrap();
        assert!(!assigned.is_virtual());
        assert_eq!(assigned.num(), 19);
    }
}
