//! Liveness analysis and live-interval construction.

use crate::ir::Block;
use crate::mir::{MachFunction, MachInst, Reg};
use log::trace;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::{BTreeMap, BTreeSet};

/// A half-open range `[start, end)` of instruction numbers over which a
/// virtual register is live.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Segment {
    /// First instruction number covered.
    pub start: u32,
    /// One past the last instruction number covered.
    pub end: u32,
}

/// The live interval of one virtual register: its segments (sorted and
/// disjoint after `merge`), whether it is live across any call, and the
/// allocation outcome.
#[derive(Clone, Debug)]
pub struct Interval {
    /// A representative reference to the virtual register, carrying its
    /// type.
    pub vreg: Reg,
    /// Live segments.
    pub segs: Vec<Segment>,
    /// Live across at least one call site.
    pub crosses_call: bool,
    /// The physical register assigned, if any.
    pub assignment: Option<u32>,
    /// The spill slot assigned instead, if any.
    pub spill_slot: Option<crate::mir::FrameIndex>,
}

impl Interval {
    fn new(vreg: Reg) -> Self {
        Self {
            vreg,
            segs: Vec::new(),
            crosses_call: false,
            assignment: None,
            spill_slot: None,
        }
    }

    fn add_segment(&mut self, start: u32, end: u32) {
        if start < end {
            self.segs.push(Segment { start, end });
        }
    }

    /// Sort segments and coalesce overlapping or adjacent ones.
    pub fn merge(&mut self) {
        if self.segs.is_empty() {
            return;
        }
        self.segs.sort_by_key(|seg| seg.start);
        let mut merged: Vec<Segment> = Vec::with_capacity(self.segs.len());
        merged.push(self.segs[0]);
        for seg in &self.segs[1..] {
            let last = merged.last_mut().unwrap();
            if seg.start <= last.end {
                last.end = last.end.max(seg.end);
            } else {
                merged.push(*seg);
            }
        }
        self.segs = merged;
    }

    /// First live position.
    pub fn start_point(&self) -> u32 {
        self.segs.first().map(|seg| seg.start).unwrap_or(0)
    }

    /// One past the last live position.
    pub fn end_point(&self) -> u32 {
        self.segs.last().map(|seg| seg.end).unwrap_or(0)
    }

    /// Is `point` inside any segment?
    pub fn covers(&self, point: u32) -> bool {
        self.segs
            .iter()
            .any(|seg| point >= seg.start && point < seg.end)
    }
}

/// The results of liveness analysis over one function.
pub struct Liveness {
    /// Instruction-number range `[start, end)` of each block.
    pub block_range: BTreeMap<Block, (u32, u32)>,
    /// Instruction numbers of call sites.
    pub call_points: BTreeSet<u32>,
    /// Live intervals keyed by virtual register number, within one bank
    /// keyed by the vreg's class (the number space is shared).
    pub intervals: FxHashMap<u32, Interval>,
}

/// Run use/def analysis, the backward liveness dataflow, and interval
/// construction over `func`.
pub fn analyze<I: MachInst>(func: &MachFunction<I>) -> Liveness {
    // 1. Number the instructions, in ascending block order, and remember
    //    the call sites.
    let mut block_range = BTreeMap::new();
    let mut call_points = BTreeSet::new();
    let mut next_id: u32 = 0;
    for (&block, data) in &func.blocks {
        let start = next_id;
        for inst in &data.insts {
            if inst.is_call() {
                call_points.insert(next_id);
            }
            next_id += 1;
        }
        block_range.insert(block, (start, next_id));
    }

    // 2. Per-block USE (read before any local write) and DEF sets.
    let mut use_sets: BTreeMap<Block, FxHashSet<u32>> = BTreeMap::new();
    let mut def_sets: BTreeMap<Block, FxHashSet<u32>> = BTreeMap::new();
    let mut vreg_info: FxHashMap<u32, Reg> = FxHashMap::default();
    for (&block, data) in &func.blocks {
        let mut uses = FxHashSet::default();
        let mut defs = FxHashSet::default();
        for inst in &data.insts {
            inst.each_use(&mut |reg| {
                if reg.is_virtual() {
                    if !defs.contains(&reg.num()) {
                        uses.insert(reg.num());
                    }
                    vreg_info.entry(reg.num()).or_insert(reg);
                }
            });
            inst.each_def(&mut |reg| {
                if reg.is_virtual() {
                    defs.insert(reg.num());
                    vreg_info.entry(reg.num()).or_insert(reg);
                }
            });
        }
        use_sets.insert(block, uses);
        def_sets.insert(block, defs);
    }

    // 3. Backward dataflow to a fixed point:
    //    OUT[B] = union of IN[S]; IN[B] = USE[B] | (OUT[B] - DEF[B]).
    let mut live_in: BTreeMap<Block, FxHashSet<u32>> = use_sets.clone();
    let mut live_out: BTreeMap<Block, FxHashSet<u32>> = BTreeMap::new();
    let blocks: Vec<Block> = func.blocks.keys().copied().collect();
    let mut changed = true;
    while changed {
        changed = false;
        for &block in blocks.iter().rev() {
            let mut new_out: FxHashSet<u32> = FxHashSet::default();
            for succ in func.successors(block) {
                if let Some(in_set) = live_in.get(&succ) {
                    new_out.extend(in_set.iter().copied());
                }
            }
            let mut new_in = use_sets[&block].clone();
            for &reg in &new_out {
                if !def_sets[&block].contains(&reg) {
                    new_in.insert(reg);
                }
            }
            if live_out.get(&block) != Some(&new_out) || live_in[&block] != new_in {
                live_out.insert(block, new_out);
                live_in.insert(block, new_in);
                changed = true;
            }
        }
    }

    // 4. Interval construction: walk each block backwards, tracking the
    //    set of currently-live vregs and where each range ends.
    let mut intervals: FxHashMap<u32, Interval> = FxHashMap::default();
    for (&block, data) in &func.blocks {
        let (block_start, block_end) = block_range[&block];
        let mut live: FxHashSet<u32> = live_out.get(&block).cloned().unwrap_or_default();
        let mut range_end: FxHashMap<u32, u32> = FxHashMap::default();
        for &reg in &live {
            range_end.insert(reg, block_end);
            if let Some(&info) = vreg_info.get(&reg) {
                intervals.entry(reg).or_insert_with(|| Interval::new(info));
            }
        }

        let mut pos = block_end;
        for inst in data.insts.iter().rev() {
            pos -= 1;
            let mut defs: Vec<Reg> = Vec::new();
            let mut uses: Vec<Reg> = Vec::new();
            inst.each_def(&mut |reg| defs.push(reg));
            inst.each_use(&mut |reg| uses.push(reg));

            for def in defs {
                if !def.is_virtual() {
                    continue;
                }
                let interval = intervals
                    .entry(def.num())
                    .or_insert_with(|| Interval::new(def));
                if live.remove(&def.num()) {
                    let end = range_end.remove(&def.num()).unwrap_or(pos + 1);
                    interval.add_segment(pos, end);
                } else {
                    // A dead definition still occupies its register for
                    // one position.
                    interval.add_segment(pos, pos + 1);
                }
            }

            for used in uses {
                if !used.is_virtual() {
                    continue;
                }
                intervals
                    .entry(used.num())
                    .or_insert_with(|| Interval::new(used));
                if live.insert(used.num()) {
                    range_end.insert(used.num(), pos + 1);
                }
            }
        }

        // Whatever is still live here is live into the block.
        for reg in live {
            let end = range_end.get(&reg).copied().unwrap_or(block_end);
            if let Some(interval) = intervals.get_mut(&reg) {
                interval.add_segment(block_start, end);
            }
        }
    }

    for interval in intervals.values_mut() {
        interval.merge();
        interval.crosses_call = call_points.iter().any(|&point| interval.covers(point));
    }
    trace!(
        "liveness: {} intervals, {} call points",
        intervals.len(),
        call_points.len()
    );

    Liveness {
        block_range,
        call_points,
        intervals,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::aarch64::inst::{ALUOp, Inst};
    use crate::isa::aarch64::regs::gpr;
    use crate::mir::{MachFunction, Reg, I32};

    fn single_block_func(insts: Vec<Inst>) -> MachFunction<Inst> {
        let mut func: MachFunction<Inst> = MachFunction::new("t".to_string());
        let b0 = func.create_block();
        func.blocks.get_mut(&b0).unwrap().insts = insts;
        func
    }

    #[test]
    fn straight_line_intervals() {
        let v0 = Reg::virt(0, I32);
        let v1 = Reg::virt(1, I32);
        // 0: v0 = mov w0 ; 1: v1 = add v0, v0 ; 2: mov w0, v1 ; 3: ret
        let func = single_block_func(vec![
            Inst::Mov {
                rd: v0,
                rm: gpr(0, I32),
            },
            Inst::AluRRR {
                op: ALUOp::Add,
                rd: v1,
                rn: v0,
                rm: v0,
            },
            Inst::Mov {
                rd: gpr(0, I32),
                rm: v1,
            },
            Inst::Ret,
        ]);

        let liveness = analyze(&func);
        let i0 = &liveness.intervals[&0];
        let i1 = &liveness.intervals[&1];
        assert_eq!(i0.segs, vec![Segment { start: 0, end: 2 }]);
        assert_eq!(i1.segs, vec![Segment { start: 1, end: 3 }]);
        assert!(!i0.crosses_call);
    }

    #[test]
    fn dead_def_gets_unit_segment() {
        let v0 = Reg::virt(0, I32);
        let func = single_block_func(vec![
            Inst::MovZ { rd: v0, imm16: 1 },
            Inst::Ret,
        ]);
        let liveness = analyze(&func);
        assert_eq!(
            liveness.intervals[&0].segs,
            vec![Segment { start: 0, end: 1 }]
        );
    }

    #[test]
    fn call_crossing_is_marked() {
        let v0 = Reg::virt(0, I32);
        let func = single_block_func(vec![
            Inst::Mov {
                rd: v0,
                rm: gpr(0, I32),
            },
            Inst::Call {
                callee: "g".to_string(),
                uses: Default::default(),
            },
            Inst::Mov {
                rd: gpr(0, I32),
                rm: v0,
            },
            Inst::Ret,
        ]);
        let liveness = analyze(&func);
        assert!(liveness.intervals[&0].crosses_call);
    }
}
