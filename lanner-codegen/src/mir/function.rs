//! Machine functions and blocks.

use crate::entity::EntityRef;
use crate::ir::Block;
use crate::mir::frame::FrameInfo;
use crate::mir::inst::MachInst;
use crate::mir::reg::Reg;
use crate::mir::types::DataType;
use smallvec::SmallVec;
use std::collections::BTreeMap;

/// A machine basic block: a straight-line instruction sequence.
#[derive(Clone, Debug)]
pub struct MachBlockData<I> {
    /// The instructions, in program order. The final instruction of a
    /// well-formed block is its terminator.
    pub insts: Vec<I>,
}

impl<I> Default for MachBlockData<I> {
    fn default() -> Self {
        Self { insts: Vec::new() }
    }
}

/// A function in machine form.
///
/// Blocks are keyed by the same `Block` numbers as the IR function they
/// were selected from; passes that introduce blocks (critical-edge
/// splitting) take numbers above every existing block. Iteration over the
/// map is in ascending block order, and the entry block is the lowest
/// number.
#[derive(Clone, Debug)]
pub struct MachFunction<I> {
    /// Symbol name.
    pub name: String,
    /// The blocks, keyed and ordered by block number.
    pub blocks: BTreeMap<Block, MachBlockData<I>>,
    /// Virtual registers holding the incoming parameters.
    pub params: Vec<Reg>,
    /// The stack frame table.
    pub frame: FrameInfo,
    /// Total frame size in bytes, set by frame lowering.
    pub stack_size: u32,
    /// Whether any incoming parameter is passed on the stack. Forces frame
    /// pointer establishment even in leaf functions.
    pub has_stack_param: bool,
    next_vreg: u32,
}

impl<I: MachInst> MachFunction<I> {
    /// Create an empty machine function.
    pub fn new(name: String) -> Self {
        Self {
            name,
            blocks: BTreeMap::new(),
            params: Vec::new(),
            frame: FrameInfo::new(),
            stack_size: 0,
            has_stack_param: false,
            next_vreg: 0,
        }
    }

    /// Mint a fresh virtual register of type `ty`.
    pub fn make_vreg(&mut self, ty: DataType) -> Reg {
        let num = self.next_vreg;
        self.next_vreg += 1;
        Reg::virt(num, ty)
    }

    /// Ensure a block with the given number exists and return it.
    pub fn ensure_block(&mut self, block: Block) -> Block {
        self.blocks.entry(block).or_default();
        block
    }

    /// Create a new block numbered above every existing block.
    pub fn create_block(&mut self) -> Block {
        let next = self
            .blocks
            .keys()
            .next_back()
            .map(|b| b.index() + 1)
            .unwrap_or(0);
        let block = Block::new(next);
        self.blocks.insert(block, MachBlockData::default());
        block
    }

    /// The entry block: the block with the lowest number.
    pub fn entry_block(&self) -> Option<Block> {
        self.blocks.keys().next().copied()
    }

    /// The successors of `block`: every branch target that appears in it.
    pub fn successors(&self, block: Block) -> SmallVec<[Block; 2]> {
        let mut succs: SmallVec<[Block; 2]> = SmallVec::new();
        if let Some(data) = self.blocks.get(&block) {
            for inst in &data.insts {
                for target in inst.branch_targets() {
                    if !succs.contains(&target) {
                        succs.push(target);
                    }
                }
            }
        }
        succs
    }

    /// The predecessor map of the whole function.
    pub fn predecessors(&self) -> BTreeMap<Block, Vec<Block>> {
        let mut preds: BTreeMap<Block, Vec<Block>> = BTreeMap::new();
        for &block in self.blocks.keys() {
            preds.entry(block).or_default();
        }
        for &block in self.blocks.keys() {
            for succ in self.successors(block) {
                preds.entry(succ).or_default().push(block);
            }
        }
        preds
    }
}
