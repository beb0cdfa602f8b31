//! The selection DAG.
//!
//! Per function, instruction selection can build a directed acyclic graph
//! whose nodes are computations and whose `TOKEN`-typed chain edges pin
//! down the order of side effects. Node creation is routed through a
//! folding set keyed on the structural identity of the node, so identical
//! computations share one node: this is the DAG's (and the backend's only)
//! common-subexpression elimination.

mod builder;
mod isd;
mod node;

pub use self::builder::DagBuilder;
pub use self::isd::Opcode;
pub use self::node::{NodeKey, SDNode, SDNodeData, SDValue};

use crate::entity::PrimaryMap;
use crate::ir::{Block, Value};
use crate::mir::{DataType, FrameIndex, PTR};
use rustc_hash::FxHashMap;
use smallvec::{smallvec, SmallVec};

/// A function's worth of DAG nodes plus the folding set that dedupes them.
///
/// Nodes are only created, never destroyed; the arena is dropped wholesale
/// with the DAG once instruction selection is done with it.
#[derive(Default)]
pub struct SelectionDag {
    nodes: PrimaryMap<SDNode, SDNodeData>,
    folding_set: FxHashMap<NodeKey, SDNode>,
}

impl SelectionDag {
    /// Create an empty DAG.
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of nodes in the DAG.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Access a node's data.
    pub fn node(&self, node: SDNode) -> &SDNodeData {
        &self.nodes[node]
    }

    /// Iterate over all nodes in creation order.
    pub fn iter(&self) -> impl Iterator<Item = (SDNode, &SDNodeData)> + '_ {
        self.nodes.iter()
    }

    /// The key that the next created node will get. Together with a later
    /// `node_count` this delimits the nodes created in between.
    pub fn next_node(&self) -> SDNode {
        self.nodes.next_key()
    }

    /// Drop the folding-set entries accumulated so far.
    ///
    /// CSE sharing is block-scoped: a computation from one block must not
    /// satisfy a structurally identical request from a sibling block,
    /// since neither dominates the other. The node arena itself is
    /// per-function and survives; values crossing blocks do so through
    /// their recorded IR definitions.
    pub fn reset_cse(&mut self) {
        self.folding_set.clear();
    }

    /// Probe the folding set for a structurally identical node; insert and
    /// return a new one if none exists.
    fn intern(&mut self, data: SDNodeData) -> SDValue {
        let key = data.profile();
        if let Some(&existing) = self.folding_set.get(&key) {
            return SDValue::new(existing, 0);
        }
        let node = self.nodes.push(data);
        self.folding_set.insert(key, node);
        SDValue::new(node, 0)
    }

    /// Get or create a payload-free node.
    pub fn get_node(
        &mut self,
        opcode: Opcode,
        value_types: SmallVec<[DataType; 2]>,
        operands: SmallVec<[SDValue; 4]>,
    ) -> SDValue {
        self.intern(SDNodeData::new(opcode, value_types, operands))
    }

    /// Get or create a node with an integer immediate payload.
    pub fn get_imm_node(
        &mut self,
        opcode: Opcode,
        value_types: SmallVec<[DataType; 2]>,
        operands: SmallVec<[SDValue; 4]>,
        imm: i64,
    ) -> SDValue {
        let mut data = SDNodeData::new(opcode, value_types, operands);
        data.imm = Some(imm);
        self.intern(data)
    }

    /// Get or create a node with a symbol payload.
    pub fn get_sym_node(
        &mut self,
        opcode: Opcode,
        value_types: SmallVec<[DataType; 2]>,
        operands: SmallVec<[SDValue; 4]>,
        symbol: String,
    ) -> SDValue {
        let mut data = SDNodeData::new(opcode, value_types, operands);
        data.symbol = Some(symbol);
        self.intern(data)
    }

    /// Get or create the node representing the address of frame slot `fi`.
    pub fn get_frame_index_node(&mut self, fi: FrameIndex) -> SDValue {
        let mut data = SDNodeData::new(Opcode::FrameIndex, smallvec![PTR], SmallVec::new());
        data.frame_index = Some(fi);
        self.intern(data)
    }

    /// Get or create the node representing IR value `value` flowing into
    /// the DAG from outside (an argument or a cross-block definition).
    pub fn get_reg_node(&mut self, value: Value, ty: DataType) -> SDValue {
        let mut data = SDNodeData::new(Opcode::CopyFromReg, smallvec![ty], SmallVec::new());
        data.ir_value = Some(value);
        self.intern(data)
    }

    /// Get or create a label node for `block`.
    pub fn get_label_node(&mut self, block: Block) -> SDValue {
        let mut data = SDNodeData::new(Opcode::Label, SmallVec::new(), SmallVec::new());
        data.label = Some(block);
        self.intern(data)
    }

    /// Get or create an integer constant of type `ty`.
    pub fn get_constant_i64(&mut self, value: i64, ty: DataType) -> SDValue {
        let mut data = SDNodeData::new(Opcode::ConstI64, smallvec![ty], SmallVec::new());
        data.imm = Some(value);
        self.intern(data)
    }

    /// Get or create an `f32` constant.
    pub fn get_constant_f32(&mut self, value: f32, ty: DataType) -> SDValue {
        let mut data = SDNodeData::new(Opcode::ConstF32, smallvec![ty], SmallVec::new());
        data.fimm = Some(value.to_bits());
        self.intern(data)
    }

    /// Tag `node` as carrying the definition of IR value `value`.
    ///
    /// This mutates the node in place and deliberately does not re-key the
    /// folding set: the tag is not part of a non-`CopyFromReg` node's
    /// structural identity.
    pub fn set_ir_value(&mut self, node: SDNode, value: Value) {
        self.nodes[node].ir_value = Some(value);
    }

    /// Render the nodes in `range` one per line, for trace logging.
    pub fn dump(&self, range: core::ops::Range<usize>) -> String {
        use core::fmt::Write;
        let mut out = String::new();
        for (node, data) in self.iter().skip(range.start).take(range.len()) {
            let _ = write!(out, "  {node} = {}", data.opcode.name());
            for operand in &data.operands {
                let _ = write!(out, " {}:{}", operand.node, operand.result);
            }
            if let Some(imm) = data.imm {
                let _ = write!(out, " #{imm}");
            }
            if let Some(bits) = data.fimm {
                let _ = write!(out, " f#{bits:#010x}");
            }
            if let Some(symbol) = &data.symbol {
                let _ = write!(out, " @{symbol}");
            }
            if let Some(fi) = data.frame_index {
                let _ = write!(out, " {fi}");
            }
            if let Some(label) = data.label {
                let _ = write!(out, " {label}");
            }
            if let Some(value) = data.ir_value {
                let _ = write!(out, " ({value})");
            }
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mir::{I32, I64, TOKEN};

    #[test]
    fn identical_nodes_are_shared() {
        let mut dag = SelectionDag::new();
        let a = dag.get_constant_i64(1, I32);
        let b = dag.get_constant_i64(2, I32);
        let add1 = dag.get_node(Opcode::Add, smallvec![I32], smallvec![a, b]);
        let add2 = dag.get_node(Opcode::Add, smallvec![I32], smallvec![a, b]);
        assert_eq!(add1.node, add2.node);
        assert_eq!(dag.node_count(), 3);
    }

    #[test]
    fn payload_distinguishes_nodes() {
        let mut dag = SelectionDag::new();
        let a = dag.get_constant_i64(1, I32);
        let b = dag.get_constant_i64(1, I64);
        assert_ne!(a.node, b.node);
        let c = dag.get_constant_i64(1, I32);
        assert_eq!(a.node, c.node);
    }

    #[test]
    fn ir_value_tag_does_not_defeat_cse() {
        let mut dag = SelectionDag::new();
        let x = dag.get_constant_i64(5, I32);
        let add1 = dag.get_node(Opcode::Add, smallvec![I32], smallvec![x, x]);
        dag.set_ir_value(add1.node, crate::ir::Value::from_u32(3));
        let add2 = dag.get_node(Opcode::Add, smallvec![I32], smallvec![x, x]);
        assert_eq!(add1.node, add2.node);
    }

    #[test]
    fn loads_chain_through_token_results() {
        let mut dag = SelectionDag::new();
        let chain = dag.get_node(Opcode::EntryToken, smallvec![TOKEN], SmallVec::new());
        let ptr = dag.get_constant_i64(0, I64);
        let load1 = dag.get_node(Opcode::Load, smallvec![I32, TOKEN], smallvec![chain, ptr]);
        let chain1 = SDValue::new(load1.node, 1);
        // Same address, different chain position: a distinct node.
        let load2 = dag.get_node(Opcode::Load, smallvec![I32, TOKEN], smallvec![chain1, ptr]);
        assert_ne!(load1.node, load2.node);
        // Same address, same chain: folded.
        let load3 = dag.get_node(Opcode::Load, smallvec![I32, TOKEN], smallvec![chain1, ptr]);
        assert_eq!(load2.node, load3.node);
    }
}
