//! Selection DAG nodes and edges.

use crate::dag::isd::Opcode;
use crate::entity::entity_impl;
use crate::ir::{Block, Value};
use crate::mir::{DataType, FrameIndex};
use smallvec::SmallVec;

/// A reference to a DAG node. Nodes are owned by their `SelectionDAG` and
/// numbered in creation order.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct SDNode(u32);
entity_impl!(SDNode, "n");

/// An edge in the DAG: one of the results of a node. Multi-result nodes
/// exist; a `Load` produces the loaded value (result 0) and a fresh chain
/// (result 1).
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct SDValue {
    /// The node producing the value.
    pub node: SDNode,
    /// Which of the node's results is referenced.
    pub result: u32,
}

impl SDValue {
    /// Make an edge to result `result` of `node`.
    pub fn new(node: SDNode, result: u32) -> SDValue {
        SDValue { node, result }
    }
}

/// The contents of a DAG node.
///
/// Payload fields are optional and mostly mutually exclusive, but a node
/// can carry both an immediate and an IR value: comparison nodes hold
/// their condition code as an immediate, and `set_ir_value` later tags the
/// node with the IR value it defines.
#[derive(Clone, Debug)]
pub struct SDNodeData {
    /// The operation.
    pub opcode: Opcode,
    /// The types of the node's results.
    pub value_types: SmallVec<[DataType; 2]>,
    /// The operand edges.
    pub operands: SmallVec<[SDValue; 4]>,
    /// Integer immediate payload (constants, condition codes, labels).
    pub imm: Option<i64>,
    /// Float immediate payload, stored as its bit pattern.
    pub fimm: Option<u32>,
    /// Symbol name payload.
    pub symbol: Option<String>,
    /// Frame index payload.
    pub frame_index: Option<FrameIndex>,
    /// Label payload.
    pub label: Option<Block>,
    /// The IR value whose definition this node carries, when known.
    pub ir_value: Option<Value>,
}

impl SDNodeData {
    /// Create a payload-free node.
    pub fn new(
        opcode: Opcode,
        value_types: SmallVec<[DataType; 2]>,
        operands: SmallVec<[SDValue; 4]>,
    ) -> Self {
        Self {
            opcode,
            value_types,
            operands,
            imm: None,
            fimm: None,
            symbol: None,
            frame_index: None,
            label: None,
            ir_value: None,
        }
    }

    /// The structural identity of this node, as used by the folding set.
    ///
    /// Everything that distinguishes two nodes participates: opcode,
    /// result types, operand edges and payloads. The `ir_value` tag is
    /// identity-relevant only for `CopyFromReg` nodes; elsewhere it is an
    /// annotation added after creation and must not defeat CSE.
    pub fn profile(&self) -> NodeKey {
        NodeKey {
            opcode: self.opcode,
            value_types: self.value_types.clone(),
            operands: self
                .operands
                .iter()
                .map(|v| (v.node.as_u32(), v.result))
                .collect(),
            imm: self.imm,
            fimm: self.fimm,
            symbol: self.symbol.clone(),
            frame_index: self.frame_index.map(FrameIndex::as_u32),
            label: self.label.map(Block::as_u32),
            ir_value: if self.opcode == Opcode::CopyFromReg {
                self.ir_value.map(Value::as_u32)
            } else {
                None
            },
        }
    }
}

/// The structural hash key of a node. Two nodes with equal keys are the
/// same computation; the folding set maps keys to existing nodes.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct NodeKey {
    opcode: Opcode,
    value_types: SmallVec<[DataType; 2]>,
    operands: SmallVec<[(u32, u32); 4]>,
    imm: Option<i64>,
    fimm: Option<u32>,
    symbol: Option<String>,
    frame_index: Option<u32>,
    label: Option<u32>,
    ir_value: Option<u32>,
}
