//! IR function and basic-block representation.

use crate::entity::{EntityRef, PrimaryMap, SecondaryMap};
use crate::ir::entities::{Block, Value};
use crate::ir::instructions::InstructionData;
use crate::ir::types::Type;

/// A function signature: name, return type and parameter types.
#[derive(Clone, Debug)]
pub struct Signature {
    /// Symbol name, without mangling.
    pub name: String,
    /// Return type, `Type::Void` for none.
    pub ret: Type,
    /// Parameter types, in order.
    pub params: Vec<Type>,
}

/// The contents of a basic block: an instruction sequence ending in a
/// terminator.
#[derive(Clone, Debug, Default)]
pub struct BlockData {
    /// The instructions, in program order.
    pub insts: Vec<InstructionData>,
}

/// An IR function definition.
///
/// Blocks are numbered densely in creation order; the entry block is the
/// block with the lowest number. Values are likewise numbered densely and
/// each carries a recorded type.
#[derive(Clone, Debug)]
pub struct Function {
    /// The signature of this function.
    pub sig: Signature,
    /// The SSA values bound to the incoming parameters, in order.
    pub params: Vec<Value>,
    /// All basic blocks.
    pub blocks: PrimaryMap<Block, BlockData>,
    /// The type of each value. `Type::Void` means "not recorded", which the
    /// backend treats as a fatal inconsistency when the value is consumed.
    pub value_types: SecondaryMap<Value, Type>,
    next_value: u32,
}

impl Function {
    /// Create a new, empty function with the given signature.
    pub fn new(sig: Signature) -> Self {
        Self {
            sig,
            params: Vec::new(),
            blocks: PrimaryMap::new(),
            value_types: SecondaryMap::new(),
            next_value: 0,
        }
    }

    /// Mint a fresh value of type `ty`.
    pub fn make_value(&mut self, ty: Type) -> Value {
        let v = Value::new(self.next_value as usize);
        self.next_value += 1;
        self.value_types[v] = ty;
        v
    }

    /// Create a new empty block.
    pub fn make_block(&mut self) -> Block {
        self.blocks.push(BlockData::default())
    }

    /// The entry block. Functions with no blocks are declarations and have
    /// no entry.
    pub fn entry_block(&self) -> Option<Block> {
        self.blocks.keys().next()
    }

    /// The recorded type of `v`, or `None` when no type was recorded.
    pub fn value_type(&self, v: Value) -> Option<Type> {
        match self.value_types[v] {
            Type::Void => None,
            ty => Some(ty),
        }
    }
}
