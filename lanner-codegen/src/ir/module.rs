//! IR modules: global variables, declarations and function definitions.

use crate::entity::PrimaryMap;
use crate::ir::entities::GlobalValue;
use crate::ir::function::{Function, Signature};
use crate::ir::types::Type;

/// A module-level global variable.
///
/// Initializer entries are stored as integers; `f32` initializers are held
/// as their raw bit pattern, which is also how they are emitted into the
/// data section.
#[derive(Clone, Debug)]
pub struct GlobalVarData {
    /// Symbol name.
    pub name: String,
    /// Element type.
    pub ty: Type,
    /// Array dimensions, outermost first; empty for a scalar.
    pub dims: Vec<u32>,
    /// Flattened initializer values. Empty means zero-initialized.
    pub init: Vec<i64>,
}

impl GlobalVarData {
    /// Is this a scalar (non-array) global?
    pub fn is_scalar(&self) -> bool {
        self.dims.is_empty()
    }

    /// Total number of elements.
    pub fn elem_count(&self) -> u64 {
        self.dims.iter().map(|&d| d as u64).product()
    }
}

/// A whole compilation unit as handed to the backend.
#[derive(Clone, Debug, Default)]
pub struct Module {
    /// Global variables, in declaration order.
    pub globals: PrimaryMap<GlobalValue, GlobalVarData>,
    /// Signatures of external functions referenced by calls.
    pub declarations: Vec<Signature>,
    /// Function definitions.
    pub functions: Vec<Function>,
}

impl Module {
    /// Create an empty module.
    pub fn new() -> Self {
        Self::default()
    }
}
