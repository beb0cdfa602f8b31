//! Representation of the mid-end intermediate representation.
//!
//! The `ir` module defines everything the backend consumes: typed SSA
//! values, basic blocks of three-address instructions, function definitions
//! and module-level globals. Construction is done either programmatically
//! or through the `lanner-reader` crate's textual format; the frontend
//! proper lives outside this repository.

mod condcodes;
mod entities;
mod function;
mod instructions;
mod module;
mod types;
mod write;

pub use self::condcodes::{FloatCC, IntCC};
pub use self::entities::{Block, GlobalValue, Value};
pub use self::function::{BlockData, Function, Signature};
pub use self::instructions::{BinaryOp, InstructionData, Operand};
pub use self::module::{GlobalVarData, Module};
pub use self::types::Type;
pub use self::write::write_module;
