//! IR entity references.
//!
//! Instructions reference other parts of the function (blocks, values) and
//! of the module (global variables) through compact typed indices rather
//! than pointers; see the `entity` module for the rationale. The `Display`
//! impls match the textual IR format.

use crate::entity::entity_impl;

/// An opaque reference to a basic block in a function.
///
/// Block numbers also identify the machine-IR blocks derived from them;
/// blocks created by backend passes (edge splitting) take numbers above any
/// block of the source function.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Block(u32);
entity_impl!(Block, "block");

/// An opaque reference to an SSA value.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Value(u32);
entity_impl!(Value, "v");

/// An opaque reference to a global variable of the module.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct GlobalValue(u32);
entity_impl!(GlobalValue, "gv");
