//! Lanner code generation library.
//!
//! This crate is the backend of the lanner compiler: it consumes a typed,
//! SSA-optional mid-end IR module (see [`ir`]) and produces AArch64
//! assembly text. The pipeline per function:
//!
//! 1. instruction selection: direct IR-to-MIR translation, or selection
//!    DAG construction (with structural CSE) followed by node emission;
//! 2. phi elimination: critical-edge splitting and parallel copies;
//! 3. liveness analysis and linear-scan register allocation with spilling;
//! 4. frame lowering: prologue/epilogue, callee-saved save/restore;
//! 5. stack-slot lowering: frame indices to SP-relative addressing;
//! 6. assembly emission.
//!
//! Targets are looked up through [`isa::lookup`] by triple; only AArch64
//! is implemented.

#![deny(missing_docs, trivial_numeric_casts, unused_extern_crates)]
#![warn(unused_import_braces)]

pub mod entity;

pub mod dag;
pub mod ir;
pub mod isa;
pub mod mir;
pub mod regalloc;
mod result;

pub use crate::result::{CodegenError, CodegenResult};

/// Version number of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
