//! Instruction Set Architectures.
//!
//! `isa::lookup()` is the entry point: it maps a target triple to a
//! `TargetIsa` implementation. The only target built today is AArch64, but
//! the registry shape keeps additional backends a module away.

pub mod aarch64;

use crate::ir::Module;
use crate::CodegenResult;
use core::fmt;
use core::str::FromStr;
use target_lexicon::{Architecture, Triple};

/// Which instruction-selection path a backend runs.
///
/// Both produce the same MIR-level results; the DAG path additionally
/// shares repeated pure computations within a block.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub enum IselLevel {
    /// Direct pattern translation, IR instruction by IR instruction.
    #[default]
    Direct,
    /// Build the selection DAG per block, then emit from its nodes.
    Dag,
}

/// Methods that everything compiling with a target ISA needs.
pub trait TargetIsa {
    /// The name of this ISA.
    fn name(&self) -> &'static str;

    /// The triple this instance was created for.
    fn triple(&self) -> &Triple;

    /// Run the full backend pipeline over `module` and return the
    /// assembly text.
    fn compile_module(&self, module: &Module) -> CodegenResult<String>;
}

/// Describes the reason for a target lookup failure.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum LookupError {
    /// Support for this target has not been implemented.
    Unsupported,
}

impl std::error::Error for LookupError {}

impl fmt::Display for LookupError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LookupError::Unsupported => {
                write!(f, "support for this target has not been implemented yet")
            }
        }
    }
}

/// Look up the ISA for `triple` with the given instruction-selection
/// configuration.
pub fn lookup(triple: Triple, isel: IselLevel) -> Result<Box<dyn TargetIsa>, LookupError> {
    match triple.architecture {
        Architecture::Aarch64(..) => Ok(Box::new(aarch64::Aarch64Backend::new(triple, isel))),
        _ => Err(LookupError::Unsupported),
    }
}

/// Look up an ISA by name. Recognizes the architecture spellings the CLI
/// accepts (`aarch64`, `armv8`) as well as full triples.
pub fn lookup_by_name(name: &str, isel: IselLevel) -> Result<Box<dyn TargetIsa>, LookupError> {
    match name {
        "aarch64" | "armv8" => lookup(
            Triple::from_str("aarch64-unknown-linux-gnu").expect("builtin triple parses"),
            isel,
        ),
        _ => {
            let triple = Triple::from_str(name).map_err(|_| LookupError::Unsupported)?;
            lookup(triple, isel)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_recognized_names() {
        assert!(lookup_by_name("aarch64", IselLevel::Direct).is_ok());
        assert!(lookup_by_name("armv8", IselLevel::Direct).is_ok());
        assert!(lookup_by_name("aarch64-unknown-linux-gnu", IselLevel::Direct).is_ok());
        assert_eq!(
            lookup_by_name("x86_64", IselLevel::Direct).err(),
            Some(LookupError::Unsupported)
        );
    }
}
