//! Reader for the lanner IR text format.
//!
//! The format is a small LLVM-flavoured notation covering exactly the IR
//! surface the backend consumes:
//!
//! ```text
//! global @count : i32 = 0
//! global @table : [4 x 4] i32 = { 1, 2, 3 }
//!
//! declare i32 @getint()
//!
//! define i32 @main(i32 %n) {
//! entry:
//!   %sum = add i32 %n, 1
//!   %c = icmp slt i32 %sum, 10
//!   br i1 %c, label %then, label %else
//! then:
//!   ret i32 %sum
//! else:
//!   ret i32 0
//! }
//! ```
//!
//! Values are `%name`, symbols `@name`, comments run from `;` to the end
//! of the line. Block labels are bare identifiers; branch targets and phi
//! incoming labels refer to them as `%name`.

#![deny(missing_docs, trivial_numeric_casts, unused_extern_crates)]

mod error;
mod lexer;
mod parser;

pub use crate::error::{Location, ParseError, ParseResult};
pub use crate::lexer::{Lexer, LocatedToken, Token};
pub use crate::parser::parse_module;

/// Version number of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;
    use lanner_codegen::ir::{InstructionData, Type};

    #[test]
    fn parse_simple_function() {
        let module = parse_module(
            "define i32 @f() {\n\
             entry:\n\
             \x20 ret i32 42\n\
             }\n",
        )
        .expect("parses");
        assert_eq!(module.functions.len(), 1);
        let func = &module.functions[0];
        assert_eq!(func.sig.name, "f");
        assert_eq!(func.sig.ret, Type::I32);
        assert_eq!(func.blocks.len(), 1);
        let entry = func.entry_block().unwrap();
        assert!(matches!(
            func.blocks[entry].insts[0],
            InstructionData::Return { value: Some(_) }
        ));
    }

    #[test]
    fn parse_globals_and_declarations() {
        let module = parse_module(
            "global @a : i32 = 7\n\
             global @m : [2 x 3] i32 = { 1, 0, 0, 0, 0, 6 }\n\
             declare void @putint(i32)\n",
        )
        .expect("parses");
        assert_eq!(module.globals.len(), 2);
        assert_eq!(module.declarations.len(), 1);
        let m = module.globals.values().nth(1).unwrap();
        assert_eq!(m.dims, vec![2, 3]);
        assert_eq!(m.init, vec![1, 0, 0, 0, 0, 6]);
    }

    #[test]
    fn parse_loop_with_phi() {
        let module = parse_module(
            "define i32 @sum(i32 %n) {\n\
             entry:\n\
             \x20 br label %loop\n\
             loop:\n\
             \x20 %i = phi i32 [ 0, %entry ], [ %next, %loop ]\n\
             \x20 %next = add i32 %i, 1\n\
             \x20 %done = icmp sge i32 %next, %n\n\
             \x20 br i1 %done, label %exit, label %loop\n\
             exit:\n\
             \x20 ret i32 %i\n\
             }\n",
        )
        .expect("parses");
        let func = &module.functions[0];
        assert_eq!(func.blocks.len(), 3);
        // The forward-referenced %next resolved to the add's result.
        let loop_block = func.blocks.keys().nth(1).unwrap();
        let InstructionData::Phi { ref args, .. } = func.blocks[loop_block].insts[0] else {
            panic!("expected phi first in the loop block");
        };
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn unknown_opcode_is_reported_with_line() {
        let result = parse_module(
            "define void @f() {\n\
             entry:\n\
             \x20 %x = frobnicate i32 1, 2\n\
             \x20 ret void\n\
             }\n",
        );
        let error = result.expect_err("must fail");
        assert_eq!(error.location.line_number, 3);
        assert!(error.message.contains("frobnicate"));
    }

    #[test]
    fn printed_module_parses_back() {
        let module = parse_module(
            "global @a : i32 = 7\n\
             define i32 @f(i32 %x) {\n\
             entry:\n\
             \x20 %g = load i32, ptr @a\n\
             \x20 %s = add i32 %x, %g\n\
             \x20 %c = icmp slt i32 %s, 100\n\
             \x20 br i1 %c, label %small, label %big\n\
             small:\n\
             \x20 ret i32 %s\n\
             big:\n\
             \x20 ret i32 100\n\
             }\n",
        )
        .expect("parses");
        let printed = module.to_string();
        let reparsed = parse_module(&printed)
            .unwrap_or_else(|error| panic!("printed module must parse, got {error}:\n{printed}"));
        assert_eq!(printed, reparsed.to_string());
    }

    #[test]
    fn float_initializers_store_bit_patterns() {
        let module = parse_module("global @pi : f32 = 3.5\n").expect("parses");
        let g = module.globals.values().next().unwrap();
        assert_eq!(g.init, vec![i64::from(3.5f32.to_bits())]);
    }
}
