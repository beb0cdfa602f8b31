//! Node opcodes of the selection DAG.

// Some variants are never constructed by the builder (they exist for
// completeness of the opcode space), but we still want them as options.
#![allow(dead_code)]

/// The operation performed by a DAG node.
///
/// Nodes with side effects (`Load`, `Store`, `Call`, the terminators)
/// consume and/or produce a `TOKEN`-typed chain value; pure computations
/// carry data operands only.
#[allow(missing_docs)]
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Opcode {
    // Terminators.
    Ret,
    Br,
    BrCond,

    // Chain bookkeeping.
    EntryToken,
    TokenFactor,

    // Values and constants.
    Copy,
    /// A value live into the DAG from outside: a function argument or a
    /// definition from another block. Carries the IR value as payload.
    CopyFromReg,
    Phi,
    ConstI32,
    ConstI64,
    ConstF32,
    /// A global or function symbol address. Carries the name as payload.
    Symbol,
    /// A basic-block label. Carries the block as payload.
    Label,

    // Memory.
    Load,
    Store,
    /// An abstract stack slot address. Carries the frame index as payload.
    FrameIndex,
    Gep,

    // Integer arithmetic.
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Ashr,
    Lshr,
    And,
    Or,
    Xor,

    // Float arithmetic.
    Fadd,
    Fsub,
    Fmul,
    Fdiv,

    // Casts.
    Zext,
    SiToFp,
    FpToSi,

    // Comparisons; the condition code rides in the immediate payload.
    Icmp,
    Fcmp,

    // Calls.
    Call,
}

impl Opcode {
    /// Mnemonic for logs and DAG dumps.
    pub fn name(self) -> &'static str {
        use Opcode::*;
        match self {
            Ret => "ret",
            Br => "br",
            BrCond => "brcond",
            EntryToken => "entry_token",
            TokenFactor => "token_factor",
            Copy => "copy",
            CopyFromReg => "copy_from_reg",
            Phi => "phi",
            ConstI32 => "const_i32",
            ConstI64 => "const_i64",
            ConstF32 => "const_f32",
            Symbol => "symbol",
            Label => "label",
            Load => "load",
            Store => "store",
            FrameIndex => "frame_index",
            Gep => "gep",
            Add => "add",
            Sub => "sub",
            Mul => "mul",
            Div => "div",
            Rem => "rem",
            Shl => "shl",
            Ashr => "ashr",
            Lshr => "lshr",
            And => "and",
            Or => "or",
            Xor => "xor",
            Fadd => "fadd",
            Fsub => "fsub",
            Fmul => "fmul",
            Fdiv => "fdiv",
            Zext => "zext",
            SiToFp => "sitofp",
            FpToSi => "fptosi",
            Icmp => "icmp",
            Fcmp => "fcmp",
            Call => "call",
        }
    }
}
