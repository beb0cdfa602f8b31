//! IR instruction definitions.
//!
//! The backend consumes a three-address, SSA-optional instruction set. Each
//! instruction is a variant of `InstructionData`; operands are `Operand`
//! values which either name an SSA value or carry an immediate.

use crate::ir::condcodes::{FloatCC, IntCC};
use crate::ir::entities::{Block, GlobalValue, Value};
use crate::ir::types::Type;

/// An operand of an IR instruction.
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum Operand {
    /// An SSA value.
    Value(Value),
    /// A 32-bit integer immediate.
    Iconst(i32),
    /// A 32-bit float immediate.
    Fconst(f32),
    /// The address of a global variable.
    Global(GlobalValue),
}

impl Operand {
    /// The referenced SSA value, if this operand is one.
    pub fn as_value(self) -> Option<Value> {
        match self {
            Operand::Value(v) => Some(v),
            _ => None,
        }
    }
}

/// A two-operand arithmetic or bitwise operation.
#[allow(missing_docs)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    /// Signed division.
    Div,
    /// Signed remainder. Expanded by the backend; AArch64 has no remainder
    /// instruction.
    Rem,
    Shl,
    /// Arithmetic shift right.
    Ashr,
    /// Logical shift right.
    Lshr,
    And,
    Or,
    Xor,
    Fadd,
    Fsub,
    Fmul,
    Fdiv,
}

impl BinaryOp {
    /// Does this operation work on floating point operands?
    pub fn is_float(self) -> bool {
        matches!(
            self,
            BinaryOp::Fadd | BinaryOp::Fsub | BinaryOp::Fmul | BinaryOp::Fdiv
        )
    }

    /// Mnemonic used by the textual IR format.
    pub fn mnemonic(self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::Div => "sdiv",
            BinaryOp::Rem => "srem",
            BinaryOp::Shl => "shl",
            BinaryOp::Ashr => "ashr",
            BinaryOp::Lshr => "lshr",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Xor => "xor",
            BinaryOp::Fadd => "fadd",
            BinaryOp::Fsub => "fsub",
            BinaryOp::Fmul => "fmul",
            BinaryOp::Fdiv => "fdiv",
        }
    }
}

/// The contents of an instruction.
///
/// Every block's final instruction must be a terminator (`Branch`,
/// `BranchCond` or `Return`), and terminators appear nowhere else.
#[allow(missing_docs)]
#[derive(Clone, Debug)]
pub enum InstructionData {
    /// Reserve stack storage and define `result` as its address. `dims` is
    /// empty for a scalar, or the array dimensions outermost-first.
    Alloca {
        result: Value,
        ty: Type,
        dims: Vec<u32>,
    },
    /// Load a `ty` value from `ptr`.
    Load {
        result: Value,
        ty: Type,
        ptr: Operand,
    },
    /// Store a `ty` value to `ptr`.
    Store {
        ty: Type,
        value: Operand,
        ptr: Operand,
    },
    /// A two-operand arithmetic operation.
    Binary {
        op: BinaryOp,
        ty: Type,
        result: Value,
        lhs: Operand,
        rhs: Operand,
    },
    /// Integer comparison producing an `i1`.
    IntCompare {
        cond: IntCC,
        result: Value,
        lhs: Operand,
        rhs: Operand,
    },
    /// Float comparison producing an `i1`.
    FloatCompare {
        cond: FloatCC,
        result: Value,
        lhs: Operand,
        rhs: Operand,
    },
    /// Unconditional branch.
    Branch { dest: Block },
    /// Two-way branch on an `i1` condition.
    BranchCond {
        cond: Operand,
        then_dest: Block,
        else_dest: Block,
    },
    /// SSA phi. `args` pairs each predecessor block with the incoming
    /// value on that edge.
    Phi {
        result: Value,
        ty: Type,
        args: Vec<(Block, Operand)>,
    },
    /// Call a function by symbol name. `result` is `None` for void calls.
    Call {
        result: Option<Value>,
        ret_ty: Type,
        callee: String,
        args: Vec<(Type, Operand)>,
    },
    /// Return from the function, with an optional typed value.
    Return { value: Option<(Type, Operand)> },
    /// Address arithmetic over a (possibly multi-dimensional) array.
    /// `dims` are the array dimensions of the pointee; `indices` index
    /// successive dimensions and are scaled by the backend.
    GetElementPtr {
        result: Value,
        elem_ty: Type,
        base: Operand,
        dims: Vec<u32>,
        indices: Vec<Operand>,
    },
    /// Zero-extend an integer value.
    Zext {
        result: Value,
        from: Type,
        to: Type,
        arg: Operand,
    },
    /// Signed integer to float conversion.
    SiToFp { result: Value, arg: Operand },
    /// Float to signed integer conversion (toward zero).
    FpToSi { result: Value, arg: Operand },
}

impl InstructionData {
    /// The value defined by this instruction, if any.
    pub fn result(&self) -> Option<Value> {
        match *self {
            InstructionData::Alloca { result, .. }
            | InstructionData::Load { result, .. }
            | InstructionData::Binary { result, .. }
            | InstructionData::IntCompare { result, .. }
            | InstructionData::FloatCompare { result, .. }
            | InstructionData::Phi { result, .. }
            | InstructionData::GetElementPtr { result, .. }
            | InstructionData::Zext { result, .. }
            | InstructionData::SiToFp { result, .. }
            | InstructionData::FpToSi { result, .. } => Some(result),
            InstructionData::Call { result, .. } => result,
            _ => None,
        }
    }

    /// Is this instruction a block terminator?
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            InstructionData::Branch { .. }
                | InstructionData::BranchCond { .. }
                | InstructionData::Return { .. }
        )
    }
}
