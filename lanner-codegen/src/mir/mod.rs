//! Machine IR: the target-independent half.
//!
//! After instruction selection a function is a set of machine blocks
//! holding target instructions over virtual and physical registers. The
//! pieces here are shared by every target: machine value types, registers,
//! the frame layout table, and the `MachInst` trait through which the
//! target-independent passes (liveness, linear scan) see instructions.

mod frame;
mod function;
mod inst;
mod reg;
mod types;

pub use self::frame::{FrameIndex, FrameInfo, FrameObject, FrameObjectKind};
pub use self::function::{MachBlockData, MachFunction};
pub use self::inst::MachInst;
pub use self::reg::{Reg, RegClass};
pub use self::types::{DataType, TypeClass, F32, F64, I32, I64, PTR, TOKEN};
