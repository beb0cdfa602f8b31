//! Source-level IR value types.
//!
//! The mid-end IR is typed with the small fixed set of scalar types the
//! source language can produce. Machine-level types (`mir::DataType`) are a
//! separate, coarser lattice; see `DataType::from_ir`.

use core::fmt::{self, Display, Formatter};
use core::str::FromStr;

/// The type of an IR value.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Type {
    /// A boolean produced by comparisons.
    I1,
    /// A byte. Promoted to 32 bits by the backend.
    I8,
    /// A 32-bit integer.
    I32,
    /// A 64-bit integer.
    I64,
    /// A 32-bit IEEE float.
    F32,
    /// A 64-bit IEEE float.
    F64,
    /// A pointer. 64 bits wide on every supported target.
    Ptr,
    /// The return "type" of a void function.
    Void,
}

impl Type {
    /// Size of a value of this type in bytes, as laid out in memory by the
    /// backend.
    pub fn bytes(self) -> u32 {
        match self {
            Type::I1 | Type::I8 | Type::I32 | Type::F32 => 4,
            Type::I64 | Type::F64 | Type::Ptr => 8,
            Type::Void => 0,
        }
    }

    /// Is this a floating point type?
    pub fn is_float(self) -> bool {
        matches!(self, Type::F32 | Type::F64)
    }

    /// Is this an integer (or pointer) type?
    pub fn is_int(self) -> bool {
        matches!(self, Type::I1 | Type::I8 | Type::I32 | Type::I64 | Type::Ptr)
    }
}

// The "unrecorded" type, used by value-type side tables.
impl Default for Type {
    fn default() -> Self {
        Type::Void
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(match *self {
            Type::I1 => "i1",
            Type::I8 => "i8",
            Type::I32 => "i32",
            Type::I64 => "i64",
            Type::F32 => "f32",
            Type::F64 => "f64",
            Type::Ptr => "ptr",
            Type::Void => "void",
        })
    }
}

impl FromStr for Type {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, ()> {
        match s {
            "i1" => Ok(Type::I1),
            "i8" => Ok(Type::I8),
            "i32" => Ok(Type::I32),
            "i64" => Ok(Type::I64),
            "f32" => Ok(Type::F32),
            "f64" => Ok(Type::F64),
            "ptr" => Ok(Type::Ptr),
            "void" => Ok(Type::Void),
            _ => Err(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes() {
        assert_eq!(Type::I1.bytes(), 4);
        assert_eq!(Type::I32.bytes(), 4);
        assert_eq!(Type::Ptr.bytes(), 8);
        assert_eq!(Type::Void.bytes(), 0);
    }

    #[test]
    fn parse_display_round_trip() {
        for t in [
            Type::I1,
            Type::I8,
            Type::I32,
            Type::I64,
            Type::F32,
            Type::F64,
            Type::Ptr,
            Type::Void,
        ] {
            assert_eq!(t.to_string().parse::<Type>(), Ok(t));
        }
        assert!("i16".parse::<Type>().is_err());
    }
}
