//! Condition codes for the lanner IR.
//!
//! A condition code determines how two numbers are compared. Integers and
//! floating point numbers follow different rules, so they use separate
//! condition code enums.

use core::fmt::{self, Display, Formatter};
use core::str::FromStr;

/// Condition code for comparing integers, used by the `icmp` instruction.
///
/// Signed and unsigned comparisons are distinguished where it makes a
/// difference.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum IntCC {
    /// `==`.
    Equal,
    /// `!=`.
    NotEqual,
    /// Signed `<`.
    SignedLessThan,
    /// Signed `>=`.
    SignedGreaterThanOrEqual,
    /// Signed `>`.
    SignedGreaterThan,
    /// Signed `<=`.
    SignedLessThanOrEqual,
    /// Unsigned `<`.
    UnsignedLessThan,
    /// Unsigned `>=`.
    UnsignedGreaterThanOrEqual,
    /// Unsigned `>`.
    UnsignedGreaterThan,
    /// Unsigned `<=`.
    UnsignedLessThanOrEqual,
}

impl IntCC {
    /// All condition codes, in declaration order. Indexable by the
    /// discriminant, which is how the selection DAG carries them.
    pub fn all() -> &'static [IntCC] {
        &[
            IntCC::Equal,
            IntCC::NotEqual,
            IntCC::SignedLessThan,
            IntCC::SignedGreaterThanOrEqual,
            IntCC::SignedGreaterThan,
            IntCC::SignedLessThanOrEqual,
            IntCC::UnsignedLessThan,
            IntCC::UnsignedGreaterThanOrEqual,
            IntCC::UnsignedGreaterThan,
            IntCC::UnsignedLessThanOrEqual,
        ]
    }

    /// Get the corresponding string condition code.
    pub fn to_static_str(self) -> &'static str {
        use self::IntCC::*;
        match self {
            Equal => "eq",
            NotEqual => "ne",
            SignedGreaterThan => "sgt",
            SignedGreaterThanOrEqual => "sge",
            SignedLessThan => "slt",
            SignedLessThanOrEqual => "sle",
            UnsignedGreaterThan => "ugt",
            UnsignedGreaterThanOrEqual => "uge",
            UnsignedLessThan => "ult",
            UnsignedLessThanOrEqual => "ule",
        }
    }
}

impl Display for IntCC {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(self.to_static_str())
    }
}

impl FromStr for IntCC {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, ()> {
        use self::IntCC::*;
        match s {
            "eq" => Ok(Equal),
            "ne" => Ok(NotEqual),
            "sge" => Ok(SignedGreaterThanOrEqual),
            "sgt" => Ok(SignedGreaterThan),
            "sle" => Ok(SignedLessThanOrEqual),
            "slt" => Ok(SignedLessThan),
            "uge" => Ok(UnsignedGreaterThanOrEqual),
            "ugt" => Ok(UnsignedGreaterThan),
            "ule" => Ok(UnsignedLessThanOrEqual),
            "ult" => Ok(UnsignedLessThan),
            _ => Err(()),
        }
    }
}

/// Condition code for comparing floating point numbers, used by the `fcmp`
/// instruction.
///
/// The ordered codes are false when either operand is NaN; the unordered
/// codes are true when either operand is NaN.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum FloatCC {
    /// EQ (ordered).
    OrderedEqual,
    /// LT | GT (ordered).
    OrderedNotEqual,
    /// GT (ordered).
    OrderedGreaterThan,
    /// GT | EQ (ordered).
    OrderedGreaterThanOrEqual,
    /// LT (ordered).
    OrderedLessThan,
    /// LT | EQ (ordered).
    OrderedLessThanOrEqual,
    /// Neither operand is NaN.
    Ordered,
    /// UN | EQ.
    UnorderedOrEqual,
    /// UN | GT.
    UnorderedOrGreaterThan,
    /// UN | GT | EQ.
    UnorderedOrGreaterThanOrEqual,
    /// UN | LT.
    UnorderedOrLessThan,
    /// UN | LT | EQ.
    UnorderedOrLessThanOrEqual,
    /// UN | LT | GT.
    UnorderedOrNotEqual,
    /// At least one operand is NaN.
    Unordered,
}

impl FloatCC {
    /// All condition codes, in declaration order. Indexable by the
    /// discriminant, which is how the selection DAG carries them.
    pub fn all() -> &'static [FloatCC] {
        &[
            FloatCC::OrderedEqual,
            FloatCC::OrderedNotEqual,
            FloatCC::OrderedGreaterThan,
            FloatCC::OrderedGreaterThanOrEqual,
            FloatCC::OrderedLessThan,
            FloatCC::OrderedLessThanOrEqual,
            FloatCC::Ordered,
            FloatCC::UnorderedOrEqual,
            FloatCC::UnorderedOrGreaterThan,
            FloatCC::UnorderedOrGreaterThanOrEqual,
            FloatCC::UnorderedOrLessThan,
            FloatCC::UnorderedOrLessThanOrEqual,
            FloatCC::UnorderedOrNotEqual,
            FloatCC::Unordered,
        ]
    }

    /// Get the corresponding string condition code.
    pub fn to_static_str(self) -> &'static str {
        use self::FloatCC::*;
        match self {
            OrderedEqual => "oeq",
            OrderedNotEqual => "one",
            OrderedGreaterThan => "ogt",
            OrderedGreaterThanOrEqual => "oge",
            OrderedLessThan => "olt",
            OrderedLessThanOrEqual => "ole",
            Ordered => "ord",
            UnorderedOrEqual => "ueq",
            UnorderedOrGreaterThan => "ugt",
            UnorderedOrGreaterThanOrEqual => "uge",
            UnorderedOrLessThan => "ult",
            UnorderedOrLessThanOrEqual => "ule",
            UnorderedOrNotEqual => "une",
            Unordered => "uno",
        }
    }
}

impl Display for FloatCC {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(self.to_static_str())
    }
}

impl FromStr for FloatCC {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, ()> {
        use self::FloatCC::*;
        match s {
            "oeq" => Ok(OrderedEqual),
            "one" => Ok(OrderedNotEqual),
            "ogt" => Ok(OrderedGreaterThan),
            "oge" => Ok(OrderedGreaterThanOrEqual),
            "olt" => Ok(OrderedLessThan),
            "ole" => Ok(OrderedLessThanOrEqual),
            "ord" => Ok(Ordered),
            "ueq" => Ok(UnorderedOrEqual),
            "ugt" => Ok(UnorderedOrGreaterThan),
            "uge" => Ok(UnorderedOrGreaterThanOrEqual),
            "ult" => Ok(UnorderedOrLessThan),
            "ule" => Ok(UnorderedOrLessThanOrEqual),
            "une" => Ok(UnorderedOrNotEqual),
            "uno" => Ok(Unordered),
            _ => Err(()),
        }
    }
}
