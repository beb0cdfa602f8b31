//! The `Location`, `ParseError` and `ParseResult` types.

#![macro_use]

/// The location of a token or error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Location {
    /// Line number; source file lines start from 1.
    pub line_number: usize,
}

/// A parse error is returned when the parse failed.
#[derive(Debug, thiserror::Error)]
#[error("line {}: {}", .location.line_number, .message)]
pub struct ParseError {
    /// Location of the error.
    pub location: Location,
    /// Error message.
    pub message: String,
}

/// Result of a parser operation; the error carries a location.
pub type ParseResult<T> = Result<T, ParseError>;

// Create an `Err` variant of `ParseResult<X>` from a location and
// `format!` args.
macro_rules! err {
    ( $loc:expr, $msg:expr ) => {
        Err($crate::ParseError {
            location: $loc,
            message: $msg.to_string(),
        })
    };

    ( $loc:expr, $fmt:expr, $( $arg:expr ),+ ) => {
        Err($crate::ParseError {
            location: $loc,
            message: format!( $fmt, $( $arg ),+ ),
        })
    };
}
