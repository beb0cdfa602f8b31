//! Result and error types representing the outcome of compiling a function.

/// An error that occurred while compiling a module.
///
/// Most backend faults are invariant violations (compiler bugs) and panic
/// instead; the variants here are the conditions a caller can meaningfully
/// report.
#[derive(Debug, thiserror::Error)]
pub enum CodegenError {
    /// The input IR uses a construct the backend does not support.
    #[error("unsupported IR: {0}")]
    Unsupported(String),

    /// A value was consumed without a recorded type. The mid-end is
    /// expected to have typed every value.
    #[error("value {0} has no recorded type")]
    MissingType(String),

    /// The input IR is malformed, e.g. a block without a terminator.
    #[error("malformed IR: {0}")]
    Malformed(String),
}

/// A convenient alias for a `Result` that uses `CodegenError` as the error
/// type.
pub type CodegenResult<T> = Result<T, CodegenError>;
