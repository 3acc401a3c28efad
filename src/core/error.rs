// This module defines error types for the IR layer using the thiserror crate for
// idiomatic Rust error handling. CompileError is the internal-compiler-error enum:
// every variant is reachable only through a front-end bug (the typed tree handed to
// lowering is assumed semantically valid), so these are never recovered — the driver
// prints the message and aborts the compilation. Each variant carries enough context
// (the construct involved, the offending name) to identify the failing internal
// operation. The module also provides CompileResult<T> as a convenience alias.

//! Error types for the IR lowering and optimization layer.
//!
//! Using thiserror for more idiomatic error handling.

use thiserror::Error;

/// Internal-compiler-error enum for the middle tier.
///
/// Anything here means the front end violated its contract; nothing is
/// user-diagnosable at this stage. The one user-level diagnostic this layer
/// produces (a literal-zero divisor seen during constant folding) is a
/// warning on the log stream, not an error.
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("expression used as an assignment target is not addressable: {what}")]
    NotAddressable { what: &'static str },

    #[error("break statement outside of a loop or switch")]
    StrayBreak,

    #[error("continue statement outside of a loop")]
    StrayContinue,

    #[error("unsupported construct reached lowering: {what}")]
    Unsupported { what: &'static str },

    #[error("function {name} has no body to lower")]
    MissingBody { name: String },

    #[error("local slot index {index} out of range for function {name}")]
    BadLocalSlot { index: u32, name: String },

    #[error("aggregate value of {bytes} bytes used where a scalar is required")]
    AggregateScalarMismatch { bytes: u64 },
}

/// Result type alias for lowering and optimization operations.
pub type CompileResult<T> = Result<T, CompileError>;
