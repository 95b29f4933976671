//! Codec errors
//!
//! The encoder and decoder are always built together and only ever see
//! bytecode produced by the compiler itself, so every variant here is an
//! internal-consistency violation. Callers propagate them and the top level
//! treats them as fatal.

use thiserror::Error;

use crate::opcode::{ImmKind, Opcode};

/// Errors that can occur while encoding or decoding bytecode
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// Decoding ran past the end of the buffer
    #[error("Unexpected end of bytecode at offset {offset} (needed {needed} more bytes)")]
    UnexpectedEnd {
        /// Cursor position when the read was attempted
        offset: usize,
        /// Number of bytes the read required
        needed: usize,
    },

    /// Decoded tag does not name an opcode
    #[error("Invalid opcode tag: {0:#x}")]
    InvalidOpcode(u16),

    /// Opcode tag does not fit the 9-bit wire range
    #[error("Opcode tag {0:#x} is outside the encodable range")]
    OpTagOutOfRange(u16),

    /// Decoded member code does not name a member key kind
    #[error("Invalid member code: {0}")]
    InvalidMemberCode(u8),

    /// A decoded value does not fit the field it was read into
    #[error("Value {value} out of range for {field}")]
    ValueOutOfRange {
        /// Field type being decoded or encoded
        field: &'static str,
        /// Offending value
        value: i64,
    },

    /// Instruction carries the wrong number of immediates for its opcode
    #[error("{op:?} expects {expected} immediates, found {found}")]
    ImmediateArity {
        /// Opcode of the offending instruction
        op: Opcode,
        /// Number of immediates in the opcode schema
        expected: usize,
        /// Number of immediates carried by the instruction
        found: usize,
    },

    /// Immediate kind differs from the opcode schema
    #[error("{op:?} immediate {index} should be {expected:?}, found {found:?}")]
    ImmediateMismatch {
        /// Opcode of the offending instruction
        op: Opcode,
        /// Position of the immediate
        index: usize,
        /// Kind required by the schema
        expected: ImmKind,
        /// Kind actually present
        found: ImmKind,
    },

    /// Decoding finished before the end of the buffer
    #[error("Decoded {consumed} of {len} bytes")]
    TrailingBytes {
        /// Final cursor position
        consumed: usize,
        /// Buffer length
        len: usize,
    },
}

/// Result type for codec operations
pub type Result<T> = std::result::Result<T, CodecError>;
