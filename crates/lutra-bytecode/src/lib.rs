//! # Lutra Bytecode
//!
//! In-memory bytecode for the Lutra compiler and the compact byte encoding
//! used to keep it around between passes.
//!
//! ## Layers
//!
//! - **varint**: `varuint32` and 9-bit opcode tags
//! - **field**: one encoding per operand type
//! - **compression**: instruction streams, driven by the per-opcode schema
//! - **verify**: whole-program round-trip check

#![warn(clippy::all)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod compression;
pub mod error;
pub mod field;
pub mod instruction;
pub mod opcode;
pub mod operand;
pub mod program;
pub mod varint;
pub mod verify;

pub use compression::{decode_bytecode_vec, encode_bytecode_vec};
pub use error::{CodecError, Result};
pub use instruction::{BytecodeVec, Double, Immediate, Instruction, NO_SRC_LOC};
pub use opcode::{ImmKind, Opcode};
pub use operand::{
    BlockId, FCallArgs, FCallFlags, IterArgs, IterArgsFlags, IterId, LitstrId, LocalId,
    LocalRange, MemberCode, MemberKey, NamedLocal, SwitchEntry,
};
pub use program::{Block, Class, Func, Program, Unit};
pub use varint::{Buffer, Reader};
pub use verify::{CompressionReport, test_compression};
