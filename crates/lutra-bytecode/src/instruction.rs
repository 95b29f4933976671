//! Bytecode instructions
//!
//! An instruction is an opcode, an optional source location and the opcode's
//! immediates. Immediates are stored as a closed tagged union; the per-opcode
//! schema in [`Opcode::immediates`] says which variant must sit in each slot.

use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::error::{CodecError, Result};
use crate::opcode::{ImmKind, Opcode};
use crate::operand::{
    BlockId, FCallArgs, IterArgs, IterId, LitstrId, LocalId, LocalRange, MemberKey, NamedLocal,
    SwitchEntry,
};

/// Source location meaning "unknown"
pub const NO_SRC_LOC: i32 = -1;

/// A sequence of instructions
pub type BytecodeVec = Vec<Instruction>;

/// Float immediate compared by bit pattern, so NaN payloads round-trip as equal
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Double(pub f64);

impl PartialEq for Double {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for Double {}

/// Immediate operand
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Immediate {
    /// Raw byte
    U8(u8),
    /// Variable-width count
    Iva(u32),
    /// Integer literal
    I64(i64),
    /// Float literal
    Double(Double),
    /// Local slot
    Local(LocalId),
    /// Local slot with name
    NamedLocal(NamedLocal),
    /// Iterator slot
    Iter(IterId),
    /// Literal string
    Litstr(LitstrId),
    /// Jump target
    Block(BlockId),
    /// Range of locals
    LocalRange(LocalRange),
    /// Iterator arguments
    IterArgs(IterArgs),
    /// Call arguments
    FCallArgs(Box<FCallArgs>),
    /// Member key
    MemberKey(MemberKey),
    /// Jump table
    BlockVec(Vec<BlockId>),
    /// String switch table
    SwitchTable(Vec<SwitchEntry>),
    /// Literal string list
    StrVec(Vec<LitstrId>),
    /// Integer list
    I32Vec(Vec<i32>),
}

impl Immediate {
    /// Wire kind of this immediate
    pub const fn kind(&self) -> ImmKind {
        match self {
            Self::U8(_) => ImmKind::U8,
            Self::Iva(_) => ImmKind::Iva,
            Self::I64(_) => ImmKind::I64,
            Self::Double(_) => ImmKind::Double,
            Self::Local(_) => ImmKind::Local,
            Self::NamedLocal(_) => ImmKind::NamedLocal,
            Self::Iter(_) => ImmKind::Iter,
            Self::Litstr(_) => ImmKind::Litstr,
            Self::Block(_) => ImmKind::Block,
            Self::LocalRange(_) => ImmKind::LocalRange,
            Self::IterArgs(_) => ImmKind::IterArgs,
            Self::FCallArgs(_) => ImmKind::FCallArgs,
            Self::MemberKey(_) => ImmKind::MemberKey,
            Self::BlockVec(_) => ImmKind::BlockVec,
            Self::SwitchTable(_) => ImmKind::SwitchTable,
            Self::StrVec(_) => ImmKind::StrVec,
            Self::I32Vec(_) => ImmKind::I32Vec,
        }
    }
}

impl From<FCallArgs> for Immediate {
    fn from(args: FCallArgs) -> Self {
        Self::FCallArgs(Box::new(args))
    }
}

/// A single bytecode instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    /// Opcode
    pub op: Opcode,
    /// Source line, `NO_SRC_LOC` if unknown
    pub src_loc: i32,
    /// Immediates, in schema order
    pub imms: SmallVec<[Immediate; 4]>,
}

impl Instruction {
    /// Create an instruction without immediates or location
    pub fn new(op: Opcode) -> Self {
        Self {
            op,
            src_loc: NO_SRC_LOC,
            imms: SmallVec::new(),
        }
    }

    /// Create an instruction with the given immediates
    pub fn with_imms(op: Opcode, imms: impl IntoIterator<Item = Immediate>) -> Self {
        Self {
            op,
            src_loc: NO_SRC_LOC,
            imms: imms.into_iter().collect(),
        }
    }

    /// Set the source location
    pub fn at(mut self, src_loc: i32) -> Self {
        self.src_loc = src_loc;
        self
    }

    /// Append an immediate
    pub fn imm(mut self, imm: impl Into<Immediate>) -> Self {
        self.imms.push(imm.into());
        self
    }

    /// Check the immediates against the opcode schema
    pub fn check_schema(&self) -> Result<()> {
        let expected = self.op.immediates();
        if expected.len() != self.imms.len() {
            return Err(CodecError::ImmediateArity {
                op: self.op,
                expected: expected.len(),
                found: self.imms.len(),
            });
        }
        for (index, (&kind, imm)) in expected.iter().zip(&self.imms).enumerate() {
            if imm.kind() != kind {
                return Err(CodecError::ImmediateMismatch {
                    op: self.op,
                    index,
                    expected: kind,
                    found: imm.kind(),
                });
            }
        }
        Ok(())
    }
}

// ==================== Disassembly ====================

fn join<T>(
    f: &mut fmt::Formatter<'_>,
    items: &[T],
    each: impl Fn(&mut fmt::Formatter<'_>, &T) -> fmt::Result,
) -> fmt::Result {
    f.write_str("<")?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(" ")?;
        }
        each(f, item)?;
    }
    f.write_str(">")
}

impl fmt::Display for NamedLocal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id {
            Some(id) => write!(f, "L:{}", id.0)?,
            None => f.write_str("L:-")?,
        }
        if let Some(name) = self.name {
            write!(f, "({name})")?;
        }
        Ok(())
    }
}

impl fmt::Display for MemberKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = self.code().name();
        match self {
            Self::ElemCell(i) | Self::PropCell(i) => write!(f, "{code}:{i}"),
            Self::ElemLocal(l) | Self::PropLocal(l) => write!(f, "{code}:{l}"),
            Self::ElemStr(s) | Self::PropStr(s) | Self::NullsafePropStr(s) => {
                write!(f, "{code}:s{}", s.0)
            }
            Self::ElemInt(i) => write!(f, "{code}:{i}"),
            Self::NewElem => f.write_str(code),
        }
    }
}

impl fmt::Display for FCallArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{:#x} {} {} ", self.flags.0, self.num_args, self.num_rets)?;
        if self.enforce_inout() {
            f.write_str("\"")?;
            for i in 0..self.num_args {
                f.write_str(if self.is_inout(i) { "1" } else { "0" })?;
            }
            f.write_str("\" ")?;
        } else {
            f.write_str("\"\" ")?;
        }
        match self.async_eager_target {
            Some(target) => write!(f, "B{}", target.0)?,
            None => f.write_str("-")?,
        }
        if self.lock_while_unwinding {
            f.write_str(" lock")?;
        }
        if self.skip_num_args_check {
            f.write_str(" skipargs")?;
        }
        if let Some(ctx) = self.context {
            write!(f, " s{}", ctx.0)?;
        }
        f.write_str(">")
    }
}

impl fmt::Display for Immediate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::U8(v) => write!(f, "{v}"),
            Self::Iva(v) => write!(f, "{v}"),
            Self::I64(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{:?}", v.0),
            Self::Local(l) => write!(f, "L:{}", l.0),
            Self::NamedLocal(l) => write!(f, "{l}"),
            Self::Iter(i) => write!(f, "I:{}", i.0),
            Self::Litstr(s) => write!(f, "s{}", s.0),
            Self::Block(b) => write!(f, "B{}", b.0),
            Self::LocalRange(r) => write!(f, "L:{}+{}", r.first.0, r.count),
            Self::IterArgs(a) => {
                write!(f, "<{} I:{} ", a.flags.0, a.iter_id.0)?;
                match a.key_id {
                    Some(k) => write!(f, "K:{} ", k.0)?,
                    None => f.write_str("K:- ")?,
                }
                write!(f, "V:{}>", a.val_id.0)
            }
            Self::FCallArgs(a) => write!(f, "{a}"),
            Self::MemberKey(k) => write!(f, "{k}"),
            Self::BlockVec(v) => join(f, v, |f, b| write!(f, "B{}", b.0)),
            Self::SwitchTable(v) => join(f, v, |f, e| write!(f, "s{}:B{}", e.key.0, e.target.0)),
            Self::StrVec(v) => join(f, v, |f, s| write!(f, "s{}", s.0)),
            Self::I32Vec(v) => join(f, v, |f, i| write!(f, "{i}")),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.op.name())?;
        for imm in &self.imms {
            write!(f, " {imm}")?;
        }
        if self.src_loc != NO_SRC_LOC {
            write!(f, " @{}", self.src_loc)?;
        }
        Ok(())
    }
}
