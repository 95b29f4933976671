//! Instruction stream codec
//!
//! ```text
//! stream      := varuint32(count) instruction*
//! instruction := opcode_tag varuint32(src_loc - NO_SRC_LOC) immediate*
//! ```
//!
//! Immediates are written in the order given by [`Opcode::immediates`]; the
//! decoder reads them back by the same table, so nothing else about an
//! opcode's layout is stored.

use tracing::{debug, trace};

use crate::error::{CodecError, Result};
use crate::field::{check_field, decode_field, encode_field};
use crate::instruction::{BytecodeVec, Double, Immediate, Instruction, NO_SRC_LOC};
use crate::opcode::{ImmKind, Opcode};
use crate::varint::{Buffer, Reader, write_op_tag};

/// Append the encoding of `insns` to `out`
///
/// Fails without writing a partial instruction if an instruction does not
/// match its opcode's schema or carries an immediate the wire format cannot
/// represent. Bytes already written for earlier instructions
/// stay in `out`.
pub fn encode_bytecode_vec(out: &mut Buffer, insns: &[Instruction]) -> Result<()> {
    let start = out.len();
    let count = u32::try_from(insns.len()).map_err(|_| CodecError::ValueOutOfRange {
        field: "BytecodeVec::len",
        value: insns.len() as i64,
    })?;
    encode_field(out, &count);
    for insn in insns {
        encode_instruction(out, insn)?;
    }
    debug!(
        instructions = insns.len(),
        bytes = out.len() - start,
        "encoded bytecode"
    );
    Ok(())
}

/// Decode a whole buffer produced by [`encode_bytecode_vec`]
pub fn decode_bytecode_vec(bytes: &[u8]) -> Result<BytecodeVec> {
    let mut reader = Reader::new(bytes);
    let count: u32 = decode_field(&mut reader)?;
    let mut insns = BytecodeVec::with_capacity((count as usize).min(bytes.len()));
    for _ in 0..count {
        insns.push(decode_instruction(&mut reader)?);
    }
    if !reader.at_end() {
        return Err(CodecError::TrailingBytes {
            consumed: reader.offset(),
            len: reader.len(),
        });
    }
    debug!(instructions = insns.len(), bytes = bytes.len(), "decoded bytecode");
    Ok(insns)
}

fn encode_instruction(out: &mut Buffer, insn: &Instruction) -> Result<()> {
    insn.check_schema()?;
    insn.imms.iter().try_for_each(check_immediate)?;
    trace!(offset = out.len(), op = insn.op.name(), "encode instruction");

    write_op_tag(out, insn.op.tag())?;
    encode_field(out, &(insn.src_loc.wrapping_sub(NO_SRC_LOC) as u32));
    for imm in &insn.imms {
        encode_immediate(out, imm);
    }
    Ok(())
}

fn check_immediate(imm: &Immediate) -> Result<()> {
    match imm {
        Immediate::NamedLocal(v) => check_field(v),
        Immediate::IterArgs(v) => check_field(v),
        Immediate::FCallArgs(v) => check_field(&**v),
        Immediate::MemberKey(v) => check_field(v),
        Immediate::BlockVec(v) => check_field(v),
        Immediate::SwitchTable(v) => check_field(v),
        Immediate::StrVec(v) => check_field(v),
        Immediate::I32Vec(v) => check_field(v),
        Immediate::U8(_)
        | Immediate::Iva(_)
        | Immediate::I64(_)
        | Immediate::Double(_)
        | Immediate::Local(_)
        | Immediate::Iter(_)
        | Immediate::Litstr(_)
        | Immediate::Block(_)
        | Immediate::LocalRange(_) => Ok(()),
    }
}

fn encode_immediate(out: &mut Buffer, imm: &Immediate) {
    match imm {
        Immediate::U8(v) => encode_field(out, v),
        Immediate::Iva(v) => encode_field(out, v),
        Immediate::I64(v) => encode_field(out, v),
        Immediate::Double(v) => encode_field(out, &v.0),
        Immediate::Local(v) => encode_field(out, v),
        Immediate::NamedLocal(v) => encode_field(out, v),
        Immediate::Iter(v) => encode_field(out, v),
        Immediate::Litstr(v) => encode_field(out, v),
        Immediate::Block(v) => encode_field(out, v),
        Immediate::LocalRange(v) => encode_field(out, v),
        Immediate::IterArgs(v) => encode_field(out, v),
        Immediate::FCallArgs(v) => encode_field(out, &**v),
        Immediate::MemberKey(v) => encode_field(out, v),
        Immediate::BlockVec(v) => encode_field(out, v),
        Immediate::SwitchTable(v) => encode_field(out, v),
        Immediate::StrVec(v) => encode_field(out, v),
        Immediate::I32Vec(v) => encode_field(out, v),
    }
}

fn decode_instruction(reader: &mut Reader<'_>) -> Result<Instruction> {
    let offset = reader.offset();
    let tag = reader.read_op_tag()?;
    let op = Opcode::from_tag(tag).ok_or(CodecError::InvalidOpcode(tag))?;
    trace!(offset, op = op.name(), "decode instruction");

    let src_loc = decode_field::<u32>(reader)?.wrapping_add(NO_SRC_LOC as u32) as i32;
    let imms = op
        .immediates()
        .iter()
        .map(|&kind| decode_immediate(reader, kind))
        .collect::<Result<_>>()?;
    Ok(Instruction { op, src_loc, imms })
}

fn decode_immediate(reader: &mut Reader<'_>, kind: ImmKind) -> Result<Immediate> {
    Ok(match kind {
        ImmKind::U8 => Immediate::U8(decode_field(reader)?),
        ImmKind::Iva => Immediate::Iva(decode_field(reader)?),
        ImmKind::I64 => Immediate::I64(decode_field(reader)?),
        ImmKind::Double => Immediate::Double(Double(decode_field(reader)?)),
        ImmKind::Local => Immediate::Local(decode_field(reader)?),
        ImmKind::NamedLocal => Immediate::NamedLocal(decode_field(reader)?),
        ImmKind::Iter => Immediate::Iter(decode_field(reader)?),
        ImmKind::Litstr => Immediate::Litstr(decode_field(reader)?),
        ImmKind::Block => Immediate::Block(decode_field(reader)?),
        ImmKind::LocalRange => Immediate::LocalRange(decode_field(reader)?),
        ImmKind::IterArgs => Immediate::IterArgs(decode_field(reader)?),
        ImmKind::FCallArgs => Immediate::FCallArgs(Box::new(decode_field(reader)?)),
        ImmKind::MemberKey => Immediate::MemberKey(decode_field(reader)?),
        ImmKind::BlockVec => Immediate::BlockVec(decode_field(reader)?),
        ImmKind::SwitchTable => Immediate::SwitchTable(decode_field(reader)?),
        ImmKind::StrVec => Immediate::StrVec(decode_field(reader)?),
        ImmKind::I32Vec => Immediate::I32Vec(decode_field(reader)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operand::{BlockId, LitstrId};

    #[test]
    fn test_empty_stream() {
        let mut out = Buffer::new();
        encode_bytecode_vec(&mut out, &[]).unwrap();
        assert_eq!(out, [0]);
        assert!(decode_bytecode_vec(&out).unwrap().is_empty());
    }

    #[test]
    fn test_src_loc_delta() {
        let insns = vec![
            Instruction::new(Opcode::Nop),
            Instruction::new(Opcode::Nop).at(0),
            Instruction::new(Opcode::Nop).at(300),
        ];
        let mut out = Buffer::new();
        encode_bytecode_vec(&mut out, &insns).unwrap();
        assert_eq!(out, [3, 0x00, 0x00, 0x00, 0x01, 0x00, 0xFE, 0x2D, 0x01]);
        assert_eq!(decode_bytecode_vec(&out).unwrap(), insns);
    }

    #[test]
    fn test_extended_opcode_tag() {
        let insns = vec![Instruction::new(Opcode::BreakTraceHint)];
        let mut out = Buffer::new();
        encode_bytecode_vec(&mut out, &insns).unwrap();
        assert_eq!(out, [1, 0xFF, 0xFF, 0x00]);
        assert_eq!(decode_bytecode_vec(&out).unwrap(), insns);
    }

    #[test]
    fn test_schema_violation_writes_nothing_for_instruction() {
        let insns = vec![
            Instruction::new(Opcode::Nop),
            Instruction::new(Opcode::String).imm(Immediate::Block(BlockId(0))),
        ];
        let mut out = Buffer::new();
        let err = encode_bytecode_vec(&mut out, &insns).unwrap_err();
        assert!(matches!(err, CodecError::ImmediateMismatch { index: 0, .. }));
        // count and the first instruction only
        assert_eq!(out, [2, 0x00, 0x00]);
    }

    #[test]
    fn test_trailing_bytes() {
        let insns = vec![Instruction::new(Opcode::String).imm(Immediate::Litstr(LitstrId(1)))];
        let mut out = Buffer::new();
        encode_bytecode_vec(&mut out, &insns).unwrap();
        out.push(0);
        assert_eq!(
            decode_bytecode_vec(&out),
            Err(CodecError::TrailingBytes {
                consumed: out.len() - 1,
                len: out.len()
            })
        );
    }
}
