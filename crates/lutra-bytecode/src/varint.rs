//! Variable-width integer and opcode tag encoding
//!
//! `varuint32` wire form:
//!
//! ```text
//! byte               if value < 0xFE
//! 0xFE u16_le        if value <= 0xFFFF
//! 0xFF u32_le        otherwise
//! ```
//!
//! Opcode tags use their own sentinel: tags below `0xFF` are one byte, the
//! rest are `0xFF` followed by `tag - 0xFF`.

use crate::error::{CodecError, Result};

/// Encoded bytecode
pub type Buffer = Vec<u8>;

/// Prefix of a varuint32 carrying a `u16`
pub const VAR_U16_CODE: u8 = 0xFE;

/// Prefix of a varuint32 carrying a `u32`
pub const VAR_U32_CODE: u8 = 0xFF;

/// Prefix of an extended opcode tag
pub const OP_TAG_SHIFT: u8 = 0xFF;

/// Largest opcode tag the two-byte form can carry
pub const MAX_OP_TAG: u16 = OP_TAG_SHIFT as u16 + u8::MAX as u16;

/// Append a varuint32 in its shortest form
pub fn write_var_u32(out: &mut Buffer, value: u32) {
    if value < u32::from(VAR_U16_CODE.min(VAR_U32_CODE)) {
        out.push(value as u8);
    } else if let Ok(short) = u16::try_from(value) {
        out.push(VAR_U16_CODE);
        out.extend_from_slice(&short.to_le_bytes());
    } else {
        out.push(VAR_U32_CODE);
        out.extend_from_slice(&value.to_le_bytes());
    }
}

/// Number of bytes `write_var_u32` emits for `value`
pub const fn var_u32_len(value: u32) -> usize {
    if value < VAR_U16_CODE as u32 {
        1
    } else if value <= u16::MAX as u32 {
        3
    } else {
        5
    }
}

/// Append an opcode tag
pub fn write_op_tag(out: &mut Buffer, tag: u16) -> Result<()> {
    if tag < u16::from(OP_TAG_SHIFT) {
        out.push(tag as u8);
        return Ok(());
    }
    let rest = u8::try_from(tag - u16::from(OP_TAG_SHIFT))
        .map_err(|_| CodecError::OpTagOutOfRange(tag))?;
    out.push(OP_TAG_SHIFT);
    out.push(rest);
    Ok(())
}

/// Cursor over an encoded buffer
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    /// Create a reader positioned at the start of `bytes`
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    /// Current cursor position
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Total buffer length
    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the buffer is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Whether the cursor sits exactly at the end of the buffer
    #[inline]
    pub fn at_end(&self) -> bool {
        self.offset == self.bytes.len()
    }

    /// Take the next `len` bytes
    pub fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.offset.checked_add(len);
        let slice = end
            .and_then(|end| self.bytes.get(self.offset..end))
            .ok_or(CodecError::UnexpectedEnd {
                offset: self.offset,
                needed: len,
            })?;
        self.offset += len;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Read a raw byte
    #[inline]
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    /// Read a little-endian `u16`
    pub fn read_u16_le(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.take_array()?))
    }

    /// Read a little-endian `u32`
    pub fn read_u32_le(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take_array()?))
    }

    /// Read a little-endian `i32`
    pub fn read_i32_le(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.take_array()?))
    }

    /// Read a little-endian `i64`
    pub fn read_i64_le(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.take_array()?))
    }

    /// Read a little-endian `f64` bit pattern
    pub fn read_f64_le(&mut self) -> Result<f64> {
        Ok(f64::from_bits(u64::from_le_bytes(self.take_array()?)))
    }

    /// Read a varuint32
    pub fn read_var_u32(&mut self) -> Result<u32> {
        match self.read_u8()? {
            VAR_U32_CODE => self.read_u32_le(),
            VAR_U16_CODE => self.read_u16_le().map(u32::from),
            byte => Ok(u32::from(byte)),
        }
    }

    /// Read an opcode tag
    pub fn read_op_tag(&mut self) -> Result<u16> {
        let byte = self.read_u8()?;
        if byte < OP_TAG_SHIFT {
            return Ok(u16::from(byte));
        }
        let next = self.read_u8()?;
        Ok(u16::from(next) + u16::from(OP_TAG_SHIFT))
    }
}
