//! Typed field codec
//!
//! One encode/decode pair per operand type. Composite types are encoded field
//! by field in their logical order, recursing through this codec, so the
//! byte layout never depends on in-memory representation.
//!
//! Values with a "none" state are written as a delta from their sentinel so
//! that the common none case costs a single zero byte.

use tracing::trace;

use crate::error::{CodecError, Result};
use crate::operand::{
    BlockId, FCallArgs, FCallFlags, INVALID_LOCAL_NAME, IterArgs, IterArgsFlags, IterId, LitstrId,
    LocalId, LocalRange, MemberCode, MemberKey, NO_BLOCK_ID, NO_KEY, NO_LOCAL_ID, NamedLocal,
    SwitchEntry, inout_bytes,
};
use crate::varint::{Buffer, Reader, write_var_u32};

mod sealed {
    pub trait Sealed {}
}

/// A value with a fixed bytecode encoding
pub trait Field: Sized + sealed::Sealed {
    /// Reject values the encoding cannot represent
    ///
    /// `encode` assumes this passed: a value that collides with a sentinel
    /// would otherwise be written as a different, valid value.
    fn check(&self) -> Result<()> {
        Ok(())
    }

    /// Append the encoding of `self`
    fn encode(&self, out: &mut Buffer);

    /// Decode one value, advancing the reader
    fn decode(reader: &mut Reader<'_>) -> Result<Self>;
}

/// Encode a field, tracing its type and position
#[inline]
pub fn encode_field<T: Field>(out: &mut Buffer, value: &T) {
    trace!(offset = out.len(), field = std::any::type_name::<T>(), "encode");
    value.encode(out);
}

/// Check that a field is encodable
#[inline]
pub fn check_field<T: Field>(value: &T) -> Result<()> {
    value.check()
}

/// Decode a field, tracing its type and position
#[inline]
pub fn decode_field<T: Field>(reader: &mut Reader<'_>) -> Result<T> {
    trace!(offset = reader.offset(), field = std::any::type_name::<T>(), "decode");
    T::decode(reader)
}

fn out_of_range(field: &'static str, value: impl Into<i64>) -> CodecError {
    CodecError::ValueOutOfRange {
        field,
        value: value.into(),
    }
}

macro_rules! impl_sealed {
    ($($ty:ty),* $(,)?) => {
        $(impl sealed::Sealed for $ty {})*
    };
}

impl_sealed!(
    u8,
    u32,
    i32,
    i64,
    f64,
    LocalId,
    IterId,
    BlockId,
    LitstrId,
    Option<LitstrId>,
    LocalRange,
    NamedLocal,
    IterArgs,
    FCallArgs,
    MemberKey,
    SwitchEntry,
);

impl<T: Field> sealed::Sealed for Vec<T> {}

// ==================== Plain values ====================

impl Field for u8 {
    fn encode(&self, out: &mut Buffer) {
        out.push(*self);
    }

    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        reader.read_u8()
    }
}

impl Field for u32 {
    fn encode(&self, out: &mut Buffer) {
        write_var_u32(out, *self);
    }

    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        reader.read_var_u32()
    }
}

impl Field for i32 {
    fn encode(&self, out: &mut Buffer) {
        out.extend_from_slice(&self.to_le_bytes());
    }

    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        reader.read_i32_le()
    }
}

impl Field for i64 {
    fn encode(&self, out: &mut Buffer) {
        out.extend_from_slice(&self.to_le_bytes());
    }

    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        reader.read_i64_le()
    }
}

impl Field for f64 {
    fn encode(&self, out: &mut Buffer) {
        out.extend_from_slice(&self.to_bits().to_le_bytes());
    }

    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        reader.read_f64_le()
    }
}

macro_rules! impl_id_field {
    ($($ty:ident),*) => {
        $(
            impl Field for $ty {
                fn encode(&self, out: &mut Buffer) {
                    write_var_u32(out, self.0);
                }

                fn decode(reader: &mut Reader<'_>) -> Result<Self> {
                    reader.read_var_u32().map($ty)
                }
            }
        )*
    };
}

impl_id_field!(LocalId, IterId, BlockId, LitstrId);

impl Field for Option<LitstrId> {
    fn check(&self) -> Result<()> {
        match self {
            Some(id) if id.0 == u32::MAX => Err(out_of_range("LitstrId", id.0)),
            _ => Ok(()),
        }
    }

    fn encode(&self, out: &mut Buffer) {
        let raw = self.map_or(0, |id| id.0.wrapping_add(1));
        encode_field(out, &raw);
    }

    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        let raw: u32 = decode_field(reader)?;
        Ok(raw.checked_sub(1).map(LitstrId))
    }
}

// ==================== Composites ====================

impl Field for LocalRange {
    fn encode(&self, out: &mut Buffer) {
        encode_field(out, &self.first);
        encode_field(out, &self.count);
    }

    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        let first = decode_field(reader)?;
        let count = decode_field(reader)?;
        Ok(Self { first, count })
    }
}

impl Field for NamedLocal {
    fn check(&self) -> Result<()> {
        // The name is shifted by one on the wire and must still read back as an i32
        if let Some(name) = self.name
            && name >= i32::MAX as u32
        {
            return Err(out_of_range("NamedLocal::name", name));
        }
        match self.id {
            Some(id) if id.0 == NO_LOCAL_ID => Err(out_of_range("NamedLocal::id", id.0)),
            _ => Ok(()),
        }
    }

    fn encode(&self, out: &mut Buffer) {
        let name = self.raw_name().wrapping_sub(INVALID_LOCAL_NAME) as u32;
        encode_field(out, &name);
        encode_field(out, &self.raw_id().wrapping_sub(NO_LOCAL_ID));
    }

    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        let base: u32 = decode_field(reader)?;
        let name = i32::try_from(base)
            .map_err(|_| out_of_range("NamedLocal::name", base))?
            .wrapping_add(INVALID_LOCAL_NAME);
        let id = decode_field::<u32>(reader)?.wrapping_add(NO_LOCAL_ID);
        Ok(Self {
            name: (name != INVALID_LOCAL_NAME).then_some(name as u32),
            id: (id != NO_LOCAL_ID).then_some(LocalId(id)),
        })
    }
}

impl Field for IterArgs {
    fn check(&self) -> Result<()> {
        match self.key_id {
            Some(key) if key.0 == NO_KEY => Err(out_of_range("IterArgs::key_id", key.0)),
            _ => Ok(()),
        }
    }

    fn encode(&self, out: &mut Buffer) {
        encode_field(out, &self.flags.0);
        encode_field(out, &self.iter_id);
        encode_field(out, &self.raw_key_id().wrapping_sub(NO_KEY));
        encode_field(out, &self.val_id);
    }

    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        let flags = IterArgsFlags(decode_field(reader)?);
        let iter_id = decode_field(reader)?;
        let key_id = decode_field::<u32>(reader)?.wrapping_add(NO_KEY);
        let val_id = decode_field(reader)?;
        Ok(Self {
            flags,
            iter_id,
            key_id: (key_id != NO_KEY).then_some(LocalId(key_id)),
            val_id,
        })
    }
}

const MARKER_LOCK_WHILE_UNWINDING: u8 = 1 << 0;
const MARKER_SKIP_NUM_ARGS_CHECK: u8 = 1 << 1;

impl Field for FCallArgs {
    fn check(&self) -> Result<()> {
        if self.flags.intersection(FCallFlags::INTERNAL_FLAGS) != self.flags {
            return Err(out_of_range("FCallArgs::flags", self.flags.0));
        }
        if let Some(target) = self.async_eager_target
            && target.0 == NO_BLOCK_ID
        {
            return Err(out_of_range("FCallArgs::async_eager_target", target.0));
        }
        if let Some(bits) = &self.inout
            && bits.len() != inout_bytes(self.num_args)
        {
            return Err(out_of_range("FCallArgs::inout", bits.len() as i64));
        }
        self.context.check()
    }

    fn encode(&self, out: &mut Buffer) {
        let mut flags = self.flags.intersection(FCallFlags::INTERNAL_FLAGS);
        if self.enforce_inout() {
            flags = flags.union(FCallFlags::ENFORCE_INOUT);
        }
        let mut markers = 0u8;
        if self.lock_while_unwinding {
            markers |= MARKER_LOCK_WHILE_UNWINDING;
        }
        if self.skip_num_args_check {
            markers |= MARKER_SKIP_NUM_ARGS_CHECK;
        }

        encode_field(out, &flags.0);
        encode_field(out, &self.num_args);
        encode_field(out, &self.num_rets);
        encode_field(out, &markers);
        encode_field(out, &self.context);
        let target = self.async_eager_target.map_or(NO_BLOCK_ID, BlockId::index);
        encode_field(out, &target.wrapping_sub(NO_BLOCK_ID));

        if self.enforce_inout() {
            let start = out.len();
            out.resize(start + inout_bytes(self.num_args), 0);
            for i in (0..self.num_args).filter(|&i| self.is_inout(i)) {
                out[start + (i / 8) as usize] |= 1 << (i % 8);
            }
        }
    }

    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        let flags = FCallFlags(decode_field(reader)?);
        let num_args: u32 = decode_field(reader)?;
        let num_rets: u32 = decode_field(reader)?;
        let markers: u8 = decode_field(reader)?;
        let context = decode_field(reader)?;
        let target = decode_field::<u32>(reader)?.wrapping_add(NO_BLOCK_ID);

        let inout = if flags.contains(FCallFlags::ENFORCE_INOUT) {
            let bytes = reader.take(inout_bytes(num_args))?;
            Some(Box::from(bytes))
        } else {
            None
        };

        Ok(Self {
            flags: flags.intersection(FCallFlags::INTERNAL_FLAGS),
            num_args,
            num_rets,
            inout,
            async_eager_target: (target != NO_BLOCK_ID).then_some(BlockId(target)),
            lock_while_unwinding: markers & MARKER_LOCK_WHILE_UNWINDING != 0,
            skip_num_args_check: markers & MARKER_SKIP_NUM_ARGS_CHECK != 0,
            context,
        })
    }
}

impl Field for MemberKey {
    fn check(&self) -> Result<()> {
        match self {
            Self::ElemLocal(local) | Self::PropLocal(local) => local.check(),
            _ => Ok(()),
        }
    }

    fn encode(&self, out: &mut Buffer) {
        encode_field(out, &(self.code() as u8));
        match *self {
            Self::ElemStr(s) | Self::PropStr(s) | Self::NullsafePropStr(s) => encode_field(out, &s),
            Self::ElemInt(i) => encode_field(out, &i),
            Self::ElemCell(idx) | Self::PropCell(idx) => encode_field(out, &i64::from(idx)),
            Self::ElemLocal(local) | Self::PropLocal(local) => encode_field(out, &local),
            Self::NewElem => {}
        }
    }

    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        let byte: u8 = decode_field(reader)?;
        let code = MemberCode::from_byte(byte).ok_or(CodecError::InvalidMemberCode(byte))?;
        let cell = |reader: &mut Reader<'_>| -> Result<u32> {
            let raw: i64 = decode_field(reader)?;
            u32::try_from(raw).map_err(|_| out_of_range("MemberKey::cell", raw))
        };
        Ok(match code {
            MemberCode::ElemStr => Self::ElemStr(decode_field(reader)?),
            MemberCode::PropStr => Self::PropStr(decode_field(reader)?),
            MemberCode::NullsafePropStr => Self::NullsafePropStr(decode_field(reader)?),
            MemberCode::ElemInt => Self::ElemInt(decode_field(reader)?),
            MemberCode::ElemCell => Self::ElemCell(cell(reader)?),
            MemberCode::PropCell => Self::PropCell(cell(reader)?),
            MemberCode::ElemLocal => Self::ElemLocal(decode_field(reader)?),
            MemberCode::PropLocal => Self::PropLocal(decode_field(reader)?),
            MemberCode::NewElem => Self::NewElem,
        })
    }
}

impl Field for SwitchEntry {
    fn encode(&self, out: &mut Buffer) {
        encode_field(out, &self.key);
        encode_field(out, &self.target);
    }

    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        let key = decode_field(reader)?;
        let target = decode_field(reader)?;
        Ok(Self { key, target })
    }
}

/// Wire length of a vector
fn vec_len(len: usize) -> Result<u32> {
    u32::try_from(len)
        .map_err(|_| out_of_range("Vec::len", i64::try_from(len).unwrap_or(i64::MAX)))
}

impl<T: Field> Field for Vec<T> {
    fn check(&self) -> Result<()> {
        vec_len(self.len())?;
        self.iter().try_for_each(T::check)
    }

    fn encode(&self, out: &mut Buffer) {
        // Checked by `check`
        encode_field(out, &(self.len() as u32));
        for item in self {
            encode_field(out, item);
        }
    }

    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        let len: u32 = decode_field(reader)?;
        // Every element needs at least one byte; don't trust `len` further than that.
        let remaining = reader.len() - reader.offset();
        let mut data = Vec::with_capacity((len as usize).min(remaining));
        for _ in 0..len {
            data.push(decode_field(reader)?);
        }
        Ok(data)
    }
}
