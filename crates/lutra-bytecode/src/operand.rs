//! Bytecode operands
//!
//! Immediate operand types carried by instructions. Several of them have a
//! "none" state that the wire format represents as a delta from a sentinel
//! value (see the `NO_*` constants); in memory that state is an `Option`.

use serde::{Deserialize, Serialize};

/// Sentinel for "no local": `LocalId` deltas are taken against this value
pub const NO_LOCAL_ID: u32 = u32::MAX;

/// Sentinel for "no block": `BlockId` deltas are taken against this value
pub const NO_BLOCK_ID: u32 = u32::MAX;

/// Sentinel for an iterator without a key local
pub const NO_KEY: u32 = u32::MAX;

/// Sentinel for a local without a name
pub const INVALID_LOCAL_NAME: i32 = -1;

/// Local variable slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct LocalId(pub u32);

impl LocalId {
    /// Create a new local id
    #[inline]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Get slot index
    #[inline]
    pub const fn index(self) -> u32 {
        self.0
    }
}

/// Iterator slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct IterId(pub u32);

impl IterId {
    /// Create a new iterator id
    #[inline]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Get slot index
    #[inline]
    pub const fn index(self) -> u32 {
        self.0
    }
}

/// Basic block within a function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct BlockId(pub u32);

impl BlockId {
    /// Create a new block id
    #[inline]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Get block index
    #[inline]
    pub const fn index(self) -> u32 {
        self.0
    }
}

/// Index into the unit's literal string table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct LitstrId(pub u32);

impl LitstrId {
    /// Create a new literal string id
    #[inline]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Get table index
    #[inline]
    pub const fn index(self) -> u32 {
        self.0
    }
}

/// Contiguous range of locals: `first .. first + count`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalRange {
    /// First local in the range
    pub first: LocalId,
    /// Number of locals
    pub count: u32,
}

/// Local operand that remembers the source name it was bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NamedLocal {
    /// Index of the name in the function's local names (`None` if unnamed)
    pub name: Option<u32>,
    /// Slot id (`None` once the slot has been killed)
    pub id: Option<LocalId>,
}

impl NamedLocal {
    /// A named local whose name index equals its slot
    pub const fn new(id: LocalId) -> Self {
        Self {
            name: Some(id.0),
            id: Some(id),
        }
    }

    /// Raw name index, `INVALID_LOCAL_NAME` when unnamed
    #[inline]
    pub fn raw_name(&self) -> i32 {
        self.name.map_or(INVALID_LOCAL_NAME, |n| n as i32)
    }

    /// Raw slot id, `NO_LOCAL_ID` when absent
    #[inline]
    pub fn raw_id(&self) -> u32 {
        self.id.map_or(NO_LOCAL_ID, LocalId::index)
    }
}

/// Iterator instruction flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct IterArgsFlags(pub u8);

impl IterArgsFlags {
    /// No flags
    pub const NONE: Self = Self(0);
    /// The base is a local and must not be mutated by the loop body
    pub const BASE_CONST: Self = Self(1 << 0);

    /// Check whether every bit of `other` is set
    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

/// Iterator arguments: slot plus output locals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IterArgs {
    /// Iterator flags
    pub flags: IterArgsFlags,
    /// Iterator slot
    pub iter_id: IterId,
    /// Local receiving the key, if any
    pub key_id: Option<LocalId>,
    /// Local receiving the value
    pub val_id: LocalId,
}

impl IterArgs {
    /// Raw key local, `NO_KEY` when absent
    #[inline]
    pub fn raw_key_id(&self) -> u32 {
        self.key_id.map_or(NO_KEY, LocalId::index)
    }
}

/// Call flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct FCallFlags(pub u8);

impl FCallFlags {
    /// No flags
    pub const NONE: Self = Self(0);
    /// Last argument is an unpacked container
    pub const HAS_UNPACK: Self = Self(1 << 0);
    /// Call passes reified generics
    pub const HAS_GENERICS: Self = Self(1 << 1);
    /// Skip repacking of variadic arguments
    pub const SKIP_REPACK: Self = Self(1 << 2);
    /// Callee coeffects are not checked
    pub const SKIP_COEFFECTS_CHECK: Self = Self(1 << 3);
    /// Return value must be mutable
    pub const ENFORCE_MUTABLE_RETURN: Self = Self(1 << 4);
    /// Receiver must not be readonly
    pub const ENFORCE_READONLY_THIS: Self = Self(1 << 5);
    /// Wire-only: an inout bitset follows the call descriptor
    pub const ENFORCE_INOUT: Self = Self(1 << 7);

    /// Flags that live in memory; `ENFORCE_INOUT` is derived from the bitset
    pub const INTERNAL_FLAGS: Self = Self(0x3F);

    /// Check whether every bit of `other` is set
    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Union of two flag sets
    #[inline]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Intersection of two flag sets
    #[inline]
    pub const fn intersection(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }
}

/// Call arguments descriptor
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FCallArgs {
    /// Call flags (never contains `ENFORCE_INOUT`)
    pub flags: FCallFlags,
    /// Number of arguments
    pub num_args: u32,
    /// Number of return values (1 + number of inout arguments)
    pub num_rets: u32,
    /// One bit per argument, set when the argument must be passed inout
    pub inout: Option<Box<[u8]>>,
    /// Block to resume at when an async callee finishes eagerly
    pub async_eager_target: Option<BlockId>,
    /// Hold the object lock while unwinding
    pub lock_while_unwinding: bool,
    /// Callee skips the argument count check
    pub skip_num_args_check: bool,
    /// Calling context class, if one is forwarded
    pub context: Option<LitstrId>,
}

impl FCallArgs {
    /// Plain call with `num_args` arguments and a single return value
    pub fn new(num_args: u32) -> Self {
        Self {
            flags: FCallFlags::NONE,
            num_args,
            num_rets: 1,
            inout: None,
            async_eager_target: None,
            lock_while_unwinding: false,
            skip_num_args_check: false,
            context: None,
        }
    }

    /// Enforce inout-ness of each argument. `inout.len()` must equal `num_args`.
    pub fn with_inout(mut self, inout: &[bool]) -> Self {
        debug_assert_eq!(inout.len(), self.num_args as usize);
        let mut bits = vec![0u8; inout_bytes(self.num_args)];
        for (i, _) in inout.iter().enumerate().filter(|(_, set)| **set) {
            bits[i / 8] |= 1 << (i % 8);
        }
        self.num_rets = 1 + inout.iter().filter(|set| **set).count() as u32;
        self.inout = Some(bits.into_boxed_slice());
        self
    }

    /// Set the async eager return target
    pub fn with_async_eager_target(mut self, target: BlockId) -> Self {
        self.async_eager_target = Some(target);
        self
    }

    /// Set the forwarded context
    pub fn with_context(mut self, context: LitstrId) -> Self {
        self.context = Some(context);
        self
    }

    /// Whether the call carries an inout bitset
    #[inline]
    pub fn enforce_inout(&self) -> bool {
        self.inout.is_some()
    }

    /// Whether argument `i` is passed inout
    pub fn is_inout(&self, i: u32) -> bool {
        self.inout
            .as_deref()
            .and_then(|bits| bits.get((i / 8) as usize))
            .is_some_and(|byte| byte & (1 << (i % 8)) != 0)
    }
}

/// Size in bytes of an inout bitset for `num_args` arguments
#[inline]
pub const fn inout_bytes(num_args: u32) -> usize {
    num_args.div_ceil(8) as usize
}

/// Discriminant of a [`MemberKey`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MemberCode {
    /// Element by stack cell
    ElemCell = 0,
    /// Element by local
    ElemLocal = 1,
    /// Element by literal string
    ElemStr = 2,
    /// Element by integer
    ElemInt = 3,
    /// Property by stack cell
    PropCell = 4,
    /// Property by local
    PropLocal = 5,
    /// Property by literal string
    PropStr = 6,
    /// Null-safe property by literal string
    NullsafePropStr = 7,
    /// Append a new element
    NewElem = 8,
}

impl MemberCode {
    /// Convert from raw byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::ElemCell),
            1 => Some(Self::ElemLocal),
            2 => Some(Self::ElemStr),
            3 => Some(Self::ElemInt),
            4 => Some(Self::PropCell),
            5 => Some(Self::PropLocal),
            6 => Some(Self::PropStr),
            7 => Some(Self::NullsafePropStr),
            8 => Some(Self::NewElem),
            _ => None,
        }
    }

    /// Short mnemonic used in disassembly
    pub const fn name(self) -> &'static str {
        match self {
            Self::ElemCell => "EC",
            Self::ElemLocal => "EL",
            Self::ElemStr => "ET",
            Self::ElemInt => "EI",
            Self::PropCell => "PC",
            Self::PropLocal => "PL",
            Self::PropStr => "PT",
            Self::NullsafePropStr => "QT",
            Self::NewElem => "W",
        }
    }
}

/// Member-access key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemberKey {
    /// Element keyed by the value in a stack cell
    ElemCell(u32),
    /// Element keyed by a local
    ElemLocal(NamedLocal),
    /// Element keyed by a literal string
    ElemStr(LitstrId),
    /// Element keyed by an integer
    ElemInt(i64),
    /// Property named by the value in a stack cell
    PropCell(u32),
    /// Property named by a local
    PropLocal(NamedLocal),
    /// Property named by a literal string
    PropStr(LitstrId),
    /// Null-safe property named by a literal string
    NullsafePropStr(LitstrId),
    /// Next free element
    NewElem,
}

impl MemberKey {
    /// Discriminant of this key
    pub const fn code(&self) -> MemberCode {
        match self {
            Self::ElemCell(_) => MemberCode::ElemCell,
            Self::ElemLocal(_) => MemberCode::ElemLocal,
            Self::ElemStr(_) => MemberCode::ElemStr,
            Self::ElemInt(_) => MemberCode::ElemInt,
            Self::PropCell(_) => MemberCode::PropCell,
            Self::PropLocal(_) => MemberCode::PropLocal,
            Self::PropStr(_) => MemberCode::PropStr,
            Self::NullsafePropStr(_) => MemberCode::NullsafePropStr,
            Self::NewElem => MemberCode::NewElem,
        }
    }
}

/// One arm of a string switch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SwitchEntry {
    /// Case label
    pub key: LitstrId,
    /// Jump target
    pub target: BlockId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inout_bitset() {
        let args = FCallArgs::new(10).with_inout(&[
            true, false, false, false, false, false, false, false, false, true,
        ]);
        assert_eq!(args.inout.as_deref(), Some(&[0b0000_0001, 0b0000_0010][..]));
        assert!(args.is_inout(0));
        assert!(!args.is_inout(1));
        assert!(args.is_inout(9));
        assert!(!args.is_inout(10));
        assert_eq!(args.num_rets, 3);
    }

    #[test]
    fn test_inout_bytes() {
        assert_eq!(inout_bytes(0), 0);
        assert_eq!(inout_bytes(1), 1);
        assert_eq!(inout_bytes(8), 1);
        assert_eq!(inout_bytes(9), 2);
    }

    #[test]
    fn test_named_local_raw() {
        let nl = NamedLocal {
            name: None,
            id: None,
        };
        assert_eq!(nl.raw_name(), INVALID_LOCAL_NAME);
        assert_eq!(nl.raw_id(), NO_LOCAL_ID);
        assert_eq!(NamedLocal::new(LocalId(3)).raw_id(), 3);
    }

    #[test]
    fn test_member_code_roundtrip() {
        for byte in 0..=8u8 {
            let code = MemberCode::from_byte(byte).unwrap();
            assert_eq!(code as u8, byte);
        }
        assert_eq!(MemberCode::from_byte(9), None);
    }
}
