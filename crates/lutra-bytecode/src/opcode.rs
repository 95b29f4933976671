//! Opcodes and their immediate schemas
//!
//! The instruction set uses "9-bit" opcodes: there are more than 256 tags but
//! fewer than 512, so the wire encoding needs one byte for most opcodes and
//! two for the extended range (see [`crate::varint::write_op_tag`]).
//!
//! Every opcode has a fixed, ordered list of immediate kinds. The codec never
//! looks at an opcode's semantics, only at this table.

use serde::{Deserialize, Serialize};

/// Wire type of an immediate operand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImmKind {
    /// Raw byte (sub-opcodes, small enums)
    U8,
    /// Variable-width unsigned count
    Iva,
    /// 64-bit signed integer
    I64,
    /// 64-bit float
    Double,
    /// Local slot
    Local,
    /// Local slot with its source name
    NamedLocal,
    /// Iterator slot
    Iter,
    /// Literal string
    Litstr,
    /// Jump target
    Block,
    /// Contiguous range of locals
    LocalRange,
    /// Iterator arguments
    IterArgs,
    /// Call arguments
    FCallArgs,
    /// Member-access key
    MemberKey,
    /// Vector of jump targets
    BlockVec,
    /// Vector of string switch arms
    SwitchTable,
    /// Vector of literal strings
    StrVec,
    /// Vector of 32-bit integers
    I32Vec,
}

macro_rules! opcodes {
    ($( $(#[$doc:meta])* $name:ident = $tag:literal [$($imm:ident),*] ),* $(,)?) => {
        /// Bytecode opcodes
        ///
        /// Stack-based instruction set. Discriminants are the wire tags.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[repr(u16)]
        pub enum Opcode {
            $( $(#[$doc])* $name = $tag, )*
        }

        impl Opcode {
            /// Every opcode, in tag order
            pub const ALL: &'static [Opcode] = &[$(Opcode::$name),*];

            /// Convert from a wire tag
            pub fn from_tag(tag: u16) -> Option<Self> {
                match tag {
                    $($tag => Some(Self::$name),)*
                    _ => None,
                }
            }

            /// Get the name of this opcode
            pub const fn name(self) -> &'static str {
                match self {
                    $(Self::$name => stringify!($name),)*
                }
            }

            /// Immediate kinds carried by this opcode, in encoding order
            pub const fn immediates(self) -> &'static [ImmKind] {
                match self {
                    $(Self::$name => &[$(ImmKind::$imm),*],)*
                }
            }
        }
    };
}

opcodes! {
    // ==================== Basic ====================
    /// No operation
    Nop = 0x00 [],
    /// Pop a cell
    PopC = 0x01 [],
    /// Pop an uninit
    PopU = 0x02 [],
    /// Duplicate the top cell
    Dup = 0x03 [],
    /// Push null
    Null = 0x04 [],
    /// Push true
    True = 0x05 [],
    /// Push false
    False = 0x06 [],
    /// Push an integer literal
    Int = 0x07 [I64],
    /// Push a float literal
    Double = 0x08 [Double],
    /// Push a literal string
    String = 0x09 [Litstr],
    /// Test the type of the top cell: push `is_type(pop, op)`
    IsTypeC = 0x0A [U8],
    /// Push an empty dict with a capacity hint
    NewDictArray = 0x0B [Iva],
    /// Pop n cells into a vec
    NewVec = 0x0C [Iva],
    /// Pop n cells into a keyset
    NewKeysetArray = 0x0D [Iva],
    /// Pop one cell per key into a dict with literal keys
    NewStructDict = 0x0E [StrVec],
    /// Add a keyed element to the array below the top two cells
    AddElemC = 0x0F [],
    /// Append the top cell to the array below it
    AddNewElemC = 0x10 [],
    /// Push a class constant
    ClsCnsD = 0x11 [Litstr, Litstr],
    /// Push a global constant
    CnsE = 0x12 [Litstr],

    // ==================== Operators ====================
    /// Concatenate the top two cells
    Concat = 0x20 [],
    /// Concatenate the top n cells
    ConcatN = 0x21 [Iva],
    /// Addition
    Add = 0x22 [],
    /// Subtraction
    Sub = 0x23 [],
    /// Multiplication
    Mul = 0x24 [],
    /// Division
    Div = 0x25 [],
    /// Modulo
    Mod = 0x26 [],
    /// Exponentiation
    Pow = 0x27 [],
    /// Logical not
    Not = 0x28 [],
    /// Identity comparison
    Same = 0x29 [],
    /// Negated identity comparison
    NSame = 0x2A [],
    /// Loose equality
    Eq = 0x2B [],
    /// Loose inequality
    Neq = 0x2C [],
    /// Less than
    Lt = 0x2D [],
    /// Less than or equal
    Lte = 0x2E [],
    /// Greater than
    Gt = 0x2F [],
    /// Greater than or equal
    Gte = 0x30 [],
    /// Bitwise and
    BitAnd = 0x31 [],
    /// Bitwise or
    BitOr = 0x32 [],
    /// Bitwise xor
    BitXor = 0x33 [],
    /// Bitwise not
    BitNot = 0x34 [],
    /// Left shift
    Shl = 0x35 [],
    /// Right shift
    Shr = 0x36 [],
    /// Cast to int
    CastInt = 0x37 [],
    /// Cast to float
    CastDouble = 0x38 [],
    /// Cast to string
    CastString = 0x39 [],
    /// Cast to vec
    CastVec = 0x3A [],
    /// Cast to dict
    CastDict = 0x3B [],
    /// Cast to keyset
    CastKeyset = 0x3C [],

    // ==================== Control flow ====================
    /// Unconditional jump
    Jmp = 0x40 [Block],
    /// Unconditional jump without a surprise check
    JmpNS = 0x41 [Block],
    /// Jump if the popped cell is falsy
    JmpZ = 0x42 [Block],
    /// Jump if the popped cell is truthy
    JmpNZ = 0x43 [Block],
    /// Integer switch: kind, base, targets
    Switch = 0x44 [U8, I64, BlockVec],
    /// String switch
    SSwitch = 0x45 [SwitchTable],
    /// Return the top cell
    RetC = 0x46 [],
    /// Return the top n cells
    RetM = 0x47 [Iva],
    /// Throw the top cell
    Throw = 0x48 [],
    /// Fatal error with the given kind
    Fatal = 0x49 [U8],

    // ==================== Locals ====================
    /// Push a local, raising a notice if undefined
    CGetL = 0x50 [NamedLocal],
    /// Push a local without notices
    CGetQuietL = 0x51 [Local],
    /// Push a local or uninit
    CUGetL = 0x52 [Local],
    /// Move a local onto the stack, unsetting it
    PushL = 0x53 [Local],
    /// Store the top cell into a local
    SetL = 0x54 [Local],
    /// Pop the top cell into a local
    PopL = 0x55 [Local],
    /// Unset a local
    UnsetL = 0x56 [Local],
    /// Push whether a local is set
    IssetL = 0x57 [Local],
    /// Test the type of a local
    IsTypeL = 0x58 [NamedLocal, U8],
    /// Increment or decrement a local
    IncDecL = 0x59 [NamedLocal, U8],
    /// Compound assignment to a local
    SetOpL = 0x5A [Local, U8],
    /// Suppress error reporting, saving the previous level in a local
    Silence = 0x5B [Local, U8],

    // ==================== Iteration ====================
    /// Initialize an iterator over the popped base
    IterInit = 0x60 [IterArgs, Block],
    /// Initialize an iterator over a local base
    LIterInit = 0x61 [IterArgs, Local, Block],
    /// Advance an iterator
    IterNext = 0x62 [IterArgs, Block],
    /// Advance an iterator over a local base
    LIterNext = 0x63 [IterArgs, Local, Block],
    /// Free an iterator
    IterFree = 0x64 [Iter],
    /// Free an iterator over a local base
    LIterFree = 0x65 [Iter, Local],

    // ==================== Calls ====================
    /// Call a function object
    FCallFunc = 0x70 [FCallArgs],
    /// Call a function by name
    FCallFuncD = 0x71 [FCallArgs, Litstr],
    /// Call a method on an object by name: call args, class hint, null-safety, method
    FCallObjMethodD = 0x72 [FCallArgs, Litstr, U8, Litstr],
    /// Call a static method: call args, class hint, class, method
    FCallClsMethodD = 0x73 [FCallArgs, Litstr, Litstr, Litstr],
    /// Call a constructor
    FCallCtor = 0x74 [FCallArgs, Litstr],
    /// Allocate an object of a named class
    NewObjD = 0x75 [Litstr],
    /// Lock the object on the top of the stack
    LockObj = 0x76 [],
    /// Create a closure capturing n cells
    CreateCl = 0x77 [Iva, Iva],
    /// Resolve a function by name
    ResolveFunc = 0x78 [Litstr],
    /// Check declared reified generics against a list of positions
    CheckReifiedGenericMismatch = 0x79 [I32Vec],

    // ==================== Misc ====================
    /// Fetch a memoized value or jump
    MemoGet = 0x80 [Block, LocalRange],
    /// Fetch a memoized value from an eager async call
    MemoGetEager = 0x81 [Block, Block, LocalRange],
    /// Store a memoized value
    MemoSet = 0x82 [LocalRange],
    /// Verify a parameter type
    VerifyParamType = 0x83 [Local],
    /// Verify the type of an inout output
    VerifyOutType = 0x84 [Iva],
    /// Verify the return type
    VerifyRetTypeC = 0x85 [],
    /// Check whether a property is initialized
    CheckProp = 0x86 [Litstr],
    /// Initialize a property
    InitProp = 0x87 [Litstr, U8],
    /// Assert the type of a local (type annotation, raw)
    AssertRATL = 0x88 [Local, U8],
    /// Suspend on the top cell
    Await = 0x89 [],
    /// Await every local in a range
    AwaitAll = 0x8A [LocalRange],
    /// Yield the top cell
    Yield = 0x8B [],
    /// Source-level line marker
    SrcLoc = 0x8C [Iva, Iva],

    // ==================== Tail of the single-byte range ====================
    /// Host-side diagnostics hook
    DebugHook = 0xFE [U8],
    /// Body of a natively implemented function
    NativeImpl = 0xFF [],

    // ==================== Member instructions (extended range) ====================
    /// Start a member operation on a local
    BaseL = 0x100 [NamedLocal, U8],
    /// Start a member operation on a stack cell
    BaseC = 0x101 [Iva, U8],
    /// Start a member operation on `$this`
    BaseH = 0x102 [],
    /// Start a member operation on a global
    BaseGC = 0x103 [Iva, U8],
    /// Intermediate member step
    Dim = 0x104 [U8, MemberKey],
    /// Final step: query
    QueryM = 0x105 [Iva, U8, MemberKey],
    /// Final step: assignment
    SetM = 0x106 [Iva, MemberKey],
    /// Final step: increment or decrement
    IncDecM = 0x107 [Iva, U8, MemberKey],
    /// Final step: compound assignment
    SetOpM = 0x108 [Iva, U8, MemberKey],
    /// Final step: unset
    UnsetM = 0x109 [Iva, MemberKey],
    /// Final step: range assignment into a string
    SetRangeM = 0x10A [Iva, Iva, U8],

    // ==================== Class and object ====================
    /// Push a class by name
    ClassGetC = 0x120 [],
    /// Test an object against a named class
    InstanceOfD = 0x121 [Litstr],
    /// Push the late-bound class
    LateBoundCls = 0x122 [],
    /// Push `$this`
    This = 0x123 [],
    /// Push `$this` or null
    BareThis = 0x124 [U8],
    /// Fail unless `$this` is available
    CheckThis = 0x125 [],
    /// Push a static property
    CGetS = 0x126 [U8],
    /// Store a static property
    SetS = 0x127 [U8],

    // ==================== Extended-range tail ====================
    /// Profiling hint emitted at the end of a tracelet
    BreakTraceHint = 0x1FE [],
}

impl Opcode {
    /// Get the wire tag of this opcode
    #[inline]
    pub const fn tag(self) -> u16 {
        self as u16
    }

    /// Whether this opcode ends a basic block
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Jmp
                | Self::JmpNS
                | Self::Switch
                | Self::SSwitch
                | Self::RetC
                | Self::RetM
                | Self::Throw
                | Self::Fatal
                | Self::NativeImpl
        )
    }
}
