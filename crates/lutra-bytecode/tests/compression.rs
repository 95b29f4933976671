//! Instruction stream codec: wire format, round trip and failure modes

use lutra_bytecode::{
    BlockId, CodecError, Double, FCallArgs, FCallFlags, ImmKind, Immediate, Instruction,
    IterArgs, IterArgsFlags, IterId, LitstrId, LocalId, LocalRange, MemberKey, NamedLocal,
    Opcode, SwitchEntry, decode_bytecode_vec, encode_bytecode_vec,
};
use proptest::prelude::*;

fn encode(insns: &[Instruction]) -> Vec<u8> {
    let mut out = Vec::new();
    encode_bytecode_vec(&mut out, insns).unwrap();
    out
}

#[test]
fn test_single_instruction_bytes() {
    let insn = Instruction::new(Opcode::IsTypeC).imm(Immediate::U8(5)).at(42);
    let bytes = encode(&[insn.clone()]);
    assert_eq!(bytes, [0x01, 0x0A, 0x2B, 0x05]);
    assert_eq!(decode_bytecode_vec(&bytes).unwrap(), vec![insn]);
}

#[test]
fn test_fcall_inout_bitset_on_stream() {
    let mut inout = vec![false; 10];
    inout[1] = true;
    inout[8] = true;
    let insn = Instruction::new(Opcode::FCallFunc).imm(FCallArgs::new(10).with_inout(&inout));
    let bytes = encode(&[insn.clone()]);

    // count, tag, src_loc, then the call descriptor ending in the bitset
    assert_eq!(bytes[3], FCallFlags::ENFORCE_INOUT.0);
    assert_eq!(&bytes[bytes.len() - 2..], &[0b0000_0010, 0b0000_0001]);
    assert_eq!(decode_bytecode_vec(&bytes).unwrap(), vec![insn]);
}

#[test]
fn test_mixed_block_round_trip() {
    let insns = vec![
        Instruction::new(Opcode::CGetL)
            .imm(Immediate::NamedLocal(NamedLocal::new(LocalId::new(0))))
            .at(3),
        Instruction::new(Opcode::LIterInit)
            .imm(Immediate::IterArgs(IterArgs {
                flags: IterArgsFlags::BASE_CONST,
                iter_id: IterId::new(0),
                key_id: None,
                val_id: LocalId::new(2),
            }))
            .imm(Immediate::Local(LocalId::new(1)))
            .imm(Immediate::Block(BlockId::new(4))),
        Instruction::new(Opcode::SSwitch).imm(Immediate::SwitchTable(vec![
            SwitchEntry {
                key: LitstrId::new(0),
                target: BlockId::new(1),
            },
            SwitchEntry {
                key: LitstrId::new(1),
                target: BlockId::new(2),
            },
        ])),
        Instruction::new(Opcode::QueryM)
            .imm(Immediate::Iva(1))
            .imm(Immediate::U8(0))
            .imm(Immediate::MemberKey(MemberKey::NullsafePropStr(LitstrId::new(7)))),
        Instruction::new(Opcode::MemoGet)
            .imm(Immediate::Block(BlockId::new(2)))
            .imm(Immediate::LocalRange(LocalRange {
                first: LocalId::new(1),
                count: 3,
            })),
        Instruction::new(Opcode::Double).imm(Immediate::Double(Double(-0.0))),
        Instruction::new(Opcode::RetC).at(1000),
    ];
    let bytes = encode(&insns);
    let decoded = decode_bytecode_vec(&bytes).unwrap();
    assert_eq!(decoded, insns);
    assert_eq!(encode(&decoded), bytes);
}

#[test]
fn test_truncated_stream() {
    let insns = vec![Instruction::new(Opcode::Int).imm(Immediate::I64(i64::MIN))];
    let bytes = encode(&insns);
    for len in 0..bytes.len() {
        assert!(
            matches!(
                decode_bytecode_vec(&bytes[..len]),
                Err(CodecError::UnexpectedEnd { .. })
            ),
            "prefix of length {len} decoded"
        );
    }
}

#[test]
fn test_invalid_opcode() {
    assert_eq!(
        decode_bytecode_vec(&[0x01, 0x13, 0x00]),
        Err(CodecError::InvalidOpcode(0x13))
    );
    assert_eq!(
        decode_bytecode_vec(&[0x01, 0xFF, 0xFE, 0x00]),
        Err(CodecError::InvalidOpcode(0x1FD))
    );
}

#[test]
fn test_trailing_bytes_rejected() {
    let mut bytes = encode(&[Instruction::new(Opcode::Nop)]);
    bytes.extend_from_slice(&[0x00, 0x00]);
    assert_eq!(
        decode_bytecode_vec(&bytes),
        Err(CodecError::TrailingBytes {
            consumed: 3,
            len: 5
        })
    );
}

#[test]
fn test_schema_arity_rejected() {
    let mut out = Vec::new();
    let insn = Instruction::new(Opcode::Jmp);
    assert_eq!(
        encode_bytecode_vec(&mut out, &[insn]),
        Err(CodecError::ImmediateArity {
            op: Opcode::Jmp,
            expected: 1,
            found: 0
        })
    );
}

#[test]
fn test_schema_kind_rejected() {
    let mut out = Vec::new();
    let insn = Instruction::new(Opcode::FCallFuncD)
        .imm(FCallArgs::new(0))
        .imm(Immediate::Block(BlockId::new(0)));
    assert_eq!(
        encode_bytecode_vec(&mut out, &[insn]),
        Err(CodecError::ImmediateMismatch {
            op: Opcode::FCallFuncD,
            index: 1,
            expected: ImmKind::Litstr,
            found: ImmKind::Block
        })
    );
}

#[test]
fn test_sentinel_collisions_rejected() {
    let rejected = |insn: Instruction| {
        let mut out = Vec::new();
        match encode_bytecode_vec(&mut out, &[insn]) {
            Err(CodecError::ValueOutOfRange { field, .. }) => {
                // only the instruction count made it out
                assert_eq!(out, [1]);
                field
            }
            other => panic!("expected ValueOutOfRange, got {other:?}"),
        }
    };

    let named = NamedLocal {
        name: Some(i32::MAX as u32),
        id: None,
    };
    assert_eq!(
        rejected(Instruction::new(Opcode::CGetL).imm(Immediate::NamedLocal(named))),
        "NamedLocal::name"
    );

    let iter = IterArgs {
        flags: IterArgsFlags::NONE,
        iter_id: IterId::new(0),
        key_id: Some(LocalId::new(u32::MAX)),
        val_id: LocalId::new(1),
    };
    assert_eq!(
        rejected(
            Instruction::new(Opcode::LIterInit)
                .imm(Immediate::IterArgs(iter))
                .imm(Immediate::Local(LocalId::new(0)))
                .imm(Immediate::Block(BlockId::new(0)))
        ),
        "IterArgs::key_id"
    );

    let mut flagged = FCallArgs::new(0);
    flagged.flags = FCallFlags(0x40);
    assert_eq!(
        rejected(Instruction::new(Opcode::FCallFunc).imm(flagged)),
        "FCallArgs::flags"
    );
    assert_eq!(
        rejected(
            Instruction::new(Opcode::FCallFunc)
                .imm(FCallArgs::new(0).with_context(LitstrId::new(u32::MAX)))
        ),
        "LitstrId"
    );
    assert_eq!(
        rejected(
            Instruction::new(Opcode::FCallFunc)
                .imm(FCallArgs::new(1).with_async_eager_target(BlockId::new(u32::MAX)))
        ),
        "FCallArgs::async_eager_target"
    );

    let mut short_bitset = FCallArgs::new(16);
    short_bitset.inout = Some(Box::from([0u8].as_slice()));
    assert_eq!(
        rejected(Instruction::new(Opcode::FCallFunc).imm(short_bitset)),
        "FCallArgs::inout"
    );
}

// ==================== Generators ====================

fn local() -> impl Strategy<Value = LocalId> {
    any::<u32>().prop_map(LocalId::new)
}

fn block() -> impl Strategy<Value = BlockId> {
    any::<u32>().prop_map(BlockId::new)
}

fn litstr() -> impl Strategy<Value = LitstrId> {
    // u32::MAX is reserved by the nullable encoding
    (0..u32::MAX).prop_map(LitstrId::new)
}

fn named_local() -> impl Strategy<Value = NamedLocal> {
    (
        proptest::option::of(0..i32::MAX as u32),
        proptest::option::of(0..u32::MAX),
    )
        .prop_map(|(name, id)| NamedLocal {
            name,
            id: id.map(LocalId::new),
        })
}

fn fcall_args() -> impl Strategy<Value = FCallArgs> {
    (
        0u8..=0x3F,
        0u32..40,
        proptest::option::of(0..u32::MAX),
        any::<bool>(),
        any::<bool>(),
        proptest::option::of(litstr()),
        any::<bool>(),
        proptest::collection::vec(any::<bool>(), 40),
    )
        .prop_map(
            |(flags, num_args, target, lock, skip, context, enforce, bits)| {
                let mut args = FCallArgs::new(num_args);
                if enforce {
                    args = args.with_inout(&bits[..num_args as usize]);
                }
                args.flags = FCallFlags(flags);
                args.async_eager_target = target.map(BlockId::new);
                args.lock_while_unwinding = lock;
                args.skip_num_args_check = skip;
                args.context = context;
                args
            },
        )
}

fn member_key() -> impl Strategy<Value = MemberKey> {
    prop_oneof![
        any::<u32>().prop_map(MemberKey::ElemCell),
        named_local().prop_map(MemberKey::ElemLocal),
        litstr().prop_map(MemberKey::ElemStr),
        any::<i64>().prop_map(MemberKey::ElemInt),
        any::<u32>().prop_map(MemberKey::PropCell),
        named_local().prop_map(MemberKey::PropLocal),
        litstr().prop_map(MemberKey::PropStr),
        litstr().prop_map(MemberKey::NullsafePropStr),
        Just(MemberKey::NewElem),
    ]
}

fn immediate(kind: ImmKind) -> BoxedStrategy<Immediate> {
    match kind {
        ImmKind::U8 => any::<u8>().prop_map(Immediate::U8).boxed(),
        ImmKind::Iva => any::<u32>().prop_map(Immediate::Iva).boxed(),
        ImmKind::I64 => any::<i64>().prop_map(Immediate::I64).boxed(),
        ImmKind::Double => any::<u64>()
            .prop_map(|bits| Immediate::Double(Double(f64::from_bits(bits))))
            .boxed(),
        ImmKind::Local => local().prop_map(Immediate::Local).boxed(),
        ImmKind::NamedLocal => named_local().prop_map(Immediate::NamedLocal).boxed(),
        ImmKind::Iter => any::<u32>()
            .prop_map(|i| Immediate::Iter(IterId::new(i)))
            .boxed(),
        ImmKind::Litstr => litstr().prop_map(Immediate::Litstr).boxed(),
        ImmKind::Block => block().prop_map(Immediate::Block).boxed(),
        ImmKind::LocalRange => (local(), any::<u32>())
            .prop_map(|(first, count)| Immediate::LocalRange(LocalRange { first, count }))
            .boxed(),
        ImmKind::IterArgs => (
            0u8..2,
            any::<u32>(),
            proptest::option::of(0..u32::MAX),
            local(),
        )
            .prop_map(|(flags, iter, key, val_id)| {
                Immediate::IterArgs(IterArgs {
                    flags: IterArgsFlags(flags),
                    iter_id: IterId::new(iter),
                    key_id: key.map(LocalId::new),
                    val_id,
                })
            })
            .boxed(),
        ImmKind::FCallArgs => fcall_args().prop_map(Immediate::from).boxed(),
        ImmKind::MemberKey => member_key().prop_map(Immediate::MemberKey).boxed(),
        ImmKind::BlockVec => proptest::collection::vec(block(), 0..8)
            .prop_map(Immediate::BlockVec)
            .boxed(),
        ImmKind::SwitchTable => proptest::collection::vec((litstr(), block()), 0..8)
            .prop_map(|arms| {
                Immediate::SwitchTable(
                    arms.into_iter()
                        .map(|(key, target)| SwitchEntry { key, target })
                        .collect(),
                )
            })
            .boxed(),
        ImmKind::StrVec => proptest::collection::vec(litstr(), 0..8)
            .prop_map(Immediate::StrVec)
            .boxed(),
        ImmKind::I32Vec => proptest::collection::vec(any::<i32>(), 0..8)
            .prop_map(Immediate::I32Vec)
            .boxed(),
    }
}

fn instruction() -> impl Strategy<Value = Instruction> {
    (proptest::sample::select(Opcode::ALL), any::<i32>()).prop_flat_map(|(op, src_loc)| {
        op.immediates()
            .iter()
            .map(|&kind| immediate(kind))
            .collect::<Vec<_>>()
            .prop_map(move |imms| Instruction::with_imms(op, imms).at(src_loc))
    })
}

proptest! {
    #[test]
    fn prop_stream_round_trip(insns in proptest::collection::vec(instruction(), 0..32)) {
        let bytes = encode(&insns);
        let decoded = decode_bytecode_vec(&bytes).unwrap();
        prop_assert_eq!(&decoded, &insns);
        prop_assert_eq!(encode(&decoded), bytes);
    }

    #[test]
    fn prop_concatenated_streams_are_rejected(
        a in proptest::collection::vec(instruction(), 1..8),
        b in proptest::collection::vec(instruction(), 1..8),
    ) {
        let mut bytes = encode(&a);
        bytes.extend(encode(&b));
        let trailing = matches!(
            decode_bytecode_vec(&bytes),
            Err(CodecError::TrailingBytes { .. })
        );
        prop_assert!(trailing);
    }
}
