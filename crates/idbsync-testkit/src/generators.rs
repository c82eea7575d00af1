//! Proptest generators for property-based testing.

use proptest::prelude::*;

use idbsync_core::local_types::{TypeChunk, TypePatch, TypeRecord, TypeRef};
use idbsync_core::payloads::{MemberExtra, OperandRepr, SegmentDef, SregRange};
use idbsync_core::{Ea, Event, RawData};

/// Generate an address in a plausible image range.
pub fn ea() -> impl Strategy<Value = Ea> {
    (0x1000u64..0xffff_ffff).prop_map(Ea)
}

/// Generate an identifier-shaped name.
pub fn name() -> impl Strategy<Value = String> {
    "[a-zA-Z_][a-zA-Z0-9_]{0,23}".prop_map(String::from)
}

/// Generate a comment, including empty and non-ASCII text.
pub fn comment() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(String::new()),
        "[ -~]{1,40}".prop_map(String::from),
        Just("\u{00e9}t\u{00e9} \u{4e2d}".to_string()),
    ]
}

/// Generate a raw blob, including bytes outside ASCII.
pub fn raw_data() -> impl Strategy<Value = RawData> {
    prop::collection::vec(any::<u8>(), 0..=32).prop_map(RawData::from_bytes)
}

pub fn member_extra() -> impl Strategy<Value = MemberExtra> {
    prop_oneof![
        Just(MemberExtra::None),
        name().prop_map(|struct_name| MemberExtra::Struct { struct_name }),
        (any::<u32>(), any::<u64>(), any::<u64>(), any::<u64>()).prop_map(
            |(flags, base, target, tdelta)| MemberExtra::Offset {
                flags,
                base,
                target,
                tdelta,
            }
        ),
        (any::<u8>(), any::<u64>()).prop_map(|(serial, tid)| MemberExtra::Enum { serial, tid }),
        any::<u32>().prop_map(|strtype| MemberExtra::StringLiteral { strtype }),
    ]
}

pub fn operand_repr() -> impl Strategy<Value = OperandRepr> {
    prop_oneof![
        Just(OperandRepr::Hex),
        Just(OperandRepr::Bin),
        Just(OperandRepr::Dec),
        Just(OperandRepr::Chr),
        Just(OperandRepr::Oct),
        Just(OperandRepr::Offset),
        (name(), any::<u8>()).prop_map(|(ename, serial)| OperandRepr::Enum { ename, serial }),
        (prop::collection::vec(name(), 1..=3), any::<i64>())
            .prop_map(|(spath, delta)| OperandRepr::StructPath { spath, delta }),
        Just(OperandRepr::StackVar),
    ]
}

pub fn sreg_range() -> impl Strategy<Value = SregRange> {
    (ea(), any::<u64>(), any::<u8>()).prop_map(|(start_ea, value, tag)| SregRange {
        start_ea,
        end_ea: Ea(start_ea.0 + 0x100),
        value,
        tag,
    })
}

pub fn segment_def() -> impl Strategy<Value = SegmentDef> {
    (name(), name(), ea(), 0u64..0x10000).prop_map(|(name, class, start_ea, len)| SegmentDef {
        name,
        class,
        start_ea,
        end_ea: Ea(start_ea.0 + len),
        orgbase: 0,
        align: 3,
        comb: 2,
        perm: 5,
        bitness: 1,
        flags: 0,
    })
}

/// Generate lifted type chunks: raw bytes interleaved with symbolic
/// references.
pub fn type_chunks() -> impl Strategy<Value = Vec<TypeChunk>> {
    prop::collection::vec(
        prop_oneof![
            4 => any::<u8>().prop_map(TypeChunk::Byte),
            1 => name().prop_map(|name| TypeChunk::Ref(TypeRef::LocalType { name })),
        ],
        0..=16,
    )
}

pub fn type_record() -> impl Strategy<Value = TypeRecord> {
    (name(), type_chunks(), raw_data(), comment(), raw_data()).prop_map(
        |(name, chunks, fields, cmt, field_cmts)| TypeRecord {
            name,
            chunks,
            fields,
            cmt,
            field_cmts,
        },
    )
}

pub fn type_patch() -> impl Strategy<Value = TypePatch> {
    (
        1u32..1000,
        prop::option::of(type_record()),
        prop::option::of(type_record()),
    )
        .prop_map(|(ordinal, old, new)| TypePatch { ordinal, old, new })
}

fn byte_event() -> impl Strategy<Value = Event> {
    prop_oneof![
        ea().prop_map(|ea| Event::MakeCode { ea }),
        (ea(), any::<u32>(), 1u64..0x1000, name())
            .prop_map(|(ea, flags, size, sname)| Event::MakeData {
                ea,
                flags,
                size,
                sname,
            }),
        (ea(), name(), any::<bool>()).prop_map(|(ea, new_name, local_name)| Event::Renamed {
            ea,
            new_name,
            local_name,
        }),
        ea().prop_map(|ea| Event::Undefined { ea }),
        ea().prop_map(|ea| Event::MakeUnknown { ea }),
        (ea(), any::<u8>()).prop_map(|(ea, value)| Event::BytePatched { ea, value }),
        (ea(), comment(), any::<bool>()).prop_map(|(ea, comment, rptble)| Event::CmtChanged {
            ea,
            comment,
            rptble,
        }),
        (ea(), 1000i32..3000, comment())
            .prop_map(|(ea, line_idx, cmt)| Event::ExtraCmtChanged { ea, line_idx, cmt }),
        (ea(), 0u64..1024, comment())
            .prop_map(|(ea, pos, cmt)| Event::BookmarkChanged { ea, pos, cmt }),
        (ea(), 0u8..8, operand_repr())
            .prop_map(|(ea, n, op)| Event::OpTypeChanged { ea, n, op }),
    ]
}

fn func_event() -> impl Strategy<Value = Event> {
    prop_oneof![
        (ea(), 1u64..0x1000).prop_map(|(start_ea, len)| Event::FuncAdded {
            start_ea,
            end_ea: Ea(start_ea.0 + len),
        }),
        ea().prop_map(|start_ea| Event::DeletingFunc { start_ea }),
        (ea(), ea()).prop_map(|(start_ea, new_start)| Event::SetFuncStart {
            start_ea,
            new_start,
        }),
        (ea(), ea()).prop_map(|(start_ea, new_end)| Event::SetFuncEnd { start_ea, new_end }),
        (ea(), ea(), ea()).prop_map(|(start_ea_func, start_ea_tail, end_ea_tail)| {
            Event::FuncTailAppended {
                start_ea_func,
                start_ea_tail,
                end_ea_tail,
            }
        }),
        (ea(), ea()).prop_map(|(start_ea_func, tail_ea)| Event::FuncTailDeleted {
            start_ea_func,
            tail_ea,
        }),
        (ea(), ea()).prop_map(|(tail_ea, owner_func)| Event::TailOwnerChanged {
            tail_ea,
            owner_func,
        }),
        (1u32..=2, ea(), ea(), comment(), any::<bool>()).prop_map(
            |(kind, start_ea, end_ea, cmt, rptble)| Event::RangeCmtChanged {
                kind,
                start_ea,
                end_ea,
                cmt,
                rptble,
            }
        ),
    ]
}

fn type_event() -> impl Strategy<Value = Event> {
    prop_oneof![
        name().prop_map(|name| Event::EnumCreated { name }),
        name().prop_map(|ename| Event::EnumDeleted { ename }),
        (name(), name(), any::<bool>()).prop_map(|(oldname, newname, is_enum)| {
            Event::EnumRenamed {
                oldname,
                newname,
                is_enum,
            }
        }),
        (name(), any::<bool>()).prop_map(|(ename, bf_flag)| Event::EnumBfChanged {
            ename,
            bf_flag,
        }),
        (name(), name(), any::<u64>(), any::<u64>()).prop_map(|(ename, name, value, bmask)| {
            Event::EnumMemberCreated {
                ename,
                name,
                value,
                bmask,
            }
        }),
        (name(), any::<bool>()).prop_map(|(name, is_union)| Event::StrucCreated {
            name,
            is_union,
        }),
        name().prop_map(|sname| Event::StrucDeleted { sname }),
        (name(), name(), 0u64..256, any::<u32>(), 1u64..16, member_extra()).prop_map(
            |(sname, fieldname, offset, flag, nbytes, extra)| Event::StrucMemberCreated {
                sname,
                fieldname,
                offset,
                flag,
                nbytes,
                extra,
            }
        ),
        (name(), 0u64..256).prop_map(|(sname, offset)| Event::StrucMemberDeleted {
            sname,
            offset,
        }),
        (ea(), name(), type_chunks(), raw_data()).prop_map(
            |(ea, name, type_chunks, fields)| Event::TiChanged {
                ea,
                name,
                type_chunks,
                fields,
            }
        ),
        prop::collection::vec(type_patch(), 0..=4)
            .prop_map(|patches| Event::LocalTypesChanged { patches }),
    ]
}

fn segment_event() -> impl Strategy<Value = Event> {
    prop_oneof![
        segment_def().prop_map(|def| Event::SegmAdded { def }),
        (ea(), any::<u16>()).prop_map(|(ea, flags)| Event::SegmDeleted { ea, flags }),
        (ea(), name()).prop_map(|(ea, name)| Event::SegmNameChanged { ea, name }),
        (ea(), ea(), any::<bool>()).prop_map(|(from_ea, to_ea, changed_netmap)| {
            Event::SegmMoved {
                from_ea,
                to_ea,
                changed_netmap,
            }
        }),
        (0u16..16, prop::collection::vec(sreg_range(), 0..=4))
            .prop_map(|(rg, sreg_ranges)| Event::SgrChanged { rg, sreg_ranges }),
    ]
}

fn decompiler_event() -> impl Strategy<Value = Event> {
    prop_oneof![
        (ea(), prop::collection::vec((any::<i32>(), name()), 0..=4))
            .prop_map(|(ea, labels)| Event::UserLabels { ea, labels }),
    ]
}

/// Generate an event from across the taxonomy.
pub fn event() -> BoxedStrategy<Event> {
    prop_oneof![
        byte_event(),
        func_event(),
        type_event(),
        segment_event(),
        decompiler_event(),
    ]
    .boxed()
}
