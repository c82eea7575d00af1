//! Wire codec coverage across the event taxonomy.

use proptest::prelude::*;

use idbsync_core::local_types::{TypeChunk, TypePatch, TypeRecord, TypeRef};
use idbsync_core::payloads::{
    CitemLocator, LvarSettings, MemberExtra, NumberFormat, OperandLocator, OperandRepr,
    SegmentDef, SregRange, TreeLoc,
};
use idbsync_core::{decode_event, encode_event, Ea, Event, RawData};
use idbsync_testkit::generators;

fn sample_record(name: &str) -> TypeRecord {
    TypeRecord {
        name: name.into(),
        chunks: vec![
            TypeChunk::Byte(0x3d),
            TypeChunk::Ref(TypeRef::LocalType {
                name: "OTHER".into(),
            }),
        ],
        fields: RawData::from_bytes(vec![0x01, 0x80]),
        cmt: "a type".into(),
        field_cmts: RawData::default(),
    }
}

/// Number of variants in the event taxonomy.
const EVENT_VARIANTS: usize = 50;

/// One event per taxonomy variant, with representative payloads.
fn one_of_each() -> Vec<Event> {
    let ea = Ea(0x401000);
    vec![
        Event::MakeCode { ea },
        Event::MakeData {
            ea,
            flags: 0x400,
            size: 8,
            sname: "MY_STRUCT".into(),
        },
        Event::Renamed {
            ea,
            new_name: "main".into(),
            local_name: false,
        },
        Event::FuncAdded {
            start_ea: ea,
            end_ea: Ea(0x401080),
        },
        Event::DeletingFunc { start_ea: ea },
        Event::SetFuncStart {
            start_ea: ea,
            new_start: Ea(0x400ff0),
        },
        Event::SetFuncEnd {
            start_ea: ea,
            new_end: Ea(0x401100),
        },
        Event::FuncTailAppended {
            start_ea_func: ea,
            start_ea_tail: Ea(0x402000),
            end_ea_tail: Ea(0x402040),
        },
        Event::FuncTailDeleted {
            start_ea_func: ea,
            tail_ea: Ea(0x402000),
        },
        Event::TailOwnerChanged {
            tail_ea: Ea(0x402000),
            owner_func: ea,
        },
        Event::CmtChanged {
            ea,
            comment: "entry point".into(),
            rptble: true,
        },
        Event::RangeCmtChanged {
            kind: 1,
            start_ea: ea,
            end_ea: Ea(0x401080),
            cmt: "does things".into(),
            rptble: false,
        },
        Event::ExtraCmtChanged {
            ea,
            line_idx: 1000,
            cmt: "above".into(),
        },
        Event::TiChanged {
            ea,
            name: String::new(),
            type_chunks: vec![TypeChunk::Byte(0x3d)],
            fields: RawData::default(),
        },
        Event::LocalTypesChanged {
            patches: vec![TypePatch {
                ordinal: 3,
                old: None,
                new: Some(sample_record("FRESH")),
            }],
        },
        Event::OpTypeChanged {
            ea,
            n: 1,
            op: OperandRepr::Enum {
                ename: "ERRNO".into(),
                serial: 0,
            },
        },
        Event::EnumCreated {
            name: "ERRNO".into(),
        },
        Event::EnumDeleted {
            ename: "ERRNO".into(),
        },
        Event::EnumRenamed {
            oldname: "ERRNO".into(),
            newname: "POSIX_ERRNO".into(),
            is_enum: true,
        },
        Event::EnumBfChanged {
            ename: "FLAGS".into(),
            bf_flag: true,
        },
        Event::EnumCmtChanged {
            emname: "EPERM".into(),
            cmt: "not permitted".into(),
            repeatable_cmt: false,
        },
        Event::EnumMemberCreated {
            ename: "ERRNO".into(),
            name: "EPERM".into(),
            value: 1,
            bmask: u64::MAX,
        },
        Event::EnumMemberDeleted {
            ename: "ERRNO".into(),
            value: 1,
            serial: 0,
            bmask: u64::MAX,
        },
        Event::StrucCreated {
            name: "HEADER".into(),
            is_union: false,
        },
        Event::StrucDeleted {
            sname: "HEADER".into(),
        },
        Event::StrucRenamed {
            oldname: "HEADER".into(),
            newname: "FILE_HEADER".into(),
        },
        Event::StrucCmtChanged {
            sname: "HEADER".into(),
            smname: "magic".into(),
            cmt: "always 0x7f".into(),
            repeatable_cmt: true,
        },
        Event::StrucMemberCreated {
            sname: "HEADER".into(),
            fieldname: "magic".into(),
            offset: 0,
            flag: 0x400,
            nbytes: 4,
            extra: MemberExtra::Offset {
                flags: 1,
                base: 0,
                target: 0x1000,
                tdelta: 0,
            },
        },
        Event::StrucMemberChanged {
            sname: "HEADER".into(),
            soff: 4,
            eoff: 8,
            flag: 0x400,
            extra: MemberExtra::None,
        },
        Event::StrucMemberDeleted {
            sname: "HEADER".into(),
            offset: 4,
        },
        Event::StrucMemberRenamed {
            sname: "HEADER".into(),
            offset: 0,
            newname: "signature".into(),
        },
        Event::ExpandingStruc {
            sname: "HEADER".into(),
            offset: 8,
            delta: -4,
        },
        Event::SegmAdded {
            def: SegmentDef {
                name: ".text".into(),
                class: "CODE".into(),
                start_ea: Ea(0x1000),
                end_ea: Ea(0x2000),
                orgbase: 0,
                align: 3,
                comb: 2,
                perm: 5,
                bitness: 1,
                flags: 0,
            },
        },
        Event::SegmDeleted {
            ea: Ea(0x1000),
            flags: 1,
        },
        Event::SegmStartChanged {
            ea: Ea(0x1000),
            newstart: Ea(0x1100),
        },
        Event::SegmEndChanged {
            ea: Ea(0x1000),
            newend: Ea(0x3000),
        },
        Event::SegmNameChanged {
            ea: Ea(0x1000),
            name: ".code".into(),
        },
        Event::SegmClassChanged {
            ea: Ea(0x1000),
            sclass: "DATA".into(),
        },
        Event::SegmAttrsUpdated {
            ea: Ea(0x1000),
            perm: 7,
            bitness: 2,
        },
        Event::SegmMoved {
            from_ea: Ea(0x1000),
            to_ea: Ea(0x8000),
            changed_netmap: false,
        },
        Event::Undefined { ea },
        Event::BytePatched { ea, value: 0x90 },
        Event::BookmarkChanged {
            ea,
            pos: 3,
            cmt: "revisit".into(),
        },
        Event::SgrChanged {
            rg: 2,
            sreg_ranges: vec![SregRange {
                start_ea: Ea(0x1000),
                end_ea: Ea(0x2000),
                value: 0,
                tag: 2,
            }],
        },
        Event::MakeUnknown { ea },
        Event::UserLabels {
            ea,
            labels: vec![(1, "retry".into())],
        },
        Event::UserCmts {
            ea,
            cmts: vec![(TreeLoc { ea, itp: 64 }, "loop body".into())],
        },
        Event::UserIflags {
            ea,
            iflags: vec![(CitemLocator { ea, op: 0 }, 1)],
        },
        Event::UserLvarSettings {
            ea,
            lvar_settings: LvarSettings::default(),
        },
        Event::UserNumforms {
            ea,
            numforms: vec![(
                OperandLocator { ea, opnum: 1 },
                NumberFormat {
                    flags: 0x10,
                    opnum: 1,
                    props: 0,
                    serial: 0,
                    org_nbytes: 4,
                    type_name: String::new(),
                },
            )],
        },
    ]
}

#[test]
fn every_variant_roundtrips() {
    let events = one_of_each();
    assert_eq!(events.len(), EVENT_VARIANTS);
    for event in events {
        let bytes = encode_event(&event).unwrap();
        let back = decode_event(&bytes).unwrap();
        assert_eq!(back, event, "variant {}", event.tag());
    }
}

#[test]
fn wire_tags_are_unique() {
    let mut tags: Vec<&str> = one_of_each().iter().map(|e| e.tag()).collect();
    tags.sort_unstable();
    tags.dedup();
    assert_eq!(tags.len(), EVENT_VARIANTS);
}

proptest! {
    #[test]
    fn generated_events_roundtrip(event in generators::event()) {
        let bytes = encode_event(&event).unwrap();
        prop_assert_eq!(decode_event(&bytes).unwrap(), event);
    }

    #[test]
    fn reencoding_is_byte_stable(event in generators::event()) {
        let bytes = encode_event(&event).unwrap();
        let back = decode_event(&bytes).unwrap();
        prop_assert_eq!(encode_event(&back).unwrap(), bytes);
    }
}
