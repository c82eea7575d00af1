//! Event wire codec.
//!
//! Events travel as CBOR maps with the legacy tag under the `"event"` key.
//! Decoding is strict: an unknown tag or a malformed record is a
//! [`CodecError`], which the replay boundary logs and skips.

use crate::error::CodecError;
use crate::event::Event;

/// Encode an event into its wire bytes.
pub fn encode_event(event: &Event) -> Result<Vec<u8>, CodecError> {
    let mut buf = Vec::new();
    ciborium::into_writer(event, &mut buf).map_err(|e| CodecError::Encode(e.to_string()))?;
    Ok(buf)
}

/// Decode an event from wire bytes.
pub fn decode_event(bytes: &[u8]) -> Result<Event, CodecError> {
    ciborium::from_reader(bytes).map_err(|e| CodecError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local_types::{TypeChunk, TypeRef};
    use crate::payloads::*;
    use crate::types::{Ea, RawData};

    fn sample_events() -> Vec<Event> {
        vec![
            Event::MakeCode { ea: Ea(0x401000) },
            Event::MakeData {
                ea: Ea(0x402000),
                flags: 0x400,
                size: 8,
                sname: "MY_STRUCT".into(),
            },
            Event::Renamed {
                ea: Ea(0x401000),
                new_name: "entry_point".into(),
                local_name: false,
            },
            Event::FuncAdded {
                start_ea: Ea(0x401000),
                end_ea: Ea(0x401080),
            },
            Event::RangeCmtChanged {
                kind: 1,
                start_ea: Ea(0x401000),
                end_ea: Ea(0x401080),
                cmt: "decrypts the config".into(),
                rptble: true,
            },
            Event::TiChanged {
                ea: Ea(0x401000),
                name: String::new(),
                type_chunks: vec![
                    TypeChunk::Byte(0x3d),
                    TypeChunk::Ref(TypeRef::LocalType {
                        name: "CONFIG".into(),
                    }),
                ],
                fields: RawData::from_bytes(vec![0x05, b'f', b'i', b'e', b'l', b'd']),
            },
            Event::OpTypeChanged {
                ea: Ea(0x401010),
                n: 1,
                op: OperandRepr::Enum {
                    ename: "ERROR_CODES".into(),
                    serial: 0,
                },
            },
            Event::StrucMemberCreated {
                sname: "CONFIG".into(),
                fieldname: "magic".into(),
                offset: 0,
                flag: 0x20000400,
                nbytes: 4,
                extra: MemberExtra::None,
            },
            Event::SgrChanged {
                rg: 16,
                sreg_ranges: vec![SregRange {
                    start_ea: Ea(0x1000),
                    end_ea: Ea(0x2000),
                    value: 0,
                    tag: 2,
                }],
            },
            Event::UserCmts {
                ea: Ea(0x401000),
                cmts: vec![(
                    TreeLoc {
                        ea: Ea(0x401010),
                        itp: 64,
                    },
                    "loop counter".into(),
                )],
            },
            Event::UserLvarSettings {
                ea: Ea(0x401000),
                lvar_settings: LvarSettings {
                    lvvec: vec![LvarSavedInfo {
                        ll: LvarLocator {
                            location: VarLocation::Stack { stkoff: -8 },
                            defea: Ea(0x401004),
                        },
                        name: "counter".into(),
                        type_info: TypeDescriptor {
                            chunks: Some(vec![TypeChunk::Byte(0x07)]),
                            fields: RawData::default(),
                            field_cmts: RawData::default(),
                        },
                        cmt: String::new(),
                        flags: 0,
                    }],
                    sizes: vec![4],
                    lmaps: vec![],
                    stkoff_delta: 0,
                    ulv_flags: 0,
                },
            },
        ]
    }

    #[test]
    fn roundtrip_across_taxonomy_sample() {
        for event in sample_events() {
            let bytes = encode_event(&event).unwrap();
            let back = decode_event(&bytes).unwrap();
            assert_eq!(back, event, "tag {}", event.tag());
        }
    }

    #[test]
    fn encoder_output_is_stable() {
        // Re-encoding a decoded event reproduces the bytes exactly.
        for event in sample_events() {
            let bytes = encode_event(&event).unwrap();
            let reencoded = encode_event(&decode_event(&bytes).unwrap()).unwrap();
            assert_eq!(reencoded, bytes, "tag {}", event.tag());
        }
    }

    #[test]
    fn garbage_is_a_decode_error() {
        let err = decode_event(&[0xde, 0xad, 0xbe, 0xef]).unwrap_err();
        assert!(matches!(err, CodecError::Decode(_)));
    }

    #[test]
    fn truncated_record_is_a_decode_error() {
        let bytes = encode_event(&Event::MakeCode { ea: Ea(0x401000) }).unwrap();
        assert!(decode_event(&bytes[..bytes.len() - 1]).is_err());
    }
}
