//! Structured sub-records carried inside events.
//!
//! The legacy implementation passed these around as loosely shaped
//! dictionaries whose keys depended on runtime flags. Here every payload is
//! an explicit type: a record whose shape does not match its declared kind
//! fails at decode time instead of corrupting the replay.

use serde::{Deserialize, Serialize};

use crate::local_types::TypeChunk;
use crate::types::{Ea, RawData};

/// Type descriptor attached to a structure member.
///
/// Exactly one kind applies to a given member, selected by the member's
/// type flags on the capturing side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MemberExtra {
    /// Plain member, no extra descriptor.
    None,

    /// Member is an embedded structure.
    Struct { struct_name: String },

    /// Member is an offset/reference.
    Offset {
        flags: u32,
        base: u64,
        target: u64,
        tdelta: u64,
    },

    /// Member is an enum value.
    Enum {
        serial: u8,
        /// Past protocol versions did not carry the enum type id.
        #[serde(default)]
        tid: u64,
    },

    /// Member is a string literal.
    StringLiteral { strtype: u32 },
}

/// Operand display representation.
///
/// Closed enumeration: the capture side only ever emits these forms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "repr", rename_all = "snake_case")]
pub enum OperandRepr {
    Hex,
    Bin,
    Dec,
    Chr,
    Oct,
    Offset,
    Enum {
        ename: String,
        serial: u8,
    },
    /// Structure offset path, innermost-last.
    StructPath {
        spath: Vec<String>,
        delta: i64,
    },
    StackVar,
}

/// Descriptor for a freshly created segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentDef {
    pub name: String,
    pub class: String,
    pub start_ea: Ea,
    pub end_ea: Ea,
    pub orgbase: u64,
    pub align: u8,
    pub comb: u8,
    pub perm: u8,
    pub bitness: u8,
    pub flags: u16,
}

/// One segment-register range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SregRange {
    pub start_ea: Ea,
    pub end_ea: Ea,
    pub value: u64,
    pub tag: u8,
}

/// Location of a comment inside a decompiled-function tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeLoc {
    pub ea: Ea,
    pub itp: i32,
}

/// Locator for a decompiler tree item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitemLocator {
    pub ea: Ea,
    pub op: i32,
}

/// Locator for an instruction operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperandLocator {
    pub ea: Ea,
    pub opnum: u8,
}

/// User-chosen number format for one operand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberFormat {
    pub flags: u32,
    pub opnum: u8,
    pub props: u8,
    pub serial: u8,
    pub org_nbytes: u8,
    pub type_name: String,
}

/// Serialized type information for one local variable.
///
/// The type itself travels in lifted chunk form (see
/// [`crate::local_types::parse_type_blob`]) so that references to other
/// local types survive the ordinal renumbering between database copies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDescriptor {
    /// Lifted type chunks; `None` when the variable has no saved type.
    pub chunks: Option<Vec<TypeChunk>>,
    pub fields: RawData,
    pub field_cmts: RawData,
}

/// Storage location of a local variable.
///
/// Closed enumeration; distributed, relative, and custom locations are not
/// representable on the wire and are never captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "atype", rename_all = "snake_case")]
pub enum VarLocation {
    None,
    Stack { stkoff: i64 },
    Reg1 { reg1: i32 },
    Reg2 { reg1: i32, reg2: i32 },
    Static { ea: Ea },
}

/// Locator pairing a storage location with a definition address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LvarLocator {
    pub location: VarLocation,
    pub defea: Ea,
}

/// Saved name/type/comment info for one local variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LvarSavedInfo {
    pub ll: LvarLocator,
    pub name: String,
    pub type_info: TypeDescriptor,
    pub cmt: String,
    pub flags: u32,
}

/// The complete user lvar settings block for one function.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LvarSettings {
    pub lvvec: Vec<LvarSavedInfo>,
    pub sizes: Vec<i64>,
    pub lmaps: Vec<(LvarLocator, LvarLocator)>,
    #[serde(default)]
    pub stkoff_delta: i64,
    #[serde(default)]
    pub ulv_flags: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip<T>(value: &T) -> T
    where
        T: Serialize + for<'de> Deserialize<'de>,
    {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf).unwrap();
        ciborium::from_reader(buf.as_slice()).unwrap()
    }

    #[test]
    fn member_extra_enum_tid_defaults() {
        // Records written before the tid field existed decode with tid=0.
        let mut buf = Vec::new();
        ciborium::into_writer(
            &ciborium::Value::Map(vec![
                (
                    ciborium::Value::Text("kind".into()),
                    ciborium::Value::Text("enum".into()),
                ),
                (
                    ciborium::Value::Text("serial".into()),
                    ciborium::Value::Integer(2.into()),
                ),
            ]),
            &mut buf,
        )
        .unwrap();

        let extra: MemberExtra = ciborium::from_reader(buf.as_slice()).unwrap();
        assert_eq!(extra, MemberExtra::Enum { serial: 2, tid: 0 });
    }

    #[test]
    fn operand_repr_struct_path_roundtrip() {
        let repr = OperandRepr::StructPath {
            spath: vec!["outer".into(), "inner".into()],
            delta: -4,
        };
        assert_eq!(roundtrip(&repr), repr);
    }

    #[test]
    fn var_location_rejects_unknown_kind() {
        let mut buf = Vec::new();
        ciborium::into_writer(
            &ciborium::Value::Map(vec![(
                ciborium::Value::Text("atype".into()),
                ciborium::Value::Text("custom".into()),
            )]),
            &mut buf,
        )
        .unwrap();

        let result: Result<VarLocation, _> = ciborium::from_reader(buf.as_slice());
        assert!(result.is_err());
    }
}
