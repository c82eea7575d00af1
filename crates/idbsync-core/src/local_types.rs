//! Local type catalogue, structural diffing, and the legacy ordinal wire
//! format used inside serialized type blobs.
//!
//! The host numbers its local types with ordinals that are private to one
//! database copy. Serialized type info embeds references to other types by
//! ordinal, so a blob captured on one side cannot be replayed verbatim on
//! another. `parse_type_blob` lifts embedded ordinal references into
//! symbolic name references; `build_type_blob` lowers them back using the
//! receiving side's ordinals.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::types::RawData;

/// One local type as it travels on the wire.
///
/// The type body is carried in lifted chunk form (see [`parse_type_blob`])
/// so that references to other local types are symbolic, never ordinals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeRecord {
    pub name: String,
    pub chunks: Vec<TypeChunk>,
    pub fields: RawData,
    pub cmt: String,
    pub field_cmts: RawData,
}

/// Snapshot of the host's local type catalogue, keyed by ordinal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeCatalogue {
    records: BTreeMap<u32, TypeRecord>,
}

impl TypeCatalogue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, ordinal: u32, record: TypeRecord) {
        self.records.insert(ordinal, record);
    }

    pub fn remove(&mut self, ordinal: u32) -> Option<TypeRecord> {
        self.records.remove(&ordinal)
    }

    pub fn get(&self, ordinal: u32) -> Option<&TypeRecord> {
        self.records.get(&ordinal)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &TypeRecord)> {
        self.records.iter().map(|(&k, v)| (k, v))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Structural diff against a newer snapshot.
    ///
    /// Yields one patch per ordinal whose record changed, in ordinal order.
    /// Unchanged ordinals produce nothing.
    pub fn diff(&self, newer: &TypeCatalogue) -> Vec<TypePatch> {
        let mut ordinals: Vec<u32> = self.records.keys().copied().collect();
        for ordinal in newer.records.keys() {
            if !self.records.contains_key(ordinal) {
                ordinals.push(*ordinal);
            }
        }
        ordinals.sort_unstable();

        let mut patches = Vec::new();
        for ordinal in ordinals {
            let old = self.records.get(&ordinal);
            let new = newer.records.get(&ordinal);
            if old != new {
                patches.push(TypePatch {
                    ordinal,
                    old: old.cloned(),
                    new: new.cloned(),
                });
            }
        }
        patches
    }
}

/// One changed catalogue slot.
///
/// `(None, Some)` is an insertion, `(Some, None)` a deletion, and
/// `(Some, Some)` an in-place edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypePatch {
    pub ordinal: u32,
    pub old: Option<TypeRecord>,
    pub new: Option<TypeRecord>,
}

/// Errors raised while lifting or lowering a type blob.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeBlobError {
    /// A lifted reference names a type the receiving catalogue lacks.
    #[error("no local type named {0:?}")]
    UnresolvedName(String),

    /// An embedded ordinal does not resolve to a named type.
    #[error("no local type with ordinal {0}")]
    UnknownOrdinal(u32),

    /// An embedded ordinal reference is malformed.
    #[error("malformed ordinal reference")]
    MalformedOrdinal,
}

/// One element of a lifted type blob.
///
/// Raw bytes pass through untouched, one per chunk, so the lowering side
/// can reproduce the exact byte stream around the rewritten references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TypeChunk {
    Byte(u8),
    Ref(TypeRef),
}

/// A symbolic reference to another local type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "ref", rename_all = "snake_case")]
pub enum TypeRef {
    /// Ordinary `= <ordinal>` reference.
    LocalType { name: String },
    /// Ordinal reference embedded after a typedef wrapper prefix.
    RareLocalType { name: String },
}

/// Encode an ordinal into its framed wire form: a length byte, `#`, then
/// the ordinal packed big-endian in 6/7-bit groups with continuation flags.
pub fn encode_ordinal(ordinal: u32) -> Vec<u8> {
    let mut enc = vec![(ordinal & 0x7f) as u8 | 0x40];
    if ordinal > 0x3f {
        let mut bt = ordinal / 0x40;
        enc.push((bt & 0x7f) as u8 | 0x80);
        while bt > 0x7f {
            bt /= 0x80;
            enc.push((bt & 0x7f) as u8 | 0x80);
        }
    }
    enc.reverse();

    let mut framed = Vec::with_capacity(enc.len() + 2);
    framed.push(enc.len() as u8 + 2);
    framed.push(b'#');
    framed.extend_from_slice(&enc);
    framed
}

/// Decode a framed ordinal produced by [`encode_ordinal`].
///
/// Returns `None` when the framing or digits are malformed. A zero digit
/// byte is malformed: the encoder never emits one.
pub fn decode_ordinal(enc: &[u8]) -> Option<u32> {
    if enc.len() < 3 || enc[1] != b'#' {
        return None;
    }
    let digit_len = (enc[0] as usize).checked_sub(2)?;
    decode_ordinal_digits(enc.get(2..2 + digit_len)?)
}

fn decode_ordinal_digits(digits: &[u8]) -> Option<u32> {
    let mut ordinal: u32 = 0;
    let mut terminated = false;
    for &ch in digits {
        if ch == 0 {
            return None;
        }
        ordinal = ordinal.checked_mul(0x40)?;
        if ch & 0x80 != 0 {
            ordinal = ordinal.checked_mul(2)?;
            ordinal |= u32::from(ch & 0x7f);
        } else {
            ordinal |= u32::from(ch & 0x3f);
            terminated = true;
            break;
        }
    }
    if terminated || !digits.is_empty() {
        Some(ordinal)
    } else {
        None
    }
}

/// Lift a raw type blob into chunks, rewriting embedded ordinal references
/// to symbolic names through `resolve`.
///
/// Bytes that do not form a recognizable reference pass through verbatim.
/// The rare form is an ordinal that follows a typedef wrapper prefix
/// (`0x0d 0x01` or `0x0a 0x0d 0x01`) without the leading `=`.
pub fn parse_type_blob<F>(blob: &[u8], mut resolve: F) -> Result<Vec<TypeChunk>, TypeBlobError>
where
    F: FnMut(u32) -> Option<String>,
{
    let mut out: Vec<TypeChunk> = Vec::new();
    let mut pos = 0usize;

    while pos < blob.len() {
        let a_byte = blob[pos];
        pos += 1;

        if a_byte == b'=' && pos < blob.len() {
            let ord_len = blob[pos] as usize;
            pos += 1;
            if pos < blob.len() && blob.len() + 1 >= pos + ord_len {
                let marker = blob[pos];
                pos += 1;
                if marker == b'#' {
                    let take = ord_len.saturating_sub(2);
                    let digits = &blob[pos..pos + take];
                    pos += take;
                    let ordinal = decode_ordinal_digits(digits)
                        .ok_or(TypeBlobError::MalformedOrdinal)?;
                    let name =
                        resolve(ordinal).ok_or(TypeBlobError::UnknownOrdinal(ordinal))?;
                    out.push(TypeChunk::Ref(TypeRef::LocalType { name }));
                    continue;
                }
                out.push(TypeChunk::Byte(a_byte));
                out.push(TypeChunk::Byte(ord_len as u8));
                out.push(TypeChunk::Byte(marker));
                continue;
            }
            out.push(TypeChunk::Byte(a_byte));
            out.push(TypeChunk::Byte(ord_len as u8));
            continue;
        }

        if a_byte == b'#' && rare_prefix_present(&out) {
            // The previous chunk is the length byte of the reference.
            let ord_len = match out.pop() {
                Some(TypeChunk::Byte(b)) => b as usize,
                _ => return Err(TypeBlobError::MalformedOrdinal),
            };
            let take = ord_len.saturating_sub(2);
            if pos + take > blob.len() {
                return Err(TypeBlobError::MalformedOrdinal);
            }
            let digits = &blob[pos..pos + take];
            pos += take;
            let ordinal =
                decode_ordinal_digits(digits).ok_or(TypeBlobError::MalformedOrdinal)?;
            let name = resolve(ordinal).ok_or(TypeBlobError::UnknownOrdinal(ordinal))?;
            out.push(TypeChunk::Ref(TypeRef::RareLocalType { name }));
            continue;
        }

        out.push(TypeChunk::Byte(a_byte));
    }

    Ok(out)
}

fn rare_prefix_present(out: &[TypeChunk]) -> bool {
    let byte_at = |back: usize| -> Option<u8> {
        match out.get(out.len().checked_sub(back)?)? {
            TypeChunk::Byte(b) => Some(*b),
            TypeChunk::Ref(_) => None,
        }
    };
    // out[-1] is the pending length byte; the wrapper prefix sits before it.
    (byte_at(3) == Some(0x0d) && byte_at(2) == Some(0x01))
        || (byte_at(4) == Some(0x0a) && byte_at(3) == Some(0x0d) && byte_at(2) == Some(0x01))
}

/// Lower lifted chunks back into a raw type blob, resolving names to the
/// receiving side's ordinals through `resolve`.
pub fn build_type_blob<F>(chunks: &[TypeChunk], mut resolve: F) -> Result<Vec<u8>, TypeBlobError>
where
    F: FnMut(&str) -> Option<u32>,
{
    let mut blob = Vec::new();
    for chunk in chunks {
        match chunk {
            TypeChunk::Byte(b) => blob.push(*b),
            TypeChunk::Ref(r) => {
                let name = match r {
                    TypeRef::LocalType { name } => {
                        blob.push(b'=');
                        name
                    }
                    TypeRef::RareLocalType { name } => name,
                };
                let ordinal = resolve(name)
                    .filter(|&o| o > 0)
                    .ok_or_else(|| TypeBlobError::UnresolvedName(name.clone()))?;
                blob.extend_from_slice(&encode_ordinal(ordinal));
            }
        }
    }
    Ok(blob)
}
