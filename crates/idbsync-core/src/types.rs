//! Strong type definitions shared across the event taxonomy.
//!
//! Addresses and raw type blobs are newtypes to prevent misuse at compile
//! time, and to pin down their wire representation.

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// An effective address inside the analyzed database.
///
/// Addresses are opaque to the sync core: they are captured from one host
/// and replayed verbatim into another copy of the same snapshot.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ea(pub u64);

impl Ea {
    /// The invalid/sentinel address.
    pub const BAD: Self = Self(u64::MAX);
}

impl fmt::Debug for Ea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ea({:#x})", self.0)
    }
}

impl fmt::Display for Ea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl From<u64> for Ea {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// A raw byte payload carried inside a string field.
///
/// The legacy wire format transports serialized type descriptors as text
/// strings in which every byte is embedded as the code point U+0000..U+00FF.
/// `RawData` keeps that representation on the wire while exposing plain
/// bytes to Rust code. It is distinct from `String` on purpose: human text
/// is UTF-8, type blobs are not, and mixing the two corrupts data silently.
///
/// Decoding rejects any string containing a code point above U+00FF, since
/// such a string cannot have been produced by the legacy escape encoding.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct RawData(pub Vec<u8>);

impl RawData {
    /// Create from raw bytes.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Whether the blob is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Embed the bytes into the legacy escape string (one char per byte).
    pub fn to_escaped(&self) -> String {
        self.0.iter().map(|&b| b as char).collect()
    }

    /// Recover bytes from a legacy escape string.
    ///
    /// Fails on any char above U+00FF: the input was not produced by the
    /// legacy encoding and must not be silently truncated.
    pub fn from_escaped(s: &str) -> Result<Self, char> {
        let mut bytes = Vec::with_capacity(s.len());
        for ch in s.chars() {
            let code = ch as u32;
            if code > 0xFF {
                return Err(ch);
            }
            bytes.push(code as u8);
        }
        Ok(Self(bytes))
    }
}

impl fmt::Debug for RawData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawData({})", hex::encode(&self.0))
    }
}

impl From<&[u8]> for RawData {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl From<Vec<u8>> for RawData {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl Serialize for RawData {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_escaped())
    }
}

impl<'de> Deserialize<'de> for RawData {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RawDataVisitor;

        impl<'de> Visitor<'de> for RawDataVisitor {
            type Value = RawData;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a legacy-escaped byte string")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<RawData, E> {
                RawData::from_escaped(v).map_err(|ch| {
                    E::custom(format!(
                        "char {:?} (U+{:04X}) is outside the legacy byte range",
                        ch, ch as u32
                    ))
                })
            }
        }

        deserializer.deserialize_str(RawDataVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ea_display_is_hex() {
        assert_eq!(format!("{}", Ea(0x401000)), "0x401000");
        assert_eq!(format!("{:?}", Ea(0x10)), "Ea(0x10)");
    }

    #[test]
    fn raw_data_escape_roundtrip() {
        let blob = RawData::from_bytes(vec![0x0d, 0x01, 0x80, 0xff, 0x00]);
        let escaped = blob.to_escaped();
        let recovered = RawData::from_escaped(&escaped).unwrap();
        assert_eq!(blob, recovered);
    }

    #[test]
    fn raw_data_rejects_wide_chars() {
        assert_eq!(RawData::from_escaped("ok\u{0100}"), Err('\u{0100}'));
    }

    #[test]
    fn raw_data_cbor_roundtrip() {
        let blob = RawData::from_bytes(vec![0x3d, 0x03, 0x23, 0x81, 0x42]);
        let mut buf = Vec::new();
        ciborium::into_writer(&blob, &mut buf).unwrap();
        let back: RawData = ciborium::from_reader(buf.as_slice()).unwrap();
        assert_eq!(blob, back);
    }

    #[test]
    fn raw_data_decode_rejects_utf8_text_blob() {
        // A genuine UTF-8 string with a non-latin char must not decode as a
        // raw blob.
        let mut buf = Vec::new();
        ciborium::into_writer("\u{4e2d}", &mut buf).unwrap();
        let result: Result<RawData, _> = ciborium::from_reader(buf.as_slice());
        assert!(result.is_err());
    }
}
