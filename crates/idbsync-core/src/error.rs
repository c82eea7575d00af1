//! Error types for the idbsync core.

use thiserror::Error;

/// An error reported by the host analysis engine.
///
/// The host API surface is opaque to the core: failures arrive as messages
/// and are only ever logged, never interpreted.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct HostError(pub String);

impl HostError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Errors produced while encoding or decoding events and packets.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("encode failed: {0}")]
    Encode(String),

    #[error("decode failed: {0}")]
    Decode(String),
}

/// Errors produced while replaying a single event into the host.
///
/// Every variant is recoverable at the replay boundary: one event's failure
/// is logged and the rest of the batch continues.
#[derive(Debug, Error)]
pub enum ApplyError {
    /// The host rejected the mutation.
    #[error("host rejected {tag}: {source}")]
    Host {
        tag: &'static str,
        source: HostError,
    },

    /// A closed discriminator carried a value outside the known set.
    #[error("unsupported range kind: {0}")]
    UnsupportedRangeKind(u32),

    /// A struct member span whose end precedes its start.
    #[error("inverted member span: soff {soff:#x}, eoff {eoff:#x}")]
    InvertedMemberSpan { soff: u64, eoff: u64 },

    /// A symbolic type reference could not be lowered on this side.
    #[error("type reference lowering failed: {0}")]
    TypeBlob(#[from] crate::local_types::TypeBlobError),
}
