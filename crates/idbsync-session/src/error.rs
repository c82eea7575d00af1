//! Error types for the session layer.

use thiserror::Error;

/// Errors surfaced by session operations.
///
/// None of these are fatal to the host process. Negotiation failures
/// abandon the join attempt and leave local editing untouched; transport
/// and codec failures around a single packet are logged at the boundary
/// that observes them.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The transport could not deliver a packet.
    #[error("transport failed: {0}")]
    Transport(String),

    /// The snapshot negotiation was rejected or timed out.
    #[error("snapshot negotiation failed: {0}")]
    Negotiation(String),

    /// A packet or event failed to encode or decode.
    #[error(transparent)]
    Codec(#[from] idbsync_core::CodecError),
}
