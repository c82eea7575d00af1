//! # idbsync Session
//!
//! Session negotiation, hook capture, and replay for idbsync.
//!
//! ## Overview
//!
//! One [`SyncSession`] lives alongside each open database copy. It
//! remembers which project/binary/snapshot the copy belongs to (with
//! transparent migration of the legacy key layout), negotiates joining a
//! collaborative session over a [`Transport`], captures local edits
//! through a [`Recorder`], and replays inbound events into the host with
//! per-event fault isolation.
//!
//! ## Key Properties
//!
//! - **Join gating**: a join is only sent after a fresh snapshot listing
//!   confirms the server carries the local snapshot
//! - **No feedback loop**: capture is suppressed for the full extent of
//!   every replayed mutation
//! - **Monotonic tick**: advances on every capture, adopts the server's
//!   stamp on replay, and resets only when the snapshot changes
//! - **Fault isolation**: one bad event never aborts a batch
//!
//! ## Message Flow
//!
//! ```text
//! Client                              Server
//!   |-------- ListSnapshotsQuery ----->|
//!   |<------- ListSnapshotsReply ------|      (snapshot present?)
//!   |-------- JoinSession(tick) ------>|
//!   |<------- RelayEvent(tick) --------|      (resumed feed)
//!   |-------- RelayEvent ------------->|      (local captures)
//!   |-------- UpdateLocation --------->|      (presence)
//! ```

pub mod capture;
pub mod deferred;
pub mod error;
pub mod packets;
pub mod replay;
pub mod session;
pub mod state;
pub mod transport;

pub use capture::{
    CaptureSwitch, DatabaseNotifications, DecompilerNotifications, FunctionNotifications,
    Recorder, SegmentNotifications, SuppressGuard, TypeBaseline, TypeNotifications,
    ViewNotifications,
};
pub use deferred::{Deferred, Resolver};
pub use error::SessionError;
pub use packets::{decode_packet, encode_packet, Packet, SnapshotInfo};
pub use replay::replay_batch;
pub use session::{Phase, SyncSession, User, UserProfile};
pub use state::{MemoryStateStore, SessionState, StateStore};
pub use transport::{scripted::ScriptHandle, Transport};
