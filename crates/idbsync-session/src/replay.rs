//! Batch replay boundary.
//!
//! Replay is fault-isolated per event: a malformed envelope or a rejected
//! mutation is logged and the rest of the batch continues. A partially
//! applied batch is an accepted state; the next reconnect resumes from the
//! last adopted tick.

use idbsync_core::Host;

use crate::packets::Packet;
use crate::session::SyncSession;
use crate::state::StateStore;
use crate::transport::Transport;

/// Replay a batch of inbound packets into the host, in order.
pub fn replay_batch<S, T>(
    session: &SyncSession<S, T>,
    host: &mut dyn Host,
    packets: impl IntoIterator<Item = Packet>,
) where
    S: StateStore + 'static,
    T: Transport + 'static,
{
    for packet in packets {
        session.handle_packet(host, packet);
    }
}
