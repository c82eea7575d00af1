//! The session/snapshot state machine.
//!
//! One `SyncSession` per open database copy. Joining is gated on a
//! snapshot listing: the client never announces itself into a session the
//! server does not carry. Everything runs on one cooperative thread;
//! continuations re-enter the session through cloned handles.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use bytes::Bytes;
use tracing::{debug, info, warn};

use idbsync_core::host::TypeOps;
use idbsync_core::{decode_event, encode_event, Ea, Event, Host};

use crate::capture::{CaptureSwitch, TypeBaseline};
use crate::packets::Packet;
use crate::state::{SessionState, StateStore};
use crate::transport::Transport;

/// Where the session stands in the join lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Not part of any session. Also the landing state after every
    /// abandoned or failed join.
    Disconnected,
    /// A snapshot listing is outstanding; the join decision waits on it.
    AwaitingSnapshotReply,
    /// Announced into the session; capture is live.
    Joined,
}

/// A collaborator visible in the roster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub color: u32,
    pub cursor: Ea,
}

/// This client's identity as shown to other collaborators.
#[derive(Debug, Clone)]
pub struct UserProfile {
    pub name: String,
    pub color: u32,
}

struct SessionInner<S, T> {
    store: S,
    transport: T,
    profile: UserProfile,
    host_id: String,
    state: SessionState,
    phase: Phase,
    users: BTreeMap<String, User>,
    capture: CaptureSwitch,
    baseline: TypeBaseline,
    cursor: Ea,
}

/// Handle to the per-database session. Clones share one state; the clone
/// given to a continuation is the same session it was created from.
pub struct SyncSession<S: StateStore, T: Transport> {
    inner: Rc<RefCell<SessionInner<S, T>>>,
}

impl<S: StateStore, T: Transport> Clone for SyncSession<S, T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<S: StateStore + 'static, T: Transport + 'static> SyncSession<S, T> {
    pub fn new(store: S, transport: T, profile: UserProfile, host_id: String) -> Self {
        Self {
            inner: Rc::new(RefCell::new(SessionInner {
                store,
                transport,
                profile,
                host_id,
                state: SessionState::default(),
                phase: Phase::Disconnected,
                users: BTreeMap::new(),
                capture: CaptureSwitch::new(),
                baseline: TypeBaseline::new(),
                cursor: Ea::BAD,
            })),
        }
    }

    pub fn phase(&self) -> Phase {
        self.inner.borrow().phase
    }

    pub fn is_joined(&self) -> bool {
        self.phase() == Phase::Joined
    }

    /// The capture gate shared with the recorder.
    pub fn capture_switch(&self) -> CaptureSwitch {
        self.inner.borrow().capture.clone()
    }

    /// The local-type diff baseline shared with the recorder.
    pub fn type_baseline(&self) -> TypeBaseline {
        self.inner.borrow().baseline.clone()
    }

    /// Current persisted identifiers and tick.
    pub fn state(&self) -> SessionState {
        self.inner.borrow().state.clone()
    }

    /// Current roster, keyed by user name.
    pub fn users(&self) -> BTreeMap<String, User> {
        self.inner.borrow().users.clone()
    }

    /// Point this copy at a snapshot and persist the choice.
    pub fn set_identifiers(&self, project: &str, binary: &str, snapshot: &str) {
        let inner = &mut *self.inner.borrow_mut();
        inner.state.set_project(&mut inner.store, project);
        inner.state.set_binary(&mut inner.store, binary);
        inner.state.set_snapshot(&mut inner.store, snapshot);
    }

    /// The database copy finished loading: restore identifiers and, if the
    /// triple is complete, start a join attempt.
    pub fn on_host_ready(&self) {
        {
            let inner = &mut *self.inner.borrow_mut();
            inner.state = SessionState::load(&mut inner.store);
        }
        self.try_join();
    }

    /// Start a join attempt.
    ///
    /// Every attempt, including reconnects, goes through a fresh snapshot
    /// listing; the join is sent only if the server still carries the
    /// local snapshot.
    pub fn try_join(&self) {
        let deferred = {
            let inner = &mut *self.inner.borrow_mut();
            if !inner.state.is_complete() {
                debug!("identifiers incomplete, not joining any session yet");
                inner.phase = Phase::Disconnected;
                return;
            }
            inner.phase = Phase::AwaitingSnapshotReply;
            let query = Packet::ListSnapshotsQuery {
                project: inner.state.project.clone().unwrap_or_default(),
                binary: inner.state.binary.clone().unwrap_or_default(),
            };
            inner.transport.query(query)
        };

        let session = self.clone();
        deferred.add_callback(move |reply| session.snapshots_listed(reply));

        let session = self.clone();
        deferred.add_errback(move |err| {
            warn!(%err, "snapshot listing failed, join abandoned");
            let mut inner = session.inner.borrow_mut();
            if inner.phase == Phase::AwaitingSnapshotReply {
                inner.phase = Phase::Disconnected;
            }
        });
    }

    fn snapshots_listed(&self, reply: &Packet) {
        let inner = &mut *self.inner.borrow_mut();
        if inner.phase != Phase::AwaitingSnapshotReply {
            debug!("stale snapshot reply ignored");
            return;
        }

        let Packet::ListSnapshotsReply { snapshots } = reply else {
            warn!("unexpected reply to snapshot listing, join abandoned");
            inner.phase = Phase::Disconnected;
            return;
        };

        let wanted = inner.state.snapshot.clone().unwrap_or_default();
        if !snapshots.iter().any(|s| s.name == wanted) {
            debug!(snapshot = %wanted, "snapshot is not on the server");
            inner.phase = Phase::Disconnected;
            return;
        }

        let join = Packet::JoinSession {
            host_id: inner.host_id.clone(),
            project: inner.state.project.clone().unwrap_or_default(),
            binary: inner.state.binary.clone().unwrap_or_default(),
            snapshot: wanted.clone(),
            tick: inner.state.tick,
            name: inner.profile.name.clone(),
            color: inner.profile.color,
            ea: inner.cursor,
        };
        if let Err(err) = inner.transport.send(join) {
            warn!(%err, "join packet failed to send");
            inner.phase = Phase::Disconnected;
            return;
        }

        inner.users.clear();
        inner.capture.hook_all();
        inner.phase = Phase::Joined;
        info!(snapshot = %wanted, tick = inner.state.tick, "joined session");
    }

    /// Leave the session. Identifiers stay persisted; only presence and
    /// capture are torn down.
    pub fn leave(&self) {
        let inner = &mut *self.inner.borrow_mut();
        if inner.phase != Phase::Joined {
            debug!("already left session");
            inner.phase = Phase::Disconnected;
            return;
        }
        let packet = Packet::LeaveSession {
            host_id: inner.host_id.clone(),
            name: inner.profile.name.clone(),
        };
        if let Err(err) = inner.transport.send(packet) {
            warn!(%err, "leave packet failed to send");
        }
        inner.users.clear();
        inner.capture.unhook_all();
        inner.phase = Phase::Disconnected;
        debug!("left session");
    }

    /// The database copy is closing: leave and forget the identifiers.
    pub fn on_dataset_close(&self) {
        self.leave();
        let inner = &mut *self.inner.borrow_mut();
        inner.state.clear(&mut inner.store);
    }

    /// Local cursor moved; broadcast it if joined. Never persisted.
    pub fn update_location(&self, ea: Ea) {
        let inner = &mut *self.inner.borrow_mut();
        inner.cursor = ea;
        if inner.phase != Phase::Joined {
            return;
        }
        let packet = Packet::UpdateLocation {
            name: inner.profile.name.clone(),
            ea,
            color: inner.profile.color,
        };
        if let Err(err) = inner.transport.send(packet) {
            warn!(%err, "location update failed to send");
        }
    }

    /// Ship one locally captured event and advance the tick.
    pub(crate) fn record(&self, event: &Event) {
        let inner = &mut *self.inner.borrow_mut();
        if inner.phase != Phase::Joined {
            debug!(tag = event.tag(), "dropping capture while not joined");
            return;
        }
        let payload = match encode_event(event) {
            Ok(bytes) => Bytes::from(bytes),
            Err(err) => {
                warn!(tag = event.tag(), %err, "event failed to encode");
                return;
            }
        };
        let packet = Packet::RelayEvent {
            tick: None,
            payload,
        };
        if let Err(err) = inner.transport.send(packet) {
            warn!(tag = event.tag(), %err, "event failed to send");
            return;
        }
        let tick = inner.state.bump_tick(&mut inner.store);
        debug!(tag = event.tag(), tick, "captured event");
    }

    /// Feed one inbound packet through the session.
    ///
    /// Roster packets touch presence only; event envelopes are replayed
    /// into the host with capture suppressed for the full extent of the
    /// mutation.
    pub fn handle_packet(&self, host: &mut dyn Host, packet: Packet) {
        match packet {
            Packet::JoinSession {
                name, color, ea, ..
            } => {
                debug!(user = %name, "user joined");
                self.inner
                    .borrow_mut()
                    .users
                    .insert(name, User { color, cursor: ea });
            }

            Packet::LeaveSession { name, .. } => {
                debug!(user = %name, "user left");
                self.inner.borrow_mut().users.remove(&name);
            }

            Packet::UpdateLocation { name, ea, color } => {
                let mut inner = self.inner.borrow_mut();
                let user = inner
                    .users
                    .entry(name)
                    .or_insert(User { color, cursor: ea });
                user.cursor = ea;
                user.color = color;
            }

            Packet::UpdateUserName { old_name, new_name } => {
                let mut inner = self.inner.borrow_mut();
                if let Some(user) = inner.users.remove(&old_name) {
                    inner.users.insert(new_name, user);
                }
            }

            Packet::UpdateUserColor {
                name, new_color, ..
            } => {
                if let Some(user) = self.inner.borrow_mut().users.get_mut(&name) {
                    user.color = new_color;
                }
            }

            Packet::RelayEvent { tick, payload } => {
                self.replay_event(host, tick, &payload);
            }

            Packet::ListSnapshotsQuery { .. } | Packet::ListSnapshotsReply { .. } => {
                // Replies arrive through the query promise, not here.
                debug!("ignoring out-of-band snapshot packet");
            }
        }
    }

    fn replay_event(&self, host: &mut dyn Host, tick: Option<u64>, payload: &[u8]) {
        let event = match decode_event(payload) {
            Ok(event) => event,
            Err(err) => {
                warn!(%err, "malformed event skipped");
                return;
            }
        };

        // Capture stays suppressed for the full extent of the mutation so
        // that host notifications fired by apply() never echo back.
        let switch = self.inner.borrow().capture.clone();
        let guard = switch.suppress();
        let result = event.apply(host);
        drop(guard);

        match result {
            Ok(()) => {
                // A catalogue rewrite happened with capture suppressed, so
                // the diff baseline has to move with it; otherwise the next
                // local notification re-emits the same patches.
                if matches!(event, Event::LocalTypesChanged { .. }) {
                    match host.read_type_catalogue() {
                        Ok(catalogue) => self.inner.borrow().baseline.replace(catalogue),
                        Err(err) => {
                            warn!(%err, "type baseline not refreshed after replay");
                        }
                    }
                }
                if let Some(tick) = tick {
                    let inner = &mut *self.inner.borrow_mut();
                    inner.state.adopt_tick(&mut inner.store, tick);
                }
                debug!(tag = event.tag(), ?tick, "replayed event");
            }
            Err(err) => {
                warn!(tag = event.tag(), %err, event = ?event, "event replay failed");
            }
        }
    }
}
