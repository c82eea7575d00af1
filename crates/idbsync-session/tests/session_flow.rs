//! End-to-end session scenarios over the scripted transport.

use bytes::Bytes;

use idbsync_core::{encode_event, Ea, Event};
use idbsync_session::packets::{Packet, SnapshotInfo};
use idbsync_session::transport::scripted::{ScriptHandle, SharedScriptedTransport};
use idbsync_session::{
    replay_batch, DatabaseNotifications, MemoryStateStore, Phase, Recorder, SessionError,
    StateStore, SyncSession, UserProfile,
};
use idbsync_testkit::MockHost;

type TestSession = SyncSession<MemoryStateStore, SharedScriptedTransport>;

fn profile() -> UserProfile {
    UserProfile {
        name: "alice".into(),
        color: 0x00ff_8800,
    }
}

fn new_session(store: MemoryStateStore) -> (TestSession, ScriptHandle) {
    idbsync_testkit::init_tracing();
    let script = ScriptHandle::new();
    let session = SyncSession::new(store, script.transport(), profile(), "10.0.0.7:51234".into());
    (session, script)
}

fn listing_with(names: &[&str]) -> Packet {
    Packet::ListSnapshotsReply {
        snapshots: names
            .iter()
            .map(|n| SnapshotInfo {
                name: n.to_string(),
                date: "2024-01-01 00:00:00".into(),
            })
            .collect(),
    }
}

/// Drive a session all the way to `Joined`.
fn joined_session() -> (TestSession, ScriptHandle, MemoryStateStore) {
    let store = MemoryStateStore::new();
    let (session, script) = new_session(store.clone());
    session.set_identifiers("malware", "dropper.exe", "initial");
    session.try_join();
    script.resolve_next_query(listing_with(&["initial", "patched"]));
    assert_eq!(session.phase(), Phase::Joined);
    (session, script, store)
}

fn relay(event: &Event, tick: Option<u64>) -> Packet {
    Packet::RelayEvent {
        tick,
        payload: Bytes::from(encode_event(event).unwrap()),
    }
}

fn relay_count(script: &ScriptHandle) -> usize {
    script
        .sent()
        .iter()
        .filter(|p| matches!(p, Packet::RelayEvent { .. }))
        .count()
}

#[test]
fn join_waits_for_the_snapshot_listing() {
    let (session, script) = new_session(MemoryStateStore::new());
    session.set_identifiers("malware", "dropper.exe", "initial");
    session.try_join();

    assert_eq!(session.phase(), Phase::AwaitingSnapshotReply);
    assert_eq!(script.pending_queries(), 1);
    let sent = script.sent();
    assert_eq!(sent.len(), 1);
    assert!(matches!(&sent[0], Packet::ListSnapshotsQuery { project, binary }
        if project == "malware" && binary == "dropper.exe"));

    script.resolve_next_query(listing_with(&["other", "initial"]));

    assert_eq!(session.phase(), Phase::Joined);
    assert!(session.capture_switch().is_hooked());
    let sent = script.sent();
    assert!(matches!(&sent[1], Packet::JoinSession { snapshot, tick, name, .. }
        if snapshot == "initial" && *tick == 0 && name == "alice"));
}

#[test]
fn join_is_abandoned_when_the_snapshot_is_not_on_the_server() {
    let (session, script) = new_session(MemoryStateStore::new());
    session.set_identifiers("malware", "dropper.exe", "initial");
    session.try_join();

    script.resolve_next_query(listing_with(&["unrelated"]));

    assert_eq!(session.phase(), Phase::Disconnected);
    assert!(!session.capture_switch().is_hooked());
    assert!(script
        .sent()
        .iter()
        .all(|p| !matches!(p, Packet::JoinSession { .. })));
}

#[test]
fn listing_failure_abandons_the_join() {
    let (session, script) = new_session(MemoryStateStore::new());
    session.set_identifiers("p", "b", "s");
    session.try_join();

    script.reject_next_query(SessionError::Transport("connection reset".into()));

    assert_eq!(session.phase(), Phase::Disconnected);
}

#[test]
fn stale_listing_reply_is_ignored() {
    let (session, script) = new_session(MemoryStateStore::new());
    session.set_identifiers("p", "b", "s");
    session.try_join();
    // Abandon the attempt before the reply lands.
    session.leave();

    script.resolve_next_query(listing_with(&["s"]));

    assert_eq!(session.phase(), Phase::Disconnected);
    assert!(script
        .sent()
        .iter()
        .all(|p| !matches!(p, Packet::JoinSession { .. })));
}

#[test]
fn incomplete_identifiers_never_query() {
    let (session, script) = new_session(MemoryStateStore::new());
    session.on_host_ready();

    assert_eq!(session.phase(), Phase::Disconnected);
    assert!(script.sent().is_empty());
    assert_eq!(script.pending_queries(), 0);
}

#[test]
fn host_ready_restores_state_and_rejoins() {
    let store = MemoryStateStore::new();
    {
        let (session, _script) = new_session(store.clone());
        session.set_identifiers("malware", "dropper.exe", "initial");
    }

    // A fresh session over the same store, as after reopening the copy.
    let (session, script) = new_session(store);
    session.on_host_ready();
    assert_eq!(session.phase(), Phase::AwaitingSnapshotReply);

    script.resolve_next_query(listing_with(&["initial"]));
    assert_eq!(session.phase(), Phase::Joined);
}

#[test]
fn captures_are_dropped_until_joined() {
    let (session, script) = new_session(MemoryStateStore::new());
    let mut recorder = Recorder::new(session.clone());

    recorder.make_code(Ea(0x401000));

    assert_eq!(relay_count(&script), 0);
    assert_eq!(session.state().tick, 0);
}

#[test]
fn captures_ship_and_advance_the_tick() {
    let (session, script, store) = joined_session();
    let mut recorder = Recorder::new(session.clone());

    recorder.make_code(Ea(0x401000));
    recorder.byte_patched(Ea(0x401001), 0x90);

    assert_eq!(relay_count(&script), 2);
    // Outbound events carry no tick; the server stamps them.
    for packet in script.sent() {
        if let Packet::RelayEvent { tick, .. } = packet {
            assert_eq!(tick, None);
        }
    }
    assert_eq!(session.state().tick, 2);
    assert_eq!(store.get("tick").as_deref(), Some("2"));
}

#[test]
fn replay_never_echoes_back_as_a_capture() {
    let (session, script, _store) = joined_session();
    let recorder = std::rc::Rc::new(std::cell::RefCell::new(Recorder::new(session.clone())));
    let sent_before = relay_count(&script);

    // The host fires its notification hooks while the mutation applies,
    // exactly as the real analysis engine does.
    let mut host = MockHost::new();
    let echo = std::rc::Rc::clone(&recorder);
    host.on_mutation = Some(Box::new(move |_op| {
        echo.borrow_mut().make_code(Ea(0x401000));
    }));

    session.handle_packet(&mut host, relay(&Event::MakeCode { ea: Ea(0x401000) }, Some(1)));

    assert_eq!(host.ops, ["make_code(0x401000)"]);
    assert_eq!(relay_count(&script), sent_before);
    // Suppression lifts once the replay is over.
    assert!(session.capture_switch().is_capturing());
}

#[test]
fn replay_adopts_the_server_tick_on_success_only() {
    let (session, _script, store) = joined_session();
    let mut host = MockHost::new();

    session.handle_packet(&mut host, relay(&Event::MakeCode { ea: Ea(0x1000) }, Some(42)));
    assert_eq!(session.state().tick, 42);
    assert_eq!(store.get("tick").as_deref(), Some("42"));

    host.fail_on("patch_byte");
    session.handle_packet(
        &mut host,
        relay(&Event::BytePatched { ea: Ea(0x1000), value: 0 }, Some(43)),
    );
    assert_eq!(session.state().tick, 42);
}

#[test]
fn one_bad_event_does_not_abort_the_batch() {
    let (session, _script, _store) = joined_session();
    let mut host = MockHost::new();
    host.fail_on("del_func");

    replay_batch(
        &session,
        &mut host,
        vec![
            relay(&Event::MakeCode { ea: Ea(0x1000) }, Some(10)),
            relay(&Event::DeletingFunc { start_ea: Ea(0x2000) }, Some(11)),
            relay(&Event::BytePatched { ea: Ea(0x3000), value: 0xcc }, Some(12)),
        ],
    );

    assert_eq!(host.ops, ["make_code(0x1000)", "patch_byte(0x3000, 0xcc)"]);
    assert_eq!(session.state().tick, 12);
}

#[test]
fn malformed_event_payload_is_skipped() {
    let (session, _script, _store) = joined_session();
    let mut host = MockHost::new();

    session.handle_packet(
        &mut host,
        Packet::RelayEvent {
            tick: Some(5),
            payload: Bytes::from_static(b"\xff\xff\xffgarbage"),
        },
    );

    assert!(host.ops.is_empty());
    assert_eq!(session.state().tick, 0);
}

#[test]
fn roster_follows_presence_packets() {
    let (session, _script, _store) = joined_session();
    let mut host = MockHost::new();

    session.handle_packet(
        &mut host,
        Packet::JoinSession {
            host_id: "10.0.0.9:40000".into(),
            project: "malware".into(),
            binary: "dropper.exe".into(),
            snapshot: "initial".into(),
            tick: 0,
            name: "bob".into(),
            color: 0x0000_ff00,
            ea: Ea(0x1000),
        },
    );
    session.handle_packet(
        &mut host,
        Packet::UpdateLocation {
            name: "bob".into(),
            ea: Ea(0x2000),
            color: 0x0000_ff00,
        },
    );
    session.handle_packet(
        &mut host,
        Packet::UpdateUserName {
            old_name: "bob".into(),
            new_name: "robert".into(),
        },
    );

    let users = session.users();
    assert!(!users.contains_key("bob"));
    assert_eq!(users.get("robert").map(|u| u.cursor), Some(Ea(0x2000)));

    session.handle_packet(
        &mut host,
        Packet::LeaveSession {
            host_id: "10.0.0.9:40000".into(),
            name: "robert".into(),
        },
    );
    assert!(session.users().is_empty());
}

#[test]
fn location_updates_are_sent_only_while_joined() {
    let (session, script) = new_session(MemoryStateStore::new());
    session.update_location(Ea(0x1000));
    assert!(script.sent().is_empty());

    session.set_identifiers("p", "b", "s");
    session.try_join();
    script.resolve_next_query(listing_with(&["s"]));

    session.update_location(Ea(0x2000));
    assert!(matches!(
        script.sent().last(),
        Some(Packet::UpdateLocation { ea, .. }) if *ea == Ea(0x2000)
    ));
}

#[test]
fn leave_tears_down_presence_and_capture() {
    let (session, script, _store) = joined_session();
    let mut host = MockHost::new();
    session.handle_packet(
        &mut host,
        Packet::JoinSession {
            host_id: "10.0.0.9:40000".into(),
            project: "malware".into(),
            binary: "dropper.exe".into(),
            snapshot: "initial".into(),
            tick: 0,
            name: "bob".into(),
            color: 1,
            ea: Ea(0x1000),
        },
    );

    session.leave();

    assert_eq!(session.phase(), Phase::Disconnected);
    assert!(session.users().is_empty());
    assert!(!session.capture_switch().is_hooked());
    assert!(matches!(
        script.sent().last(),
        Some(Packet::LeaveSession { name, .. }) if name == "alice"
    ));

    // Identifiers survive a leave; only the dataset close forgets them.
    assert!(session.state().is_complete());
}

#[test]
fn dataset_close_forgets_the_identifiers() {
    let (session, _script, store) = joined_session();

    session.on_dataset_close();

    assert_eq!(session.phase(), Phase::Disconnected);
    assert_eq!(store.get("project"), None);
    assert_eq!(store.get("snapshot"), None);
    assert_eq!(store.get("tick"), None);
    assert!(!session.state().is_complete());
}

#[test]
fn legacy_store_layout_joins_after_migration() {
    let mut store = MemoryStateStore::new();
    store.set("group", "malware");
    store.set("project", "dropper.exe");
    store.set("database", "initial");
    store.set("tick", "5");

    let (session, script) = new_session(store.clone());
    session.on_host_ready();
    script.resolve_next_query(listing_with(&["initial"]));

    assert_eq!(session.phase(), Phase::Joined);
    let sent = script.sent();
    assert!(matches!(sent.last(), Some(Packet::JoinSession { project, binary, snapshot, tick, .. })
        if project == "malware" && binary == "dropper.exe" && snapshot == "initial" && *tick == 5));
    assert_eq!(store.get("group"), None);
    assert_eq!(store.get("database"), None);
}
