//! Capture scenarios that read state back from the host.

use idbsync_core::local_types::{TypeChunk, TypePatch, TypeRecord};
use idbsync_core::payloads::SregRange;
use idbsync_core::{decode_event, encode_event, Ea, Event, RawData};
use idbsync_session::packets::Packet;
use idbsync_session::transport::scripted::{ScriptHandle, SharedScriptedTransport};
use idbsync_session::{
    MemoryStateStore, Phase, Recorder, SegmentNotifications, SyncSession, TypeNotifications,
    UserProfile,
};
use idbsync_testkit::MockHost;

fn record(name: &str) -> TypeRecord {
    TypeRecord {
        name: name.into(),
        chunks: vec![TypeChunk::Byte(0x3d)],
        fields: RawData::default(),
        cmt: String::new(),
        field_cmts: RawData::default(),
    }
}

fn joined_session() -> (SyncSession<MemoryStateStore, SharedScriptedTransport>, ScriptHandle) {
    idbsync_testkit::init_tracing();
    let script = ScriptHandle::new();
    let session = SyncSession::new(
        MemoryStateStore::new(),
        script.transport(),
        UserProfile {
            name: "alice".into(),
            color: 0xff_0000,
        },
        "10.0.0.7:51234".into(),
    );
    session.set_identifiers("p", "b", "s");
    session.try_join();
    script.resolve_next_query(Packet::ListSnapshotsReply {
        snapshots: vec![idbsync_session::packets::SnapshotInfo {
            name: "s".into(),
            date: "2024-01-01 00:00:00".into(),
        }],
    });
    assert_eq!(session.phase(), Phase::Joined);
    (session, script)
}

fn sent_events(script: &ScriptHandle) -> Vec<Event> {
    script
        .sent()
        .iter()
        .filter_map(|p| match p {
            Packet::RelayEvent { payload, .. } => Some(decode_event(payload).unwrap()),
            _ => None,
        })
        .collect()
}

#[test]
fn local_type_edits_are_recovered_by_diffing() {
    let (session, script) = joined_session();
    let mut recorder = Recorder::new(session);

    let mut host = MockHost::new();
    host.catalogue.insert(1, record("KEEP"));
    host.catalogue.insert(2, record("DROP"));
    recorder.prime(&host);

    // The user deletes one type and adds another.
    host.catalogue.remove(2);
    host.catalogue.insert(3, record("FRESH"));
    recorder.local_types_changed(&host);

    let events = sent_events(&script);
    assert_eq!(events.len(), 1);
    let Event::LocalTypesChanged { patches } = &events[0] else {
        panic!("expected a local type event, got {}", events[0].tag());
    };
    assert_eq!(patches.len(), 2);
    assert_eq!(patches[0].ordinal, 2);
    assert!(patches[0].new.is_none());
    assert_eq!(patches[1].ordinal, 3);
    assert_eq!(patches[1].new.as_ref().map(|r| r.name.as_str()), Some("FRESH"));

    // The diff baseline moved forward: no change, no event.
    recorder.local_types_changed(&host);
    assert_eq!(sent_events(&script).len(), 1);
}

#[test]
fn sgr_capture_reads_ranges_back_from_the_host() {
    let (session, script) = joined_session();
    let mut recorder = Recorder::new(session);

    let mut host = MockHost::new();
    let ranges = vec![
        SregRange {
            start_ea: Ea(0x1000),
            end_ea: Ea(0x2000),
            value: 1,
            tag: 2,
        },
        SregRange {
            start_ea: Ea(0x2000),
            end_ea: Ea(0x3000),
            value: 0,
            tag: 2,
        },
    ];
    host.sreg.insert(3, ranges.clone());

    recorder.sgr_changed(&host, 3);

    let events = sent_events(&script);
    assert_eq!(events.len(), 1);
    assert_eq!(
        events[0],
        Event::SgrChanged {
            rg: 3,
            sreg_ranges: ranges,
        }
    );
}

#[test]
fn replayed_type_patches_never_resurface_as_a_capture() {
    let (session, script) = joined_session();
    let mut recorder = Recorder::new(session.clone());

    let mut host = MockHost::new();
    recorder.prime(&host);

    // A remote catalogue rewrite arrives and applies under suppression.
    let remote = Event::LocalTypesChanged {
        patches: vec![TypePatch {
            ordinal: 1,
            old: None,
            new: Some(record("REMOTE")),
        }],
    };
    let payload = encode_event(&remote).unwrap();
    session.handle_packet(
        &mut host,
        Packet::RelayEvent {
            tick: Some(1),
            payload: payload.into(),
        },
    );
    assert_eq!(host.catalogue.get(1).map(|r| r.name.as_str()), Some("REMOTE"));

    // The user's next edit ships alone, without the replayed patch.
    host.catalogue.insert(2, record("MINE"));
    recorder.local_types_changed(&host);

    let events = sent_events(&script);
    assert_eq!(events.len(), 1);
    let Event::LocalTypesChanged { patches } = &events[0] else {
        panic!("expected a local type event, got {}", events[0].tag());
    };
    assert_eq!(patches.len(), 1);
    assert_eq!(patches[0].ordinal, 2);
    assert_eq!(patches[0].new.as_ref().map(|r| r.name.as_str()), Some("MINE"));
}

#[test]
fn type_diff_is_silent_while_suppressed() {
    let (session, script) = joined_session();
    let switch = session.capture_switch();
    let mut recorder = Recorder::new(session);

    let mut host = MockHost::new();
    recorder.prime(&host);
    host.catalogue.insert(1, record("FRESH"));

    let _guard = switch.suppress();
    recorder.local_types_changed(&host);

    assert!(sent_events(&script).is_empty());
}
