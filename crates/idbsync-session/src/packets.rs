//! Wire packets exchanged with the relay server.
//!
//! Packets are tagged under the `"command"` key. Events never travel as
//! bare records: they cross the boundary inside a [`Packet::RelayEvent`]
//! envelope whose payload is the encoded event, so the relay can forward
//! and stamp them without understanding the taxonomy.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use idbsync_core::{CodecError, Ea};

/// One snapshot as listed by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotInfo {
    pub name: String,
    pub date: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command")]
pub enum Packet {
    /// Announce this client inside a snapshot session.
    #[serde(rename = "join_session")]
    JoinSession {
        /// Identity of the sending host, derived from its network identity.
        host_id: String,
        project: String,
        binary: String,
        snapshot: String,
        /// The tick this client has replayed up to; the server resumes the
        /// event feed from here.
        tick: u64,
        name: String,
        color: u32,
        ea: Ea,
    },

    #[serde(rename = "leave_session")]
    LeaveSession { host_id: String, name: String },

    #[serde(rename = "list_snapshots_query")]
    ListSnapshotsQuery { project: String, binary: String },

    #[serde(rename = "list_snapshots_reply")]
    ListSnapshotsReply { snapshots: Vec<SnapshotInfo> },

    /// Cursor broadcast. Fire-and-forget, never persisted.
    #[serde(rename = "update_location")]
    UpdateLocation { name: String, ea: Ea, color: u32 },

    #[serde(rename = "update_user_name")]
    UpdateUserName { old_name: String, new_name: String },

    #[serde(rename = "update_user_color")]
    UpdateUserColor {
        name: String,
        old_color: u32,
        new_color: u32,
    },

    /// One encoded event. Clients send it without a tick; the server
    /// stamps the tick when rebroadcasting.
    #[serde(rename = "event")]
    RelayEvent {
        tick: Option<u64>,
        payload: Bytes,
    },
}

/// Encode a packet into its wire bytes.
pub fn encode_packet(packet: &Packet) -> Result<Vec<u8>, CodecError> {
    let mut buf = Vec::new();
    ciborium::into_writer(packet, &mut buf).map_err(|e| CodecError::Encode(e.to_string()))?;
    Ok(buf)
}

/// Decode a packet from wire bytes.
pub fn decode_packet(bytes: &[u8]) -> Result<Packet, CodecError> {
    ciborium::from_reader(bytes).map_err(|e| CodecError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_session_wire_shape() {
        let packet = Packet::JoinSession {
            host_id: "10.0.0.7:51234".into(),
            project: "malware".into(),
            binary: "dropper.exe".into(),
            snapshot: "initial".into(),
            tick: 42,
            name: "alice".into(),
            color: 0x00ff_0000,
            ea: Ea(0x401000),
        };
        let json = serde_json::to_value(&packet).unwrap();
        assert_eq!(json["command"], "join_session");
        assert_eq!(json["tick"], 42);
    }

    #[test]
    fn packet_roundtrip() {
        let packets = vec![
            Packet::ListSnapshotsQuery {
                project: "p".into(),
                binary: "b".into(),
            },
            Packet::ListSnapshotsReply {
                snapshots: vec![SnapshotInfo {
                    name: "initial".into(),
                    date: "2024-01-01 10:00:00".into(),
                }],
            },
            Packet::RelayEvent {
                tick: Some(3),
                payload: Bytes::from_static(&[0xa1, 0x01, 0x02]),
            },
            Packet::UpdateUserColor {
                name: "bob".into(),
                old_color: 1,
                new_color: 2,
            },
        ];
        for packet in packets {
            let bytes = encode_packet(&packet).unwrap();
            assert_eq!(decode_packet(&bytes).unwrap(), packet);
        }
    }

    #[test]
    fn relay_event_tick_is_optional() {
        let packet = Packet::RelayEvent {
            tick: None,
            payload: Bytes::from_static(&[0x01]),
        };
        let bytes = encode_packet(&packet).unwrap();
        let back = decode_packet(&bytes).unwrap();
        assert_eq!(back, packet);
    }
}
