//! The closed catalogue of messages exchanged on the bus channel.
//!
//! Every object published to the channel is JSON with a required `type`
//! field. Decoding produces a [`BusMessage`] variant, so handler matches are
//! exhaustiveness-checked at compile time; a `type` this build does not know
//! simply fails to decode and is dropped by the subscriber loop.
//!
//! Every process receives every message, so each variant declares the
//! [`Audience`] that may handle it and everything else silently ignores it.
//! Handlers are written to tolerate duplicate delivery: re-applying a
//! `sync_config` is a pure overwrite, and a `queue_match` for players that
//! already departed misses their pending-join records and does nothing.

use crate::player::QueuedPlayer;
use crate::types::{PlayerId, Role};
use serde::{Deserialize, Serialize};

/// Which process role(s) a message type is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    /// Handled only on the host
    Host,
    /// Handled only on backends
    Backend,
    /// Handled on every process
    All,
}

impl Audience {
    /// Whether a process with the given role should process this message.
    pub fn accepts(&self, role: Role) -> bool {
        match self {
            Audience::Host => role == Role::Host,
            Audience::Backend => role == Role::Backend,
            Audience::All => true,
        }
    }
}

/// A message published to the shared bus channel.
///
/// The catalogue:
///
/// | type | sent by | handled by |
/// |---|---|---|
/// | `sync_request` | backend | host |
/// | `sync_config` | host | backend |
/// | `queue_join` / `queue_leave` | backend | host |
/// | `duel_req` | backend | host |
/// | `queue_match` | host | everyone |
/// | `arena_join` | backend | host |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusMessage {
    /// A backend asking the host for the current template set.
    SyncRequest {
        /// Requester's server name, echoed back so the reply targets it
        #[serde(default, skip_serializing_if = "Option::is_none")]
        origin: Option<String>,
    },

    /// The host's template snapshot, applied by backends.
    SyncConfig {
        /// When present, only the named backend applies the snapshot
        #[serde(default, skip_serializing_if = "Option::is_none")]
        origin: Option<String>,
        /// Gzip + base64 snapshot of the remote template set
        data: String,
    },

    /// A backend toggling a player in a fleet-wide queue.
    QueueJoin {
        arena: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        map: Option<String>,
        #[serde(default)]
        origin: String,
        player: QueuedPlayer,
    },

    /// A backend removing a player from every queue they occupy.
    QueueLeave {
        uuid: PlayerId,
        #[serde(default)]
        origin: String,
    },

    /// A backend requesting a duel between a specific pair of players.
    DuelReq {
        arena: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        map: Option<String>,
        requester: QueuedPlayer,
        target: QueuedPlayer,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        origin: Option<String>,
    },

    /// The host announcing a ready match and its prepared instance.
    ///
    /// Backends holding any of the named players transfer them to the host;
    /// the host itself registers the batch as pending joins (unless the
    /// match is a duel it already prepared locally).
    QueueMatch {
        arena: String,
        map: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        duel: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        origin: Option<String>,
        players: Vec<QueuedPlayer>,
    },

    /// An ad-hoc join request for a named map, handled on the host like a
    /// one-shot queue_match producer.
    ArenaJoin {
        arena: String,
        map: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        duel: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        origin: Option<String>,
        players: Vec<QueuedPlayer>,
    },
}

impl BusMessage {
    /// The audience that processes this message; everything else drops it.
    pub fn audience(&self) -> Audience {
        match self {
            BusMessage::SyncRequest { .. } => Audience::Host,
            BusMessage::SyncConfig { .. } => Audience::Backend,
            BusMessage::QueueJoin { .. } => Audience::Host,
            BusMessage::QueueLeave { .. } => Audience::Host,
            BusMessage::DuelReq { .. } => Audience::Host,
            BusMessage::QueueMatch { .. } => Audience::All,
            BusMessage::ArenaJoin { .. } => Audience::Host,
        }
    }

    /// The wire tag of this message, for logging.
    pub fn message_type(&self) -> &'static str {
        match self {
            BusMessage::SyncRequest { .. } => "sync_request",
            BusMessage::SyncConfig { .. } => "sync_config",
            BusMessage::QueueJoin { .. } => "queue_join",
            BusMessage::QueueLeave { .. } => "queue_leave",
            BusMessage::DuelReq { .. } => "duel_req",
            BusMessage::QueueMatch { .. } => "queue_match",
            BusMessage::ArenaJoin { .. } => "arena_join",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::Element;

    #[test]
    fn queue_join_round_trips() {
        let msg = BusMessage::QueueJoin {
            arena: "skirmish".to_string(),
            map: None,
            origin: "lobby-2".to_string(),
            player: QueuedPlayer::with_origin(PlayerId::new(), "lobby-2"),
        };

        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""type":"queue_join""#));

        let decoded: BusMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn duel_req_uses_snake_case_tag() {
        let msg = BusMessage::DuelReq {
            arena: "duels".to_string(),
            map: Some("courtyard".to_string()),
            requester: QueuedPlayer::new(PlayerId::new()),
            target: QueuedPlayer::new(PlayerId::new()),
            origin: Some("lobby-1".to_string()),
        };

        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""type":"duel_req""#));
    }

    #[test]
    fn unknown_type_fails_to_decode() {
        let result = serde_json::from_str::<BusMessage>(r#"{"type":"spectate_request"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn queue_match_decodes_player_payloads() {
        let json = r#"{
            "type": "queue_match",
            "arena": "skirmish",
            "map": "ravine#3",
            "origin": "lobby-1",
            "players": [
                {"uuid": "550e8400-e29b-41d4-a716-446655440000", "elements": ["WATER"], "origin": "lobby-1"},
                {"uuid": "6fa459ea-ee8a-3ca4-894e-db77e160355e"}
            ]
        }"#;

        let decoded: BusMessage = serde_json::from_str(json).unwrap();
        match decoded {
            BusMessage::QueueMatch { players, duel, .. } => {
                assert_eq!(players.len(), 2);
                assert!(!duel);
                assert!(players[0].has_element(Element::Water));
                assert_eq!(players[1].origin, None);
            }
            other => panic!("decoded wrong variant: {other:?}"),
        }
    }

    #[test]
    fn audiences_match_the_catalogue() {
        let host_only = BusMessage::SyncRequest { origin: None };
        assert!(host_only.audience().accepts(Role::Host));
        assert!(!host_only.audience().accepts(Role::Backend));

        let backend_only = BusMessage::SyncConfig {
            origin: None,
            data: String::new(),
        };
        assert!(!backend_only.audience().accepts(Role::Host));
        assert!(backend_only.audience().accepts(Role::Backend));

        let everyone = BusMessage::QueueMatch {
            arena: String::new(),
            map: String::new(),
            duel: false,
            origin: None,
            players: vec![],
        };
        assert!(everyone.audience().accepts(Role::Host));
        assert!(everyone.audience().accepts(Role::Backend));
    }
}
