//! The message envelope and payload shapes that are used consistently across
//! the server and any client. Also contains the shared game data model.

pub mod model;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::{Card, EnemyWave, HandRank, Tower};

/// The buffer size of a connection's outbound queue and of the hub's intake
/// channel. A full outbound queue marks its connection as a slow consumer.
pub const CHANNEL_BUFFER_SIZE: usize = 256;

/// The maximum size of a single inbound frame (512 KiB). Bounds per-connection
/// memory.
pub const MAX_FRAME_BYTES: usize = 512 * 1024;

/// How many cards a dealt hand holds.
pub const HAND_SIZE: usize = 5;

/// How often a player may draw within one card round.
pub const MAX_DRAWS: u8 = 3;

/// The sender id the gateway stamps on its own emissions.
pub const SERVER_SENDER: &str = "server";

/// Every message kind the gateway understands. Unknown tags deserialize into
/// [`MessageKind::Other`] and are forwarded unmodified, so adding a handled
/// kind here is a compile-time checked change to the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    DealCards,
    HoldHand,
    HoldCard,
    DiscardCard,
    StartWave,
    PlaceTower,
    UpgradeTower,
    CardsDealt,
    WaveStarted,
    TowerPlaced,
    TowerUpgraded,
    #[serde(untagged)]
    Other(String),
}

/// The sole unit exchanged over the wire and over internal broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "roomId", default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    #[serde(rename = "senderId", default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<String>,
}

/// Payload of `hold_card` and `discard_card`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HoldCardPayload {
    pub card_id: String,
}

/// Payload of `place_tower`. The tower type arrives as a free-form label;
/// unrecognized labels fall back to the basic tower.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceTowerPayload {
    pub tower_type: String,
    pub x: f64,
    pub y: f64,
}

/// Payload of `upgrade_tower`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpgradeTowerPayload {
    pub tower_id: String,
}

/// Payload of `cards_dealt`. `gold_earned` is present only on the final draw
/// of a round.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardsDealtPayload {
    pub cards: Vec<Card>,
    pub hand_rank: HandRank,
    pub draw_count: u8,
    pub max_draws: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gold_earned: Option<u32>,
}

/// Payload of `wave_started`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaveStartedPayload {
    pub wave: EnemyWave,
}

/// Payload of `tower_placed` and `tower_upgraded`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TowerPayload {
    pub tower: Tower,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_kinds_round_trip_through_their_snake_case_tags() {
        let json = serde_json::to_string(&MessageKind::DealCards).unwrap();
        assert_eq!(json, "\"deal_cards\"");
        let kind: MessageKind = serde_json::from_str("\"start_wave\"").unwrap();
        assert_eq!(kind, MessageKind::StartWave);
    }

    #[test]
    fn unknown_kind_is_preserved_verbatim() {
        let kind: MessageKind = serde_json::from_str("\"chat_message\"").unwrap();
        assert_eq!(kind, MessageKind::Other("chat_message".into()));
        assert_eq!(serde_json::to_string(&kind).unwrap(), "\"chat_message\"");
    }

    #[test]
    fn envelope_omits_absent_routing_fields() {
        let envelope = Envelope {
            kind: MessageKind::DealCards,
            payload: Value::Null,
            room_id: None,
            sender_id: None,
        };
        let json = serde_json::to_string(&envelope).unwrap();
        assert!(!json.contains("roomId"));
        assert!(!json.contains("senderId"));
    }

    #[test]
    fn envelope_parses_the_wire_shape() {
        let raw = r#"{"type":"hold_card","payload":{"cardId":"hearts-A"},"roomId":"r1","senderId":"p1"}"#;
        let envelope: Envelope = serde_json::from_str(raw).unwrap();
        assert_eq!(envelope.kind, MessageKind::HoldCard);
        assert_eq!(envelope.room_id.as_deref(), Some("r1"));
        let payload: HoldCardPayload = serde_json::from_value(envelope.payload).unwrap();
        assert_eq!(payload.card_id, "hearts-A");
    }
}
