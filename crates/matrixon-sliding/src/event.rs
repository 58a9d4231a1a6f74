//! Parsed view of an incoming room event
//!
//! Events arrive from pollers as raw JSON. Only the handful of fields the
//! cache and its listeners need are pulled out; anything missing or of the
//! wrong shape reads as empty.

use ruma::OwnedRoomId;
use serde::Serialize;
use serde_json::Value;

use crate::storage::StoredEvent;

/// State event carrying the room's display name
pub const ROOM_NAME_EVENT: &str = "m.room.name";

/// State event carrying the room's canonical alias
pub const CANONICAL_ALIAS_EVENT: &str = "m.room.canonical_alias";

/// One event as delivered to cache listeners
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventData {
    pub room_id: OwnedRoomId,
    pub event_type: String,
    /// `None` for timeline events, `Some("")` for room-level state
    pub state_key: Option<String>,
    pub content: Value,
    /// Stream position of the batch this event arrived in
    pub latest_pos: i64,
    /// `origin_server_ts` in milliseconds
    pub timestamp: u64,
    /// The event as received
    pub event: Value,
}

impl EventData {
    /// Extract the interesting fields from `event` without failing
    pub fn parse(room_id: OwnedRoomId, event: &Value, latest_pos: i64) -> Self {
        Self {
            room_id,
            event_type: str_field(event, "type"),
            state_key: event
                .get("state_key")
                .and_then(Value::as_str)
                .map(str::to_owned),
            content: event.get("content").cloned().unwrap_or(Value::Null),
            latest_pos,
            timestamp: timestamp_of(event),
            event: event.clone(),
        }
    }

    /// True for room-level state of `event_type` (empty state key)
    pub fn is_room_state(&self, event_type: &str) -> bool {
        self.event_type == event_type && self.state_key.as_deref() == Some("")
    }

    /// `content.<field>` as a string, empty when absent
    pub fn content_str(&self, field: &str) -> String {
        str_field(&self.content, field)
    }
}

impl From<&StoredEvent> for EventData {
    /// Stored rows carry their type and state key as columns; the stream
    /// position is unknown and reads as zero.
    fn from(stored: &StoredEvent) -> Self {
        Self {
            room_id: stored.room_id.clone(),
            event_type: stored.event_type.clone(),
            state_key: stored.state_key.clone(),
            content: stored.json.get("content").cloned().unwrap_or(Value::Null),
            latest_pos: 0,
            timestamp: timestamp_of(&stored.json),
            event: stored.json.clone(),
        }
    }
}

/// `origin_server_ts` of a raw event, zero when absent or negative
pub fn timestamp_of(event: &Value) -> u64 {
    event
        .get("origin_server_ts")
        .and_then(Value::as_u64)
        .unwrap_or(0)
}

fn str_field(value: &Value, field: &str) -> String {
    value
        .get(field)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ruma::owned_room_id;
    use serde_json::json;

    #[test]
    fn test_parse_state_event() {
        let raw = json!({
            "type": "m.room.name",
            "state_key": "",
            "content": {"name": "The Room"},
            "origin_server_ts": 1_632_131_678_061u64,
            "event_id": "$abc",
        });
        let ev = EventData::parse(owned_room_id!("!a:localhost"), &raw, 7);
        assert_eq!(ev.event_type, ROOM_NAME_EVENT);
        assert_eq!(ev.state_key.as_deref(), Some(""));
        assert!(ev.is_room_state(ROOM_NAME_EVENT));
        assert!(!ev.is_room_state(CANONICAL_ALIAS_EVENT));
        assert_eq!(ev.content_str("name"), "The Room");
        assert_eq!(ev.timestamp, 1_632_131_678_061);
        assert_eq!(ev.latest_pos, 7);
        assert_eq!(ev.event, raw);
    }

    #[test]
    fn test_parse_malformed_event_degrades() {
        let raw = json!({"type": 42, "state_key": null, "origin_server_ts": "soon"});
        let ev = EventData::parse(owned_room_id!("!a:localhost"), &raw, 0);
        assert_eq!(ev.event_type, "");
        assert_eq!(ev.state_key, None);
        assert_eq!(ev.content, Value::Null);
        assert_eq!(ev.content_str("name"), "");
        assert_eq!(ev.timestamp, 0);
    }

    #[test]
    fn test_from_stored_row() {
        let stored = StoredEvent {
            room_id: owned_room_id!("!a:localhost"),
            event_type: CANONICAL_ALIAS_EVENT.to_string(),
            state_key: Some(String::new()),
            json: json!({"content": {"alias": "#a:localhost"}, "origin_server_ts": 5}),
        };
        let ev = EventData::from(&stored);
        assert!(ev.is_room_state(CANONICAL_ALIAS_EVENT));
        assert_eq!(ev.content_str("alias"), "#a:localhost");
        assert_eq!(ev.timestamp, 5);
        assert_eq!(ev.latest_pos, 0);
    }

    #[test]
    fn test_timeline_event_is_not_state() {
        let raw = json!({"type": "m.room.name", "content": {"name": "spoof"}});
        let ev = EventData::parse(owned_room_id!("!a:localhost"), &raw, 0);
        assert!(!ev.is_room_state(ROOM_NAME_EVENT));
    }
}
