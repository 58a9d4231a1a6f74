//! Storage collaborator consulted when the global cache is first populated

use std::collections::HashMap;

use async_trait::async_trait;
use ruma::OwnedRoomId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use matrixon_common::Result;

/// A stored event row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub room_id: OwnedRoomId,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_key: Option<String>,
    pub json: Value,
}

/// Read access to persisted room data
#[async_trait]
pub trait SyncStorage: Send + Sync {
    /// The most recent event of every known room, one per room
    async fn latest_event_in_all_rooms(&self) -> Result<Vec<StoredEvent>>;

    /// Current state events of the given types, grouped by room
    async fn current_state_events_in_all_rooms(
        &self,
        event_types: &[String],
    ) -> Result<HashMap<OwnedRoomId, Vec<StoredEvent>>>;
}
