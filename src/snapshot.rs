// =============================================================================
// Matrixon Sliding Sync Proxy - Snapshot Storage
// =============================================================================
//
// Project: Matrixon - Ultra High Performance Matrix NextServer (Synapse Alternative)
// Author: arkSong (arksong2018@gmail.com) - Founder of Matrixon Innovation Project
// Contributors: Matrixon Development Team
// Version: 0.11.0-alpha
// License: Apache 2.0 / MIT
//
// Description:
//   JSON file backed implementation of the storage queries used to populate
//   the global room cache, plus the recorded event batches fed to `replay`.
//
//   Snapshot format:
//     {"rooms": [{"room_id": "!a:example.com",
//                 "latest_event": {...},
//                 "state": [{"type": "m.room.name", "state_key": "", ...}]}]}
//
// =============================================================================

use std::{collections::HashMap, path::Path};

use async_trait::async_trait;
use ruma::OwnedRoomId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument};

use matrixon_common::{MatrixonError, Result};
use matrixon_sliding::{StoredEvent, SyncStorage};

/// One room in a snapshot file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRoom {
    pub room_id: OwnedRoomId,

    /// Absent for rooms with no events yet
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_event: Option<Value>,

    /// Current state events of the room
    #[serde(default)]
    pub state: Vec<Value>,
}

/// Room data read from a JSON snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotStorage {
    pub rooms: Vec<SnapshotRoom>,
}

impl SnapshotStorage {
    #[instrument]
    pub async fn open(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            MatrixonError::Storage(format!("failed to read snapshot {}: {e}", path.display()))
        })?;
        let storage: SnapshotStorage = serde_json::from_str(&raw)?;
        info!("📂 Opened snapshot with {} rooms", storage.rooms.len());
        Ok(storage)
    }
}

fn stored_event(room_id: &OwnedRoomId, json: &Value) -> StoredEvent {
    StoredEvent {
        room_id: room_id.clone(),
        event_type: json
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned(),
        state_key: json
            .get("state_key")
            .and_then(Value::as_str)
            .map(str::to_owned),
        json: json.clone(),
    }
}

#[async_trait]
impl SyncStorage for SnapshotStorage {
    async fn latest_event_in_all_rooms(&self) -> Result<Vec<StoredEvent>> {
        Ok(self
            .rooms
            .iter()
            .filter_map(|room| {
                room.latest_event
                    .as_ref()
                    .map(|json| stored_event(&room.room_id, json))
            })
            .collect())
    }

    async fn current_state_events_in_all_rooms(
        &self,
        event_types: &[String],
    ) -> Result<HashMap<OwnedRoomId, Vec<StoredEvent>>> {
        let mut by_room = HashMap::new();
        for room in &self.rooms {
            let events: Vec<StoredEvent> = room
                .state
                .iter()
                .map(|json| stored_event(&room.room_id, json))
                .filter(|ev| event_types.contains(&ev.event_type))
                .collect();
            if !events.is_empty() {
                by_room.insert(room.room_id.clone(), events);
            }
        }
        debug!("📥 {} rooms have state of types {:?}", by_room.len(), event_types);
        Ok(by_room)
    }
}

/// Events a poller delivered for one room in one go
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventBatch {
    pub room_id: OwnedRoomId,
    #[serde(default)]
    pub latest_pos: i64,
    pub events: Vec<Value>,
}

/// Read recorded batches from a JSON array
pub async fn load_batches(path: &Path) -> Result<Vec<EventBatch>> {
    let raw = tokio::fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&raw)?)
}
