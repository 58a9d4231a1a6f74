//! Room summaries and list ordering
//!
//! [`SortableRoom`] is the point-in-time summary kept in the global cache.
//! [`SortableRooms`] orders a set of them for one list and answers the index
//! questions the range algebra needs.

use std::cmp::Ordering;

use ruma::{OwnedRoomId, RoomId};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use matrixon_common::{MatrixonError, Result};

use crate::list::{
    RequestFilters, Ranges, SORT_BY_HIGHLIGHT_COUNT, SORT_BY_NAME, SORT_BY_NOTIFICATION_COUNT,
    SORT_BY_RECENCY,
};

/// Cached summary of a room, used for ordering and display only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortableRoom {
    /// Room ID
    pub room_id: OwnedRoomId,

    /// Display name from `m.room.name`, falling back to the canonical alias
    #[serde(default)]
    pub name: String,

    /// `origin_server_ts` of the latest event, in milliseconds
    #[serde(default)]
    pub last_message_timestamp: u64,

    /// The latest event as received
    #[serde(default)]
    pub last_event_json: serde_json::Value,
}

impl SortableRoom {
    /// Empty summary for `room_id`
    pub fn new(room_id: OwnedRoomId) -> Self {
        Self {
            room_id,
            name: String::new(),
            last_message_timestamp: 0,
            last_event_json: serde_json::Value::Null,
        }
    }
}

/// A list's rooms in sort order
#[derive(Debug, Clone, Default)]
pub struct SortableRooms {
    rooms: Vec<SortableRoom>,
}

impl SortableRooms {
    pub fn new(rooms: Vec<SortableRoom>) -> Self {
        Self { rooms }
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Order by `sort_by`, most significant identifier first.
    ///
    /// Count-based orders need per-user unread counts which the global cache
    /// does not hold; they compare equal here and defer to the next key. Ties
    /// are broken by room ID so the order is total.
    #[instrument(level = "debug", skip(self), fields(rooms = self.rooms.len()))]
    pub fn sort(&mut self, sort_by: &[String]) -> Result<()> {
        for sort in sort_by {
            match sort.as_str() {
                SORT_BY_RECENCY | SORT_BY_NAME | SORT_BY_HIGHLIGHT_COUNT | SORT_BY_NOTIFICATION_COUNT => {}
                unknown => {
                    return Err(MatrixonError::BadRequest(format!("unknown sort order: {unknown}")));
                }
            }
        }
        self.rooms.sort_by(|a, b| {
            sort_by
                .iter()
                .map(|sort| compare(sort, a, b))
                .find(|ordering| *ordering != Ordering::Equal)
                .unwrap_or_else(|| a.room_id.cmp(&b.room_id))
        });
        debug!("🔧 Sorted {} rooms by {:?}", self.rooms.len(), sort_by);
        Ok(())
    }

    /// Position of `room_id` in the current order
    pub fn index_of(&self, room_id: &RoomId) -> Option<usize> {
        self.rooms.iter().position(|r| r.room_id.as_str() == room_id.as_str())
    }

    /// Room IDs in the current order
    pub fn room_ids(&self) -> Vec<OwnedRoomId> {
        self.rooms.iter().map(|r| r.room_id.clone()).collect()
    }

    /// Room IDs visible through each window, one entry per range
    pub fn subslice(&self, ranges: &Ranges) -> Vec<Vec<OwnedRoomId>> {
        ranges
            .iter()
            .map(|&[start, end]| {
                if start > end || start >= self.rooms.len() {
                    return Vec::new();
                }
                let end = end.min(self.rooms.len() - 1);
                self.rooms[start..=end].iter().map(|r| r.room_id.clone()).collect()
            })
            .collect()
    }

    /// Keep only rooms the filters accept
    pub fn filter(&mut self, filters: &RequestFilters) {
        self.rooms.retain(|room| filters.include(room));
    }
}

fn compare(sort: &str, a: &SortableRoom, b: &SortableRoom) -> Ordering {
    match sort {
        SORT_BY_RECENCY => b.last_message_timestamp.cmp(&a.last_message_timestamp),
        SORT_BY_NAME => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
        _ => Ordering::Equal,
    }
}
