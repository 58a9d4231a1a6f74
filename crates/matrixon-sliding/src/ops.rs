//! Wire operations sent to clients to keep their sliding windows in sync

use ruma::OwnedRoomId;
use serde::{Deserialize, Serialize};

/// A single list operation, tagged by `op` on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ListOp {
    /// Replace the window `range` with these rooms
    Sync {
        range: [usize; 2],
        room_ids: Vec<OwnedRoomId>,
    },

    /// Insert `room_id` at `index`, shifting the window
    Insert { index: usize, room_id: OwnedRoomId },

    /// Remove the row at `index`
    Delete { index: usize },

    /// Forget everything the client holds for `range`
    Invalidate { range: [usize; 2] },
}
