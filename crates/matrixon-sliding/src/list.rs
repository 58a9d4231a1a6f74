//! Sliding window lists
//!
//! A [`RequestList`] describes one sorted room list a client is watching
//! through a set of windows ([`Ranges`]). When a room changes position in the
//! sorted list, [`RequestList::calculate_move_indexes`] works out which
//! single row left and which single row entered each window, so the client
//! can be sent DELETE/INSERT pairs instead of whole windows.

use ruma::OwnedRoomId;
use serde::{Deserialize, Serialize};
use tracing::trace;

use matrixon_common::{MatrixonError, Result};

use crate::{ops::ListOp, required_state::RoomSubscription, sort::SortableRoom};

/// Most recently active rooms first
pub const SORT_BY_RECENCY: &str = "by_recency";

/// Rooms with the most highlights first
pub const SORT_BY_HIGHLIGHT_COUNT: &str = "by_highlight_count";

/// Rooms with the most notifications first
pub const SORT_BY_NOTIFICATION_COUNT: &str = "by_notification_count";

/// Alphabetical by room name
pub const SORT_BY_NAME: &str = "by_name";

/// Sort identifiers understood by the proxy
pub const KNOWN_SORT_ORDERS: [&str; 4] = [
    SORT_BY_RECENCY,
    SORT_BY_HIGHLIGHT_COUNT,
    SORT_BY_NOTIFICATION_COUNT,
    SORT_BY_NAME,
];

/// Inclusive `[start, end]` windows over a sorted room list.
///
/// Always ordered by start index with no inverted or overlapping windows;
/// both construction and deserialization reject anything else.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<[usize; 2]>", into = "Vec<[usize; 2]>")]
pub struct Ranges(Vec<[usize; 2]>);

impl Ranges {
    /// Order `ranges` by start index, rejecting inverted or overlapping windows
    pub fn new(mut ranges: Vec<[usize; 2]>) -> Result<Self> {
        ranges.sort_by_key(|r| r[0]);
        for [start, end] in &ranges {
            if start > end {
                return Err(MatrixonError::BadRequest(format!(
                    "range [{start},{end}] has start after end"
                )));
            }
        }
        for pair in ranges.windows(2) {
            if pair[1][0] <= pair[0][1] {
                return Err(MatrixonError::BadRequest(format!(
                    "ranges [{},{}] and [{},{}] overlap",
                    pair[0][0], pair[0][1], pair[1][0], pair[1][1]
                )));
            }
        }
        Ok(Self(ranges))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &[usize; 2]> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[[usize; 2]] {
        &self.0
    }

    /// Whether `index` falls inside any window
    pub fn inside(&self, index: usize) -> bool {
        self.0.iter().any(|[start, end]| *start <= index && index <= *end)
    }
}

impl TryFrom<Vec<[usize; 2]>> for Ranges {
    type Error = MatrixonError;

    fn try_from(ranges: Vec<[usize; 2]>) -> Result<Self> {
        Self::new(ranges)
    }
}

impl From<Ranges> for Vec<[usize; 2]> {
    fn from(ranges: Ranges) -> Self {
        ranges.0
    }
}

/// Room filters attached to a list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestFilters {
    /// Is DM filter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_dm: Option<bool>,

    /// Spaces filter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spaces: Option<Vec<OwnedRoomId>>,

    /// Is encrypted filter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_encrypted: Option<bool>,

    /// Is invite filter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_invite: Option<bool>,

    /// Room types filter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_types: Option<Vec<String>>,

    /// Not room types filter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_room_types: Option<Vec<String>>,

    /// Room name filter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_name_like: Option<String>,

    /// Tags filter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,

    /// Not tags filter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_tags: Option<Vec<String>>,
}

impl RequestFilters {
    /// Evaluate the filters answerable from a cached room summary.
    ///
    /// Only `room_name_like` is decided here; the remaining filters depend on
    /// per-user membership, tags and encryption state held elsewhere.
    pub fn include(&self, room: &SortableRoom) -> bool {
        match &self.room_name_like {
            Some(like) => room.name.to_lowercase().contains(&like.to_lowercase()),
            None => true,
        }
    }
}

/// One named list in a sliding sync request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestList {
    /// Windows the client has buffered
    #[serde(default, skip_serializing_if = "Ranges::is_empty")]
    pub ranges: Ranges,

    /// Sort identifiers, most significant first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<String>,

    /// Filters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<RequestFilters>,

    /// Subscription applied to every room surfaced by this list
    #[serde(flatten)]
    pub room_subscription: RoomSubscription,

    /// Set by the client to drop the list
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deleted: bool,
}

impl RequestList {
    /// Positional comparison of the sort identifiers; an absent side counts as changed
    pub fn sort_order_changed(&self, other: Option<&RequestList>) -> bool {
        match other {
            Some(other) => self.sort != other.sort,
            None => true,
        }
    }

    /// `(leaving, entering)` index pairs, one per window touched by a room
    /// moving from sorted position `from` to `to`.
    ///
    /// Each endpoint is clamped into the window it belongs to. A window the
    /// move crosses completely reports its own edges: the row at the far edge
    /// left and a new row arrived at the near edge.
    pub fn calculate_move_indexes(&self, from: usize, to: usize) -> Vec<(usize, usize)> {
        if from == to {
            return Vec::new();
        }
        let (lower, upper) = (from.min(to), from.max(to));
        let moves: Vec<(usize, usize)> = self
            .ranges
            .iter()
            .filter(|[start, end]| start <= end && *start <= upper && *end >= lower)
            .map(|&[start, end]| (from.clamp(start, end), to.clamp(start, end)))
            .collect();
        trace!(from, to, ?moves, "calculated move indexes");
        moves
    }

    /// DELETE for `index`, or nothing when the client was never shown that row
    pub fn write_delete_op(&self, index: usize) -> Option<ListOp> {
        self.ranges.inside(index).then_some(ListOp::Delete { index })
    }

    /// INSERT of `room_id` at `index`, or nothing outside every window
    pub fn write_insert_op(&self, index: usize, room_id: OwnedRoomId) -> Option<ListOp> {
        self.ranges
            .inside(index)
            .then_some(ListOp::Insert { index, room_id })
    }

    /// DELETE/INSERT pairs for a room moving from `from` to `to`.
    ///
    /// `sorted` is the room order after the move; it supplies the room that
    /// now occupies each entering index.
    pub fn move_ops(&self, from: usize, to: usize, sorted: &[OwnedRoomId]) -> Vec<ListOp> {
        let mut ops = Vec::new();
        for (leaving, entering) in self.calculate_move_indexes(from, to) {
            let Some(room_id) = sorted.get(entering) else {
                continue;
            };
            ops.push(ListOp::Delete { index: leaving });
            ops.push(ListOp::Insert {
                index: entering,
                room_id: room_id.clone(),
            });
        }
        ops
    }

    /// Ops for a room that was not in the list and now sits at `to`.
    ///
    /// `prev_len` is the list length before the room arrived. Every window
    /// at or after `to` shifts down by one: its bottom row is pushed out if
    /// the window was full, and a row enters at its top (or at `to`).
    pub fn enter_ops(&self, to: usize, prev_len: usize, sorted: &[OwnedRoomId]) -> Vec<ListOp> {
        let mut ops = Vec::new();
        for &[start, end] in self.ranges.iter().filter(|[_, end]| *end >= to) {
            let entering = to.max(start);
            let Some(room_id) = sorted.get(entering) else {
                continue;
            };
            if end < prev_len {
                ops.extend(self.write_delete_op(end));
            }
            ops.extend(self.write_insert_op(entering, room_id.clone()));
        }
        ops
    }

    /// Ops for a room that sat at `from` and has left the list.
    ///
    /// `sorted` is the order after the room left. Every window at or after
    /// `from` shifts up by one: the row at `from` (or the window top) goes,
    /// and the next room, if any, enters at the bottom.
    pub fn leave_ops(&self, from: usize, sorted: &[OwnedRoomId]) -> Vec<ListOp> {
        let mut ops = Vec::new();
        for &[start, end] in self.ranges.iter().filter(|[_, end]| *end >= from) {
            let leaving = from.max(start);
            // The list held sorted.len() + 1 rooms before the removal.
            if leaving > sorted.len() {
                continue;
            }
            ops.extend(self.write_delete_op(leaving));
            if let Some(room_id) = sorted.get(end) {
                ops.extend(self.write_insert_op(end, room_id.clone()));
            }
        }
        ops
    }

    /// Sort and timeline limit checks for a single list.
    ///
    /// Window shape is already guaranteed by [`Ranges`].
    pub fn validate(&self, max_timeline_limit: u64) -> Result<()> {
        if self.room_subscription.timeline_limit > max_timeline_limit {
            return Err(MatrixonError::BadRequest(format!(
                "timeline_limit {} exceeds maximum {}",
                self.room_subscription.timeline_limit, max_timeline_limit
            )));
        }
        if let Some(unknown) = self
            .sort
            .iter()
            .find(|s| !KNOWN_SORT_ORDERS.contains(&s.as_str()))
        {
            return Err(MatrixonError::BadRequest(format!("unknown sort order: {unknown}")));
        }
        Ok(())
    }
}
