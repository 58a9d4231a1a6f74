// =============================================================================
// Matrixon Sliding Sync Proxy - Session Module
// =============================================================================
//
// Project: Matrixon - Ultra High Performance Matrix NextServer (Synapse Alternative)
// Author: arkSong (arksong2018@gmail.com) - Founder of Matrixon Innovation Project
// Contributors: Matrixon Development Team
// Version: 0.11.0-alpha
// License: Apache 2.0 / MIT
//
// Description:
//   Per-connection state of one sliding sync client. A session owns the
//   last accepted request and the room order each of its lists was last
//   shown in, and turns request changes and new events into list operations.
//
// =============================================================================

use std::collections::BTreeMap;

use ruma::{OwnedRoomId, OwnedUserId, RoomId};
use tracing::{debug, instrument};

use matrixon_common::Result;
use matrixon_sliding::{
    EventData, GlobalCache, ListOp, Request, RequestList, RequiredStateMap, RoomSubscription,
    SortableRooms,
};

use crate::config::Config;

/// List operations produced by one step of a session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionUpdate {
    pub lists: BTreeMap<String, Vec<ListOp>>,
    pub subscribed: Vec<OwnedRoomId>,
    pub unsubscribed: Vec<OwnedRoomId>,
}

impl SessionUpdate {
    pub fn is_empty(&self) -> bool {
        self.lists.is_empty() && self.subscribed.is_empty() && self.unsubscribed.is_empty()
    }
}

/// What the client should receive for one room
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomView {
    pub timeline_limit: u64,
    pub required_state: RequiredStateMap,
}

/// State of one connected client
#[derive(Debug)]
pub struct Session {
    user_id: OwnedUserId,
    default_timeline_limit: u64,
    max_timeline_limit: u64,
    request: Option<Request>,
    list_orders: BTreeMap<String, Vec<OwnedRoomId>>,
}

impl Session {
    pub fn new(user_id: OwnedUserId, config: &Config) -> Self {
        Self {
            user_id,
            default_timeline_limit: config.default_timeline_limit,
            max_timeline_limit: config.max_timeline_limit,
            request: None,
            list_orders: BTreeMap::new(),
        }
    }

    /// The merged request, if any has been accepted
    pub fn request(&self) -> Option<&Request> {
        self.request.as_ref()
    }

    /// Accept a new request body.
    ///
    /// Lists whose sort or filters changed have their previous windows
    /// invalidated; every new or changed list gets a SYNC per window.
    #[instrument(skip_all, fields(user_id = %self.user_id))]
    pub fn handle_request(&mut self, cache: &GlobalCache, next: &Request) -> Result<SessionUpdate> {
        next.validate(self.max_timeline_limit)?;
        let (merged, delta) = Request::apply_delta(self.request.as_ref(), next);

        let mut update = SessionUpdate {
            subscribed: delta.subs,
            unsubscribed: delta.unsubs,
            ..Default::default()
        };
        for (name, list_delta) in &delta.lists {
            let Some(curr) = &list_delta.curr else {
                self.list_orders.remove(name);
                debug!("🗑️ List {} deleted", name);
                continue;
            };

            let rooms = sorted_rooms(cache, curr)?;
            let mut ops = Vec::new();
            if let Some(prev) = &list_delta.prev {
                if list_delta.sort_order_changed() || prev.filters != curr.filters {
                    ops.extend(prev.ranges.iter().map(|range| ListOp::Invalidate { range: *range }));
                }
            }
            for (range, room_ids) in curr.ranges.iter().zip(rooms.subslice(&curr.ranges)) {
                ops.push(ListOp::Sync {
                    range: *range,
                    room_ids,
                });
            }
            self.list_orders.insert(name.clone(), rooms.room_ids());
            update.lists.insert(name.clone(), ops);
        }

        self.request = Some(merged);
        Ok(update)
    }

    /// React to an event the global cache has just ingested.
    ///
    /// Recomputes each list's order and reports the event's room moving
    /// within it, entering it or leaving it.
    #[instrument(skip_all, fields(user_id = %self.user_id, room_id = %event.room_id))]
    pub fn on_event(&mut self, cache: &GlobalCache, event: &EventData) -> Result<SessionUpdate> {
        let mut update = SessionUpdate::default();
        let Some(request) = &self.request else {
            return Ok(update);
        };

        for (name, list) in &request.lists {
            let order = sorted_rooms(cache, list)?.room_ids();
            let prev = self.list_orders.get(name);
            let from = prev.and_then(|old| position(old, &event.room_id));
            let to = position(&order, &event.room_id);

            let ops = match (from, to) {
                (Some(from), Some(to)) => list.move_ops(from, to, &order),
                (None, Some(to)) => list.enter_ops(to, prev.map_or(0, Vec::len), &order),
                (Some(from), None) => list.leave_ops(from, &order),
                (None, None) => Vec::new(),
            };
            self.list_orders.insert(name.clone(), order);
            if !ops.is_empty() {
                update.lists.insert(name.clone(), ops);
            }
        }
        Ok(update)
    }

    /// Timeline limit and required state for `room_id`.
    ///
    /// Combines the explicit subscription with the subscription of every
    /// list currently showing the room. `None` when nothing covers it.
    pub fn room_view(&self, room_id: &RoomId) -> Option<RoomView> {
        let request = self.request.as_ref()?;
        let mut combined: Option<RoomSubscription> = request.room_subscription(room_id).ok().cloned();

        for (name, list) in &request.lists {
            let visible = self
                .list_orders
                .get(name)
                .and_then(|order| position(order, room_id))
                .map_or(false, |index| list.ranges.inside(index));
            if visible {
                combined = Some(match combined {
                    Some(sub) => sub.combine(&list.room_subscription),
                    None => list.room_subscription.clone(),
                });
            }
        }

        combined.map(|sub| RoomView {
            timeline_limit: if sub.timeline_limit == 0 {
                self.default_timeline_limit
            } else {
                sub.timeline_limit
            },
            required_state: sub.required_state_map(&self.user_id),
        })
    }
}

fn position(order: &[OwnedRoomId], room_id: &RoomId) -> Option<usize> {
    order.iter().position(|r| r.as_str() == room_id.as_str())
}

fn sorted_rooms(cache: &GlobalCache, list: &RequestList) -> Result<SortableRooms> {
    let mut rooms = cache.snapshot_rooms();
    if let Some(filters) = &list.filters {
        rooms.filter(filters);
    }
    rooms.sort(&list.sort)?;
    Ok(rooms)
}
