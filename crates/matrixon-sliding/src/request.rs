//! Sliding sync requests and incremental diffing
//!
//! Each session keeps the last accepted [`Request`]. A new request body is
//! merged into it with [`Request::apply_delta`], which returns the new
//! canonical request and a [`RequestDelta`] naming exactly what changed.

use std::collections::BTreeMap;

use ruma::{OwnedRoomId, RoomId};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use matrixon_common::{MatrixonError, Result};

use crate::{
    list::{RequestList, SORT_BY_RECENCY},
    required_state::RoomSubscription,
};

/// A sliding sync request body
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Lists keyed by client-chosen name
    #[serde(default)]
    pub lists: BTreeMap<String, RequestList>,

    /// Explicit room subscriptions
    #[serde(default)]
    pub room_subscriptions: BTreeMap<OwnedRoomId, RoomSubscription>,

    /// Rooms to drop from `room_subscriptions` this round
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unsubscribe_rooms: Vec<OwnedRoomId>,
}

/// Before/after view of one list across a merge
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestListDelta {
    /// Absent when the list is new
    pub prev: Option<RequestList>,

    /// Absent when the list was deleted
    pub curr: Option<RequestList>,
}

impl RequestListDelta {
    /// Whether the sort identifiers differ across the merge
    pub fn sort_order_changed(&self) -> bool {
        match (&self.prev, &self.curr) {
            (Some(prev), curr) => prev.sort_order_changed(curr.as_ref()),
            (None, _) => true,
        }
    }
}

/// What a merge changed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestDelta {
    /// Rooms newly subscribed this round
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subs: Vec<OwnedRoomId>,

    /// Rooms newly unsubscribed this round
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unsubs: Vec<OwnedRoomId>,

    /// Lists that were added, changed or deleted
    #[serde(default)]
    pub lists: BTreeMap<String, RequestListDelta>,
}

impl Request {
    /// Merge `next` into `prev` (absent on a session's first request).
    ///
    /// Subscriptions present in `next` replace prior ones wholesale. A room
    /// both subscribed and unsubscribed in `next` is a no-op: it stays
    /// subscribed if it already was and stays absent otherwise. Lists are
    /// merged field by field; only new, changed or deleted lists appear in
    /// the delta.
    #[instrument(level = "debug", skip_all, fields(
        first = prev.is_none(),
        lists = next.lists.len(),
        subscriptions = next.room_subscriptions.len(),
        unsubscribes = next.unsubscribe_rooms.len(),
    ))]
    pub fn apply_delta(prev: Option<&Request>, next: &Request) -> (Request, RequestDelta) {
        let mut delta = RequestDelta::default();

        let (room_subscriptions, subs, unsubs) = merge_room_subscriptions(prev, next);
        delta.subs = subs;
        delta.unsubs = unsubs;

        let mut lists = prev.map(|p| p.lists.clone()).unwrap_or_default();
        for (name, next_list) in &next.lists {
            let existing = lists.remove(name);
            if next_list.deleted {
                if existing.is_some() {
                    delta.lists.insert(
                        name.clone(),
                        RequestListDelta {
                            prev: existing,
                            curr: None,
                        },
                    );
                }
                continue;
            }

            let merged = merge_list(existing.as_ref(), next_list);
            if existing.as_ref() != Some(&merged) {
                delta.lists.insert(
                    name.clone(),
                    RequestListDelta {
                        prev: existing,
                        curr: Some(merged.clone()),
                    },
                );
            }
            lists.insert(name.clone(), merged);
        }

        debug!(
            subs = delta.subs.len(),
            unsubs = delta.unsubs.len(),
            list_changes = delta.lists.len(),
            "🔄 Applied request delta"
        );

        let merged = Request {
            lists,
            room_subscriptions,
            unsubscribe_rooms: Vec::new(),
        };
        (merged, delta)
    }

    /// Merge `next` into this request
    pub fn apply(&self, next: &Request) -> (Request, RequestDelta) {
        Self::apply_delta(Some(self), next)
    }

    /// The list called `name`, or `NotRequested` if the client never configured it
    pub fn list(&self, name: &str) -> Result<&RequestList> {
        self.lists
            .get(name)
            .ok_or_else(|| MatrixonError::NotRequested(format!("list '{name}'")))
    }

    /// The subscription for `room_id`, or `NotRequested` if there is none
    pub fn room_subscription(&self, room_id: &RoomId) -> Result<&RoomSubscription> {
        self.room_subscriptions
            .get(room_id)
            .ok_or_else(|| MatrixonError::NotRequested(format!("room subscription for {room_id}")))
    }

    /// Reject malformed windows, unknown sorts and over-limit timelines
    pub fn validate(&self, max_timeline_limit: u64) -> Result<()> {
        for (name, list) in &self.lists {
            list.validate(max_timeline_limit)
                .map_err(|e| MatrixonError::BadRequest(format!("list '{name}': {e}")))?;
        }
        for (room_id, sub) in &self.room_subscriptions {
            if sub.timeline_limit > max_timeline_limit {
                return Err(MatrixonError::BadRequest(format!(
                    "room subscription {room_id}: timeline_limit {} exceeds maximum {}",
                    sub.timeline_limit, max_timeline_limit
                )));
            }
        }
        Ok(())
    }
}

fn merge_room_subscriptions(
    prev: Option<&Request>,
    next: &Request,
) -> (BTreeMap<OwnedRoomId, RoomSubscription>, Vec<OwnedRoomId>, Vec<OwnedRoomId>) {
    let mut merged = prev
        .map(|p| p.room_subscriptions.clone())
        .unwrap_or_default();
    let mut subs = Vec::new();
    let mut unsubs = Vec::new();

    for room_id in &next.unsubscribe_rooms {
        if next.room_subscriptions.contains_key(room_id) {
            continue;
        }
        if merged.remove(room_id).is_some() && !unsubs.contains(room_id) {
            unsubs.push(room_id.clone());
        }
    }

    for (room_id, sub) in &next.room_subscriptions {
        let already_subscribed = merged.contains_key(room_id);
        if next.unsubscribe_rooms.contains(room_id) && !already_subscribed {
            continue;
        }
        if !already_subscribed {
            subs.push(room_id.clone());
        }
        merged.insert(room_id.clone(), sub.clone());
    }

    (merged, subs, unsubs)
}

fn merge_list(existing: Option<&RequestList>, next: &RequestList) -> RequestList {
    let mut merged = existing.cloned().unwrap_or_default();
    if !next.ranges.is_empty() {
        merged.ranges = next.ranges.clone();
    }
    if !next.sort.is_empty() {
        merged.sort = next.sort.clone();
    }
    if next.filters.is_some() {
        merged.filters = next.filters.clone();
    }
    if !next.room_subscription.is_empty() {
        merged.room_subscription = next.room_subscription.clone();
    }
    if merged.sort.is_empty() {
        merged.sort = vec![SORT_BY_RECENCY.to_string()];
    }
    merged.deleted = false;
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::list::{Ranges, RequestFilters, SORT_BY_HIGHLIGHT_COUNT, SORT_BY_NAME};
    use ruma::{owned_room_id, room_id};
    use test_log::test;

    fn sort(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn timeline(limit: u64) -> RoomSubscription {
        RoomSubscription {
            timeline_limit: limit,
            required_state: Vec::new(),
        }
    }

    fn subs(entries: &[(&str, u64)]) -> BTreeMap<OwnedRoomId, RoomSubscription> {
        entries
            .iter()
            .map(|(id, limit)| (OwnedRoomId::try_from(*id).unwrap(), timeline(*limit)))
            .collect()
    }

    fn lists(entries: Vec<(&str, RequestList)>) -> BTreeMap<String, RequestList> {
        entries.into_iter().map(|(name, l)| (name.to_string(), l)).collect()
    }

    fn list_delta(prev: Option<&RequestList>, curr: Option<&RequestList>) -> RequestListDelta {
        RequestListDelta {
            prev: prev.cloned(),
            curr: curr.cloned(),
        }
    }

    /// The prior request shared by the incremental cases
    fn existing() -> Request {
        Request {
            lists: lists(vec![(
                "q",
                RequestList {
                    sort: sort(&[SORT_BY_NAME]),
                    room_subscription: timeline(5),
                    ..Default::default()
                },
            )]),
            room_subscriptions: subs(&[("!foo:bar", 10)]),
            unsubscribe_rooms: Vec::new(),
        }
    }

    #[test]
    fn test_initial_room_sub_only() {
        let next = Request {
            room_subscriptions: subs(&[("!foo:bar", 10)]),
            ..Default::default()
        };
        let (merged, delta) = Request::apply_delta(None, &next);
        assert_eq!(merged.lists, BTreeMap::new());
        assert_eq!(merged.room_subscriptions, subs(&[("!foo:bar", 10)]));
        assert_eq!(delta.subs, vec![owned_room_id!("!foo:bar")]);
        assert!(delta.unsubs.is_empty());
        assert!(delta.lists.is_empty());
    }

    #[test]
    fn test_initial_list_only() {
        let list = RequestList {
            ranges: Ranges::new(vec![[0, 20]]).unwrap(),
            sort: sort(&[SORT_BY_HIGHLIGHT_COUNT]),
            ..Default::default()
        };
        let next = Request {
            lists: lists(vec![("a", list.clone())]),
            ..Default::default()
        };
        let (merged, delta) = Request::apply_delta(None, &next);
        assert_eq!(merged.lists, lists(vec![("a", list.clone())]));
        assert!(merged.room_subscriptions.is_empty());
        assert!(delta.subs.is_empty());
        assert_eq!(delta.lists["a"], list_delta(None, Some(&list)));
        assert!(delta.lists["a"].sort_order_changed());
    }

    #[test]
    fn test_initial_sort_defaults_to_recency() {
        let next = Request {
            lists: lists(vec![(
                "a",
                RequestList {
                    ranges: Ranges::new(vec![[0, 20]]).unwrap(),
                    ..Default::default()
                },
            )]),
            ..Default::default()
        };
        let (merged, delta) = Request::apply_delta(None, &next);
        let want = RequestList {
            ranges: Ranges::new(vec![[0, 20]]).unwrap(),
            sort: sort(&[SORT_BY_RECENCY]),
            ..Default::default()
        };
        assert_eq!(merged.lists["a"], want);
        assert_eq!(delta.lists["a"], list_delta(None, Some(&want)));
    }

    #[test]
    fn test_initial_multiple_lists_and_sub() {
        let encrypted = RequestList {
            ranges: Ranges::new(vec![[0, 10]]).unwrap(),
            filters: Some(RequestFilters {
                is_encrypted: Some(true),
                ..Default::default()
            }),
            sort: sort(&[SORT_BY_RECENCY]),
            ..Default::default()
        };
        let with_sub = RequestList {
            ranges: Ranges::new(vec![[0, 5]]).unwrap(),
            sort: sort(&[SORT_BY_RECENCY, SORT_BY_NAME]),
            room_subscription: RoomSubscription {
                timeline_limit: 11,
                required_state: vec![["m.room.create".to_string(), String::new()]],
            },
            ..Default::default()
        };
        let next = Request {
            lists: lists(vec![("a", encrypted.clone()), ("b", with_sub.clone())]),
            room_subscriptions: subs(&[("!foo:bar", 10)]),
            unsubscribe_rooms: Vec::new(),
        };
        let (merged, delta) = Request::apply_delta(None, &next);
        assert_eq!(merged.lists, next.lists);
        assert_eq!(delta.subs, vec![owned_room_id!("!foo:bar")]);
        assert_eq!(delta.lists.len(), 2);
        assert_eq!(delta.lists["a"], list_delta(None, Some(&encrypted)));
        assert_eq!(delta.lists["b"], list_delta(None, Some(&with_sub)));
    }

    #[test]
    fn test_overwrite_sort_and_update_sub() {
        let input = existing();
        let next = Request {
            lists: lists(vec![(
                "q",
                RequestList {
                    sort: sort(&[SORT_BY_RECENCY]),
                    ..Default::default()
                },
            )]),
            room_subscriptions: subs(&[("!foo:bar", 100)]),
            unsubscribe_rooms: Vec::new(),
        };
        let (merged, delta) = input.apply(&next);
        let want_q = RequestList {
            sort: sort(&[SORT_BY_RECENCY]),
            room_subscription: timeline(5),
            ..Default::default()
        };
        assert_eq!(merged.lists["q"], want_q);
        assert_eq!(merged.room_subscriptions, subs(&[("!foo:bar", 100)]));
        assert!(delta.subs.is_empty());
        assert!(delta.unsubs.is_empty());
        assert_eq!(delta.lists["q"], list_delta(Some(&input.lists["q"]), Some(&want_q)));
        assert!(delta.lists["q"].sort_order_changed());
    }

    #[test]
    fn test_adding_a_sub() {
        let input = existing();
        let next = Request {
            room_subscriptions: subs(&[("!bar:baz", 42)]),
            ..Default::default()
        };
        let (merged, delta) = input.apply(&next);
        assert_eq!(merged.room_subscriptions, subs(&[("!bar:baz", 42), ("!foo:bar", 10)]));
        assert_eq!(delta.subs, vec![owned_room_id!("!bar:baz")]);
        assert!(delta.unsubs.is_empty());
        assert_eq!(merged.lists, input.lists);
        assert!(delta.lists.is_empty(), "untouched lists carry over without a delta");
    }

    #[test]
    fn test_unsubscribing() {
        let input = existing();
        let next = Request {
            lists: lists(vec![(
                "q",
                RequestList {
                    sort: sort(&[SORT_BY_NAME]),
                    ..Default::default()
                },
            )]),
            unsubscribe_rooms: vec![owned_room_id!("!foo:bar")],
            ..Default::default()
        };
        let (merged, delta) = input.apply(&next);
        assert!(merged.room_subscriptions.is_empty());
        assert!(delta.subs.is_empty());
        assert_eq!(delta.unsubs, vec![owned_room_id!("!foo:bar")]);
        assert_eq!(merged.lists, input.lists);
        assert!(delta.lists.is_empty(), "unchanged list emits no delta");
    }

    #[test]
    fn test_unsubscribing_unknown_room_is_noop() {
        let (merged, delta) = existing().apply(&Request {
            unsubscribe_rooms: vec![owned_room_id!("!nope:bar")],
            ..Default::default()
        });
        assert_eq!(merged.room_subscriptions, subs(&[("!foo:bar", 10)]));
        assert!(delta.unsubs.is_empty());
    }

    #[test]
    fn test_subscribe_and_unsubscribe_new_room_cancels() {
        let input = existing();
        let next = Request {
            room_subscriptions: subs(&[("!bar:baz", 42)]),
            unsubscribe_rooms: vec![owned_room_id!("!bar:baz")],
            ..Default::default()
        };
        let (merged, delta) = input.apply(&next);
        assert_eq!(merged.room_subscriptions, subs(&[("!foo:bar", 10)]));
        assert!(delta.subs.is_empty());
        assert!(delta.unsubs.is_empty());
    }

    #[test]
    fn test_subscribe_and_unsubscribe_existing_room_retains() {
        let input = existing();
        let next = Request {
            room_subscriptions: subs(&[("!foo:bar", 30)]),
            unsubscribe_rooms: vec![owned_room_id!("!foo:bar")],
            ..Default::default()
        };
        let (merged, delta) = input.apply(&next);
        assert_eq!(merged.room_subscriptions, subs(&[("!foo:bar", 30)]));
        assert!(delta.subs.is_empty());
        assert!(delta.unsubs.is_empty());
    }

    #[test]
    fn test_deleting_a_list() {
        let input = existing();
        let next = Request {
            lists: lists(vec![(
                "q",
                RequestList {
                    deleted: true,
                    ..Default::default()
                },
            )]),
            ..Default::default()
        };
        let (merged, delta) = input.apply(&next);
        assert!(merged.lists.is_empty());
        assert_eq!(merged.room_subscriptions, subs(&[("!foo:bar", 10)]));
        assert_eq!(delta.lists["q"], list_delta(Some(&input.lists["q"]), None));
        assert!(delta.lists["q"].sort_order_changed());
    }

    #[test]
    fn test_deleting_unknown_list_is_noop() {
        let (merged, delta) = Request::apply_delta(
            None,
            &Request {
                lists: lists(vec![("gone", RequestList { deleted: true, ..Default::default() })]),
                ..Default::default()
            },
        );
        assert!(merged.lists.is_empty());
        assert!(delta.lists.is_empty());
    }

    #[test]
    fn test_adding_a_list() {
        let input = existing();
        let next = Request {
            lists: lists(vec![
                (
                    "q",
                    RequestList {
                        sort: sort(&[SORT_BY_RECENCY]),
                        ..Default::default()
                    },
                ),
                (
                    "s",
                    RequestList {
                        sort: sort(&[SORT_BY_HIGHLIGHT_COUNT]),
                        room_subscription: timeline(9000),
                        ..Default::default()
                    },
                ),
            ]),
            ..Default::default()
        };
        let (merged, delta) = input.apply(&next);
        let want_q = RequestList {
            sort: sort(&[SORT_BY_RECENCY]),
            room_subscription: timeline(5),
            ..Default::default()
        };
        let want_s = RequestList {
            sort: sort(&[SORT_BY_HIGHLIGHT_COUNT]),
            room_subscription: timeline(9000),
            ..Default::default()
        };
        assert_eq!(merged.lists, lists(vec![("q", want_q.clone()), ("s", want_s.clone())]));
        assert_eq!(merged.room_subscriptions, subs(&[("!foo:bar", 10)]));
        assert_eq!(delta.lists["q"], list_delta(Some(&input.lists["q"]), Some(&want_q)));
        assert_eq!(delta.lists["s"], list_delta(None, Some(&want_s)));
    }

    #[test]
    fn test_ranges_are_kept_sorted() {
        let (merged, _) = Request::apply_delta(
            None,
            &Request {
                lists: lists(vec![(
                    "a",
                    RequestList {
                        ranges: serde_json::from_str("[[30, 40], [0, 10]]").unwrap(),
                        ..Default::default()
                    },
                )]),
                ..Default::default()
            },
        );
        assert_eq!(merged.lists["a"].ranges.as_slice(), &[[0, 10], [30, 40]]);
    }

    #[test]
    fn test_merged_maps_are_never_absent() {
        let (merged, delta) = Request::apply_delta(None, &Request::default());
        let json = serde_json::to_value(&merged).unwrap();
        assert_eq!(json, serde_json::json!({"lists": {}, "room_subscriptions": {}}));
        assert_eq!(serde_json::to_value(&delta).unwrap(), serde_json::json!({"lists": {}}));
    }

    #[test]
    fn test_not_requested_lookups() {
        let request = existing();
        assert!(request.list("q").is_ok());
        assert!(request.list("missing").unwrap_err().is_not_requested());
        assert!(request.room_subscription(room_id!("!foo:bar")).is_ok());
        assert!(request
            .room_subscription(room_id!("!other:bar"))
            .unwrap_err()
            .is_not_requested());
    }

    #[test]
    fn test_validate() {
        let mut request = existing();
        assert!(request.validate(50).is_ok());

        request.room_subscriptions = subs(&[("!foo:bar", 500)]);
        assert!(request.validate(50).is_err());

        let mut request = existing();
        request.lists.insert(
            "bad".to_string(),
            RequestList {
                ranges: Ranges::new(vec![[0, 10]]).unwrap(),
                sort: sort(&["by_vibes"]),
                ..Default::default()
            },
        );
        let err = request.validate(50).unwrap_err();
        assert!(err.to_string().contains("list 'bad'"), "{err}");
    }

    #[test]
    fn test_request_wire_format() {
        let request: Request = serde_json::from_str(
            r#"{
                "lists": {"a": {"ranges": [[0, 9]], "sort": ["by_name"], "timeline_limit": 1}},
                "room_subscriptions": {"!foo:bar": {"timeline_limit": 10, "required_state": [["*", "*"]]}},
                "unsubscribe_rooms": ["!old:bar"]
            }"#,
        )
        .unwrap();
        assert_eq!(request.lists["a"].room_subscription.timeline_limit, 1);
        assert_eq!(request.room_subscriptions[room_id!("!foo:bar")].timeline_limit, 10);
        assert_eq!(request.unsubscribe_rooms, vec![owned_room_id!("!old:bar")]);
    }

    #[test]
    fn test_malformed_ranges_never_reach_a_merge() {
        for body in [
            r#"{"lists": {"a": {"ranges": [[5, 2]]}}}"#,
            r#"{"lists": {"a": {"ranges": [[0, 10], [5, 20]]}}}"#,
        ] {
            assert!(serde_json::from_str::<Request>(body).is_err(), "{body}");
        }

        let next: Request = serde_json::from_str(r#"{"lists": {"a": {"ranges": [[20, 30], [0, 10]]}}}"#).unwrap();
        let (merged, _) = Request::apply_delta(None, &next);
        let list = merged.list("a").unwrap();
        assert_eq!(list.ranges.as_slice(), &[[0, 10], [20, 30]]);
        assert!(merged.validate(50).is_ok());
        assert_eq!(list.calculate_move_indexes(0, 25), vec![(0, 10), (20, 25)]);
    }
}
