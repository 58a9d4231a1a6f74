//! Required state filtering
//!
//! A [`RoomSubscription`] carries the raw `(event_type, state_key)` patterns a
//! client asked for. [`RoomSubscription::required_state_map`] compiles them
//! into an immutable [`RequiredStateMap`] which answers "should this state
//! event be sent?" and, where possible, describes a narrow storage query.
//!
//! Pattern tokens:
//! - `*` matches any event type or any state key
//! - `$ME` as a state key is replaced by the requesting user's ID
//! - `$LAZY` is reserved for lazy-loaded members and never matches

use std::collections::{BTreeMap, HashSet};

use ruma::UserId;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Matches any event type or any state key
pub const WILDCARD: &str = "*";

/// Replaced by the requesting user's ID when used as a state key
pub const STATE_KEY_ME: &str = "$ME";

/// Lazy-loading marker; accepted on the wire but never matched
pub const STATE_KEY_LAZY: &str = "$LAZY";

fn is_zero(n: &u64) -> bool {
    *n == 0
}

/// Per-room subscription parameters supplied by a client
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSubscription {
    /// Maximum number of timeline events to return per room
    #[serde(default, skip_serializing_if = "is_zero")]
    pub timeline_limit: u64,

    /// Ordered `(event_type, state_key)` patterns
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_state: Vec<[String; 2]>,
}

impl RoomSubscription {
    /// True when neither field was supplied
    pub fn is_empty(&self) -> bool {
        self.timeline_limit == 0 && self.required_state.is_empty()
    }

    /// Union of two subscriptions.
    ///
    /// Patterns are concatenated without deduplication, the larger timeline
    /// limit wins. Overlap between the two pattern lists is resolved when the
    /// result is compiled with [`RoomSubscription::required_state_map`].
    pub fn combine(&self, other: &RoomSubscription) -> RoomSubscription {
        let mut required_state = Vec::with_capacity(self.required_state.len() + other.required_state.len());
        required_state.extend(self.required_state.iter().cloned());
        required_state.extend(other.required_state.iter().cloned());
        RoomSubscription {
            timeline_limit: self.timeline_limit.max(other.timeline_limit),
            required_state,
        }
    }

    /// Positional comparison of the raw pattern lists.
    ///
    /// Two lists holding the same patterns in a different order are reported
    /// as changed even though they compile to the same map.
    pub fn required_state_changed(&self, other: &RoomSubscription) -> bool {
        self.required_state != other.required_state
    }

    /// Compile the patterns into a [`RequiredStateMap`] for `user_id`
    #[instrument(level = "trace", skip(self), fields(patterns = self.required_state.len()))]
    pub fn required_state_map(&self, user_id: &UserId) -> RequiredStateMap {
        let mut map = RequiredStateMap::default();
        for [event_type, state_key] in &self.required_state {
            if state_key == STATE_KEY_LAZY {
                continue;
            }
            let type_wildcard = event_type == WILDCARD;
            let key_wildcard = state_key == WILDCARD;
            match (type_wildcard, key_wildcard) {
                (true, true) => map.all_state = true,
                (true, false) => {
                    map.any_type_keys.insert(resolve_state_key(state_key, user_id));
                }
                (false, true) => {
                    map.event_types.insert(event_type.clone(), StateKeys::All);
                }
                (false, false) => {
                    let key = resolve_state_key(state_key, user_id);
                    map.event_types
                        .entry(event_type.clone())
                        .or_insert_with(|| StateKeys::Keys(Vec::new()))
                        .push(key);
                }
            }
        }
        debug!(
            all_state = map.all_state,
            event_types = map.event_types.len(),
            any_type_keys = map.any_type_keys.len(),
            "compiled required state map"
        );
        map
    }
}

fn resolve_state_key(state_key: &str, user_id: &UserId) -> String {
    if state_key == STATE_KEY_ME {
        user_id.to_string()
    } else {
        state_key.to_owned()
    }
}

/// State keys required for a single event type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateKeys {
    /// Every state key of this type
    All,
    /// Only these state keys, in first-seen order
    Keys(Vec<String>),
}

impl StateKeys {
    /// Whether `state_key` is covered
    pub fn contains(&self, state_key: &str) -> bool {
        match self {
            StateKeys::All => true,
            StateKeys::Keys(keys) => keys.iter().any(|k| k == state_key),
        }
    }

    // `All` absorbs explicit keys.
    fn push(&mut self, state_key: String) {
        if let StateKeys::Keys(keys) = self {
            if !keys.contains(&state_key) {
                keys.push(state_key);
            }
        }
    }
}

/// Compiled view of one or more [`RoomSubscription`]s for a single user
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequiredStateMap {
    all_state: bool,
    event_types: BTreeMap<String, StateKeys>,
    any_type_keys: HashSet<String>,
}

impl RequiredStateMap {
    /// Whether `(*, *)` was requested
    pub fn is_all_state(&self) -> bool {
        self.all_state
    }

    /// Whether the state event `(event_type, state_key)` should be returned
    pub fn include(&self, event_type: &str, state_key: &str) -> bool {
        if self.all_state {
            return true;
        }
        if self.any_type_keys.contains(state_key) {
            return true;
        }
        self.event_types
            .get(event_type)
            .map_or(false, |keys| keys.contains(state_key))
    }

    /// Narrow per-type query for the storage layer.
    ///
    /// Empty when `(*, *)` or any `(*, key)` pattern is present: those need
    /// every state event in the room to be evaluated with [`include`].
    ///
    /// [`include`]: RequiredStateMap::include
    pub fn query_state_map(&self) -> BTreeMap<String, StateKeys> {
        if self.all_state || !self.any_type_keys.is_empty() {
            return BTreeMap::new();
        }
        self.event_types.clone()
    }
}
