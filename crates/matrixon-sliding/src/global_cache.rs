//! Global room cache
//!
//! One [`GlobalCache`] is shared by every session. Pollers feed it new events
//! through [`GlobalCache::on_new_events`]; request handlers read
//! [`SortableRoom`] copies out of it to sort and filter lists. Sessions that
//! want to hear about new events register a [`GlobalCacheListener`].
//!
//! The room map and the listener registry sit behind separate locks, so
//! subscribing or unsubscribing never waits on room reads or writes.
//!
//! The cache moves through three phases. It starts `Uninitialized`,
//! [`populate_global_cache`] moves it through `Populating` to `Live`, and only
//! a live cache accepts events from pollers. A failed population leaves the
//! cache empty and `Uninitialized` again.

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use parking_lot::{Mutex, RwLock};
use ruma::{OwnedRoomId, RoomId};
use serde_json::Value;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, info, instrument, trace, warn};

use matrixon_common::{
    utils::{log_operation_end, log_operation_start},
    MatrixonError, Result,
};

use crate::{
    event::{timestamp_of, EventData, CANONICAL_ALIAS_EVENT, ROOM_NAME_EVENT},
    sort::{SortableRoom, SortableRooms},
    storage::SyncStorage,
};

/// Lifecycle of the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePhase {
    Uninitialized,
    Populating,
    Live,
}

impl fmt::Display for CachePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CachePhase::Uninitialized => write!(f, "uninitialized"),
            CachePhase::Populating => write!(f, "populating"),
            CachePhase::Live => write!(f, "live"),
        }
    }
}

/// Receives every event the cache ingests.
///
/// Called synchronously from [`GlobalCache::on_new_events`] after the room
/// lock is released. Implementations must not block; slow consumers should
/// hand off to a queue, as [`ChannelListener`] does.
pub trait GlobalCacheListener: Send + Sync {
    fn on_new_event(&self, event: &EventData);

    /// A closed listener is dropped from the registry after the current delivery
    fn is_closed(&self) -> bool {
        false
    }
}

/// Listener that forwards events into a bounded channel
#[derive(Debug)]
pub struct ChannelListener {
    sender: mpsc::Sender<EventData>,
    dropped: AtomicU64,
}

impl ChannelListener {
    /// New listener with a queue of `capacity` events, plus its receiving end
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<EventData>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let listener = Self {
            sender,
            dropped: AtomicU64::new(0),
        };
        (listener, receiver)
    }

    /// Events discarded because the queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl GlobalCacheListener for ChannelListener {
    fn on_new_event(&self, event: &EventData) {
        match self.sender.try_send(event.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    room_id = %event.room_id,
                    dropped,
                    "⚠️ Listener queue full, dropping event"
                );
            }
            Err(TrySendError::Closed(_)) => {
                trace!("listener receiver gone");
            }
        }
    }

    fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Shared per-room summaries plus the listeners interested in new events
pub struct GlobalCache {
    rooms: RwLock<HashMap<OwnedRoomId, SortableRoom>>,
    phase: Mutex<CachePhase>,
    listeners: Mutex<BTreeMap<u64, Arc<dyn GlobalCacheListener>>>,
    next_listener_id: AtomicU64,
}

impl fmt::Debug for GlobalCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobalCache")
            .field("phase", &self.phase())
            .field("rooms", &self.room_count())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl Default for GlobalCache {
    fn default() -> Self {
        Self::new()
    }
}

impl GlobalCache {
    pub fn new() -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            phase: Mutex::new(CachePhase::Uninitialized),
            listeners: Mutex::new(BTreeMap::new()),
            next_listener_id: AtomicU64::new(0),
        }
    }

    pub fn phase(&self) -> CachePhase {
        *self.phase.lock()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.read().len()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Copy of the cached summary for `room_id`
    pub fn load_room(&self, room_id: &RoomId) -> Option<SortableRoom> {
        self.rooms.read().get(room_id).cloned()
    }

    /// Replace the summary for `room.room_id`
    pub fn assign_room(&self, room: SortableRoom) {
        self.rooms.write().insert(room.room_id.clone(), room);
    }

    /// Copies of every cached summary, ready to sort
    pub fn snapshot_rooms(&self) -> SortableRooms {
        SortableRooms::new(self.rooms.read().values().cloned().collect())
    }

    /// Register `listener` and return its handle. Handles are never reused.
    pub fn subscribe(&self, listener: Arc<dyn GlobalCacheListener>) -> u64 {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().insert(id, listener);
        debug!("👂 Registered cache listener {}", id);
        id
    }

    /// Register a [`ChannelListener`] of `capacity` and return its handle and receiver
    pub fn subscribe_channel(&self, capacity: usize) -> (u64, mpsc::Receiver<EventData>) {
        let (listener, receiver) = ChannelListener::new(capacity);
        let id = self.subscribe(Arc::new(listener));
        (id, receiver)
    }

    /// Remove the listener registered under `id`. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: u64) -> bool {
        let removed = self.listeners.lock().remove(&id).is_some();
        if removed {
            debug!("🔇 Removed cache listener {}", id);
        }
        removed
    }

    /// Apply a poller's batch of events for one room, in order.
    ///
    /// Each event updates the room summary under the write lock and is then
    /// handed to every listener, in registration order, with no lock held.
    /// Events must already be in stream order; nothing is reordered or
    /// deduplicated here.
    #[instrument(level = "debug", skip(self, events), fields(events = events.len()))]
    pub fn on_new_events(&self, room_id: &RoomId, events: &[Value], latest_pos: i64) -> Result<()> {
        let phase = self.phase();
        if phase != CachePhase::Live {
            return Err(MatrixonError::InvalidState(format!(
                "cannot ingest events while cache is {phase}"
            )));
        }
        for event in events {
            let data = EventData::parse(room_id.to_owned(), event, latest_pos);
            {
                let mut rooms = self.rooms.write();
                let room = rooms
                    .entry(room_id.to_owned())
                    .or_insert_with(|| SortableRoom::new(room_id.to_owned()));
                apply_room_state(room, &data);
                room.last_message_timestamp = data.timestamp;
                room.last_event_json = data.event.clone();
            }
            self.notify(&data);
        }
        Ok(())
    }

    fn notify(&self, event: &EventData) {
        let listeners: Vec<(u64, Arc<dyn GlobalCacheListener>)> = self
            .listeners
            .lock()
            .iter()
            .map(|(id, listener)| (*id, Arc::clone(listener)))
            .collect();

        let mut closed = Vec::new();
        for (id, listener) in listeners {
            listener.on_new_event(event);
            if listener.is_closed() {
                closed.push(id);
            }
        }

        if !closed.is_empty() {
            let mut registry = self.listeners.lock();
            for id in closed {
                registry.remove(&id);
                debug!("🧹 Pruned closed cache listener {}", id);
            }
        }
    }

    fn begin_population(&self) -> Result<()> {
        let mut phase = self.phase.lock();
        if *phase != CachePhase::Uninitialized {
            return Err(MatrixonError::InvalidState(format!(
                "cache population requires an uninitialized cache, found {}",
                *phase
            )));
        }
        *phase = CachePhase::Populating;
        Ok(())
    }

    fn finish_population(&self) {
        *self.phase.lock() = CachePhase::Live;
    }

    fn abort_population(&self) {
        self.rooms.write().clear();
        *self.phase.lock() = CachePhase::Uninitialized;
    }
}

/// Name rules shared by bulk population and live ingestion: an explicit room
/// name always wins, the canonical alias only fills an empty name.
fn apply_room_state(room: &mut SortableRoom, event: &EventData) {
    if event.is_room_state(ROOM_NAME_EVENT) {
        room.name = event.content_str("name");
    } else if event.is_room_state(CANONICAL_ALIAS_EVENT) && room.name.is_empty() {
        room.name = event.content_str("alias");
    }
}

/// Load every room's latest event and name state from `storage` into `cache`.
///
/// Must finish before any poller calls [`GlobalCache::on_new_events`],
/// otherwise an event can be applied twice or lost against the bulk scan.
/// On failure the cache is emptied and returned to `Uninitialized`.
#[instrument(skip_all)]
pub async fn populate_global_cache(storage: &dyn SyncStorage, cache: &GlobalCache) -> Result<()> {
    cache.begin_population()?;
    let start = log_operation_start("populate_global_cache");
    match load_rooms(storage, cache).await {
        Ok(()) => {
            cache.finish_population();
            info!("🏠 Global cache live with {} rooms", cache.room_count());
            log_operation_end("populate_global_cache", start);
            Ok(())
        }
        Err(e) => {
            error!("❌ Global cache population failed: {}", e);
            cache.abort_population();
            Err(e)
        }
    }
}

async fn load_rooms(storage: &dyn SyncStorage, cache: &GlobalCache) -> Result<()> {
    let latest_events = storage.latest_event_in_all_rooms().await?;
    debug!("📥 Loaded latest events for {} rooms", latest_events.len());
    for ev in latest_events {
        cache.assign_room(SortableRoom {
            last_message_timestamp: timestamp_of(&ev.json),
            last_event_json: ev.json,
            ..SortableRoom::new(ev.room_id)
        });
    }

    let state_types = [ROOM_NAME_EVENT.to_owned(), CANONICAL_ALIAS_EVENT.to_owned()];
    let state_by_room = storage.current_state_events_in_all_rooms(&state_types).await?;
    for (room_id, state_events) in state_by_room {
        let mut room = cache.load_room(&room_id).ok_or_else(|| {
            MatrixonError::Invariant(format!(
                "room {room_id} has state events but no latest event"
            ))
        })?;
        for ev in &state_events {
            apply_room_state(&mut room, &EventData::from(ev));
        }
        debug!(
            room_id = %room.room_id,
            name = %room.name,
            last_message_timestamp = room.last_message_timestamp,
            "🏠 Loaded room"
        );
        cache.assign_room(room);
    }
    Ok(())
}
