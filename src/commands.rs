// =============================================================================
// Matrixon Sliding Sync Proxy - Commands Module
// =============================================================================
//
// Project: Matrixon - Ultra High Performance Matrix NextServer (Synapse Alternative)
// Author: arkSong (arksong2018@gmail.com) - Founder of Matrixon Innovation Project
// Contributors: Matrixon Development Team
// Version: 0.11.0-alpha
// License: Apache 2.0 / MIT
//
// Description:
//   Handlers behind the CLI subcommands. Each returns the lines it would
//   print so the binary stays a thin shell around them.
//
// =============================================================================

use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use ruma::OwnedUserId;
use tracing::{info, warn};

use matrixon_sliding::{populate_global_cache, GlobalCache, Request, SortableRoom};

use crate::{
    config::Config,
    session::{Session, SessionUpdate},
    snapshot::{load_batches, SnapshotStorage},
};

/// Summary of a validated configuration
pub fn check_config(config: &Config) -> Vec<String> {
    let mut lines = vec![
        format!("server_name: {}", config.server_name),
        format!("log: {}", config.log),
        format!("listener_queue_capacity: {}", config.listener_queue_capacity),
        format!(
            "timeline_limit: default {} / max {}",
            config.default_timeline_limit, config.max_timeline_limit
        ),
    ];
    match &config.snapshot_path {
        Some(path) => lines.push(format!("snapshot_path: {}", path.display())),
        None => lines.push("snapshot_path: (unset)".to_owned()),
    }
    lines
}

/// Populate a cache from the configured snapshot
pub async fn load_cache(config: &Config) -> anyhow::Result<GlobalCache> {
    let path = config.snapshot_path()?;
    let storage = SnapshotStorage::open(path)
        .await
        .with_context(|| format!("opening snapshot {}", path.display()))?;
    let cache = GlobalCache::new();
    populate_global_cache(&storage, &cache)
        .await
        .context("populating global cache")?;
    Ok(cache)
}

/// One line per room: position, ID, name, time of the latest event
pub fn format_room(index: usize, room: &SortableRoom) -> String {
    let when = i64::try_from(room.last_message_timestamp)
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_owned());
    let name = if room.name.is_empty() { "(unnamed)" } else { room.name.as_str() };
    format!("{index:>4}  {}  {name}  {when}", room.room_id)
}

fn window_len([start, end]: [usize; 2]) -> usize {
    end.saturating_sub(start).saturating_add(1)
}

/// Sort the cached rooms and render the requested window
pub async fn inspect(config: &Config, sort: &[String], range: [usize; 2]) -> anyhow::Result<Vec<String>> {
    let cache = load_cache(config).await?;
    let mut rooms = cache.snapshot_rooms();
    rooms.sort(sort)?;
    info!("🏠 {} rooms in cache, showing {}-{}", rooms.len(), range[0], range[1]);

    let ids = rooms.room_ids();
    let mut lines = Vec::new();
    for (index, room_id) in ids.iter().enumerate().skip(range[0]).take(window_len(range)) {
        if let Some(room) = cache.load_room(room_id) {
            lines.push(format_room(index, &room));
        }
    }
    Ok(lines)
}

fn describe(update: &SessionUpdate) -> Vec<String> {
    let mut lines = Vec::new();
    for room_id in &update.subscribed {
        lines.push(format!("SUBSCRIBE {room_id}"));
    }
    for room_id in &update.unsubscribed {
        lines.push(format!("UNSUBSCRIBE {room_id}"));
    }
    for (name, ops) in &update.lists {
        for op in ops {
            let op = serde_json::to_string(op).unwrap_or_else(|e| format!("<unprintable: {e}>"));
            lines.push(format!("{name}: {op}"));
        }
    }
    lines
}

/// Run recorded poller batches through a live cache and one simulated client.
///
/// The client is notified through a channel listener, as a session loop
/// would be, and every resulting list operation is rendered.
pub async fn replay(
    config: &Config,
    events_path: &Path,
    request_path: &Path,
    user: &str,
) -> anyhow::Result<Vec<String>> {
    let user_id = OwnedUserId::try_from(user).with_context(|| format!("invalid user ID {user}"))?;
    let raw_request = tokio::fs::read_to_string(request_path)
        .await
        .with_context(|| format!("reading request {}", request_path.display()))?;
    let request: Request = serde_json::from_str(&raw_request).context("parsing request")?;
    let batches = load_batches(events_path)
        .await
        .with_context(|| format!("reading event batches {}", events_path.display()))?;

    let cache = load_cache(config).await?;
    let (listener_id, mut receiver) = cache.subscribe_channel(config.listener_queue_capacity);

    let mut session = Session::new(user_id, config);
    let mut lines = describe(&session.handle_request(&cache, &request)?);

    for batch in &batches {
        cache.on_new_events(&batch.room_id, &batch.events, batch.latest_pos)?;
        while let Ok(event) = receiver.try_recv() {
            let update = session.on_event(&cache, &event)?;
            lines.extend(describe(&update));
            if let (Some(view), Some(state_key)) = (session.room_view(&event.room_id), &event.state_key) {
                if view.required_state.include(&event.event_type, state_key) {
                    lines.push(format!(
                        "{}: state {} ({}) delivered",
                        event.room_id, event.event_type, state_key
                    ));
                }
            }
        }
    }

    if !cache.unsubscribe(listener_id) {
        warn!("⚠️ Replay listener {} was already gone", listener_id);
    }
    info!("✅ Replayed {} batches", batches.len());
    Ok(lines)
}
