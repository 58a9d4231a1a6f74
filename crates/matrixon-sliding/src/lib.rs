// =============================================================================
// Matrixon Sliding Sync Library
// =============================================================================
//
// Project: Matrixon - Ultra High Performance Matrix NextServer (Synapse Alternative)
// Author: arkSong (arksong2018@gmail.com) - Founder of Matrixon Innovation Project
// Contributors: Matrixon Development Team
// Version: 0.11.0-alpha
// License: Apache 2.0 / MIT
//
// =============================================================================

//! Matrixon Sliding Sync core
//!
//! Building blocks of a sliding sync proxy, independent of any transport:
//!
//! - [`required_state`]: which state events a room subscription asks for
//! - [`request`]: merging successive request bodies and reporting what changed
//! - [`list`]: sliding windows over sorted room lists and the moves within them
//! - [`ops`]: list operations sent to clients
//! - [`sort`]: cached room summaries and their ordering
//! - [`global_cache`]: the shared room cache fed by pollers
//! - [`storage`]: the storage queries used to populate the cache

pub mod event;
pub mod global_cache;
pub mod list;
pub mod ops;
pub mod request;
pub mod required_state;
pub mod sort;
pub mod storage;

pub use event::EventData;
pub use global_cache::{populate_global_cache, CachePhase, ChannelListener, GlobalCache, GlobalCacheListener};
pub use list::{Ranges, RequestFilters, RequestList};
pub use ops::ListOp;
pub use request::{Request, RequestDelta, RequestListDelta};
pub use required_state::{RequiredStateMap, RoomSubscription, StateKeys};
pub use sort::{SortableRoom, SortableRooms};
pub use storage::{StoredEvent, SyncStorage};

pub use matrixon_common::{MatrixonError, Result};
