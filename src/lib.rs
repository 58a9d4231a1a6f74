// =============================================================================
// Matrixon Sliding Sync Proxy - Library Crate
// =============================================================================
//
// Project: Matrixon - Ultra High Performance Matrix NextServer (Synapse Alternative)
// Author: arkSong (arksong2018@gmail.com) - Founder of Matrixon Innovation Project
// Version: 0.11.0-alpha
// License: Apache 2.0 / MIT
//
// Description:
//   Proxy-side plumbing around the sliding sync core: configuration, CLI,
//   snapshot-backed storage, per-client sessions and the command handlers
//   used by the binary.
//
// =============================================================================

pub mod clap;
pub mod commands;
pub mod config;
pub mod session;
pub mod snapshot;

// Re-export common types
pub use ruma;
pub use tokio;
pub use tracing;

// Re-export workspace crates
pub use matrixon_common as common;
pub use matrixon_sliding as sliding;

pub use config::Config;
pub use matrixon_common::{MatrixonError, Result};
