// =============================================================================
// Matrixon Sliding Sync Proxy - Clap Module
// =============================================================================
//
// Project: Matrixon - Ultra High Performance Matrix NextServer (Synapse Alternative)
// Author: arkSong (arksong2018@gmail.com) - Founder of Matrixon Innovation Project
// Contributors: Matrixon Development Team
// Version: 0.11.0-alpha
// License: Apache 2.0 / MIT
//
// Description:
//   Command line interface of the sliding sync proxy.
//
// =============================================================================

use std::{path::PathBuf, time::Instant};

use clap::{Parser, Subcommand};
use tracing::{debug, instrument};

/// Returns the current version of the crate with extra info if supplied
///
/// Set the environment variable `MATRIXON_VERSION_EXTRA` at build time to any
/// UTF-8 string to include it in parenthesis after the SemVer version.
pub fn version() -> String {
    let cargo_pkg_version = env!("CARGO_PKG_VERSION");

    match option_env!("MATRIXON_VERSION_EXTRA") {
        Some(x) => format!("{} ({})", cargo_pkg_version, x),
        None => cargo_pkg_version.to_owned(),
    }
}

/// Matrixon Sliding Sync Proxy - Command Line Interface
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[clap(about, version, name = "matrixon-sliding-proxy")]
pub struct Args {
    /// Path to configuration file
    #[clap(short, long, env = "MATRIXON_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log filter override (e.g. `debug` or `warn,matrixon_sliding=trace`)
    #[clap(short, long, global = true)]
    pub log_level: Option<String>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Load and validate the configuration, then exit
    CheckConfig,

    /// Populate the room cache from the snapshot and print a sorted window
    Inspect {
        /// Sort identifiers, most significant first
        #[clap(long, value_delimiter = ',', default_value = "by_recency")]
        sort: Vec<String>,

        /// Window to print, as `start-end` (inclusive)
        #[clap(long, default_value = "0-19", value_parser = parse_range)]
        range: [usize; 2],
    },

    /// Feed recorded event batches through the cache and print list operations
    Replay {
        /// JSON file holding `[{room_id, latest_pos, events}]` batches
        #[clap(long)]
        events: PathBuf,

        /// Sliding sync request the simulated client starts with
        #[clap(long)]
        request: PathBuf,

        /// User the simulated client belongs to
        #[clap(long, default_value = "@proxy:localhost")]
        user: String,
    },
}

/// Parse `start-end` into an inclusive window
pub fn parse_range(s: &str) -> Result<[usize; 2], String> {
    let (start, end) = s
        .split_once('-')
        .ok_or_else(|| format!("expected start-end, got '{s}'"))?;
    let start = start
        .trim()
        .parse::<usize>()
        .map_err(|e| format!("invalid range start '{start}': {e}"))?;
    let end = end
        .trim()
        .parse::<usize>()
        .map_err(|e| format!("invalid range end '{end}': {e}"))?;
    if start > end {
        return Err(format!("range start {start} is after end {end}"));
    }
    Ok([start, end])
}

/// Parse command line arguments into Args structure
#[instrument(level = "debug")]
pub fn parse() -> Args {
    let start = Instant::now();
    let args = Args::parse();
    debug!("✅ Command line arguments parsed in {:?}", start.elapsed());
    args
}
