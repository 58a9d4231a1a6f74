// =============================================================================
// Matrixon Sliding Sync Proxy - Configuration Module
// =============================================================================
//
// Project: Matrixon - Ultra High Performance Matrix NextServer (Synapse Alternative)
// Author: arkSong (arksong2018@gmail.com) - Founder of Matrixon Innovation Project
// Contributors: Matrixon Development Team
// Version: 0.11.0-alpha
// License: Apache 2.0 / MIT
//
// Description:
//   Proxy configuration loaded from a TOML file under a `[global]` table and
//   overridden by `MATRIXON_*` environment variables.
//
// =============================================================================

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use ruma::OwnedServerName;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use matrixon_common::{MatrixonError, Result};

/// Configuration structure for the sliding sync proxy
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// Server the proxied users belong to
    pub server_name: OwnedServerName,

    /// `EnvFilter` directives for logging
    #[serde(default = "default_log")]
    pub log: String,

    /// Queue bound of each channel listener on the global cache
    #[serde(default = "default_listener_queue_capacity")]
    pub listener_queue_capacity: usize,

    /// Timeline limit used when a subscription does not name one
    #[serde(default = "default_timeline_limit")]
    pub default_timeline_limit: u64,

    /// Largest timeline limit a client may ask for
    #[serde(default = "default_max_timeline_limit")]
    pub max_timeline_limit: u64,

    /// JSON snapshot of room data read by the bundled storage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_path: Option<PathBuf>,
}

fn default_log() -> String {
    "warn,matrixon_sliding=info,matrixon_sliding_proxy=info".to_owned()
}

fn default_listener_queue_capacity() -> usize {
    256
}

fn default_timeline_limit() -> u64 {
    20
}

fn default_max_timeline_limit() -> u64 {
    50
}

impl Config {
    /// Layered sources: the TOML file (if any), then `MATRIXON_*` variables
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::new();
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path).nested());
        }
        figment.merge(Env::prefixed("MATRIXON_").global())
    }

    /// Load and validate
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            if !path.exists() {
                return Err(MatrixonError::Config(format!(
                    "configuration file {} does not exist",
                    path.display()
                )));
            }
        }
        let config: Config = Self::figment(path).extract()?;
        config.validate()?;
        debug!("🔧 Loaded configuration for {}", config.server_name);
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.listener_queue_capacity == 0 {
            return Err(MatrixonError::Config(
                "listener_queue_capacity must be at least 1".to_owned(),
            ));
        }
        if self.max_timeline_limit == 0 {
            return Err(MatrixonError::Config(
                "max_timeline_limit must be at least 1".to_owned(),
            ));
        }
        if self.default_timeline_limit > self.max_timeline_limit {
            return Err(MatrixonError::Config(format!(
                "default_timeline_limit {} exceeds max_timeline_limit {}",
                self.default_timeline_limit, self.max_timeline_limit
            )));
        }
        if self.listener_queue_capacity < 16 {
            warn!(
                "⚠️ listener_queue_capacity {} is small, listeners will drop events under load",
                self.listener_queue_capacity
            );
        }
        Ok(())
    }

    /// `timeline_limit`, or the configured default when it is unset
    pub fn effective_timeline_limit(&self, timeline_limit: u64) -> u64 {
        if timeline_limit == 0 {
            self.default_timeline_limit
        } else {
            timeline_limit
        }
    }

    /// Snapshot file the bundled storage reads from
    pub fn snapshot_path(&self) -> Result<&Path> {
        self.snapshot_path
            .as_deref()
            .ok_or_else(|| MatrixonError::Config("snapshot_path is not set".to_owned()))
    }
}
