//! Utility functions for Matrixon
//!
//! Timing helpers used by the sliding sync services and the proxy binary.

use std::time::Instant;
use tracing::{debug, info};

/// Log the start of an operation and return the start time
pub fn log_operation_start(operation: &str) -> Instant {
    debug!("🔧 Starting operation: {}", operation);
    Instant::now()
}

/// Log the end of an operation with duration
pub fn log_operation_end(operation: &str, start: Instant) {
    info!("✅ Completed {} in {:?}", operation, start.elapsed());
}
