//! Matrixon Common Library
//!
//! Author: arkSong <arksong2018@gmail.com>
//! Version: 0.11.0-alpha
//!
//! Shared error type and operation-timing helpers for the sliding sync crates.

pub mod error;
pub mod utils;

pub use error::{MatrixonError, Result};
