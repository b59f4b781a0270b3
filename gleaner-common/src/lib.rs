//! # Gleaner Common Library
//!
//! Shared code for the gleaner crates:
//! - Error type and result alias
//! - Configuration loading and root folder resolution
//! - Acquisition event types and the broadcast EventBus
//! - SQLite initialization and settings storage
//! - Timestamp helpers

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod time;

pub use error::{Error, Result};
