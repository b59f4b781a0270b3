//! Automation surface seam
//!
//! The controller drives a single stateful surface (a browser session in
//! production, a directory tree offline) through [`AutomationSurface`]. The
//! surface is never driven concurrently; methods take `&self` so calls can be
//! retried from closures, and implementations keep their state behind a lock.

pub mod folder;
pub mod locator;

pub use folder::{FolderSurface, FolderSurfaceFactory};
pub use locator::{locate_first, Located};

use crate::utils::Retryable;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("{operation} timed out after {after_ms} ms")]
    Timeout { operation: String, after_ms: u64 },

    /// Expected element or resource missing
    #[error("not found: {0}")]
    NotFound(String),

    #[error("authentication rejected: {0}")]
    Auth(String),

    /// Driver crashed or is in an unusable state
    #[error("driver failure: {0}")]
    Driver(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Retryable for SurfaceError {
    fn is_retryable(&self) -> bool {
        matches!(self, SurfaceError::Timeout { .. } | SurfaceError::NotFound(_))
    }

    fn timed_out(operation: &str, after: Duration) -> Self {
        SurfaceError::Timeout {
            operation: operation.to_string(),
            after_ms: after.as_millis() as u64,
        }
    }
}

/// Login credentials for the surface
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Item currently presented by the surface
#[derive(Debug, Clone, PartialEq)]
pub struct RawItem {
    /// Surface-local handle (not the item id)
    pub handle: String,
    /// Numeric attributes visible on the item, used as label anchors
    pub attributes: HashMap<String, f64>,
}

/// Image as extracted from an item
#[derive(Debug, Clone, PartialEq)]
pub enum RawImage {
    /// Bytes already in hand
    Bytes {
        data: Vec<u8>,
        source_url: Option<String>,
    },
    /// Must be downloaded
    Url(String),
}

impl RawImage {
    pub fn source_url(&self) -> Option<&str> {
        match self {
            RawImage::Bytes { source_url, .. } => source_url.as_deref(),
            RawImage::Url(url) => Some(url),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Item(RawItem),
    /// Active location has nothing more to offer
    NoMoreItems,
}

#[async_trait]
pub trait AutomationSurface: Send + Sync {
    async fn authenticate(&self, credentials: &Credentials) -> Result<(), SurfaceError>;

    async fn set_active_location(&self, location: &str) -> Result<(), SurfaceError>;

    /// Current item, or the next one if the previous was rejected
    async fn fetch_next_item(&self) -> Result<FetchOutcome, SurfaceError>;

    async fn extract_images(&self, item: &RawItem) -> Result<Vec<RawImage>, SurfaceError>;

    /// Dismiss the current item so the next fetch yields a new one
    async fn reject_current_item(&self) -> Result<(), SurfaceError>;

    /// Release the surface; called exactly once at the end of a run
    async fn shutdown(&self) -> Result<(), SurfaceError>;
}

/// Creates one surface per acquisition run
#[async_trait]
pub trait SurfaceFactory: Send + Sync {
    async fn create(&self) -> Result<Box<dyn AutomationSurface>, SurfaceError>;
}
