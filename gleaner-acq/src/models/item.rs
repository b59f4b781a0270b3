//! Item records and the image references they own

use super::label::LabelRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Item lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Pending,
    Accepted,
    Skipped,
    Errored,
}

/// One stored image belonging to an item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageReference {
    /// Generated filename (`<sequence>-<location-slug>-<item-id>.jpg`)
    pub filename: String,
    /// Full path of the stored image
    pub path: PathBuf,
    /// Thumbnail path (same filename under `thumbnails/`)
    pub thumbnail_path: Option<PathBuf>,
    /// Where the bytes came from, when known
    pub source_url: Option<String>,
    /// Stored pixel dimensions (after any downscale)
    pub width: u32,
    pub height: u32,
}

/// One acquired subject
///
/// Mutated by the session controller while `Pending`; frozen once a terminal
/// status is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemRecord {
    pub item_id: String,
    pub location: String,
    pub acquired_at: DateTime<Utc>,
    pub images: Vec<ImageReference>,
    pub labels: Option<LabelRecord>,
    pub status: ItemStatus,
}

impl ItemRecord {
    pub fn new(item_id: String, location: String) -> Self {
        Self {
            item_id,
            location,
            acquired_at: Utc::now(),
            images: Vec::new(),
            labels: None,
            status: ItemStatus::Pending,
        }
    }

    /// Add a stored image; ignored once the item is finalized
    pub fn push_image(&mut self, image: ImageReference) {
        if self.status == ItemStatus::Pending {
            self.images.push(image);
        }
    }

    /// Attach labels; ignored once the item is finalized
    pub fn set_labels(&mut self, labels: LabelRecord) {
        if self.status == ItemStatus::Pending {
            self.labels = Some(labels);
        }
    }

    /// Move to a terminal status
    ///
    /// Returns false (and changes nothing) if the item was already finalized.
    pub fn finalize(&mut self, status: ItemStatus) -> bool {
        if self.status != ItemStatus::Pending || status == ItemStatus::Pending {
            return false;
        }
        self.status = status;
        true
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Stored filenames in acquisition order
    pub fn filenames(&self) -> Vec<&str> {
        self.images.iter().map(|i| i.filename.as_str()).collect()
    }
}
