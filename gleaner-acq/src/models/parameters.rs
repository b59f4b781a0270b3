//! Acquisition run parameters
//!
//! Every field has a default so a partial `[acquisition]` TOML table (or none
//! at all) deserializes cleanly.

use serde::{Deserialize, Serialize};

/// How the next location is chosen when the current one is capped or empty
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationStrategy {
    #[default]
    RoundRobin,
    LeastUsed,
    Random,
}

/// Lifetime of the fingerprint table used for duplicate detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupScope {
    /// In memory, forgotten when the run ends
    #[default]
    PerRun,
    /// Stored next to the images and reloaded by every run
    Persistent,
}

/// Acquisition workflow parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionParameters {
    /// Usable images an item needs to be accepted (default: 5)
    #[serde(default = "default_min_images_per_item")]
    pub min_images_per_item: usize,

    /// Accepted items per location before rotating away (default: 20)
    #[serde(default = "default_items_per_location")]
    pub items_per_location: u64,

    #[serde(default)]
    pub rotation: RotationStrategy,

    /// Timeout for each automation surface call (default: 30s)
    #[serde(default = "default_surface_timeout_secs")]
    pub surface_timeout_secs: u64,

    /// Retries for timed-out surface calls and image downloads (default: 3)
    #[serde(default = "default_retries")]
    pub surface_retries: u32,

    /// Retries for failed sink appends (default: 3)
    #[serde(default = "default_retries")]
    pub sink_retries: u32,

    /// Seeds random location choice and label synthesis
    #[serde(default)]
    pub seed: Option<u64>,

    #[serde(default)]
    pub dedup: DedupScope,

    #[serde(default)]
    pub intake: IntakeSettings,
}

/// Image intake thresholds and output settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntakeSettings {
    /// Minimum width and height in pixels (default: 100)
    #[serde(default = "default_min_dimension")]
    pub min_dimension: u32,

    /// Gray levels below this count as near-black (default: 10)
    #[serde(default = "default_blank_low")]
    pub blank_low: u8,

    /// Gray levels above this count as near-white (default: 245)
    #[serde(default = "default_blank_high")]
    pub blank_high: u8,

    /// Near-black/white pixel fraction above which an image is blank (default: 0.95)
    #[serde(default = "default_blank_ratio")]
    pub blank_ratio: f64,

    /// Wider images are downscaled to this width (default: 1200)
    #[serde(default = "default_max_width")]
    pub max_width: u32,

    /// JPEG quality for stored images (default: 85)
    #[serde(default = "default_quality")]
    pub quality: u8,

    /// Thumbnail bounding box (default: 300x300)
    #[serde(default = "default_thumbnail_size")]
    pub thumbnail_width: u32,
    #[serde(default = "default_thumbnail_size")]
    pub thumbnail_height: u32,

    /// JPEG quality for thumbnails (default: 70)
    #[serde(default = "default_thumbnail_quality")]
    pub thumbnail_quality: u8,
}

fn default_min_images_per_item() -> usize {
    5
}

fn default_items_per_location() -> u64 {
    20
}

fn default_surface_timeout_secs() -> u64 {
    30
}

fn default_retries() -> u32 {
    3
}

fn default_min_dimension() -> u32 {
    100
}

fn default_blank_low() -> u8 {
    10
}

fn default_blank_high() -> u8 {
    245
}

fn default_blank_ratio() -> f64 {
    0.95
}

fn default_max_width() -> u32 {
    1200
}

fn default_quality() -> u8 {
    85
}

fn default_thumbnail_size() -> u32 {
    300
}

fn default_thumbnail_quality() -> u8 {
    70
}

impl Default for AcquisitionParameters {
    fn default() -> Self {
        Self {
            min_images_per_item: default_min_images_per_item(),
            items_per_location: default_items_per_location(),
            rotation: RotationStrategy::default(),
            surface_timeout_secs: default_surface_timeout_secs(),
            surface_retries: default_retries(),
            sink_retries: default_retries(),
            seed: None,
            dedup: DedupScope::default(),
            intake: IntakeSettings::default(),
        }
    }
}

impl Default for IntakeSettings {
    fn default() -> Self {
        Self {
            min_dimension: default_min_dimension(),
            blank_low: default_blank_low(),
            blank_high: default_blank_high(),
            blank_ratio: default_blank_ratio(),
            max_width: default_max_width(),
            quality: default_quality(),
            thumbnail_width: default_thumbnail_size(),
            thumbnail_height: default_thumbnail_size(),
            thumbnail_quality: default_thumbnail_quality(),
        }
    }
}

impl AcquisitionParameters {
    /// Reject values that would make a run meaningless
    pub fn validate(&self) -> Result<(), String> {
        if self.min_images_per_item == 0 {
            return Err("min_images_per_item must be at least 1".to_string());
        }
        if self.items_per_location == 0 {
            return Err("items_per_location must be at least 1".to_string());
        }
        if self.surface_timeout_secs == 0 {
            return Err("surface_timeout_secs must be at least 1".to_string());
        }
        self.intake.validate()
    }
}

impl IntakeSettings {
    pub fn validate(&self) -> Result<(), String> {
        if self.blank_low >= self.blank_high {
            return Err("blank_low must be below blank_high".to_string());
        }
        if !(0.0..=1.0).contains(&self.blank_ratio) {
            return Err("blank_ratio must be within 0.0 - 1.0".to_string());
        }
        if self.max_width == 0 || self.thumbnail_width == 0 || self.thumbnail_height == 0 {
            return Err("output dimensions must be positive".to_string());
        }
        for (name, q) in [("quality", self.quality), ("thumbnail_quality", self.thumbnail_quality)] {
            if !(1..=100).contains(&q) {
                return Err(format!("{} must be within 1 - 100", name));
            }
        }
        Ok(())
    }
}
