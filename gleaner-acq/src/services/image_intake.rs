//! Image intake: validate, deduplicate, normalize and store incoming images
//!
//! Every call to [`ImageIntake::ingest`] ends in an [`IntakeOutcome`]; nothing
//! propagates as an error. Stored files are written to `<name>.part` first and
//! renamed into place, and leftover `.part` files are swept when an intake
//! opens its directory.

use super::fingerprint::Fingerprint;
use super::naming::{parse_item_id, parse_sequence, IMAGE_EXTENSION};
use crate::error::AcqResult;
use crate::models::{DedupScope, ImageReference, IntakeSettings};
use gleaner_common::config::THUMBNAIL_DIR;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Rgb, RgbImage};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Fingerprint table file used with [`DedupScope::Persistent`]
pub const FINGERPRINT_FILE: &str = "fingerprints.json";

const PARTIAL_SUFFIX: &str = ".part";

/// Longest side of the grayscale sample used for blank detection
const BLANK_SAMPLE_SIZE: u32 = 100;

/// Why an image was rejected
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IntakeError {
    #[error("cannot decode image: {0}")]
    Decode(String),

    #[error("unsupported color mode: {0}")]
    UnsupportedColor(String),

    #[error("image too small: {width}x{height} (minimum {min})")]
    TooSmall { width: u32, height: u32, min: u32 },

    #[error("image is blank ({ratio:.2} of pixels near black or white)")]
    Blank { ratio: f64 },

    #[error("storage error: {0}")]
    Storage(String),
}

/// Result of ingesting one image
#[derive(Debug, Clone, PartialEq)]
pub enum IntakeOutcome {
    /// Stored under the requested filename
    Stored(ImageReference),
    /// Same fingerprint already stored; nothing written
    Duplicate {
        fingerprint: Fingerprint,
        existing: String,
    },
    Invalid(IntakeError),
}

/// Point-in-time counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IntakeStats {
    pub total_images: usize,
    pub total_thumbnails: usize,
    pub unique_fingerprints: usize,
}

pub struct ImageIntake {
    image_dir: PathBuf,
    thumbnail_dir: PathBuf,
    settings: IntakeSettings,
    dedup: DedupScope,
    seen: HashMap<Fingerprint, String>,
    next_sequence: u64,
}

impl ImageIntake {
    /// Open `image_dir` (created if missing) for intake
    ///
    /// Sweeps leftover partial files, loads the fingerprint table for
    /// persistent dedup and continues the filename sequence after the highest
    /// one on disk.
    pub fn open(
        image_dir: impl Into<PathBuf>,
        settings: IntakeSettings,
        dedup: DedupScope,
    ) -> AcqResult<Self> {
        let image_dir = image_dir.into();
        let thumbnail_dir = image_dir.join(THUMBNAIL_DIR);
        fs::create_dir_all(&thumbnail_dir)?;

        let swept = sweep_partial_files(&image_dir);
        if swept > 0 {
            info!(dir = %image_dir.display(), swept, "Removed partial image files");
        }

        let seen = match dedup {
            DedupScope::PerRun => HashMap::new(),
            DedupScope::Persistent => load_fingerprints(&image_dir.join(FINGERPRINT_FILE)),
        };

        let next_sequence = stored_filenames(&image_dir)
            .filter_map(|name| parse_sequence(&name))
            .max()
            .map_or(1, |max| max + 1);

        debug!(
            dir = %image_dir.display(),
            fingerprints = seen.len(),
            next_sequence,
            "Image intake opened"
        );

        Ok(Self {
            image_dir,
            thumbnail_dir,
            settings,
            dedup,
            seen,
            next_sequence,
        })
    }

    pub fn image_dir(&self) -> &Path {
        &self.image_dir
    }

    pub fn thumbnail_dir(&self) -> &Path {
        &self.thumbnail_dir
    }

    /// Reserve the next filename sequence number
    pub fn next_sequence(&mut self) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        sequence
    }

    /// Highest item id found in stored filenames
    pub fn max_item_id(&self) -> Option<u64> {
        stored_filenames(&self.image_dir)
            .filter_map(|name| parse_item_id(&name))
            .max()
    }

    pub fn unique_fingerprints(&self) -> usize {
        self.seen.len()
    }

    /// Validate, deduplicate, normalize and store one image
    pub fn ingest(&mut self, raw: &[u8], target_filename: &str) -> IntakeOutcome {
        if !is_plain_filename(target_filename) {
            return IntakeOutcome::Invalid(IntakeError::Storage(format!(
                "invalid target filename: {:?}",
                target_filename
            )));
        }

        let decoded = match decode(raw) {
            Ok(img) => img,
            Err(e) => return IntakeOutcome::Invalid(e),
        };

        let (width, height) = (decoded.width(), decoded.height());
        let min = self.settings.min_dimension;
        if width < min || height < min {
            return IntakeOutcome::Invalid(IntakeError::TooSmall { width, height, min });
        }

        let gray = decoded.to_luma8();
        let ratio = blank_ratio(&gray, self.settings.blank_low, self.settings.blank_high);
        if ratio > self.settings.blank_ratio {
            return IntakeOutcome::Invalid(IntakeError::Blank { ratio });
        }

        let fingerprint = Fingerprint::of(&gray);
        if let Some(existing) = self.seen.get(&fingerprint) {
            return IntakeOutcome::Duplicate {
                fingerprint,
                existing: existing.clone(),
            };
        }

        let mut rgb = flatten_onto_white(&decoded);
        if rgb.width() > self.settings.max_width {
            let new_width = self.settings.max_width;
            let new_height = scaled_height(rgb.width(), rgb.height(), new_width);
            rgb = imageops::resize(&rgb, new_width, new_height, FilterType::Lanczos3);
        }

        let path = self.image_dir.join(target_filename);
        let thumbnail_path = self.thumbnail_dir.join(target_filename);

        if let Err(e) = write_jpeg(&rgb, &path, self.settings.quality) {
            return IntakeOutcome::Invalid(e);
        }

        let thumbnail = fit_within(
            &rgb,
            self.settings.thumbnail_width,
            self.settings.thumbnail_height,
        );
        if let Err(e) = write_jpeg(&thumbnail, &thumbnail_path, self.settings.thumbnail_quality) {
            let _ = fs::remove_file(&path);
            return IntakeOutcome::Invalid(e);
        }

        self.seen.insert(fingerprint, target_filename.to_string());
        self.persist_fingerprints();

        debug!(
            filename = target_filename,
            fingerprint = %fingerprint,
            width = rgb.width(),
            height = rgb.height(),
            "Image stored"
        );

        IntakeOutcome::Stored(ImageReference {
            filename: target_filename.to_string(),
            path,
            thumbnail_path: Some(thumbnail_path),
            source_url: None,
            width: rgb.width(),
            height: rgb.height(),
        })
    }

    /// Remove stored files and forget fingerprints of images that will not be persisted
    pub fn discard(&mut self, images: &[ImageReference]) {
        if images.is_empty() {
            return;
        }

        for image in images {
            remove_if_present(&image.path);
            if let Some(thumbnail) = &image.thumbnail_path {
                remove_if_present(thumbnail);
            }
            self.seen.retain(|_, filename| filename != &image.filename);
        }

        self.persist_fingerprints();
        debug!(count = images.len(), "Discarded stored images");
    }

    /// Scan the image directories (not cached)
    pub fn stats(&self) -> IntakeStats {
        let (total_images, total_thumbnails) = disk_counts(&self.image_dir);
        IntakeStats {
            total_images,
            total_thumbnails,
            unique_fingerprints: self.seen.len(),
        }
    }

    fn persist_fingerprints(&self) {
        if self.dedup != DedupScope::Persistent {
            return;
        }
        let path = self.image_dir.join(FINGERPRINT_FILE);
        if let Err(e) = save_fingerprints(&path, &self.seen) {
            warn!(path = %path.display(), error = %e, "Failed to save fingerprint table");
        }
    }
}

/// Count stored images and thumbnails under `image_dir`
pub fn disk_counts(image_dir: &Path) -> (usize, usize) {
    (
        stored_filenames(image_dir).count(),
        stored_filenames(&image_dir.join(THUMBNAIL_DIR)).count(),
    )
}

/// Entries in the persistent fingerprint table (0 when absent or unreadable)
pub fn stored_fingerprints(image_dir: &Path) -> usize {
    load_fingerprints(&image_dir.join(FINGERPRINT_FILE)).len()
}

fn decode(raw: &[u8]) -> Result<DynamicImage, IntakeError> {
    let img = image::load_from_memory(raw).map_err(|e| IntakeError::Decode(e.to_string()))?;
    match img {
        DynamicImage::ImageRgb8(_)
        | DynamicImage::ImageRgba8(_)
        | DynamicImage::ImageRgb16(_)
        | DynamicImage::ImageRgba16(_) => Ok(img),
        other => Err(IntakeError::UnsupportedColor(format!("{:?}", other.color()))),
    }
}

/// Fraction of near-black or near-white pixels in a downsampled copy
fn blank_ratio(gray: &GrayImage, low: u8, high: u8) -> f64 {
    let (width, height) = gray.dimensions();
    let sample = if width > BLANK_SAMPLE_SIZE || height > BLANK_SAMPLE_SIZE {
        let scale = f64::from(BLANK_SAMPLE_SIZE) / f64::from(width.max(height));
        let w = ((f64::from(width) * scale).round() as u32).max(1);
        let h = ((f64::from(height) * scale).round() as u32).max(1);
        imageops::thumbnail(gray, w, h)
    } else {
        gray.clone()
    };

    let total = sample.width() as usize * sample.height() as usize;
    if total == 0 {
        return 1.0;
    }
    let extreme = sample
        .pixels()
        .filter(|p| p.0[0] < low || p.0[0] > high)
        .count();
    extreme as f64 / total as f64
}

/// Opaque RGB copy; transparency is composited onto white
fn flatten_onto_white(img: &DynamicImage) -> RgbImage {
    if !img.color().has_alpha() {
        return img.to_rgb8();
    }

    let rgba = img.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let alpha = u32::from(a);
        let blend = |c: u8| ((u32::from(c) * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
        Rgb([blend(r), blend(g), blend(b)])
    })
}

fn scaled_height(width: u32, height: u32, new_width: u32) -> u32 {
    let scaled = (u64::from(height) * u64::from(new_width) + u64::from(width) / 2) / u64::from(width);
    (scaled as u32).max(1)
}

/// Shrink (never enlarge) to fit a bounding box, keeping aspect ratio
fn fit_within(img: &RgbImage, max_width: u32, max_height: u32) -> RgbImage {
    let (width, height) = img.dimensions();
    if width <= max_width && height <= max_height {
        return img.clone();
    }
    let scale = (f64::from(max_width) / f64::from(width)).min(f64::from(max_height) / f64::from(height));
    let w = ((f64::from(width) * scale).round() as u32).clamp(1, max_width);
    let h = ((f64::from(height) * scale).round() as u32).clamp(1, max_height);
    imageops::thumbnail(img, w, h)
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(PARTIAL_SUFFIX);
    path.with_file_name(name)
}

/// Encode to `<path>.part`, then rename into place
fn write_jpeg(img: &RgbImage, path: &Path, quality: u8) -> Result<(), IntakeError> {
    let part = partial_path(path);
    let result = encode_to(img, &part, quality).and_then(|()| {
        fs::rename(&part, path).map_err(|e| IntakeError::Storage(e.to_string()))
    });
    if result.is_err() {
        remove_if_present(&part);
    }
    result
}

fn encode_to(img: &RgbImage, path: &Path, quality: u8) -> Result<(), IntakeError> {
    let storage = |e: std::io::Error| IntakeError::Storage(format!("{}: {}", path.display(), e));

    let mut writer = BufWriter::new(File::create(path).map_err(storage)?);
    JpegEncoder::new_with_quality(&mut writer, quality)
        .encode_image(img)
        .map_err(|e| IntakeError::Storage(format!("{}: {}", path.display(), e)))?;
    writer.flush().map_err(storage)
}

fn remove_if_present(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to remove file");
        }
    }
}

fn is_plain_filename(name: &str) -> bool {
    !name.is_empty()
        && !name.contains(['/', '\\'])
        && name != "."
        && name != ".."
        && !name.ends_with(PARTIAL_SUFFIX)
}

/// Names of stored images directly inside `dir`
fn stored_filenames(dir: &Path) -> impl Iterator<Item = String> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
        .filter(|name| {
            Path::new(name)
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(IMAGE_EXTENSION))
        })
}

/// Remove `*.part` files in the image and thumbnail directories
fn sweep_partial_files(image_dir: &Path) -> usize {
    WalkDir::new(image_dir)
        .max_depth(2)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| {
            entry.file_type().is_file()
                && entry
                    .file_name()
                    .to_str()
                    .is_some_and(|n| n.ends_with(PARTIAL_SUFFIX))
        })
        .filter(|entry| fs::remove_file(entry.path()).is_ok())
        .count()
}

fn load_fingerprints(path: &Path) -> HashMap<Fingerprint, String> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return HashMap::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read fingerprint table");
            return HashMap::new();
        }
    };

    let raw: BTreeMap<String, String> = match serde_json::from_str(&content) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring unreadable fingerprint table");
            return HashMap::new();
        }
    };

    raw.into_iter()
        .filter_map(|(hex, filename)| hex.parse().ok().map(|fp| (fp, filename)))
        .collect()
}

fn save_fingerprints(path: &Path, seen: &HashMap<Fingerprint, String>) -> std::io::Result<()> {
    let raw: BTreeMap<String, &String> = seen.iter().map(|(fp, f)| (fp.to_string(), f)).collect();
    let json = serde_json::to_string_pretty(&raw)?;

    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)
}
