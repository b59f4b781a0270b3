//! Deterministic names for stored images and items
//!
//! Image files are named `<sequence:06>-<location-slug>-<item-id>.jpg`.

/// Extension of every stored image
pub const IMAGE_EXTENSION: &str = "jpg";

/// Slug for a location tag
///
/// First comma-separated segment, trimmed and lowercased; whitespace runs
/// become `-`, other non-alphanumerics are dropped.
///
/// ```
/// use gleaner_acq::services::naming::location_slug;
///
/// assert_eq!(location_slug("New York, NY"), "new-york");
/// ```
pub fn location_slug(location: &str) -> String {
    let head = location.split(',').next().unwrap_or("").trim();

    let mut slug = String::with_capacity(head.len());
    let mut pending_dash = false;
    for ch in head.chars() {
        if ch.is_whitespace() || ch == '-' {
            pending_dash = !slug.is_empty();
        } else if ch.is_alphanumeric() {
            if pending_dash {
                slug.push('-');
                pending_dash = false;
            }
            slug.extend(ch.to_lowercase());
        }
    }

    if slug.is_empty() {
        "unknown".to_string()
    } else {
        slug
    }
}

/// Zero-padded item identifier
pub fn format_item_id(id: u64) -> String {
    format!("{:05}", id)
}

pub fn image_filename(sequence: u64, location: &str, item_id: &str) -> String {
    format!(
        "{:06}-{}-{}.{}",
        sequence,
        location_slug(location),
        item_id,
        IMAGE_EXTENSION
    )
}

/// Leading sequence number of a generated filename
pub fn parse_sequence(filename: &str) -> Option<u64> {
    let stem = filename.strip_suffix(&format!(".{}", IMAGE_EXTENSION))?;
    let (sequence, _) = stem.split_once('-')?;
    sequence.parse().ok()
}

/// Trailing item id of a generated filename
pub fn parse_item_id(filename: &str) -> Option<u64> {
    let stem = filename.strip_suffix(&format!(".{}", IMAGE_EXTENSION))?;
    let (_, item_id) = stem.rsplit_once('-')?;
    item_id.parse().ok()
}
