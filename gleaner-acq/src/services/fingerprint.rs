//! Perceptual fingerprints for duplicate detection
//!
//! Average hash: the grayscale image is box-averaged onto an 8×8 grid, each
//! cell becomes one bit (set when brighter than the grid mean), and the 64
//! bits are packed row-major, most significant bit first.

use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const GRID: u32 = 8;

/// 64-bit average hash, shown as 16 hex digits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Fingerprint(pub u64);

impl Fingerprint {
    /// Fingerprint of a grayscale image
    pub fn of(gray: &GrayImage) -> Self {
        let cells = grid_means(gray);
        let mean = cells.iter().sum::<f64>() / cells.len() as f64;

        let bits = cells
            .iter()
            .fold(0u64, |acc, &cell| (acc << 1) | u64::from(cell > mean));

        Fingerprint(bits)
    }

    /// Number of differing bits
    pub fn distance(&self, other: &Fingerprint) -> u32 {
        (self.0 ^ other.0).count_ones()
    }
}

/// Mean intensity of each grid cell, row-major
fn grid_means(gray: &GrayImage) -> Vec<f64> {
    let (width, height) = gray.dimensions();
    let mut cells = Vec::with_capacity((GRID * GRID) as usize);

    for gy in 0..GRID {
        let (y0, y1) = cell_bounds(gy, height);
        for gx in 0..GRID {
            let (x0, x1) = cell_bounds(gx, width);

            let mut sum = 0u64;
            let mut count = 0u64;
            for y in y0..y1 {
                for x in x0..x1 {
                    sum += u64::from(gray.get_pixel(x, y).0[0]);
                    count += 1;
                }
            }
            cells.push(if count == 0 { 0.0 } else { sum as f64 / count as f64 });
        }
    }

    cells
}

/// Pixel span `[start, end)` covered by grid cell `index` along an axis of `len` pixels
fn cell_bounds(index: u32, len: u32) -> (u32, u32) {
    if len == 0 {
        return (0, 0);
    }
    let start = (index * len / GRID).min(len - 1);
    let end = ((index + 1) * len / GRID).clamp(start + 1, len);
    (start, end)
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl FromStr for Fingerprint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 16 {
            return Err(format!("fingerprint must be 16 hex digits, got {:?}", s));
        }
        u64::from_str_radix(s, 16)
            .map(Fingerprint)
            .map_err(|e| format!("invalid fingerprint {:?}: {}", s, e))
    }
}

impl From<Fingerprint> for String {
    fn from(fp: Fingerprint) -> Self {
        fp.to_string()
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn split_image(width: u32, height: u32) -> GrayImage {
        // left half dark, right half light
        GrayImage::from_fn(width, height, |x, _| {
            if x < width / 2 {
                Luma([40])
            } else {
                Luma([200])
            }
        })
    }

    #[test]
    fn test_half_split_pattern() {
        let fp = Fingerprint::of(&split_image(160, 120));
        // each row: 0000 1111
        assert_eq!(fp.to_string(), "0f0f0f0f0f0f0f0f");
    }

    #[test]
    fn test_scale_invariance() {
        let small = Fingerprint::of(&split_image(160, 160));
        let large = Fingerprint::of(&split_image(640, 480));
        assert_eq!(small, large);
    }

    #[test]
    fn test_uniform_image_has_no_bits() {
        let flat = GrayImage::from_pixel(50, 50, Luma([128]));
        assert_eq!(Fingerprint::of(&flat), Fingerprint(0));
    }

    #[test]
    fn test_tiny_image_does_not_panic() {
        let tiny = GrayImage::from_pixel(3, 2, Luma([10]));
        assert_eq!(Fingerprint::of(&tiny), Fingerprint(0));
    }

    #[test]
    fn test_hex_round_trip_and_errors() {
        let fp: Fingerprint = "00ff00ff00ff00ff".parse().unwrap();
        assert_eq!(fp.0, 0x00ff_00ff_00ff_00ff);
        assert!("xyz".parse::<Fingerprint>().is_err());
        assert_eq!(fp.distance(&Fingerprint(0)), 32);
    }
}
