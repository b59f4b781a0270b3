//! Test Image Generator
//!
//! Synthetic PNGs with predictable fingerprints.
//!
//! Distinct images are 200x200 RGB with a 4x4 grid of 50px cells, each cell
//! dark (60) or light (190). Patterns with 6 to 10 light cells are used, so
//! every generated image differs in its average-hash bits.

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;

const SIZE: u32 = 200;
const CELL: u32 = 50;
const DARK: u8 = 60;
const LIGHT: u8 = 190;

/// The `n`-th grid pattern with 6..=10 light cells
fn pattern(n: usize) -> u16 {
    (0..=u16::MAX)
        .filter(|p| (6..=10).contains(&p.count_ones()))
        .nth(n)
        .expect("pattern index out of range")
}

fn encode(img: RgbImage) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut buf, ImageFormat::Png)
        .expect("PNG encoding failed");
    buf.into_inner()
}

fn grid(size: u32, bits: u16) -> RgbImage {
    let cell = size / 4;
    RgbImage::from_fn(size, size, |x, y| {
        let index = (y / cell).min(3) * 4 + (x / cell).min(3);
        let value = if bits & (1 << (15 - index)) != 0 {
            LIGHT
        } else {
            DARK
        };
        Rgb([value, value, value])
    })
}

/// Valid image; different `n` give different fingerprints
pub fn distinct_png(n: usize) -> Vec<u8> {
    debug_assert_eq!(SIZE / 4, CELL);
    encode(grid(SIZE, pattern(n)))
}

/// All-white image (rejected as blank)
pub fn blank_png() -> Vec<u8> {
    encode(RgbImage::from_pixel(SIZE, SIZE, Rgb([255, 255, 255])))
}

/// Image below the default minimum dimension
pub fn small_png() -> Vec<u8> {
    encode(grid(40, pattern(0)))
}
