// Similarity signatures: a deterministic perceptual descriptor of a cropped
// symbol region.
//
// The crop is resampled to an 8x8 grid and thresholded at its own mean
// intensity; the 64 resulting bits, packed row-major, are the signature.
// Scaling is part of the descriptor, so the same glyph drawn at different
// sizes lands in the same bucket. Frequency is defined as bucket size.

use image::imageops::{self, FilterType};
use image::GrayImage;
use rayon::prelude::*;

use crate::core::types::BoundingBox;

/// Signature grid side length; 64 bits total.
pub const SIGNATURE_GRID: u32 = 8;

/// Compute the signature of one region. Deterministic: Triangle resampling
/// and integer mean, no randomness.
pub fn signature_of_region(image: &GrayImage, bbox: &BoundingBox) -> u64 {
    let crop = imageops::crop_imm(image, bbox.x, bbox.y, bbox.width, bbox.height).to_image();
    let small = imageops::resize(&crop, SIGNATURE_GRID, SIGNATURE_GRID, FilterType::Triangle);

    let sum: u32 = small.pixels().map(|p| p.0[0] as u32).sum();
    let mean = sum / (SIGNATURE_GRID * SIGNATURE_GRID);

    // Ink is darker than the crop mean; a uniform crop packs to zero.
    let mut bits = 0u64;
    for (i, p) in small.pixels().enumerate() {
        if (p.0[0] as u32) < mean {
            bits |= 1 << i;
        }
    }
    bits
}

/// Signatures for a page's final box list. Independent per box, so the
/// parallel map preserves output order and determinism.
pub fn signatures_for(image: &GrayImage, boxes: &[BoundingBox]) -> Vec<u64> {
    boxes
        .par_iter()
        .map(|b| signature_of_region(image, b))
        .collect()
}

/// Bit distance between two signatures; the secondary ranking metric for
/// similarity queries.
pub fn hamming(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}

pub fn to_hex(signature: u64) -> String {
    format!("{signature:016x}")
}

pub fn parse_hex(s: &str) -> Option<u64> {
    if s.len() != 16 {
        return None;
    }
    u64::from_str_radix(s, 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    /// Page where `ink` returns true for ink pixels.
    fn page(width: u32, height: u32, ink: impl Fn(u32, u32) -> bool) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            if ink(x, y) {
                Luma([25u8])
            } else {
                Luma([230u8])
            }
        })
    }

    #[test]
    fn test_same_glyph_same_signature() {
        // The same L-shaped stroke at two positions.
        let img = page(120, 60, |x, y| {
            let l_shape = |ox: u32, oy: u32, x: u32, y: u32| {
                let (dx, dy) = (x.wrapping_sub(ox), y.wrapping_sub(oy));
                dx < 16 && dy < 16 && (dx < 4 || dy >= 12)
            };
            l_shape(10, 10, x, y) || l_shape(70, 30, x, y)
        });

        let a = signature_of_region(&img, &BoundingBox::new(10, 10, 16, 16));
        let b = signature_of_region(&img, &BoundingBox::new(70, 30, 16, 16));
        assert_eq!(a, b);
    }

    #[test]
    fn test_scaled_glyph_same_bucket() {
        // Same proportions at 16px and 32px.
        let img = page(120, 60, |x, y| {
            let vertical_bar = |ox: u32, oy: u32, size: u32, x: u32, y: u32| {
                let (dx, dy) = (x.wrapping_sub(ox), y.wrapping_sub(oy));
                dx < size / 4 && dy < size
            };
            vertical_bar(10, 10, 16, x, y) || vertical_bar(60, 10, 32, x, y)
        });

        let small = signature_of_region(&img, &BoundingBox::new(10, 10, 16, 16));
        let large = signature_of_region(&img, &BoundingBox::new(60, 10, 32, 32));
        assert_eq!(small, large);
    }

    #[test]
    fn test_distinct_glyphs_differ() {
        let img = page(100, 40, |x, y| {
            // Left: vertical bar. Right: horizontal bar.
            (x >= 10 && x < 14 && y >= 5 && y < 21) || (x >= 50 && x < 66 && y >= 12 && y < 16)
        });

        // Boxes include surrounding parchment so the grid sees the stroke
        // orientation, not a uniform ink block.
        let bar = signature_of_region(&img, &BoundingBox::new(8, 3, 8, 20));
        let dash = signature_of_region(&img, &BoundingBox::new(46, 10, 24, 8));
        assert_ne!(bar, dash);
        assert!(hamming(bar, dash) > 0);
    }

    #[test]
    fn test_batch_matches_single() {
        let img = page(100, 40, |x, y| x % 7 == 0 && y % 3 == 0);
        let boxes = vec![
            BoundingBox::new(0, 0, 20, 20),
            BoundingBox::new(30, 5, 16, 16),
            BoundingBox::new(60, 10, 24, 24),
        ];
        let batch = signatures_for(&img, &boxes);
        let singles: Vec<u64> = boxes
            .iter()
            .map(|b| signature_of_region(&img, b))
            .collect();
        assert_eq!(batch, singles);
    }

    #[test]
    fn test_hex_round_trip() {
        let sig = 0x0123_4567_89ab_cdefu64;
        assert_eq!(to_hex(sig), "0123456789abcdef");
        assert_eq!(parse_hex("0123456789abcdef"), Some(sig));
        assert_eq!(parse_hex("xyz"), None);
        assert_eq!(parse_hex("123"), None);
    }

    #[test]
    fn test_hamming() {
        assert_eq!(hamming(0, 0), 0);
        assert_eq!(hamming(0b1011, 0b1000), 2);
        assert_eq!(hamming(u64::MAX, 0), 64);
    }
}
