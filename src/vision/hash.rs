//! DCT perceptual hashing
//!
//! Produces a fixed-length fingerprint of an image's low-frequency content so
//! that visually similar regions land a small Hamming distance apart.

use std::fmt;

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage};
use ndarray::Array2;

use super::VisionError;

/// Hash sizes accepted by the detector (bits per side of the DCT block)
pub const SUPPORTED_HASH_SIZES: [u32; 3] = [8, 16, 32];

/// Default hash size (16x16 = 256 bits)
pub const DEFAULT_HASH_SIZE: u32 = 16;

/// The image is resized to `hash_size * HIGHFREQ_FACTOR` before the DCT
const HIGHFREQ_FACTOR: u32 = 4;

/// Fixed-length perceptual hash stored as packed bits
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PerceptualHash {
    words: Vec<u64>,
    bits: usize,
}

impl PerceptualHash {
    /// Build a hash from individual bits (row-major order)
    pub fn from_bits(bits: &[bool]) -> Self {
        let mut words = vec![0u64; bits.len().div_ceil(64)];
        for (idx, &bit) in bits.iter().enumerate() {
            if bit {
                words[idx / 64] |= 1u64 << (idx % 64);
            }
        }

        Self {
            words,
            bits: bits.len(),
        }
    }

    /// Number of bits in the hash
    pub fn bit_len(&self) -> usize {
        self.bits
    }

    /// Read a single bit
    pub fn bit(&self, idx: usize) -> bool {
        idx < self.bits && self.words[idx / 64] & (1u64 << (idx % 64)) != 0
    }

    /// Hamming distance to another hash of the same length
    ///
    /// Returns `None` when the lengths differ, since the hashes were computed
    /// with different sizes and cannot be compared.
    pub fn distance(&self, other: &PerceptualHash) -> Option<u32> {
        if self.bits != other.bits {
            return None;
        }

        Some(
            self.words
                .iter()
                .zip(&other.words)
                .map(|(a, b)| (a ^ b).count_ones())
                .sum(),
        )
    }
}

impl fmt::Display for PerceptualHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Nibbles in bit order, four bits per hex digit
        for chunk in 0..self.bits.div_ceil(4) {
            let mut nibble = 0u8;
            for offset in 0..4 {
                if self.bit(chunk * 4 + offset) {
                    nibble |= 8 >> offset;
                }
            }
            write!(f, "{:x}", nibble)?;
        }
        Ok(())
    }
}

/// Compute the perceptual hash of a color or grayscale image
pub fn phash(image: &DynamicImage, hash_size: u32) -> Result<PerceptualHash, VisionError> {
    phash_gray(&image.to_luma8(), hash_size)
}

/// Compute the perceptual hash of a single-channel image
pub fn phash_gray(image: &GrayImage, hash_size: u32) -> Result<PerceptualHash, VisionError> {
    if !SUPPORTED_HASH_SIZES.contains(&hash_size) {
        return Err(VisionError::HashComputation(format!(
            "unsupported hash size {}",
            hash_size
        )));
    }

    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(VisionError::HashComputation("empty image".to_string()));
    }

    let side = hash_size * HIGHFREQ_FACTOR;
    let resized = image::imageops::resize(image, side, side, FilterType::Lanczos3);

    let n = side as usize;
    let pixels = Array2::from_shape_fn((n, n), |(row, col)| {
        resized.get_pixel(col as u32, row as u32)[0] as f64
    });

    // Only the low-frequency corner is kept, so only those basis rows are built
    let basis = dct_basis(hash_size as usize, n);
    let low_freq = basis.dot(&pixels).dot(&basis.t());

    let mut coefficients: Vec<f64> = low_freq.iter().copied().collect();
    let median = median(&mut coefficients);

    let bits: Vec<bool> = low_freq.iter().map(|&c| c > median).collect();
    Ok(PerceptualHash::from_bits(&bits))
}

/// First `rows` rows of the (unnormalized) DCT-II matrix for length `n`
fn dct_basis(rows: usize, n: usize) -> Array2<f64> {
    let n_f = n as f64;
    Array2::from_shape_fn((rows, n), |(k, i)| {
        (std::f64::consts::PI * k as f64 * (2.0 * i as f64 + 1.0) / (2.0 * n_f)).cos()
    })
}

/// Median with the even-length midpoint convention
fn median(values: &mut [f64]) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Luma, Rgb};

    fn texture(seed: u32) -> GrayImage {
        ImageBuffer::from_fn(63, 22, |x, y| {
            let v = (x * 31 + y * 17 + seed * 101) ^ (x * y + seed);
            Luma([(v % 256) as u8])
        })
    }

    #[test]
    fn test_hash_length_matches_size() {
        for size in SUPPORTED_HASH_SIZES {
            let hash = phash_gray(&texture(1), size).unwrap();
            assert_eq!(hash.bit_len(), (size * size) as usize);
        }
    }

    #[test]
    fn test_identical_images_hash_equal() {
        let a = phash_gray(&texture(3), 16).unwrap();
        let b = phash_gray(&texture(3), 16).unwrap();
        assert_eq!(a.distance(&b), Some(0));
    }

    #[test]
    fn test_distance_is_symmetric() {
        let a = phash_gray(&texture(1), 16).unwrap();
        let b = phash_gray(&texture(7), 16).unwrap();
        assert_eq!(a.distance(&b), b.distance(&a));
        assert!(a.distance(&b).unwrap() > 0);
    }

    #[test]
    fn test_color_and_gray_inputs_agree() {
        let rgb = ImageBuffer::from_fn(40, 20, |x, y| {
            let v = ((x * 13 + y * 29) % 256) as u8;
            Rgb([v, v, v])
        });
        let color = DynamicImage::ImageRgb8(rgb);
        let gray = color.to_luma8();

        assert_eq!(phash(&color, 8).unwrap(), phash_gray(&gray, 8).unwrap());
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(phash_gray(&GrayImage::new(0, 0), 16).is_err());
        assert!(phash_gray(&texture(1), 12).is_err());
    }

    #[test]
    fn test_length_mismatch_is_incomparable() {
        let small = phash_gray(&texture(1), 8).unwrap();
        let large = phash_gray(&texture(1), 16).unwrap();
        assert_eq!(small.distance(&large), None);
    }

    #[test]
    fn test_display_hex() {
        let hash = PerceptualHash::from_bits(&[true, false, false, false, false, true, true, true]);
        assert_eq!(hash.to_string(), "87");
    }
}
