//! Hash-based region detector
//!
//! Wraps hashing, template loading and region capture behind the threshold
//! and hash size shared by every comparison in a session.

use std::path::Path;

use image::{DynamicImage, GrayImage};

use super::capture::{grab_gray, Region, ScreenGrabber};
use super::hash::{phash, phash_gray, PerceptualHash, DEFAULT_HASH_SIZE};
use super::VisionError;

/// Distance reported when a comparison could not be made
pub const MAX_DISTANCE: u32 = 999;

/// Default Hamming distance threshold
pub const DEFAULT_HASH_THRESHOLD: u32 = 8;

/// Perceptual hash detector
#[derive(Debug, Clone)]
pub struct HashDetector {
    /// Maximum Hamming distance that still counts as a match
    threshold: u32,
    /// Hash size (bits per side)
    hash_size: u32,
}

impl HashDetector {
    /// Create a detector with the given threshold and hash size
    pub fn new(threshold: u32, hash_size: u32) -> Self {
        Self {
            threshold,
            hash_size,
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn hash_size(&self) -> u32 {
        self.hash_size
    }

    /// Hash a color or grayscale image
    pub fn calculate_hash(&self, image: &DynamicImage) -> Result<PerceptualHash, VisionError> {
        phash(image, self.hash_size)
    }

    /// Hash a grayscale image
    pub fn calculate_gray_hash(&self, image: &GrayImage) -> Result<PerceptualHash, VisionError> {
        phash_gray(image, self.hash_size)
    }

    /// Compare a captured region against a template hash
    ///
    /// Returns `(false, MAX_DISTANCE)` when either side is missing or the
    /// capture cannot be hashed.
    pub fn detect_hash(
        &self,
        captured: Option<&GrayImage>,
        template: Option<&PerceptualHash>,
    ) -> (bool, u32) {
        let (Some(captured), Some(template)) = (captured, template) else {
            return (false, MAX_DISTANCE);
        };

        match self.calculate_gray_hash(captured) {
            Ok(current) => self.compare(&current, template),
            Err(e) => {
                log::debug!("Detection hash failed: {}", e);
                (false, MAX_DISTANCE)
            }
        }
    }

    /// Compare two precomputed hashes against the threshold
    pub fn compare(&self, current: &PerceptualHash, template: &PerceptualHash) -> (bool, u32) {
        match template.distance(current) {
            Some(distance) => (distance <= self.threshold, distance),
            None => {
                log::debug!(
                    "Hash length mismatch: {} vs {} bits",
                    template.bit_len(),
                    current.bit_len()
                );
                (false, MAX_DISTANCE)
            }
        }
    }

    /// Capture a screen region as grayscale, logging and swallowing failures
    pub fn capture_region(&self, grabber: &dyn ScreenGrabber, region: Region) -> Option<GrayImage> {
        match grab_gray(grabber, region) {
            Ok(image) => Some(image),
            Err(e) => {
                log::debug!("Region capture error for {}: {}", region, e);
                None
            }
        }
    }

    /// Load a template image as grayscale
    ///
    /// A missing file is `Ok(None)`; unreadable or undecodable files are errors.
    pub fn load_image(&self, path: &Path) -> Result<Option<GrayImage>, VisionError> {
        if !path.exists() {
            return Ok(None);
        }

        let image = image::open(path).map_err(|e| VisionError::ImageLoad {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(Some(image.to_luma8()))
    }
}

impl Default for HashDetector {
    fn default() -> Self {
        Self::new(DEFAULT_HASH_THRESHOLD, DEFAULT_HASH_SIZE)
    }
}
