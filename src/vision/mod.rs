//! Vision and image processing module
//!
//! Handles screen region capture, perceptual hashing and the threshold-based
//! comparison used to recognise the weapon and menu indicators.

pub mod capture;
pub mod detector;
pub mod hash;

use std::path::PathBuf;

pub use capture::{FrameGrabber, Region, ScreenGrabber};
pub use detector::{HashDetector, DEFAULT_HASH_THRESHOLD, MAX_DISTANCE};
pub use hash::{PerceptualHash, DEFAULT_HASH_SIZE, SUPPORTED_HASH_SIZES};

#[cfg(feature = "desktop")]
pub use capture::DesktopGrabber;

/// Vision system errors
#[derive(Debug, thiserror::Error)]
pub enum VisionError {
    #[error("Failed to compute hash: {0}")]
    HashComputation(String),
    #[error("Failed to capture region: {0}")]
    Capture(String),
    #[error("Failed to load image {path}: {reason}")]
    ImageLoad { path: PathBuf, reason: String },
    #[error("Failed to save image {path}: {reason}")]
    ImageSave { path: PathBuf, reason: String },
    #[error("Invalid region ({left}, {top}, {right}, {bottom}): right must exceed left and bottom must exceed top")]
    InvalidRegion {
        left: i32,
        top: i32,
        right: i32,
        bottom: i32,
    },
    #[error("Invalid frame data")]
    InvalidFrameData,
}

/// Screen grabber for the attached displays, if this build can capture
pub fn desktop_grabber() -> Option<std::sync::Arc<dyn ScreenGrabber>> {
    #[cfg(feature = "desktop")]
    {
        Some(std::sync::Arc::new(DesktopGrabber))
    }

    #[cfg(not(feature = "desktop"))]
    {
        None
    }
}
