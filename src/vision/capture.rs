//! Screen region capture
//!
//! Grabs pixel rectangles from the display (or from a supplied frame) and
//! hands them to the detector as single-channel images.

use std::sync::{Mutex, PoisonError};

use image::{DynamicImage, GrayImage, ImageBuffer, RgbaImage};
use serde::{Deserialize, Serialize};

use super::VisionError;

/// Screen rectangle as (left, top, right, bottom) in pixels
///
/// Always satisfies `right > left` and `bottom > top`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "[i32; 4]", into = "[i32; 4]")]
pub struct Region {
    left: i32,
    top: i32,
    right: i32,
    bottom: i32,
}

impl Region {
    /// Create a region, rejecting empty or inverted rectangles
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Result<Self, VisionError> {
        if right <= left || bottom <= top {
            return Err(VisionError::InvalidRegion {
                left,
                top,
                right,
                bottom,
            });
        }

        Ok(Self {
            left,
            top,
            right,
            bottom,
        })
    }

    /// Region covering a whole screen of the given size
    pub fn screen(width: u32, height: u32) -> Result<Self, VisionError> {
        Self::new(0, 0, width as i32, height as i32)
    }

    pub fn left(&self) -> i32 {
        self.left
    }

    pub fn top(&self) -> i32 {
        self.top
    }

    pub fn right(&self) -> i32 {
        self.right
    }

    pub fn bottom(&self) -> i32 {
        self.bottom
    }

    pub fn width(&self) -> u32 {
        (self.right - self.left) as u32
    }

    pub fn height(&self) -> u32 {
        (self.bottom - self.top) as u32
    }

    /// Check whether `other` lies entirely inside this region
    pub fn contains(&self, other: &Region) -> bool {
        other.left >= self.left
            && other.top >= self.top
            && other.right <= self.right
            && other.bottom <= self.bottom
    }

    /// Scale from one screen resolution to another
    pub fn scaled(&self, from: (u32, u32), to: (u32, u32)) -> Result<Self, VisionError> {
        let sx = to.0 as f64 / from.0 as f64;
        let sy = to.1 as f64 / from.1 as f64;
        Self::new(
            (self.left as f64 * sx).round() as i32,
            (self.top as f64 * sy).round() as i32,
            (self.right as f64 * sx).round() as i32,
            (self.bottom as f64 * sy).round() as i32,
        )
    }
}

impl TryFrom<[i32; 4]> for Region {
    type Error = VisionError;

    fn try_from(value: [i32; 4]) -> Result<Self, Self::Error> {
        Self::new(value[0], value[1], value[2], value[3])
    }
}

impl From<Region> for [i32; 4] {
    fn from(region: Region) -> Self {
        [region.left, region.top, region.right, region.bottom]
    }
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({}, {}, {}, {}) {}x{}",
            self.left,
            self.top,
            self.right,
            self.bottom,
            self.width(),
            self.height()
        )
    }
}

/// Source of screen pixels
pub trait ScreenGrabber: Send + Sync {
    /// Grab the given rectangle as RGBA pixels
    fn grab(&self, region: Region) -> Result<RgbaImage, VisionError>;
}

/// Grab a region and convert it to grayscale
pub fn grab_gray(grabber: &dyn ScreenGrabber, region: Region) -> Result<GrayImage, VisionError> {
    let rgba = grabber.grab(region)?;
    Ok(DynamicImage::ImageRgba8(rgba).to_luma8())
}

/// Grabber backed by an externally supplied frame
///
/// Useful for replaying screenshots and for tests.
pub struct FrameGrabber {
    frame: Mutex<Option<RgbaImage>>,
}

impl FrameGrabber {
    /// Create a grabber with no frame yet
    pub fn new() -> Self {
        Self {
            frame: Mutex::new(None),
        }
    }

    /// Create a grabber around an existing frame
    pub fn with_frame(frame: RgbaImage) -> Self {
        Self {
            frame: Mutex::new(Some(frame)),
        }
    }

    /// Replace the frame with raw RGBA data
    pub fn update(&self, frame_data: &[u8], width: u32, height: u32) -> Result<(), VisionError> {
        let expected_size = (width * height * 4) as usize;
        if frame_data.len() != expected_size {
            return Err(VisionError::InvalidFrameData);
        }

        let image: RgbaImage = ImageBuffer::from_raw(width, height, frame_data.to_vec())
            .ok_or(VisionError::InvalidFrameData)?;

        self.set_frame(image);
        Ok(())
    }

    /// Replace the frame
    pub fn set_frame(&self, frame: RgbaImage) {
        *self.frame.lock().unwrap_or_else(PoisonError::into_inner) = Some(frame);
    }

    /// Drop the current frame so subsequent grabs fail
    pub fn clear(&self) {
        *self.frame.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Check if we have a frame
    pub fn has_frame(&self) -> bool {
        self.frame
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl Default for FrameGrabber {
    fn default() -> Self {
        Self::new()
    }
}

impl ScreenGrabber for FrameGrabber {
    fn grab(&self, region: Region) -> Result<RgbaImage, VisionError> {
        let guard = self.frame.lock().unwrap_or_else(PoisonError::into_inner);
        let frame = guard
            .as_ref()
            .ok_or_else(|| VisionError::Capture("no frame available".to_string()))?;

        let bounds = Region::screen(frame.width(), frame.height())?;
        if !bounds.contains(&region) {
            return Err(VisionError::Capture(format!("region {} is off-screen", region)));
        }

        let sub_image = image::imageops::crop_imm(
            frame,
            region.left() as u32,
            region.top() as u32,
            region.width(),
            region.height(),
        );
        Ok(sub_image.to_image())
    }
}

/// Grabber reading directly from the attached displays
#[cfg(feature = "desktop")]
pub struct DesktopGrabber;

#[cfg(feature = "desktop")]
impl ScreenGrabber for DesktopGrabber {
    fn grab(&self, region: Region) -> Result<RgbaImage, VisionError> {
        use screenshots::Screen;

        let screen = Screen::from_point(region.left(), region.top())
            .map_err(|e| VisionError::Capture(e.to_string()))?;

        let info = &screen.display_info;
        let bounds = Region::new(
            info.x,
            info.y,
            info.x + info.width as i32,
            info.y + info.height as i32,
        )?;
        if !bounds.contains(&region) {
            return Err(VisionError::Capture(format!(
                "region {} does not fit on display {}",
                region, info.id
            )));
        }

        let shot = screen
            .capture_area(
                region.left() - info.x,
                region.top() - info.y,
                region.width(),
                region.height(),
            )
            .map_err(|e| VisionError::Capture(e.to_string()))?;

        // Rebuild through raw bytes so the buffer type is ours
        let (width, height) = (shot.width(), shot.height());
        RgbaImage::from_raw(width, height, shot.into_raw()).ok_or(VisionError::InvalidFrameData)
    }
}

/// Default regions for the 1920x1080 reference layout
pub mod regions {
    /// Reference resolution the defaults were measured on
    pub const REFERENCE_RESOLUTION: (u32, u32) = (1920, 1080);

    /// Weapon name, single-slot or second slot
    pub const WEAPON_SLOT2: [i32; 4] = [1811, 941, 1874, 963];

    /// Weapon name, first slot
    pub const WEAPON_SLOT1: [i32; 4] = [1811, 903, 1874, 925];

    /// Quick menu marker
    pub const MENU: [i32; 4] = [950, 372, 970, 392];
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_region_validation() {
        assert!(Region::new(0, 0, 10, 10).is_ok());
        assert!(Region::new(10, 0, 10, 10).is_err());
        assert!(Region::new(0, 5, 10, 2).is_err());
    }

    #[test]
    fn test_region_containment() {
        let screen = Region::screen(1920, 1080).unwrap();
        let weapon = Region::try_from(regions::WEAPON_SLOT2).unwrap();
        assert!(screen.contains(&weapon));

        let off_screen = Region::new(1900, 1000, 1980, 1100).unwrap();
        assert!(!screen.contains(&off_screen));
    }

    #[test]
    fn test_region_scaling() {
        let menu = Region::try_from(regions::MENU).unwrap();
        let scaled = menu.scaled((1920, 1080), (2560, 1440)).unwrap();
        assert_eq!(<[i32; 4]>::from(scaled), [1267, 496, 1293, 523]);
    }

    #[test]
    fn test_region_serde_round_trip_rejects_inverted() {
        let region: Region = serde_json::from_str("[1, 2, 30, 40]").unwrap();
        assert_eq!(region.width(), 29);
        assert!(serde_json::from_str::<Region>("[30, 2, 1, 40]").is_err());
    }

    #[test]
    fn test_frame_update_validates_size() {
        let grabber = FrameGrabber::new();
        assert!(grabber.update(&[255u8; 100], 10, 10).is_err());
        assert!(grabber.update(&vec![255u8; 400], 10, 10).is_ok());
        assert!(grabber.has_frame());
    }

    #[test]
    fn test_frame_grab_crops_region() {
        let frame = ImageBuffer::from_fn(20, 10, |x, _| Rgba([x as u8 * 10, 0, 0, 255]));
        let grabber = FrameGrabber::with_frame(frame);

        let crop = grabber.grab(Region::new(5, 2, 9, 6).unwrap()).unwrap();
        assert_eq!(crop.dimensions(), (4, 4));
        assert_eq!(crop.get_pixel(0, 0)[0], 50);
    }

    #[test]
    fn test_frame_grab_fails_off_screen_or_empty() {
        let grabber = FrameGrabber::new();
        let region = Region::new(0, 0, 5, 5).unwrap();
        assert!(grabber.grab(region).is_err());

        grabber.set_frame(RgbaImage::new(4, 4));
        assert!(grabber.grab(region).is_err());
    }

    #[test]
    fn test_grab_gray_is_single_channel() {
        let frame = ImageBuffer::from_pixel(8, 8, Rgba([200, 200, 200, 255]));
        let grabber = FrameGrabber::with_frame(frame);

        let gray = grab_gray(&grabber, Region::new(0, 0, 4, 4).unwrap()).unwrap();
        assert_eq!(gray.get_pixel(1, 1)[0], 200);
    }
}
