//! One-shot tools: template capture, debug capture and live preview

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use image::{DynamicImage, GrayImage, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use crate::config::SessionConfig;
use crate::detection::{DirectoryResolver, Slot, Template, TemplateStore, MENU_TEMPLATE};
use crate::vision::{HashDetector, PerceptualHash, Region, ScreenGrabber, VisionError};
use crate::Result;

/// Live preview refresh interval
pub const PREVIEW_INTERVAL: Duration = Duration::from_millis(100);

const MATCH_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const MISS_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const PANEL_PADDING: u32 = 4;

/// Region a tool operates on
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CaptureTarget {
    Weapon,
    Menu,
}

impl CaptureTarget {
    fn name(self) -> &'static str {
        match self {
            CaptureTarget::Weapon => "weapon",
            CaptureTarget::Menu => "menu",
        }
    }
}

/// Regions shown by the live preview
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum PreviewTarget {
    Weapon,
    Menu,
    Both,
}

impl PreviewTarget {
    fn includes(self, target: CaptureTarget) -> bool {
        matches!(
            (self, target),
            (PreviewTarget::Both, _)
                | (PreviewTarget::Weapon, CaptureTarget::Weapon)
                | (PreviewTarget::Menu, CaptureTarget::Menu)
        )
    }
}

/// Outcome of a debug capture
#[derive(Debug, Clone)]
pub struct CaptureReport {
    /// Raw grayscale capture
    pub path: PathBuf,
    /// Template and capture side by side, when a template exists
    pub comparison: Option<PathBuf>,
    pub hash: PerceptualHash,
    pub distance: Option<u32>,
    pub threshold: u32,
}

impl CaptureReport {
    pub fn would_detect(&self) -> Option<bool> {
        self.distance.map(|d| d <= self.threshold)
    }
}

/// One preview sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreviewSample {
    pub target: CaptureTarget,
    pub detected: bool,
    pub distance: u32,
}

/// Capture and comparison helpers that need no input backend
pub struct Tools {
    detector: HashDetector,
    grabber: Arc<dyn ScreenGrabber>,
    resolver: DirectoryResolver,
    templates: TemplateStore,
    weapon_region: Region,
    menu_region: Region,
}

impl Tools {
    pub fn new(config: &SessionConfig, grabber: Arc<dyn ScreenGrabber>) -> Self {
        let detector = HashDetector::new(config.hash_threshold, config.hash_size);
        let resolver = DirectoryResolver::new(&config.image_dir);
        let templates = TemplateStore::load(config, &detector, &resolver);

        Self {
            detector,
            grabber,
            resolver,
            templates,
            weapon_region: config.weapon_region,
            menu_region: config.menu_region,
        }
    }

    fn region(&self, target: CaptureTarget) -> Region {
        match target {
            CaptureTarget::Weapon => self.weapon_region,
            CaptureTarget::Menu => self.menu_region,
        }
    }

    /// Reference template: the first weapon's slot 2 image, or the menu
    fn reference(&self, target: CaptureTarget) -> Option<&Template> {
        match target {
            CaptureTarget::Weapon => self.templates.weapons().first().and_then(|w| {
                w.template(Slot::Two).or_else(|| w.template(Slot::One))
            }),
            CaptureTarget::Menu => self.templates.menu(),
        }
    }

    fn capture(&self, target: CaptureTarget) -> Result<GrayImage> {
        let region = self.region(target);
        self.detector
            .capture_region(self.grabber.as_ref(), region)
            .ok_or_else(|| {
                VisionError::Capture(format!("failed to capture {} region {}", target.name(), region))
                    .into()
            })
    }

    /// Capture a region as a new template after a countdown
    pub fn capture_template(&self, target: CaptureTarget, countdown: Duration) -> Result<PathBuf> {
        log::info!("=== TEMPLATE CAPTURE MODE: {} ===", target.name().to_uppercase());
        match target {
            CaptureTarget::Weapon => log::info!("Equip the weapon and make sure its name is clearly visible"),
            CaptureTarget::Menu => log::info!("Open the quick menu and make sure it is fully visible"),
        }
        log::info!("Capture region: {}", self.region(target));

        let mut remaining = countdown.as_secs();
        while remaining > 0 {
            log::info!("Capturing in {}...", remaining);
            thread::sleep(Duration::from_secs(1));
            remaining -= 1;
        }

        let image = self.capture(target)?;
        let filename = match target {
            CaptureTarget::Weapon => "weapon.png",
            CaptureTarget::Menu => MENU_TEMPLATE,
        };
        let path = self.resolver.captured_path(filename);
        save_image(&DynamicImage::ImageLuma8(image.clone()), &path)?;

        let hash = self.detector.calculate_gray_hash(&image)?;
        log::info!("Template saved to: {}", path.display());
        log::info!("Template size: {}x{} pixels", image.width(), image.height());
        log::info!("Template hash: {}", hash);
        if target == CaptureTarget::Weapon {
            log::info!("Rename it to <weapon>_slot1.png or <weapon>_slot2.png to use it for detection");
        }

        Ok(path)
    }

    /// Save the current capture and compare it with the reference template
    pub fn save_capture(&self, target: CaptureTarget) -> Result<CaptureReport> {
        let image = self.capture(target)?;
        let path = self.resolver.preview_path(&format!("debug_{}.png", target.name()));
        save_image(&DynamicImage::ImageLuma8(image.clone()), &path)?;
        log::info!("Current {} capture saved to: {}", target.name(), path.display());

        let hash = self.detector.calculate_gray_hash(&image)?;
        log::info!("Current hash: {}", hash);

        let threshold = self.detector.threshold();
        let mut report = CaptureReport {
            path,
            comparison: None,
            hash,
            distance: None,
            threshold,
        };

        let Some(template) = self.reference(target) else {
            log::warn!("No {} template to compare against", target.name());
            return Ok(report);
        };

        let (matched, distance) = self.detector.compare(&report.hash, &template.hash);
        log::info!("Distance from template: {}", distance);
        log::info!("Threshold: {}", threshold);
        log::info!("Would detect: {}", matched);
        report.distance = Some(distance);

        if let Some(template_image) = self.detector.load_image(&template.path)? {
            let comparison = self
                .resolver
                .preview_path(&format!("debug_{}_compare.png", target.name()));
            let panel = side_by_side(&template_image, &image, matched);
            save_image(&DynamicImage::ImageRgb8(panel), &comparison)?;
            log::info!("Comparison saved to: {}", comparison.display());
            report.comparison = Some(comparison);
        }

        Ok(report)
    }

    /// Log detection status every [`PREVIEW_INTERVAL`] until stopped
    ///
    /// `max_frames` bounds the number of refreshes; `None` runs until `stop`.
    pub fn preview(
        &self,
        target: PreviewTarget,
        stop: &AtomicBool,
        max_frames: Option<u64>,
    ) -> Vec<PreviewSample> {
        log::info!("=== LIVE PREVIEW MODE ({:?}) ===", target);
        log::info!("Hash threshold: {}", self.detector.threshold());
        log::info!("Press Ctrl+C to quit");

        let targets: Vec<CaptureTarget> = [CaptureTarget::Weapon, CaptureTarget::Menu]
            .into_iter()
            .filter(|t| target.includes(*t))
            .filter(|t| {
                let available = self.reference(*t).is_some();
                if !available {
                    log::warn!("No {} template, skipping its preview", t.name());
                }
                available
            })
            .collect();

        let mut last = Vec::new();
        let mut frames = 0u64;
        while !stop.load(Ordering::SeqCst) && max_frames.map_or(true, |max| frames < max) {
            last = targets.iter().filter_map(|t| self.sample(*t)).collect();
            for sample in &last {
                log::info!(
                    "{}: dist {} (thresh {}) {}",
                    sample.target.name(),
                    sample.distance,
                    self.detector.threshold(),
                    status_label(sample.target, sample.detected)
                );
            }

            frames += 1;
            thread::sleep(PREVIEW_INTERVAL);
        }

        log::info!("Preview closed");
        last
    }

    fn sample(&self, target: CaptureTarget) -> Option<PreviewSample> {
        let template = self.reference(target)?;
        let image = self
            .detector
            .capture_region(self.grabber.as_ref(), self.region(target))?;
        let (detected, distance) = self.detector.detect_hash(Some(&image), Some(&template.hash));
        Some(PreviewSample {
            target,
            detected,
            distance,
        })
    }
}

fn status_label(target: CaptureTarget, detected: bool) -> &'static str {
    match (target, detected) {
        (CaptureTarget::Weapon, true) => "WEAPON DETECTED",
        (CaptureTarget::Weapon, false) => "NO WEAPON",
        (CaptureTarget::Menu, true) => "MENU OPEN",
        (CaptureTarget::Menu, false) => "MENU CLOSED",
    }
}

/// Template on the left, capture on the right, capture framed by verdict
fn side_by_side(template: &GrayImage, capture: &GrayImage, matched: bool) -> RgbImage {
    let pad = PANEL_PADDING;
    let width = template.width() + capture.width() + pad * 3;
    let height = template.height().max(capture.height()) + pad * 2;
    let mut panel = RgbImage::new(width, height);

    let mut blit = |image: &GrayImage, left: u32| {
        for (x, y, p) in image.enumerate_pixels() {
            panel.put_pixel(left + x, pad + y, Rgb([p[0], p[0], p[0]]));
        }
    };
    blit(template, pad);
    let capture_left = template.width() + pad * 2;
    blit(capture, capture_left);

    let color = if matched { MATCH_COLOR } else { MISS_COLOR };
    let frame = Rect::at(capture_left as i32 - 1, pad as i32 - 1)
        .of_size(capture.width() + 2, capture.height() + 2);
    draw_hollow_rect_mut(&mut panel, frame, color);
    panel
}

fn save_image(image: &DynamicImage, path: &Path) -> Result<()> {
    let io_error = |reason: String| VisionError::ImageSave {
        path: path.to_path_buf(),
        reason,
    };

    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(|e| io_error(e.to_string()))?;
    }
    image.save(path).map_err(|e| io_error(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::vision::FrameGrabber;
    use image::{ImageBuffer, Luma, Rgba, RgbaImage};

    fn noise(seed: u32, width: u32, height: u32) -> GrayImage {
        ImageBuffer::from_fn(width, height, |x, y| {
            let mut v = x.wrapping_mul(73_856_093) ^ y.wrapping_mul(19_349_663) ^ seed.wrapping_mul(83_492_791);
            v ^= v >> 13;
            v = v.wrapping_mul(0x5bd1_e995);
            v ^= v >> 15;
            Luma([(v & 0xff) as u8])
        })
    }

    fn setup(root: &Path) -> (SessionConfig, Arc<FrameGrabber>) {
        let mut config = Settings::default().normalize().unwrap();
        config.image_dir = root.to_path_buf();

        let mut frame = RgbaImage::new(1920, 1080);
        let region = config.weapon_region;
        for (x, y, p) in noise(4, region.width(), region.height()).enumerate_pixels() {
            frame.put_pixel(
                region.left() as u32 + x,
                region.top() as u32 + y,
                Rgba([p[0], p[0], p[0], 255]),
            );
        }
        (config, Arc::new(FrameGrabber::with_frame(frame)))
    }

    #[test]
    fn test_capture_template_writes_captured_file() {
        let tmp = tempfile::tempdir().unwrap();
        let (config, grabber) = setup(tmp.path());
        let tools = Tools::new(&config, grabber);

        let path = tools
            .capture_template(CaptureTarget::Menu, Duration::ZERO)
            .unwrap();
        assert_eq!(path, tmp.path().join("captured").join("menu.png"));

        let saved = image::open(&path).unwrap();
        assert_eq!((saved.width(), saved.height()), (20, 20));
    }

    #[test]
    fn test_save_capture_without_template() {
        let tmp = tempfile::tempdir().unwrap();
        let (config, grabber) = setup(tmp.path());
        let tools = Tools::new(&config, grabber);

        let report = tools.save_capture(CaptureTarget::Weapon).unwrap();
        assert!(report.path.ends_with("previews/debug_weapon.png"));
        assert!(report.path.is_file());
        assert_eq!(report.distance, None);
        assert_eq!(report.would_detect(), None);
        assert!(report.comparison.is_none());
    }

    #[test]
    fn test_save_capture_compares_against_template() {
        let tmp = tempfile::tempdir().unwrap();
        let (config, grabber) = setup(tmp.path());
        let region = config.weapon_region;
        let dir = tmp.path().join("templates");
        fs::create_dir_all(&dir).unwrap();
        noise(4, region.width(), region.height())
            .save(dir.join("burletta_slot2.png"))
            .unwrap();

        let tools = Tools::new(&config, grabber);
        let report = tools.save_capture(CaptureTarget::Weapon).unwrap();

        assert_eq!(report.distance, Some(0));
        assert_eq!(report.would_detect(), Some(true));
        let comparison = image::open(report.comparison.unwrap()).unwrap().to_rgb8();
        assert_eq!(comparison.width(), region.width() * 2 + PANEL_PADDING * 3);

        // Frame pixel just left of the capture is green
        let frame_x = region.width() + PANEL_PADDING * 2 - 1;
        assert_eq!(*comparison.get_pixel(frame_x, PANEL_PADDING + 1), MATCH_COLOR);
    }

    #[test]
    fn test_preview_honours_frame_budget_and_stop() {
        let tmp = tempfile::tempdir().unwrap();
        let (config, grabber) = setup(tmp.path());
        let region = config.weapon_region;
        let dir = tmp.path().join("captured");
        fs::create_dir_all(&dir).unwrap();
        noise(4, region.width(), region.height())
            .save(dir.join("kettle_slot2.png"))
            .unwrap();

        let tools = Tools::new(&config, grabber);
        let stop = AtomicBool::new(false);
        let samples = tools.preview(PreviewTarget::Both, &stop, Some(2));
        assert_eq!(
            samples,
            vec![PreviewSample {
                target: CaptureTarget::Weapon,
                detected: true,
                distance: 0,
            }]
        );

        stop.store(true, Ordering::SeqCst);
        assert!(tools.preview(PreviewTarget::Weapon, &stop, None).is_empty());
    }

    #[test]
    fn test_missing_capture_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let (config, _) = setup(tmp.path());
        let tools = Tools::new(&config, Arc::new(FrameGrabber::new()));
        assert!(tools.save_capture(CaptureTarget::Menu).is_err());
    }
}
