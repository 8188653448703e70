//! User settings and weapon configurations
//!
//! Defines all configurable options as they appear in `config.json`. Every
//! section defaults independently, so a partial file is completed from the
//! built-in values on load.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::autoclick::DelayProfile;
use crate::vision::capture::regions;
use crate::vision::{Region, DEFAULT_HASH_SIZE, DEFAULT_HASH_THRESHOLD};

/// Main settings structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Root of the template image tree
    pub image_dir: PathBuf,
    /// Hash comparison settings
    pub detection: DetectionSettings,
    /// Capture regions
    pub regions: RegionSettings,
    /// Detection loop timing
    pub timings: TimingSettings,
    /// Foreground window matching
    pub window: WindowSettings,
    /// Weapons keyed by identifier
    pub weapons: BTreeMap<String, WeaponSettings>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            image_dir: PathBuf::from("images"),
            detection: DetectionSettings::default(),
            regions: RegionSettings::default(),
            timings: TimingSettings::default(),
            window: WindowSettings::default(),
            weapons: default_weapons(),
        }
    }
}

impl Settings {
    /// Load settings from a JSON file
    ///
    /// A missing file is created with the defaults. A file that cannot be
    /// parsed is left untouched and the defaults are used instead.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            let settings = Self::default();
            if let Err(e) = settings.save(path) {
                log::warn!("Could not write default config to {}: {}", path.display(), e);
            }
            return Ok(settings);
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        match serde_json::from_str(&content) {
            Ok(settings) => Ok(settings),
            Err(e) => {
                log::warn!(
                    "Error loading config {}: {} - using defaults",
                    path.display(),
                    e
                );
                Ok(Self::default())
            }
        }
    }

    /// Save settings as pretty-printed JSON
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                reason: e.to_string(),
            })?;
        }

        fs::write(path, json).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Apply command-line overrides on top of the loaded values
    pub fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some((width, height)) = overrides.screen {
            self.regions.rescale(width, height);
        }
        if let Some(region) = overrides.weapon_region {
            self.regions.weapon = region;
        }
        if let Some(region) = overrides.weapon_region_alt {
            self.regions.weapon_alt = region;
        }
        if let Some(region) = overrides.menu_region {
            self.regions.menu = region;
        }
        if let Some(threshold) = overrides.threshold {
            self.detection.hash_threshold = threshold;
        }
        if let Some(hash_size) = overrides.hash_size {
            self.detection.hash_size = hash_size;
        }
        if let Some(delay) = overrides.loop_delay {
            self.timings.detection_loop = delay;
        }
        if let Some(dir) = &overrides.image_dir {
            self.image_dir = dir.clone();
        }
    }
}

/// Values supplied on the command line
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub loop_delay: Option<f64>,
    pub threshold: Option<u32>,
    pub hash_size: Option<u32>,
    pub weapon_region: Option<[i32; 4]>,
    pub weapon_region_alt: Option<[i32; 4]>,
    pub menu_region: Option<[i32; 4]>,
    pub screen: Option<(u32, u32)>,
    pub image_dir: Option<PathBuf>,
}

/// Hash comparison settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionSettings {
    /// Maximum Hamming distance counted as a match
    pub hash_threshold: u32,
    /// Hash size (8, 16 or 32)
    pub hash_size: u32,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            hash_threshold: DEFAULT_HASH_THRESHOLD,
            hash_size: DEFAULT_HASH_SIZE,
        }
    }
}

/// Capture regions as (left, top, right, bottom)
///
/// Kept as plain tuples here; validation happens in `normalize`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionSettings {
    /// Weapon region, single slot or second slot
    pub weapon: [i32; 4],
    /// Weapon region, first slot
    pub weapon_alt: [i32; 4],
    /// Quick menu region
    pub menu: [i32; 4],
    /// Screen resolution the regions refer to
    pub screen_resolution: [u32; 2],
}

impl Default for RegionSettings {
    fn default() -> Self {
        Self {
            weapon: regions::WEAPON_SLOT2,
            weapon_alt: regions::WEAPON_SLOT1,
            menu: regions::MENU,
            screen_resolution: [regions::REFERENCE_RESOLUTION.0, regions::REFERENCE_RESOLUTION.1],
        }
    }
}

impl RegionSettings {
    /// Move every region to a new screen resolution proportionally
    pub fn rescale(&mut self, width: u32, height: u32) {
        let [from_w, from_h] = self.screen_resolution;
        if from_w > 0 && from_h > 0 && (from_w, from_h) != (width, height) {
            // Invalid regions are kept as they are and rejected by normalize
            let scale = |raw: [i32; 4]| -> [i32; 4] {
                Region::try_from(raw)
                    .and_then(|r| r.scaled((from_w, from_h), (width, height)))
                    .map(<[i32; 4]>::from)
                    .unwrap_or(raw)
            };
            self.weapon = scale(self.weapon);
            self.weapon_alt = scale(self.weapon_alt);
            self.menu = scale(self.menu);
        }
        self.screen_resolution = [width, height];
    }
}

/// Detection loop timing in seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingSettings {
    /// Delay between detection ticks while the game is focused
    pub detection_loop: f64,
    /// Delay between focus checks while the game is in the background
    pub inactive_loop: f64,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            detection_loop: 0.3,
            inactive_loop: 0.5,
        }
    }
}

/// Foreground window matching
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowSettings {
    /// Title of the game window
    pub target_title: String,
    /// Title substrings that rule a window out (editors, this tool itself)
    pub excluded_keywords: Vec<String>,
    /// Only run detection while the game window is in the foreground
    pub require_focus: bool,
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            target_title: "ARC Raiders".to_string(),
            excluded_keywords: [
                "cursor",
                "visual studio",
                "vscode",
                "code",
                "pycharm",
                "sublime",
                "notepad",
                "atom",
                "autofire",
                ".rs",
                "editor",
                "ide",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            require_focus: true,
        }
    }
}

/// Individual weapon configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeaponSettings {
    /// Whether this weapon is detected at all
    pub enabled: bool,
    /// Display name (defaults to the capitalized identifier)
    pub name: Option<String>,
    /// Base template filename (defaults to `<id>.png`)
    pub template: Option<String>,
    /// Explicit slot 1 template filename
    pub template_slot1: Option<String>,
    /// Explicit slot 2 template filename
    pub template_slot2: Option<String>,
    /// Selected preset key, or "custom"
    pub profile: String,
    /// Presets available for this weapon
    pub default_profiles: BTreeMap<String, DelayPreset>,
    /// Custom delays used when no preset is selected
    pub delays: Option<DelayProfile>,
}

impl Default for WeaponSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            name: None,
            template: None,
            template_slot1: None,
            template_slot2: None,
            profile: CUSTOM_PROFILE.to_string(),
            default_profiles: BTreeMap::new(),
            delays: None,
        }
    }
}

/// Key of the free-form delay profile
pub const CUSTOM_PROFILE: &str = "custom";

impl WeaponSettings {
    /// Display name for a weapon id
    pub fn display_name(&self, id: &str) -> String {
        self.name.clone().unwrap_or_else(|| capitalize(id))
    }

    /// Slot 1 and slot 2 template filenames
    pub fn template_files(&self, id: &str) -> (String, String) {
        let base = self
            .template
            .clone()
            .unwrap_or_else(|| format!("{}.png", id));
        let stem = match base.rsplit_once('.') {
            Some((stem, _)) => stem.to_string(),
            None => base,
        };

        (
            self.template_slot1
                .clone()
                .unwrap_or_else(|| format!("{}_slot1.png", stem)),
            self.template_slot2
                .clone()
                .unwrap_or_else(|| format!("{}_slot2.png", stem)),
        )
    }

    /// Delays for the selected profile, with the profile's display name
    pub fn resolve_delays(&self) -> (DelayProfile, String) {
        if let Some(preset) = self.default_profiles.get(&self.profile) {
            let name = preset
                .name
                .clone()
                .unwrap_or_else(|| capitalize(&self.profile));
            return (preset.delays, name);
        }

        (
            self.delays.unwrap_or(DelayProfile::FALLBACK),
            "Custom".to_string(),
        )
    }
}

/// A named delay preset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayPreset {
    /// Display name
    pub name: Option<String>,
    /// Delay bounds
    #[serde(default = "fallback_delays")]
    pub delays: DelayProfile,
}

fn fallback_delays() -> DelayProfile {
    DelayProfile::FALLBACK
}

fn capitalize(id: &str) -> String {
    let mut chars = id.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Weapons shipped with default templates
fn default_weapons() -> BTreeMap<String, WeaponSettings> {
    let preset = |name: &str, min: u64, max: u64| DelayPreset {
        name: Some(name.to_string()),
        delays: DelayProfile {
            press_min: min,
            press_max: max,
            release_min: min,
            release_max: max,
        },
    };

    let mut weapons = BTreeMap::new();
    weapons.insert(
        "kettle".to_string(),
        WeaponSettings {
            name: Some("Kettle".to_string()),
            profile: "standard".to_string(),
            default_profiles: BTreeMap::from([
                ("standard".to_string(), preset("Standard", 54, 64)),
                ("fast".to_string(), preset("Fast", 27, 37)),
            ]),
            ..Default::default()
        },
    );
    weapons.insert(
        "burletta".to_string(),
        WeaponSettings {
            name: Some("Burletta".to_string()),
            profile: "standard".to_string(),
            default_profiles: BTreeMap::from([
                ("standard".to_string(), preset("Standard", 44, 54)),
                ("fast".to_string(), preset("Fast", 30, 40)),
            ]),
            ..Default::default()
        },
    );
    weapons
}
