//! Configuration module
//!
//! Handles user settings and turns them into a validated session
//! configuration in a single normalization pass.

pub mod settings;

use std::path::PathBuf;
use std::time::Duration;

pub use settings::{Overrides, Settings, WindowSettings};

use crate::autoclick::DelayProfile;
use crate::vision::{Region, VisionError, SUPPORTED_HASH_SIZES};

/// Configuration errors, fatal to starting a session
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid {name} region: {source}")]
    InvalidRegion {
        name: &'static str,
        #[source]
        source: VisionError,
    },
    #[error("{name} region {region} lies outside the {width}x{height} screen")]
    RegionOutOfBounds {
        name: &'static str,
        region: Region,
        width: u32,
        height: u32,
    },
    #[error("Unsupported hash size {0} (expected one of 8, 16, 32)")]
    UnsupportedHashSize(u32),
    #[error("Invalid delays for weapon '{weapon}': min must not exceed max")]
    InvalidDelays { weapon: String },
    #[error("Invalid {name} interval {value}s: must be positive")]
    InvalidInterval { name: &'static str, value: f64 },
    #[error("No enabled weapons configured")]
    NoEnabledWeapons,
    #[error("No weapon templates loaded - add weapon template images to the images folder")]
    NoWeaponTemplates,
    #[error("Config file {path}: {reason}")]
    Io { path: PathBuf, reason: String },
}

/// A weapon after defaults have been applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeaponConfig {
    pub id: String,
    pub name: String,
    pub slot1_template: String,
    pub slot2_template: String,
    pub profile: String,
    pub delays: DelayProfile,
}

/// Fully validated configuration consumed by a detection session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Weapon region, single slot or second slot
    pub weapon_region: Region,
    /// Weapon region, first slot
    pub weapon_region_alt: Region,
    /// Quick menu region
    pub menu_region: Region,
    /// Screen size the regions must fit in
    pub screen: (u32, u32),
    pub hash_threshold: u32,
    pub hash_size: u32,
    /// Enabled weapons only
    pub weapons: Vec<WeaponConfig>,
    pub loop_interval: Duration,
    pub inactive_interval: Duration,
    pub window: WindowSettings,
    pub image_dir: PathBuf,
    pub debug: bool,
}

impl Settings {
    /// Validate and flatten the settings
    pub fn normalize(&self) -> Result<SessionConfig, ConfigError> {
        let [width, height] = self.regions.screen_resolution;
        let screen = Region::screen(width, height).map_err(|source| ConfigError::InvalidRegion {
            name: "screen",
            source,
        })?;

        let region = |name: &'static str, raw: [i32; 4]| -> Result<Region, ConfigError> {
            let region = Region::try_from(raw)
                .map_err(|source| ConfigError::InvalidRegion { name, source })?;
            if !screen.contains(&region) {
                return Err(ConfigError::RegionOutOfBounds {
                    name,
                    region,
                    width,
                    height,
                });
            }
            Ok(region)
        };

        let weapon_region = region("weapon", self.regions.weapon)?;
        let weapon_region_alt = region("weapon_alt", self.regions.weapon_alt)?;
        let menu_region = region("menu", self.regions.menu)?;

        if !SUPPORTED_HASH_SIZES.contains(&self.detection.hash_size) {
            return Err(ConfigError::UnsupportedHashSize(self.detection.hash_size));
        }

        let interval = |name: &'static str, value: f64| -> Result<Duration, ConfigError> {
            if value.is_finite() && value > 0.0 {
                Ok(Duration::from_secs_f64(value))
            } else {
                Err(ConfigError::InvalidInterval { name, value })
            }
        };
        let loop_interval = interval("detection", self.timings.detection_loop)?;
        let inactive_interval = interval("inactive", self.timings.inactive_loop)?;

        let mut weapons = Vec::new();
        for (id, weapon) in self.weapons.iter().filter(|(_, w)| w.enabled) {
            let (delays, profile) = weapon.resolve_delays();
            if !delays.is_valid() {
                return Err(ConfigError::InvalidDelays { weapon: id.clone() });
            }

            let (slot1_template, slot2_template) = weapon.template_files(id);
            weapons.push(WeaponConfig {
                id: id.clone(),
                name: weapon.display_name(id),
                slot1_template,
                slot2_template,
                profile,
                delays,
            });
        }

        if weapons.is_empty() {
            return Err(ConfigError::NoEnabledWeapons);
        }

        Ok(SessionConfig {
            weapon_region,
            weapon_region_alt,
            menu_region,
            screen: (width, height),
            hash_threshold: self.detection.hash_threshold,
            hash_size: self.detection.hash_size,
            weapons,
            loop_interval,
            inactive_interval,
            window: self.window.clone(),
            image_dir: self.image_dir.clone(),
            debug: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_normalize() {
        let config = Settings::default().normalize().unwrap();
        assert_eq!(config.weapons.len(), 2);
        assert_eq!(config.loop_interval, Duration::from_millis(300));
        assert_eq!(config.inactive_interval, Duration::from_millis(500));
        assert_eq!(config.weapon_region.width(), 63);
    }

    #[test]
    fn test_malformed_region_is_rejected() {
        let mut settings = Settings::default();
        settings.regions.menu = [970, 372, 950, 392];
        assert!(matches!(
            settings.normalize(),
            Err(ConfigError::InvalidRegion { name: "menu", .. })
        ));
    }

    #[test]
    fn test_off_screen_region_is_rejected() {
        let mut settings = Settings::default();
        settings.regions.weapon = [1900, 1000, 1950, 1100];
        assert!(matches!(
            settings.normalize(),
            Err(ConfigError::RegionOutOfBounds { name: "weapon", .. })
        ));
    }

    #[test]
    fn test_hash_size_must_be_supported() {
        let mut settings = Settings::default();
        settings.detection.hash_size = 12;
        assert!(matches!(
            settings.normalize(),
            Err(ConfigError::UnsupportedHashSize(12))
        ));
    }

    #[test]
    fn test_inverted_delays_are_rejected() {
        let mut settings = Settings::default();
        let kettle = settings.weapons.get_mut("kettle").unwrap();
        kettle.profile = settings::CUSTOM_PROFILE.to_string();
        kettle.delays = Some(DelayProfile {
            press_min: 80,
            press_max: 40,
            release_min: 10,
            release_max: 20,
        });
        assert!(matches!(
            settings.normalize(),
            Err(ConfigError::InvalidDelays { weapon }) if weapon == "kettle"
        ));
    }

    #[test]
    fn test_disabled_weapons_are_dropped() {
        let mut settings = Settings::default();
        settings.weapons.get_mut("burletta").unwrap().enabled = false;
        let config = settings.normalize().unwrap();
        assert_eq!(config.weapons.len(), 1);
        assert_eq!(config.weapons[0].id, "kettle");

        settings.weapons.get_mut("kettle").unwrap().enabled = false;
        assert!(matches!(settings.normalize(), Err(ConfigError::NoEnabledWeapons)));
    }

    #[test]
    fn test_non_positive_interval_is_rejected() {
        let mut settings = Settings::default();
        settings.timings.detection_loop = 0.0;
        assert!(matches!(
            settings.normalize(),
            Err(ConfigError::InvalidInterval { name: "detection", .. })
        ));
    }
}
