//! Detection state machine
//!
//! The macro is active exactly when some weapon matches and the quick menu
//! does not. Ticks are driven by the session loop.

use std::sync::Arc;

use image::GrayImage;

use super::templates::{Slot, TemplateStore};
use super::ActivationFlag;
use crate::autoclick::{ClickControl, MacroActivity};
use crate::config::{ConfigError, SessionConfig};
use crate::vision::{HashDetector, Region, ScreenGrabber, MAX_DISTANCE};

/// Best weapon for one slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotMatch {
    /// Index of the matched weapon, if any weapon was within the threshold
    pub weapon: Option<usize>,
    /// Lowest distance seen in this slot, matched or not
    pub distance: u32,
}

impl SlotMatch {
    pub const NONE: SlotMatch = SlotMatch {
        weapon: None,
        distance: MAX_DISTANCE,
    };
}

/// The weapon chosen across both slots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeaponMatch {
    pub weapon: usize,
    pub slot: Slot,
    pub distance: u32,
}

/// Result of one detection pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Detection {
    pub winner: Option<WeaponMatch>,
    pub slot2: SlotMatch,
    pub slot1: SlotMatch,
    pub menu_detected: bool,
    pub menu_distance: u32,
}

impl Detection {
    /// Nothing seen, used when the primary capture fails
    pub const NOTHING: Detection = Detection {
        winner: None,
        slot2: SlotMatch::NONE,
        slot1: SlotMatch::NONE,
        menu_detected: false,
        menu_distance: MAX_DISTANCE,
    };

    pub fn weapon_detected(&self) -> bool {
        self.winner.is_some()
    }
}

/// Externally visible state, reported when it changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub weapon_detected: bool,
    pub menu_detected: bool,
    pub active: bool,
    /// Display name of the detected weapon
    pub weapon: Option<String>,
}

impl Observation {
    fn same_state(&self, other: &Observation) -> bool {
        self.weapon_detected == other.weapon_detected
            && self.menu_detected == other.menu_detected
            && self.active == other.active
    }
}

/// Pick the best in-threshold weapon from `(index, (matched, distance))` pairs
///
/// Only a strictly lower distance replaces the current best, so the first
/// weapon wins ties.
pub fn best_slot_match(results: impl IntoIterator<Item = (usize, (bool, u32))>) -> SlotMatch {
    let mut best = SlotMatch::NONE;
    for (index, (matched, distance)) in results {
        if distance < best.distance {
            best.distance = distance;
            if matched {
                best.weapon = Some(index);
            }
        }
    }
    best
}

/// Choose between the slot 2 and slot 1 matches; slot 2 wins ties
pub fn resolve_winner(slot2: SlotMatch, slot1: SlotMatch) -> Option<WeaponMatch> {
    let pick = |slot: Slot, m: SlotMatch| {
        m.weapon.map(|weapon| WeaponMatch {
            weapon,
            slot,
            distance: m.distance,
        })
    };

    match (slot2.weapon, slot1.weapon) {
        (Some(_), Some(_)) if slot1.distance < slot2.distance => pick(Slot::One, slot1),
        (Some(_), _) => pick(Slot::Two, slot2),
        (None, _) => pick(Slot::One, slot1),
    }
}

/// Detection state machine
pub struct DetectionStateMachine {
    detector: HashDetector,
    grabber: Arc<dyn ScreenGrabber>,
    clicker: Arc<dyn ClickControl>,
    activation: Arc<ActivationFlag>,
    templates: TemplateStore,
    weapon_region: Region,
    weapon_region_alt: Region,
    menu_region: Region,
    /// Weapon whose delays the engine currently uses
    applied_weapon: Option<usize>,
    last_observation: Option<Observation>,
}

impl DetectionStateMachine {
    pub fn new(
        config: &SessionConfig,
        detector: HashDetector,
        templates: TemplateStore,
        grabber: Arc<dyn ScreenGrabber>,
        clicker: Arc<dyn ClickControl>,
        activation: Arc<ActivationFlag>,
    ) -> Self {
        Self {
            detector,
            grabber,
            clicker,
            activation,
            templates,
            weapon_region: config.weapon_region,
            weapon_region_alt: config.weapon_region_alt,
            menu_region: config.menu_region,
            applied_weapon: None,
            last_observation: None,
        }
    }

    /// Fail unless at least one weapon template loaded
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.templates.has_weapons() {
            Ok(())
        } else {
            Err(ConfigError::NoWeaponTemplates)
        }
    }

    pub fn templates(&self) -> &TemplateStore {
        &self.templates
    }

    pub fn detector(&self) -> &HashDetector {
        &self.detector
    }

    pub fn is_active(&self) -> bool {
        self.activation.is_active()
    }

    /// Name of the weapon whose delays are applied
    pub fn current_weapon(&self) -> Option<&str> {
        self.applied_weapon
            .and_then(|i| self.templates.weapons().get(i))
            .map(|w| w.name.as_str())
    }

    /// Capture, compare and update the activation state
    ///
    /// Returns an observation when the detected state changed.
    pub fn tick(&mut self) -> Option<Observation> {
        let detection = self.detect();
        self.apply(&detection)
    }

    /// Run one detection pass without changing any state
    pub fn detect(&self) -> Detection {
        let grabber = self.grabber.as_ref();

        let Some(primary) = self.detector.capture_region(grabber, self.weapon_region) else {
            log::debug!("Weapon capture failed, skipping tick");
            return Detection::NOTHING;
        };
        let secondary = if self.templates.has_weapons() {
            self.detector.capture_region(grabber, self.weapon_region_alt)
        } else {
            None
        };

        let slot2 = self.match_slot(&primary, Slot::Two);
        let slot1 = secondary
            .map(|image| self.match_slot(&image, Slot::One))
            .unwrap_or(SlotMatch::NONE);

        let (menu_detected, menu_distance) = match self.templates.menu() {
            Some(menu) => {
                let image = self.detector.capture_region(grabber, self.menu_region);
                self.detector.detect_hash(image.as_ref(), Some(&menu.hash))
            }
            None => (false, MAX_DISTANCE),
        };

        Detection {
            winner: resolve_winner(slot2, slot1),
            slot2,
            slot1,
            menu_detected,
            menu_distance,
        }
    }

    fn match_slot(&self, image: &GrayImage, slot: Slot) -> SlotMatch {
        let current = match self.detector.calculate_gray_hash(image) {
            Ok(hash) => hash,
            Err(e) => {
                log::debug!("Failed to hash {} capture: {}", slot, e);
                return SlotMatch::NONE;
            }
        };

        best_slot_match(
            self.templates
                .weapons()
                .iter()
                .enumerate()
                .filter_map(|(i, weapon)| {
                    weapon
                        .hash_for_slot(slot)
                        .map(|template| (i, self.detector.compare(&current, template)))
                }),
        )
    }

    /// Apply a detection pass to the activation state
    pub fn apply(&mut self, detection: &Detection) -> Option<Observation> {
        if let Some(winner) = detection.winner {
            self.apply_weapon_delays(winner.weapon);
        }

        let weapon_detected = detection.weapon_detected();
        let weapon_name = detection
            .winner
            .and_then(|w| self.templates.weapons().get(w.weapon))
            .map(|w| w.name.clone());

        log::debug!(
            "Weapon: {} (slot2={}, slot1={}), detected={} | Menu: dist={}, detected={} | Left btn: {} | Auto-click: {}",
            weapon_name.as_deref().unwrap_or("None"),
            detection.slot2.distance,
            detection.slot1.distance,
            weapon_detected,
            detection.menu_distance,
            detection.menu_detected,
            self.clicker.is_button_held(),
            self.clicker.is_running()
        );

        if weapon_detected && !detection.menu_detected {
            self.activate();
        } else {
            self.deactivate();
            if weapon_detected {
                log::debug!("Macro paused: menu is open");
            }
        }

        let observation = Observation {
            weapon_detected,
            menu_detected: detection.menu_detected,
            active: self.is_active(),
            weapon: weapon_name,
        };

        let changed = self
            .last_observation
            .as_ref()
            .map_or(true, |last| !last.same_state(&observation));
        self.last_observation = Some(observation.clone());

        changed.then_some(observation)
    }

    /// Hand the weapon's delays to the engine unless they are already in use
    fn apply_weapon_delays(&mut self, index: usize) {
        if self.applied_weapon == Some(index) {
            return;
        }
        let Some(weapon) = self.templates.weapons().get(index) else {
            return;
        };

        self.clicker.set_delays(weapon.delays);
        self.applied_weapon = Some(index);
        log::info!("Switched to {}: {}", weapon.name, weapon.delays);
    }

    fn activate(&mut self) {
        if self.is_active() {
            return;
        }
        self.activation.set(true);
        log::info!("Macro activated (auto-click enabled)");
        if self.clicker.is_faulted() {
            log::error!("Auto-click is disabled after an input failure; detection continues");
        }
        self.clicker.start_if_button_pressed();
    }

    /// Deactivate the macro and stop clicking
    pub fn deactivate(&mut self) {
        if !self.is_active() {
            return;
        }
        self.activation.set(false);
        self.clicker.stop();
        log::info!("Macro deactivated (auto-click disabled)");
    }

    /// Deactivate and make sure the click worker is gone
    pub fn shutdown(&mut self) {
        self.deactivate();
        self.clicker.stop();
    }
}
