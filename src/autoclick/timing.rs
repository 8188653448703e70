//! Randomized click timing
//!
//! Press and release durations are drawn independently each cycle so the
//! click train never settles into a fixed period.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Press/release duration bounds in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayProfile {
    /// Shortest time the button is held down
    #[serde(rename = "click_down_min")]
    pub press_min: u64,
    /// Longest time the button is held down
    #[serde(rename = "click_down_max")]
    pub press_max: u64,
    /// Shortest gap before the next press
    #[serde(rename = "click_up_min")]
    pub release_min: u64,
    /// Longest gap before the next press
    #[serde(rename = "click_up_max")]
    pub release_max: u64,
}

impl DelayProfile {
    /// Used when a weapon names neither a preset nor custom delays
    pub const FALLBACK: DelayProfile = DelayProfile {
        press_min: 54,
        press_max: 64,
        release_min: 54,
        release_max: 64,
    };

    /// Both ranges are non-empty
    pub fn is_valid(&self) -> bool {
        self.press_min <= self.press_max && self.release_min <= self.release_max
    }
}

impl Default for DelayProfile {
    fn default() -> Self {
        Self::FALLBACK
    }
}

impl std::fmt::Display for DelayProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "down={}-{}ms, up={}-{}ms",
            self.press_min, self.press_max, self.release_min, self.release_max
        )
    }
}

/// Random duration source for the click loop
pub struct Humanizer {
    rng: rand::rngs::ThreadRng,
}

impl Default for Humanizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Humanizer {
    /// Create a new humanizer
    pub fn new() -> Self {
        Self {
            rng: rand::thread_rng(),
        }
    }

    /// How long to hold the button for this cycle
    pub fn press_duration(&mut self, profile: &DelayProfile) -> Duration {
        self.uniform_ms(profile.press_min, profile.press_max)
    }

    /// How long to wait after releasing
    pub fn release_duration(&mut self, profile: &DelayProfile) -> Duration {
        self.uniform_ms(profile.release_min, profile.release_max)
    }

    fn uniform_ms(&mut self, min: u64, max: u64) -> Duration {
        // Inverted bounds are rejected at config time; clamp rather than panic
        let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
        Duration::from_millis(self.rng.gen_range(lo..=hi))
    }
}
