//! ARC AutoFire - weapon-aware auto-fire for ARC Raiders
//!
//! This library watches two small HUD regions and the quick menu through
//! perceptual hashes. While a known weapon is equipped and the menu is
//! closed, holding the left mouse button fires a stream of humanized clicks.
//!
//! ## Echo Filtering
//!
//! Injected clicks come back through the same global hook that reports the
//! user's clicks. The `autoclick` module counts its own injections so that
//! only real button changes start or stop the click loop.

pub mod autoclick;
pub mod config;
pub mod detection;
pub mod session;
pub mod tools;
pub mod vision;
pub mod window;

pub use config::{ConfigError, SessionConfig, Settings};
pub use session::{Backends, Session};

/// Errors that can end a session or a tool run
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    #[error(transparent)]
    Vision(#[from] vision::VisionError),
    #[error(transparent)]
    Input(#[from] autoclick::InputError),
}

pub type Result<T> = std::result::Result<T, Error>;
