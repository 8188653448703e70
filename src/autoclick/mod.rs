//! Auto-click engine
//!
//! While the macro is active and the physical left button is held, a worker
//! thread injects press/release pairs with randomized timing. The engine sees
//! its own injections come back through the global mouse hook and uses the
//! echo counters in [`echo`] to tell them apart from the user's clicks.

pub mod echo;
pub mod engine;
pub mod input;
pub mod observer;
pub mod timing;

use std::sync::Arc;

pub use echo::EchoFilter;
pub use engine::AutoClicker;
pub use input::{desktop_listener, probe_injector, InputInjector, MouseListener};
pub use observer::InputObserver;
pub use timing::{DelayProfile, Humanizer};

/// Left-button transitions seen by the global hook
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEvent {
    Press,
    Release,
}

/// How an observed event was classified
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOrigin {
    /// The user's own click
    Real,
    /// An echo of something the engine injected
    Synthetic,
}

/// Read-only view of whether the macro is currently active
pub trait MacroActivity: Send + Sync {
    fn is_active(&self) -> bool;
}

/// Controls the detection loop needs over the click engine
pub trait ClickControl: Send + Sync {
    /// Use a new delay profile from the next click cycle on
    fn set_delays(&self, profile: DelayProfile);
    /// Start clicking if the physical button is already held
    fn start_if_button_pressed(&self);
    /// Stop clicking, waiting a bounded time for the worker
    fn stop(&self);
    /// Whether the click worker is running
    fn is_running(&self) -> bool;
    /// Whether the physical button is held, as far as real events tell
    fn is_button_held(&self) -> bool;
    /// Whether injection has failed and clicking is disabled
    fn is_faulted(&self) -> bool;
}

/// Callback receiving human-readable injection failures
pub type ErrorCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Input subsystem errors
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("Input injection unavailable: {0}")]
    Unavailable(String),
    #[error("Input injection failed: {0}")]
    Injection(String),
}
