//! Weapon and menu detection
//!
//! Each tick compares both weapon slots and the quick menu against their
//! templates and turns the result into the macro activation flag read by
//! the auto-click engine.

pub mod state;
pub mod templates;

use std::sync::atomic::{AtomicBool, Ordering};

pub use state::{
    best_slot_match, resolve_winner, Detection, DetectionStateMachine, Observation, SlotMatch,
    WeaponMatch,
};
pub use templates::{
    DirectoryResolver, Slot, Template, TemplateResolver, TemplateStore, WeaponTemplate,
    MENU_TEMPLATE,
};

use crate::autoclick::MacroActivity;

/// Macro activation flag
///
/// Only the state machine writes it; everything else reads it through
/// [`MacroActivity`].
#[derive(Debug, Default)]
pub struct ActivationFlag(AtomicBool);

impl ActivationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    fn set(&self, active: bool) {
        self.0.store(active, Ordering::SeqCst);
    }
}

impl MacroActivity for ActivationFlag {
    fn is_active(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
