//! Synthetic echo accounting
//!
//! Every press or release the engine injects comes back through the global
//! mouse hook. The click loop records each injection here before sending it,
//! and the observer consumes one record per echo, so only events with no
//! outstanding record are treated as the user's own.

use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Pending {
    presses: u32,
    releases: u32,
}

/// Lock-guarded pair of pending synthetic event counters
#[derive(Debug, Default)]
pub struct EchoFilter {
    pending: Mutex<Pending>,
}

impl EchoFilter {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a press about to be injected
    pub fn expect_press(&self) {
        let mut pending = self.lock();
        pending.presses = pending.presses.saturating_add(1);
    }

    /// Record a release about to be injected
    pub fn expect_release(&self) {
        let mut pending = self.lock();
        pending.releases = pending.releases.saturating_add(1);
    }

    /// Consume one pending press; true if the observed press was ours
    pub fn take_press(&self) -> bool {
        let mut pending = self.lock();
        if pending.presses > 0 {
            pending.presses -= 1;
            true
        } else {
            false
        }
    }

    /// Consume one pending release; true if the observed release was ours
    pub fn take_release(&self) -> bool {
        let mut pending = self.lock();
        if pending.releases > 0 {
            pending.releases -= 1;
            true
        } else {
            false
        }
    }

    /// Clear both counters
    pub fn reset(&self) {
        *self.lock() = Pending::default();
    }

    /// Current (presses, releases) outstanding
    pub fn pending(&self) -> (u32, u32) {
        let pending = self.lock();
        (pending.presses, pending.releases)
    }
}
