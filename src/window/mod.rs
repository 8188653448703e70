//! Foreground window checks
//!
//! Detection only runs while the game owns the foreground window.

pub mod title;

use std::sync::Arc;

pub use title::{clean_window_title, TitleMatcher};

use crate::config::WindowSettings;

/// Answers whether the game is the foreground window
pub trait FocusOracle: Send + Sync {
    fn is_target_focused(&self) -> bool;

    /// Title of the foreground window, for diagnostics
    fn foreground_title(&self) -> Option<String> {
        None
    }
}

/// Oracle for platforms without foreground queries, or when focus is not required
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysFocused;

impl FocusOracle for AlwaysFocused {
    fn is_target_focused(&self) -> bool {
        true
    }
}

/// Checks the foreground window title against a [`TitleMatcher`]
#[cfg(windows)]
pub struct ForegroundWindow {
    matcher: TitleMatcher,
}

#[cfg(windows)]
impl ForegroundWindow {
    pub fn new(matcher: TitleMatcher) -> Self {
        Self { matcher }
    }
}

#[cfg(windows)]
impl FocusOracle for ForegroundWindow {
    fn is_target_focused(&self) -> bool {
        self.foreground_title()
            .is_some_and(|title| self.matcher.matches(&title))
    }

    fn foreground_title(&self) -> Option<String> {
        use windows::Win32::UI::WindowsAndMessaging::{
            GetForegroundWindow, GetWindowTextLengthW, GetWindowTextW,
        };

        unsafe {
            let hwnd = GetForegroundWindow();
            if hwnd.0 == 0 {
                return None;
            }
            let length = GetWindowTextLengthW(hwnd);
            if length <= 0 {
                return Some(String::new());
            }
            let mut buffer = vec![0u16; (length + 1) as usize];
            let copied = GetWindowTextW(hwnd, &mut buffer).max(0) as usize;
            Some(String::from_utf16_lossy(&buffer[..copied.min(length as usize)]))
        }
    }
}

/// Focus oracle for the configured target window
pub fn focus_oracle(settings: &WindowSettings) -> Arc<dyn FocusOracle> {
    if !settings.require_focus {
        return Arc::new(AlwaysFocused);
    }

    #[cfg(windows)]
    {
        Arc::new(ForegroundWindow::new(TitleMatcher::from_settings(settings)))
    }

    #[cfg(not(windows))]
    {
        log::warn!("Foreground window checks are only available on Windows; assuming focus");
        Arc::new(AlwaysFocused)
    }
}
