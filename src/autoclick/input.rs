//! Mouse injection and observation backends
//!
//! The engine only sees the `InputInjector` and `MouseListener` traits. The
//! desktop implementations sit behind the `desktop` feature and go through
//! `rdev`, which both injects events and hooks the global event stream.

use std::sync::Arc;

use crossbeam_channel::Sender;

use super::{ButtonEvent, InputError};

/// Emits synthetic left-button events
pub trait InputInjector: Send + Sync {
    /// Press the left button
    fn press(&self) -> Result<(), InputError>;
    /// Release the left button
    fn release(&self) -> Result<(), InputError>;
    /// Backend name for logs
    fn name(&self) -> &'static str;
}

/// Source of real (and echoed) left-button events
pub trait MouseListener: Send + Sync {
    /// Start forwarding left-button events into `events`
    fn spawn(&self, events: Sender<ButtonEvent>) -> Result<(), InputError>;
}

/// Probe the injection backend once
///
/// Fails when this build has no backend or the display cannot be reached.
pub fn probe_injector() -> Result<Arc<dyn InputInjector>, InputError> {
    #[cfg(feature = "desktop")]
    {
        rdev::display_size()
            .map_err(|e| InputError::Unavailable(format!("no display: {:?}", e)))?;
        Ok(Arc::new(desktop::RdevInjector))
    }

    #[cfg(not(feature = "desktop"))]
    {
        Err(InputError::Unavailable(
            "built without the `desktop` feature".to_string(),
        ))
    }
}

/// Global mouse listener for this build
pub fn desktop_listener() -> Result<Arc<dyn MouseListener>, InputError> {
    #[cfg(feature = "desktop")]
    {
        Ok(Arc::new(desktop::RdevListener))
    }

    #[cfg(not(feature = "desktop"))]
    {
        Err(InputError::Unavailable(
            "built without the `desktop` feature".to_string(),
        ))
    }
}

#[cfg(feature = "desktop")]
mod desktop {
    use std::thread;

    use crossbeam_channel::Sender;
    use rdev::{listen, simulate, Button, Event, EventType};

    use super::{InputInjector, MouseListener};
    use crate::autoclick::{ButtonEvent, InputError};

    pub struct RdevInjector;

    impl RdevInjector {
        fn send(&self, event: &EventType) -> Result<(), InputError> {
            simulate(event).map_err(|e| InputError::Injection(format!("{:?}", e)))
        }
    }

    impl InputInjector for RdevInjector {
        fn press(&self) -> Result<(), InputError> {
            self.send(&EventType::ButtonPress(Button::Left))
        }

        fn release(&self) -> Result<(), InputError> {
            self.send(&EventType::ButtonRelease(Button::Left))
        }

        fn name(&self) -> &'static str {
            "rdev"
        }
    }

    pub struct RdevListener;

    impl MouseListener for RdevListener {
        fn spawn(&self, events: Sender<ButtonEvent>) -> Result<(), InputError> {
            thread::Builder::new()
                .name("mouse-listener".to_string())
                .spawn(move || {
                    let callback = move |event: Event| {
                        let forwarded = match event.event_type {
                            EventType::ButtonPress(Button::Left) => ButtonEvent::Press,
                            EventType::ButtonRelease(Button::Left) => ButtonEvent::Release,
                            _ => return,
                        };
                        // Receiver gone means the session ended
                        let _ = events.send(forwarded);
                    };

                    if let Err(error) = listen(callback) {
                        log::error!("Mouse listener stopped: {:?}", error);
                    }
                })
                .map(|_| ())
                .map_err(|e| InputError::Unavailable(format!("listener thread: {}", e)))
        }
    }
}
