//! Pumps global mouse events into the engine

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver};

use super::engine::AutoClicker;
use super::input::MouseListener;
use super::{ButtonEvent, EventOrigin, InputError};

/// Running event pump
///
/// The pump exits once every sender of its channel is gone.
pub struct InputObserver {
    handle: Option<JoinHandle<()>>,
}

impl InputObserver {
    /// Start `listener` and forward its events to `engine`
    pub fn start(
        listener: &dyn MouseListener,
        engine: Arc<AutoClicker>,
    ) -> Result<Self, InputError> {
        let (tx, rx) = unbounded();
        let observer = Self::pump(rx, engine)?;
        listener.spawn(tx)?;
        log::info!("Mouse listener started");
        Ok(observer)
    }

    /// Pump events from an existing channel
    pub fn pump(events: Receiver<ButtonEvent>, engine: Arc<AutoClicker>) -> Result<Self, InputError> {
        let handle = thread::Builder::new()
            .name("input-pump".to_string())
            .spawn(move || {
                for event in events {
                    if engine.handle_event(event) == EventOrigin::Real {
                        log::debug!("Real mouse {:?}", event);
                    }
                }
                log::debug!("Input pump exited");
            })
            .map_err(|e| InputError::Unavailable(format!("input pump thread: {}", e)))?;

        Ok(Self {
            handle: Some(handle),
        })
    }

    /// Wait for the pump to drain after all senders are dropped
    pub fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Input pump panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autoclick::{ClickControl, MacroActivity};
    use crossbeam_channel::Sender;

    struct Inactive;

    impl MacroActivity for Inactive {
        fn is_active(&self) -> bool {
            false
        }
    }

    struct NoopInjector;

    impl crate::autoclick::InputInjector for NoopInjector {
        fn press(&self) -> Result<(), InputError> {
            Ok(())
        }

        fn release(&self) -> Result<(), InputError> {
            Ok(())
        }

        fn name(&self) -> &'static str {
            "noop"
        }
    }

    struct ScriptedListener(Vec<ButtonEvent>);

    impl MouseListener for ScriptedListener {
        fn spawn(&self, events: Sender<ButtonEvent>) -> Result<(), InputError> {
            for event in &self.0 {
                let _ = events.send(*event);
            }
            Ok(())
        }
    }

    #[test]
    fn test_pump_tracks_real_button_state() {
        let engine = Arc::new(AutoClicker::new(Arc::new(NoopInjector), Arc::new(Inactive)));
        let listener = ScriptedListener(vec![
            ButtonEvent::Press,
            ButtonEvent::Release,
            ButtonEvent::Press,
        ]);

        // The scripted listener drops its sender after replaying, so the pump drains and exits
        let observer = InputObserver::start(&listener, Arc::clone(&engine)).unwrap();
        observer.join();

        assert!(engine.is_button_held());
        assert!(!engine.is_running());
    }

    #[test]
    fn test_pump_over_manual_channel() {
        let engine = Arc::new(AutoClicker::new(Arc::new(NoopInjector), Arc::new(Inactive)));
        let (tx, rx) = unbounded();
        let observer = InputObserver::pump(rx, Arc::clone(&engine)).unwrap();

        tx.send(ButtonEvent::Press).unwrap();
        drop(tx);
        observer.join();

        assert!(engine.is_button_held());
    }
}
