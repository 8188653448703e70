//! Detection session
//!
//! Wires capture, templates, the state machine, the click engine and the
//! mouse observer together, then runs the focus-aware detection loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::autoclick::{
    desktop_listener, probe_injector, AutoClicker, ClickControl, ErrorCallback, InputError,
    InputInjector, InputObserver, MouseListener,
};
use crate::config::SessionConfig;
use crate::detection::{
    ActivationFlag, DetectionStateMachine, DirectoryResolver, Observation, TemplateResolver,
    TemplateStore,
};
use crate::vision::{desktop_grabber, HashDetector, ScreenGrabber};
use crate::window::{clean_window_title, focus_oracle, FocusOracle};
use crate::Result;

/// Longest single sleep between stop-flag checks
const STOP_POLL: Duration = Duration::from_millis(50);

/// Log the foreground title every this many unfocused checks
const WAITING_LOG_EVERY: u32 = 10;

/// Platform services a session runs on
pub struct Backends {
    pub grabber: Arc<dyn ScreenGrabber>,
    pub injector: Arc<dyn InputInjector>,
    pub listener: Arc<dyn MouseListener>,
    pub focus: Arc<dyn FocusOracle>,
    pub resolver: Arc<dyn TemplateResolver>,
}

impl Backends {
    /// Desktop capture, injection and focus backends
    ///
    /// Probes the injection backend once and fails if it is unusable.
    pub fn desktop(config: &SessionConfig) -> Result<Self> {
        let injector = probe_injector()?;
        log::info!("Input backend: {}", injector.name());

        let listener = desktop_listener()?;
        let grabber = desktop_grabber().ok_or_else(|| {
            InputError::Unavailable("screen capture needs the `desktop` feature".to_string())
        })?;

        Ok(Self {
            grabber,
            injector,
            listener,
            focus: focus_oracle(&config.window),
            resolver: Arc::new(DirectoryResolver::new(&config.image_dir)),
        })
    }
}

/// A running detection session
pub struct Session {
    config: SessionConfig,
    machine: DetectionStateMachine,
    engine: Arc<AutoClicker>,
    focus: Arc<dyn FocusOracle>,
    stop: Arc<AtomicBool>,
    // Held for the session's lifetime; the listener thread never returns
    _observer: InputObserver,
}

impl Session {
    /// Create a session on the desktop backends
    pub fn new(config: SessionConfig, on_error: Option<ErrorCallback>) -> Result<Self> {
        let backends = Backends::desktop(&config)?;
        Self::with_backends(config, backends, on_error)
    }

    /// Create a session on the given backends
    ///
    /// Fails when no weapon template could be loaded or the mouse listener
    /// cannot start.
    pub fn with_backends(
        config: SessionConfig,
        backends: Backends,
        on_error: Option<ErrorCallback>,
    ) -> Result<Self> {
        log::info!(
            "Weapon region (slot 2): {} ({}x{} pixels)",
            config.weapon_region,
            config.weapon_region.width(),
            config.weapon_region.height()
        );
        log::info!(
            "Weapon region (slot 1): {} ({}x{} pixels)",
            config.weapon_region_alt,
            config.weapon_region_alt.width(),
            config.weapon_region_alt.height()
        );
        log::info!(
            "Menu region: {} ({}x{} pixels)",
            config.menu_region,
            config.menu_region.width(),
            config.menu_region.height()
        );

        let detector = HashDetector::new(config.hash_threshold, config.hash_size);
        let templates = TemplateStore::load(&config, &detector, backends.resolver.as_ref());

        let activation = Arc::new(ActivationFlag::new());
        let engine = Arc::new(match on_error {
            Some(callback) => {
                AutoClicker::with_error_callback(backends.injector, activation.clone(), callback)
            }
            None => AutoClicker::new(backends.injector, activation.clone()),
        });

        let machine = DetectionStateMachine::new(
            &config,
            detector,
            templates,
            backends.grabber,
            engine.clone(),
            activation,
        );
        machine.validate()?;

        let observer = InputObserver::start(backends.listener.as_ref(), engine.clone())?;

        Ok(Self {
            config,
            machine,
            engine,
            focus: backends.focus,
            stop: Arc::new(AtomicBool::new(false)),
            _observer: observer,
        })
    }

    /// Flag that ends `run` once set
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn machine(&self) -> &DetectionStateMachine {
        &self.machine
    }

    pub fn engine(&self) -> &Arc<AutoClicker> {
        &self.engine
    }

    /// One detection tick
    pub fn run_once(&mut self) -> Option<Observation> {
        self.machine.tick()
    }

    /// Run the detection loop until the stop flag is raised
    pub fn run(&mut self) {
        self.log_startup();

        let mut unfocused_checks: u32 = 0;
        let mut last_title: Option<String> = None;

        while !self.stop.load(Ordering::SeqCst) {
            if !self.focus.is_target_focused() {
                self.machine.deactivate();

                if self.config.debug && unfocused_checks % WAITING_LOG_EVERY == 0 {
                    if let Some(title) = self.focus.foreground_title() {
                        if last_title.as_deref() != Some(title.as_str()) {
                            log::debug!("Waiting for game... Current: '{}'", clean_window_title(&title));
                            last_title = Some(title);
                        }
                    }
                }

                unfocused_checks = unfocused_checks.wrapping_add(1);
                self.sleep(self.config.inactive_interval);
                continue;
            }

            unfocused_checks = 0;
            last_title = None;

            if let Some(observation) = self.run_once() {
                log::info!(
                    "Weapon: {} | Menu: {} | Macro: {}",
                    observation.weapon.as_deref().unwrap_or("none"),
                    if observation.menu_detected { "open" } else { "closed" },
                    if observation.active { "ON" } else { "OFF" }
                );
            }

            self.sleep(self.config.loop_interval);
        }

        log::info!("Stopping...");
        self.shutdown();
    }

    /// Deactivate and stop the click worker
    pub fn shutdown(&mut self) {
        self.machine.shutdown();
        self.engine.stop();
        log::info!("Stopped");
    }

    fn sleep(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        while !self.stop.load(Ordering::SeqCst) {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep((deadline - now).min(STOP_POLL));
        }
    }

    fn log_startup(&self) {
        log::info!("=== ARC AutoFire ===");
        log::info!("Loop delay: {:?}", self.config.loop_interval);
        log::info!("Hash threshold: {}", self.machine.detector().threshold());

        let templates = self.machine.templates();
        for weapon in templates.weapons() {
            log::info!("  - {}: {}", weapon.name, weapon.delays);
        }
        if templates.menu().is_some() {
            log::info!("Menu detection ENABLED - macro pauses while the quick menu is open");
        } else {
            log::warn!("Menu detection DISABLED - no menu template loaded");
        }
        log::info!("Logic: macro ON only while a weapon is equipped and the menu is closed");
        log::info!("Hold the left mouse button to auto-fire while the macro is active");
        log::info!("Press Ctrl+C to stop");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autoclick::ButtonEvent;
    use crate::config::{ConfigError, Settings};
    use crate::vision::FrameGrabber;
    use crate::window::AlwaysFocused;
    use crate::Error;
    use crossbeam_channel::Sender;
    use image::{GrayImage, ImageBuffer, Luma, Rgba, RgbaImage};
    use std::path::Path;
    use std::sync::Mutex;

    struct NullInjector;

    impl InputInjector for NullInjector {
        fn press(&self) -> std::result::Result<(), InputError> {
            Ok(())
        }

        fn release(&self) -> std::result::Result<(), InputError> {
            Ok(())
        }

        fn name(&self) -> &'static str {
            "null"
        }
    }

    /// Keeps its sender so tests can push events later
    #[derive(Default)]
    struct ManualListener {
        sender: Mutex<Option<Sender<ButtonEvent>>>,
    }

    impl MouseListener for ManualListener {
        fn spawn(&self, events: Sender<ButtonEvent>) -> std::result::Result<(), InputError> {
            *self.sender.lock().unwrap() = Some(events);
            Ok(())
        }
    }

    struct BrokenListener;

    impl MouseListener for BrokenListener {
        fn spawn(&self, _events: Sender<ButtonEvent>) -> std::result::Result<(), InputError> {
            Err(InputError::Unavailable("no hook".to_string()))
        }
    }

    struct ToggleFocus(AtomicBool);

    impl FocusOracle for ToggleFocus {
        fn is_target_focused(&self) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn noise(seed: u32, width: u32, height: u32) -> GrayImage {
        ImageBuffer::from_fn(width, height, |x, y| {
            let mut v = x.wrapping_mul(73_856_093) ^ y.wrapping_mul(19_349_663) ^ seed.wrapping_mul(83_492_791);
            v ^= v >> 13;
            v = v.wrapping_mul(0x5bd1_e995);
            v ^= v >> 15;
            Luma([(v & 0xff) as u8])
        })
    }

    fn config(root: &Path) -> SessionConfig {
        let mut config = Settings::default().normalize().unwrap();
        config.image_dir = root.to_path_buf();
        config.loop_interval = Duration::from_millis(5);
        config.inactive_interval = Duration::from_millis(5);
        config
    }

    /// Frame with the kettle slot 2 template on the HUD
    fn frame_with_weapon(config: &SessionConfig, template: &GrayImage) -> RgbaImage {
        let mut frame = RgbaImage::new(1920, 1080);
        let region = config.weapon_region;
        for (x, y, p) in template.enumerate_pixels() {
            frame.put_pixel(
                region.left() as u32 + x,
                region.top() as u32 + y,
                Rgba([p[0], p[0], p[0], 255]),
            );
        }
        frame
    }

    fn backends(
        config: &SessionConfig,
        grabber: Arc<FrameGrabber>,
        listener: Arc<dyn MouseListener>,
        focus: Arc<dyn FocusOracle>,
    ) -> Backends {
        Backends {
            grabber,
            injector: Arc::new(NullInjector),
            listener,
            focus,
            resolver: Arc::new(DirectoryResolver::new(&config.image_dir)),
        }
    }

    fn kettle_template(root: &Path, config: &SessionConfig) -> GrayImage {
        let region = config.weapon_region;
        let template = noise(3, region.width(), region.height());
        let dir = root.join("templates");
        std::fs::create_dir_all(&dir).unwrap();
        template.save(dir.join("kettle_slot2.png")).unwrap();
        template
    }

    #[test]
    fn test_session_requires_templates() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config(tmp.path());
        let b = backends(
            &config,
            Arc::new(FrameGrabber::new()),
            Arc::new(ManualListener::default()),
            Arc::new(AlwaysFocused),
        );

        let result = Session::with_backends(config, b, None);
        assert!(matches!(
            result,
            Err(Error::Config(ConfigError::NoWeaponTemplates))
        ));
    }

    #[test]
    fn test_listener_failure_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config(tmp.path());
        kettle_template(tmp.path(), &config);
        let b = backends(
            &config,
            Arc::new(FrameGrabber::new()),
            Arc::new(BrokenListener),
            Arc::new(AlwaysFocused),
        );

        assert!(matches!(
            Session::with_backends(config, b, None),
            Err(Error::Input(InputError::Unavailable(_)))
        ));
    }

    #[test]
    fn test_run_activates_and_resumes_held_button() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config(tmp.path());
        let template = kettle_template(tmp.path(), &config);
        let grabber = Arc::new(FrameGrabber::with_frame(frame_with_weapon(&config, &template)));
        let listener = Arc::new(ManualListener::default());

        let b = backends(&config, grabber, listener.clone(), Arc::new(AlwaysFocused));
        let mut session = Session::with_backends(config, b, None).unwrap();

        // Hold the button before the macro is active
        let sender = listener.sender.lock().unwrap().clone().unwrap();
        sender.send(ButtonEvent::Press).unwrap();
        let engine = Arc::clone(session.engine());
        let deadline = Instant::now() + Duration::from_secs(2);
        while !engine.is_button_held() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(engine.is_button_held());

        let observation = session.run_once().unwrap();
        assert!(observation.active);
        assert!(engine.is_running());

        session.shutdown();
        assert!(!engine.is_running());
        assert!(!session.machine().is_active());
    }

    #[test]
    fn test_run_loop_honours_stop_and_focus() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config(tmp.path());
        let template = kettle_template(tmp.path(), &config);
        let grabber = Arc::new(FrameGrabber::with_frame(frame_with_weapon(&config, &template)));
        let focus = Arc::new(ToggleFocus(AtomicBool::new(false)));

        let b = backends(
            &config,
            grabber,
            Arc::new(ManualListener::default()),
            focus.clone(),
        );
        let mut session = Session::with_backends(config, b, None).unwrap();
        let stop = session.stop_handle();

        let runner = thread::spawn(move || {
            session.run();
            session
        });

        thread::sleep(Duration::from_millis(50));
        focus.0.store(true, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(50));
        stop.store(true, Ordering::SeqCst);

        let session = runner.join().unwrap();
        assert!(!session.machine().is_active());
        assert_eq!(session.machine().current_weapon(), Some("Kettle"));
    }
}
