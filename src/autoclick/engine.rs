//! Click worker lifecycle and real/synthetic event arbitration

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};

use super::echo::EchoFilter;
use super::input::InputInjector;
use super::timing::{DelayProfile, Humanizer};
use super::{ButtonEvent, ClickControl, ErrorCallback, EventOrigin, InputError, MacroActivity};

/// Idle poll while the worker waits for the button or activation
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How long `stop` waits for the worker before detaching it
const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(1);

/// State shared between the engine and its worker thread
struct Shared {
    echo: EchoFilter,
    button_held: AtomicBool,
    faulted: AtomicBool,
    delays: Mutex<DelayProfile>,
    on_error: Option<ErrorCallback>,
}

impl Shared {
    fn delays(&self) -> DelayProfile {
        *self.delays.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn report_failure(&self, error: &InputError) {
        self.faulted.store(true, Ordering::SeqCst);
        log::error!("Auto-click stopped: {}", error);
        if let Some(callback) = &self.on_error {
            callback(&error.to_string());
        }
    }
}

struct ClickWorker {
    stop: Arc<AtomicBool>,
    done: Receiver<()>,
    handle: JoinHandle<()>,
}

impl ClickWorker {
    fn is_live(&self) -> bool {
        !self.stop.load(Ordering::SeqCst) && !self.handle.is_finished()
    }
}

/// Auto-click engine
pub struct AutoClicker {
    shared: Arc<Shared>,
    injector: Arc<dyn InputInjector>,
    activity: Arc<dyn MacroActivity>,
    worker: Mutex<Option<ClickWorker>>,
    stop_timeout: Duration,
}

impl AutoClicker {
    /// Create an engine injecting through `injector` and gated by `activity`
    pub fn new(injector: Arc<dyn InputInjector>, activity: Arc<dyn MacroActivity>) -> Self {
        Self::build(injector, activity, None)
    }

    /// Create an engine that reports injection failures to `on_error`
    pub fn with_error_callback(
        injector: Arc<dyn InputInjector>,
        activity: Arc<dyn MacroActivity>,
        on_error: ErrorCallback,
    ) -> Self {
        Self::build(injector, activity, Some(on_error))
    }

    fn build(
        injector: Arc<dyn InputInjector>,
        activity: Arc<dyn MacroActivity>,
        on_error: Option<ErrorCallback>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                echo: EchoFilter::new(),
                button_held: AtomicBool::new(false),
                faulted: AtomicBool::new(false),
                delays: Mutex::new(DelayProfile::FALLBACK),
                on_error,
            }),
            injector,
            activity,
            worker: Mutex::new(None),
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }

    /// Set how long `stop` waits for the worker
    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Classify a left-button event from the global hook and react to it
    pub fn handle_event(&self, event: ButtonEvent) -> EventOrigin {
        match event {
            ButtonEvent::Press => {
                if self.shared.echo.take_press() {
                    return EventOrigin::Synthetic;
                }
                self.shared.button_held.store(true, Ordering::SeqCst);
                if self.activity.is_active() {
                    self.start();
                }
            }
            ButtonEvent::Release => {
                if self.shared.echo.take_release() {
                    return EventOrigin::Synthetic;
                }
                self.shared.button_held.store(false, Ordering::SeqCst);
                self.stop();
            }
        }
        EventOrigin::Real
    }

    /// Current delay profile
    pub fn delays(&self) -> DelayProfile {
        self.shared.delays()
    }

    /// Outstanding (presses, releases) not yet echoed back
    pub fn pending_echoes(&self) -> (u32, u32) {
        self.shared.echo.pending()
    }

    /// Injection backend name
    pub fn backend_name(&self) -> &'static str {
        self.injector.name()
    }

    fn lock_worker(&self) -> MutexGuard<'_, Option<ClickWorker>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn start(&self) {
        if self.shared.faulted.load(Ordering::SeqCst) {
            log::warn!("Auto-click disabled after an input failure");
            return;
        }
        if !self.activity.is_active() {
            return;
        }

        let previous = {
            let mut slot = self.lock_worker();
            if slot.as_ref().is_some_and(ClickWorker::is_live) {
                return;
            }
            slot.take()
        };
        if let Some(previous) = previous {
            self.retire(previous);
        }

        let mut slot = self.lock_worker();
        if slot.as_ref().is_some_and(ClickWorker::is_live) {
            return;
        }
        match self.spawn_worker() {
            Ok(worker) => *slot = Some(worker),
            Err(e) => log::error!("Failed to start auto-click thread: {}", e),
        }
    }

    fn spawn_worker(&self) -> std::io::Result<ClickWorker> {
        let stop = Arc::new(AtomicBool::new(false));
        let (done_tx, done) = bounded(1);

        let shared = Arc::clone(&self.shared);
        let injector = Arc::clone(&self.injector);
        let activity = Arc::clone(&self.activity);
        let stop_flag = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name("autoclick".to_string())
            .spawn(move || {
                click_loop(&shared, injector.as_ref(), activity.as_ref(), &stop_flag);
                let _ = done_tx.send(());
            })?;

        Ok(ClickWorker { stop, done, handle })
    }

    /// Signal a worker to stop and wait for it, at most `stop_timeout`
    fn retire(&self, worker: ClickWorker) {
        worker.stop.store(true, Ordering::SeqCst);
        match worker.done.recv_timeout(self.stop_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if worker.handle.join().is_err() {
                    log::error!("Auto-click thread panicked");
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                log::warn!(
                    "Auto-click thread did not stop within {:?}, detaching it",
                    self.stop_timeout
                );
            }
        }
    }
}

impl ClickControl for AutoClicker {
    fn set_delays(&self, profile: DelayProfile) {
        *self
            .shared
            .delays
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = profile;
    }

    fn start_if_button_pressed(&self) {
        if self.shared.button_held.load(Ordering::SeqCst) {
            self.start();
        }
    }

    fn stop(&self) {
        let worker = self.lock_worker().take();
        if let Some(worker) = worker {
            self.retire(worker);
            log::debug!("Auto-click stopped");
        }
        self.shared.echo.reset();
    }

    fn is_running(&self) -> bool {
        self.lock_worker().as_ref().is_some_and(ClickWorker::is_live)
    }

    fn is_button_held(&self) -> bool {
        self.shared.button_held.load(Ordering::SeqCst)
    }

    fn is_faulted(&self) -> bool {
        self.shared.faulted.load(Ordering::SeqCst)
    }
}

impl Drop for AutoClicker {
    fn drop(&mut self) {
        ClickControl::stop(self);
    }
}

fn click_loop(
    shared: &Shared,
    injector: &dyn InputInjector,
    activity: &dyn MacroActivity,
    stop: &AtomicBool,
) {
    log::debug!("Auto-click thread started");
    let mut humanizer = Humanizer::new();

    while !stop.load(Ordering::SeqCst) {
        if !(activity.is_active() && shared.button_held.load(Ordering::SeqCst)) {
            thread::sleep(POLL_INTERVAL);
            continue;
        }

        let profile = shared.delays();
        if let Err(e) = click_cycle(shared, injector, &mut humanizer, &profile, stop) {
            shared.report_failure(&e);
            break;
        }
    }

    log::debug!("Auto-click thread exited");
}

/// One press/hold/release/gap cycle; a started cycle always ends released
fn click_cycle(
    shared: &Shared,
    injector: &dyn InputInjector,
    humanizer: &mut Humanizer,
    profile: &DelayProfile,
    stop: &AtomicBool,
) -> Result<(), InputError> {
    shared.echo.expect_press();
    if let Err(e) = injector.press() {
        shared.echo.take_press();
        return Err(e);
    }
    thread::sleep(humanizer.press_duration(profile));

    shared.echo.expect_release();
    if let Err(e) = injector.release() {
        shared.echo.take_release();
        return Err(e);
    }

    sleep_unless_stopped(humanizer.release_duration(profile), stop);
    Ok(())
}

fn sleep_unless_stopped(duration: Duration, stop: &AtomicBool) {
    let deadline = Instant::now() + duration;
    loop {
        if stop.load(Ordering::SeqCst) {
            return;
        }
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        thread::sleep((deadline - now).min(POLL_INTERVAL));
    }
}
