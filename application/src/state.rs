//! Shared run state: execution flags and the processing sleep interval.

use std::{
    sync::atomic::{AtomicBool, Ordering},
    sync::Arc,
    thread,
    time::Duration,
};

use anyhow::Result;
use kestrel_configuration::{Configurable, Property, PropertyTree};
use kestrel_logging::{klog, Logger, Severity};
use parking_lot::Mutex;

/// Sleep interval bounds, in microseconds.
const MIN_SLEEP_INTERVAL_US: f64 = 1.0;
const MAX_SLEEP_INTERVAL_US: f64 = 10_000_000.0;

/// State of the running application: quit/pause/single-step/learning flags
/// and the inter-iteration sleep interval. Shared between the run loop and
/// the keyboard thread; constructed once in `main` and injected everywhere
/// it is needed.
pub struct ApplicationState {
    logger: Arc<Logger>,
    tree: PropertyTree,
    quit: AtomicBool,
    pause_mode: Arc<Property<bool>>,
    single_step_mode: Arc<Property<bool>>,
    learning_mode: Arc<Property<bool>>,
    /// Sleep interval in microseconds, clamped to [1, 10^7].
    application_sleep_interval: Arc<Property<f64>>,
    data_sync: Mutex<()>,
}

impl ApplicationState {
    /// Node name this state binds to in the configuration file.
    pub const NODE_NAME: &'static str = "app_state";

    /// Creates the state with all modes off and a 1 ms sleep interval.
    ///
    /// # Errors
    ///
    /// Fails only if property registration fails, which would indicate a
    /// naming clash within this constructor.
    pub fn new(logger: Arc<Logger>) -> Result<Arc<Self>> {
        let tree = PropertyTree::new(Self::NODE_NAME);
        let pause_mode = Property::new("pause_mode", false)?;
        let single_step_mode = Property::new("single_step_mode", false)?;
        let learning_mode = Property::new("learning_mode", false)?;
        let application_sleep_interval = Property::new("application_sleep_interval", 1000.0)?;
        tree.register_property(pause_mode.clone())?;
        tree.register_property(single_step_mode.clone())?;
        tree.register_property(learning_mode.clone())?;
        tree.register_property(application_sleep_interval.clone())?;
        Ok(Arc::new(Self {
            logger,
            tree,
            quit: AtomicBool::new(false),
            pause_mode,
            single_step_mode,
            learning_mode,
            application_sleep_interval,
            data_sync: Mutex::new(()),
        }))
    }

    /// True once a quit was requested.
    #[must_use]
    pub fn quit_requested(&self) -> bool {
        self.quit.load(Ordering::SeqCst)
    }

    /// Asks the run loop to terminate.
    pub fn request_quit(&self) {
        self.quit.store(true, Ordering::SeqCst);
    }

    /// Clears a previous quit request.
    pub fn reset_quit(&self) {
        self.quit.store(false, Ordering::SeqCst);
    }

    /// True while the run loop is paused.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.pause_mode.get()
    }

    /// Toggles pause, like the pause button of a VCR.
    pub fn press_pause(&self) {
        self.pause_mode.update(|paused| *paused = !*paused);
    }

    /// True while single-step mode is on.
    #[must_use]
    pub fn is_single_step_mode_on(&self) -> bool {
        self.single_step_mode.get()
    }

    /// Toggles single-step mode.
    pub fn press_single_step(&self) {
        self.single_step_mode.update(|on| *on = !*on);
    }

    /// True while learning mode is on.
    #[must_use]
    pub fn is_learning_mode_on(&self) -> bool {
        self.learning_mode.get()
    }

    /// Toggles learning mode.
    pub fn press_learning(&self) {
        self.learning_mode.update(|on| *on = !*on);
    }

    /// Switches learning mode on.
    pub fn set_learning_mode_on(&self) {
        self.learning_mode.set(true);
    }

    /// Switches learning mode off.
    pub fn set_learning_mode_off(&self) {
        self.learning_mode.set(false);
    }

    /// Current sleep interval in microseconds.
    #[must_use]
    pub fn sleep_interval_us(&self) -> f64 {
        self.application_sleep_interval.get()
    }

    /// Sets the sleep interval in seconds.
    pub fn set_sleep_interval_s(&self, seconds: f64) {
        self.set_sleep_interval(seconds * 1_000_000.0);
    }

    /// Sets the sleep interval in milliseconds.
    pub fn set_sleep_interval_ms(&self, milliseconds: f64) {
        self.set_sleep_interval(milliseconds * 1000.0);
    }

    /// Sets the sleep interval in microseconds.
    pub fn set_sleep_interval_us(&self, microseconds: f64) {
        self.set_sleep_interval(microseconds);
    }

    /// Slows the processing down by multiplying the sleep interval.
    pub fn multiply_sleep_interval(&self, factor: f64) {
        self.application_sleep_interval
            .update(|interval| *interval = clamp_interval(*interval * factor));
        self.log_sleep_interval();
    }

    /// Speeds the processing up by dividing the sleep interval.
    pub fn divide_sleep_interval(&self, divisor: f64) {
        self.application_sleep_interval
            .update(|interval| *interval = clamp_interval(*interval / divisor));
        self.log_sleep_interval();
    }

    /// Blocks the caller for the current sleep interval.
    pub fn sleep(&self) {
        thread::sleep(Duration::from_secs_f64(
            self.sleep_interval_us() / 1_000_000.0,
        ));
    }

    /// Logs the current status of every flag.
    pub fn display_status(&self) {
        let line = "----------------------------------------------------------------";
        klog!(self.logger, Severity::Status, "{line}");
        klog!(self.logger, Severity::Status, "application status:");
        klog!(self.logger, Severity::Status, "{line}");
        klog!(
            self.logger,
            Severity::Status,
            "QUIT:\t\t\t{}",
            if self.quit_requested() { "YES" } else { "NO" }
        );
        klog!(
            self.logger,
            Severity::Status,
            "SLEEP INTERVAL:\t\t{} [us]",
            self.sleep_interval_us()
        );
        klog!(
            self.logger,
            Severity::Status,
            "PAUSE MODE:\t\t{}",
            if self.is_paused() { "ON" } else { "OFF" }
        );
        klog!(
            self.logger,
            Severity::Status,
            "SINGLE STEP MODE:\t{}",
            if self.is_single_step_mode_on() { "ON" } else { "OFF" }
        );
        klog!(
            self.logger,
            Severity::Status,
            "LEARNING:\t\t{}",
            if self.is_learning_mode_on() { "ON" } else { "OFF" }
        );
        klog!(self.logger, Severity::Status, "{line}");
    }

    /// Mutex coordinating access to experiment data shared with other
    /// threads (e.g. visualization); the run loops hold it for the duration
    /// of each step.
    #[must_use]
    pub fn data_synchronization_mutex(&self) -> &Mutex<()> {
        &self.data_sync
    }

    /// Logger this state reports through.
    #[must_use]
    pub fn logger(&self) -> &Arc<Logger> {
        &self.logger
    }

    fn set_sleep_interval(&self, microseconds: f64) {
        self.application_sleep_interval
            .update(|interval| *interval = clamp_interval(microseconds));
    }

    fn log_sleep_interval(&self) {
        klog!(
            self.logger,
            Severity::Status,
            "setting sleep interval to {} [us]",
            self.sleep_interval_us()
        );
    }
}

fn clamp_interval(microseconds: f64) -> f64 {
    microseconds.clamp(MIN_SLEEP_INTERVAL_US, MAX_SLEEP_INTERVAL_US)
}

impl Configurable for ApplicationState {
    fn tree(&self) -> &PropertyTree {
        &self.tree
    }
}

impl std::fmt::Debug for ApplicationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplicationState")
            .field("quit", &self.quit_requested())
            .field("paused", &self.is_paused())
            .field("learning", &self.is_learning_mode_on())
            .field("sleep_interval_us", &self.sleep_interval_us())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> Arc<ApplicationState> {
        ApplicationState::new(Arc::new(Logger::new())).unwrap()
    }

    #[test]
    fn flags_toggle_and_reset() {
        let state = state();
        assert!(!state.quit_requested());
        state.request_quit();
        assert!(state.quit_requested());
        state.reset_quit();
        assert!(!state.quit_requested());

        state.press_pause();
        assert!(state.is_paused());
        state.press_pause();
        assert!(!state.is_paused());

        state.press_learning();
        assert!(state.is_learning_mode_on());
        state.set_learning_mode_off();
        assert!(!state.is_learning_mode_on());
        state.set_learning_mode_on();
        assert!(state.is_learning_mode_on());
    }

    #[test]
    fn sleep_interval_is_clamped() {
        let state = state();
        state.set_sleep_interval_us(0.001);
        assert!((state.sleep_interval_us() - 1.0).abs() < f64::EPSILON);

        state.set_sleep_interval_s(60.0);
        assert!((state.sleep_interval_us() - 10_000_000.0).abs() < f64::EPSILON);

        state.set_sleep_interval_ms(2.0);
        assert!((state.sleep_interval_us() - 2000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn speed_changes_multiply_and_divide() {
        let state = state();
        state.set_sleep_interval_us(1000.0);
        state.multiply_sleep_interval(1.5);
        assert!((state.sleep_interval_us() - 1500.0).abs() < f64::EPSILON);
        state.divide_sleep_interval(1.5);
        assert!((state.sleep_interval_us() - 1000.0).abs() < f64::EPSILON);

        state.set_sleep_interval_us(9_000_000.0);
        state.multiply_sleep_interval(1000.0);
        assert!((state.sleep_interval_us() - 10_000_000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn flags_are_configurable_from_a_document() {
        let state = state();
        let logger = Logger::new();
        state.tree().load_from_config_node(
            &serde_json::json!({
                "learning_mode": "true",
                "application_sleep_interval": "250"
            }),
            &logger,
        );
        assert!(state.is_learning_mode_on());
        assert!((state.sleep_interval_us() - 250.0).abs() < f64::EPSILON);
    }
}
