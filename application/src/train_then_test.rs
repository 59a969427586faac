//! Two-phase applications: learn until done, then test until done.

use anyhow::Result;
use kestrel_configuration::Configurable;

use crate::app::{drive, ApplicationCore};

/// An application that first exhausts its learning steps, then runs
/// testing steps until those are exhausted too, which ends the run.
pub trait TrainThenTestApp: Configurable {
    /// Application plumbing bundle.
    fn core(&self) -> &ApplicationCore;

    /// Performs a single learning step; returning false switches the
    /// application to the testing phase.
    ///
    /// # Errors
    ///
    /// Any error aborts the run loop and propagates to the caller.
    fn perform_learning_step(&self) -> Result<bool>;

    /// Performs a single testing step; returning false ends the run.
    ///
    /// # Errors
    ///
    /// Any error aborts the run loop and propagates to the caller.
    fn perform_testing_step(&self) -> Result<bool>;

    /// Learns while learning mode is on; tests afterwards.
    ///
    /// # Errors
    ///
    /// Propagates errors of the selected step.
    fn perform_single_step(&self) -> Result<bool> {
        let state = self.core().state();
        if state.is_learning_mode_on() {
            if !self.perform_learning_step()? {
                state.set_learning_mode_off();
            }
            Ok(true)
        } else {
            self.perform_testing_step()
        }
    }

    /// Runs the main loop, starting in learning mode.
    ///
    /// # Errors
    ///
    /// Propagates the first step error.
    fn run(&self) -> Result<()> {
        self.core().state().set_learning_mode_on();
        drive(self.core(), |_| self.perform_single_step())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ApplicationState;
    use kestrel_configuration::PropertyTree;
    use kestrel_logging::Logger;
    use std::sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    };

    struct PhasedApp {
        core: ApplicationCore,
        learning_steps: AtomicU64,
        testing_steps: AtomicU64,
        learning_budget: u64,
        testing_budget: u64,
    }

    impl PhasedApp {
        fn new(learning_budget: u64, testing_budget: u64) -> Arc<Self> {
            let logger = Arc::new(Logger::new());
            let state = ApplicationState::new(logger.clone()).unwrap();
            state.set_sleep_interval_us(1.0);
            let core = ApplicationCore::new("phased", state, logger).unwrap();
            Arc::new(Self {
                core,
                learning_steps: AtomicU64::new(0),
                testing_steps: AtomicU64::new(0),
                learning_budget,
                testing_budget,
            })
        }
    }

    impl Configurable for PhasedApp {
        fn tree(&self) -> &PropertyTree {
            self.core.tree()
        }
    }

    impl TrainThenTestApp for PhasedApp {
        fn core(&self) -> &ApplicationCore {
            &self.core
        }

        fn perform_learning_step(&self) -> Result<bool> {
            let done = self.learning_steps.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(done < self.learning_budget)
        }

        fn perform_testing_step(&self) -> Result<bool> {
            let done = self.testing_steps.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(done < self.testing_budget)
        }
    }

    #[test]
    fn learning_phase_precedes_testing_phase() {
        let app = PhasedApp::new(4, 3);
        app.run().unwrap();

        assert_eq!(app.learning_steps.load(Ordering::SeqCst), 4);
        assert_eq!(app.testing_steps.load(Ordering::SeqCst), 3);
        assert!(!app.core.state().is_learning_mode_on());
    }

    #[test]
    fn phase_switch_happens_on_the_learning_completion_step() {
        let app = PhasedApp::new(1, 1);
        app.core.state().set_learning_mode_on();

        assert!(app.perform_single_step().unwrap());
        assert!(!app.core.state().is_learning_mode_on());
        assert_eq!(app.testing_steps.load(Ordering::SeqCst), 0);

        assert!(!app.perform_single_step().unwrap());
        assert_eq!(app.testing_steps.load(Ordering::SeqCst), 1);
    }
}
