//! Interleaved continuous-learning applications: mostly learning steps,
//! with a testing step every few iterations.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use anyhow::Result;
use kestrel_configuration::{Configurable, Property, PropertyTree};
use kestrel_logging::{klog, Severity};

use crate::app::{drive, ApplicationCore};

/// Counters and properties specific to interleaved learning/testing.
pub struct ContinuousLearningCore {
    /// Number of learning steps after which a single testing step runs.
    learning_iterations_to_test_ratio: Arc<Property<u32>>,
    /// Number of collected test measures averaged per population.
    number_of_averaged_test_measures: Arc<Property<u32>>,
    learning_iteration: AtomicU64,
}

impl ContinuousLearningCore {
    /// Registers the interleaving properties into the application's tree.
    ///
    /// # Errors
    ///
    /// Fails if property registration fails, which would indicate a naming
    /// clash within this constructor.
    pub fn new(tree: &PropertyTree) -> Result<Self> {
        let learning_iterations_to_test_ratio =
            Property::new("learning_iterations_to_test_ratio", 50_u32)?;
        let number_of_averaged_test_measures =
            Property::new("number_of_averaged_test_measures", 5_u32)?;
        tree.register_property(learning_iterations_to_test_ratio.clone())?;
        tree.register_property(number_of_averaged_test_measures.clone())?;
        Ok(Self {
            learning_iterations_to_test_ratio,
            number_of_averaged_test_measures,
            learning_iteration: AtomicU64::new(0),
        })
    }

    /// Configured learning-to-testing ratio (at least 1).
    #[must_use]
    pub fn ratio(&self) -> u64 {
        u64::from(self.learning_iterations_to_test_ratio.get().max(1))
    }

    /// Configured number of averaged test measures (at least 1).
    #[must_use]
    pub fn averaged_measures(&self) -> u64 {
        u64::from(self.number_of_averaged_test_measures.get().max(1))
    }

    /// Testing steps taken since the last population.
    #[must_use]
    pub fn learning_iteration(&self) -> u64 {
        self.learning_iteration.load(Ordering::SeqCst)
    }

    fn advance_learning_iteration(&self) -> u64 {
        self.learning_iteration.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn reset_learning_iteration(&self) {
        self.learning_iteration.store(0, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for ContinuousLearningCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContinuousLearningCore")
            .field("ratio", &self.ratio())
            .field("averaged_measures", &self.averaged_measures())
            .field("learning_iteration", &self.learning_iteration())
            .finish()
    }
}

/// An application that learns continuously and interleaves testing steps.
/// Testing itself has two phases: statistics are collected on every testing
/// step and populated (averaged, exported, visualized) every
/// `number_of_averaged_test_measures` testing steps.
pub trait ContinuousLearningApp: Configurable {
    /// Application plumbing bundle.
    fn core(&self) -> &ApplicationCore;

    /// Interleaving counters and properties.
    fn learning(&self) -> &ContinuousLearningCore;

    /// Performs a single learning step; returning false ends the run.
    ///
    /// # Errors
    ///
    /// Any error aborts the run loop and propagates to the caller.
    fn perform_learning_step(&self) -> Result<bool>;

    /// Collects test statistics; executed on every testing step.
    fn collect_test_statistics(&self) {}

    /// Populates collected test statistics; executed every
    /// `number_of_averaged_test_measures` testing steps.
    fn populate_test_statistics(&self) {}

    /// Performs one testing step: collect always, populate and reset the
    /// counter once enough measures are in.
    ///
    /// # Errors
    ///
    /// Errors from overridden implementations propagate to the run loop.
    fn perform_testing_step(&self) -> Result<bool> {
        let learning = self.learning();
        let learning_iteration = learning.advance_learning_iteration();
        klog!(
            self.core().logger(),
            Severity::Debug,
            "iteration={} learning_iteration={learning_iteration}",
            self.core().iteration()
        );

        self.collect_test_statistics();
        if learning_iteration % learning.averaged_measures() == 0 {
            self.populate_test_statistics();
            learning.reset_learning_iteration();
        }
        Ok(true)
    }

    /// Switches between learning and testing based on the iteration number
    /// and the learning mode.
    ///
    /// # Errors
    ///
    /// Propagates errors of the selected step.
    fn perform_single_step(&self) -> Result<bool> {
        let iteration = self.core().iteration();
        if iteration % self.learning().ratio() != 0 && self.core().state().is_learning_mode_on() {
            self.perform_learning_step()
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
