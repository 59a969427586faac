//! Base application plumbing shared by every run-loop variant.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use anyhow::Result;
use kestrel_configuration::{Configurable, Property, PropertyTree};
use kestrel_logging::{klog, Logger, Severity};

use crate::state::ApplicationState;

/// Per-application bundle: injected state and logger, the application's
/// property tree, the iteration counter, and the iteration limit property.
pub struct ApplicationCore {
    state: Arc<ApplicationState>,
    logger: Arc<Logger>,
    tree: PropertyTree,
    iteration: AtomicU64,
    /// Number of iterations after which the run ends; 0 deactivates the
    /// terminal condition.
    number_of_iterations: Arc<Property<i64>>,
}

impl ApplicationCore {
    /// Creates the core for an application bound to `node_name` in the
    /// configuration file.
    ///
    /// # Errors
    ///
    /// Fails if property registration fails, which would indicate a naming
    /// clash within this constructor.
    pub fn new(
        node_name: impl Into<String>,
        state: Arc<ApplicationState>,
        logger: Arc<Logger>,
    ) -> Result<Self> {
        let tree = PropertyTree::new(node_name);
        let number_of_iterations = Property::new("number_of_iterations", 0_i64)?;
        tree.register_property(number_of_iterations.clone())?;
        Ok(Self {
            state,
            logger,
            tree,
            iteration: AtomicU64::new(0),
            number_of_iterations,
        })
    }

    /// Shared run state.
    #[must_use]
    pub fn state(&self) -> &Arc<ApplicationState> {
        &self.state
    }

    /// Logger the application reports through.
    #[must_use]
    pub fn logger(&self) -> &Arc<Logger> {
        &self.logger
    }

    /// Property tree of the application; register experiment properties
    /// here at construction time.
    #[must_use]
    pub fn tree(&self) -> &PropertyTree {
        &self.tree
    }

    /// Current iteration number.
    #[must_use]
    pub fn iteration(&self) -> u64 {
        self.iteration.load(Ordering::SeqCst)
    }

    /// Configured iteration limit; 0 means unlimited.
    #[must_use]
    pub fn number_of_iterations(&self) -> i64 {
        self.number_of_iterations.get()
    }

    pub(crate) fn advance_iteration(&self) -> u64 {
        self.iteration.fetch_add(1, Ordering::SeqCst) + 1
    }
}

impl std::fmt::Debug for ApplicationCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplicationCore")
            .field("node_name", &self.tree.node_name())
            .field("iteration", &self.iteration())
            .finish()
    }
}

/// Drives the shared loop skeleton: honor quit/pause/single-step, execute
/// one step per lap under the data-synchronization guard, sleep between
/// laps. The step callback receives the iteration number and returns false
/// to leave the loop.
pub(crate) fn drive(core: &ApplicationCore, mut step: impl FnMut(u64) -> Result<bool>) -> Result<()> {
    let state = core.state();
    while !state.quit_requested() {
        if !state.is_paused() {
            // Single-step mode pauses again right after this step.
            if state.is_single_step_mode_on() {
                state.press_pause();
            }
            let _guard = state.data_synchronization_mutex().lock();
            let iteration = core.advance_iteration();
            if !step(iteration)? {
                break;
            }
        }
        state.sleep();
    }
    Ok(())
}

/// A single-loop application: one computation per iteration until the step
/// reports completion or the configured iteration limit is reached.
pub trait Application: Configurable {
    /// Application plumbing bundle.
    fn core(&self) -> &ApplicationCore;

    /// Performs a single step of computations; returning false ends the
    /// run.
    ///
    /// # Errors
    ///
    /// Any error aborts the run loop and propagates to the caller.
    fn perform_single_step(&self) -> Result<bool>;

    /// Logs the application status.
    fn display_status(&self) {
        let core = self.core();
        klog!(
            core.logger(),
            Severity::Status,
            "iteration:\t\t{}",
            core.iteration()
        );
    }

    /// Runs the main loop until quit, step completion, or the configured
    /// iteration limit.
    ///
    /// # Errors
    ///
    /// Propagates the first step error.
    fn run(&self) -> Result<()> {
        let core = self.core();
        drive(core, |iteration| {
            if !self.perform_single_step()? {
                klog!(core.logger(), Severity::Info, "terminating application...");
                core.state().request_quit();
                return Ok(false);
            }
            let limit = core.number_of_iterations();
            if limit > 0 && iteration >= limit.unsigned_abs() {
                klog!(
                    core.logger(),
                    Severity::Info,
                    "reached last iteration, terminating application..."
                );
                core.state().request_quit();
                return Ok(false);
            }
            Ok(true)
        })
    }
}
