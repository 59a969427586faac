//! Episodic applications: learn-then-test cycles repeated per episode.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use anyhow::Result;
use kestrel_configuration::{Configurable, Property, PropertyTree};

use crate::app::{drive, ApplicationCore};

/// Episode accounting for episodic train-and-test applications.
pub struct EpisodicCore {
    /// Number of episodes after which the run ends; 0 deactivates the
    /// terminal condition.
    number_of_episodes: Arc<Property<u64>>,
    episode: AtomicU64,
}

impl EpisodicCore {
    /// Registers the episode-limit property into the application's tree.
    ///
    /// # Errors
    ///
    /// Fails if property registration fails, which would indicate a naming
    /// clash within this constructor.
    pub fn new(tree: &PropertyTree) -> Result<Self> {
        let number_of_episodes = Property::new("number_of_episodes", 0_u64)?;
        tree.register_property(number_of_episodes.clone())?;
        Ok(Self {
            number_of_episodes,
            episode: AtomicU64::new(0),
        })
    }

    /// Episodes finished so far.
    #[must_use]
    pub fn episode(&self) -> u64 {
        self.episode.load(Ordering::SeqCst)
    }

    /// Configured episode limit; 0 means unlimited.
    #[must_use]
    pub fn number_of_episodes(&self) -> u64 {
        self.number_of_episodes.get()
    }

    fn advance_episode(&self) -> u64 {
        self.episode.fetch_add(1, Ordering::SeqCst) + 1
    }
}

impl std::fmt::Debug for EpisodicCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EpisodicCore")
            .field("episode", &self.episode())
            .field("number_of_episodes", &self.number_of_episodes())
            .finish()
    }
}

/// An application that repeats learn-then-test cycles in episodes, with
/// per-episode setup and teardown hooks.
pub trait EpisodicTrainAndTestApp: Configurable {
    /// Application plumbing bundle.
    fn core(&self) -> &ApplicationCore;

    /// Episode accounting.
    fn episodic(&self) -> &EpisodicCore;

    /// Performs a single learning step; returning false switches the
    /// current episode to its testing phase.
    ///
    /// # Errors
    ///
    /// Any error aborts the run loop and propagates to the caller.
    fn perform_learning_step(&self) -> Result<bool>;

    /// Performs a single testing step; returning false finishes the
    /// current episode.
    ///
    /// # Errors
    ///
    /// Any error aborts the run loop and propagates to the caller.
    fn perform_testing_step(&self) -> Result<bool>;

    /// Called at the beginning of every episode, e.g. to reset statistics.
    ///
    /// # Errors
    ///
    /// Any error aborts the run loop and propagates to the caller.
    fn start_new_episode(&self) -> Result<()>;

    /// Called when an episode ends, e.g. to export collected statistics.
    ///
    /// # Errors
    ///
    /// Any error aborts the run loop and propagates to the caller.
    fn finish_current_episode(&self) -> Result<()>;

    /// Learns, tests, and rolls episodes over within a single step.
    ///
    /// # Errors
    ///
    /// Propagates errors of the selected step or episode hook.
    fn perform_single_step(&self) -> Result<bool> {
        let state = self.core().state();
        if state.is_learning_mode_on() {
            if !self.perform_learning_step()? {
                state.set_learning_mode_off();
            }
            return Ok(true);
        }
        if self.perform_testing_step()? {
            return Ok(true);
        }

        // Episode over: close it out, check the terminal condition, and
        // open the next one in learning mode.
        let episode = self.episodic().advance_episode();
        self.finish_current_episode()?;
        let limit = self.episodic().number_of_episodes();
        if limit != 0 && episode >= limit {
            return Ok(false);
        }
        state.set_learning_mode_on();
        self.start_new_episode()?;
        Ok(true)
    }

    /// Runs the main loop, starting the first episode in learning mode.
    ///
    /// # Errors
    ///
    /// Propagates the first step or hook error.
    fn run(&self) -> Result<()> {
        self.core().state().set_learning_mode_on();
        self.start_new_episode()?;
        drive(self.core(), |_| self.perform_single_step())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ApplicationState;
    use kestrel_logging::Logger;

    struct EpisodeApp {
        core: ApplicationCore,
        episodic: EpisodicCore,
        started: AtomicU64,
        finished: AtomicU64,
        learning_left: AtomicU64,
        testing_left: AtomicU64,
    }

    impl EpisodeApp {
        fn new(episodes: u64) -> Arc<Self> {
            let logger = Arc::new(Logger::new());
            let state = ApplicationState::new(logger.clone()).unwrap();
            state.set_sleep_interval_us(1.0);
            let core = ApplicationCore::new("episodes", state, logger).unwrap();
            let episodic = EpisodicCore::new(core.tree()).unwrap();
            episodic.number_of_episodes.set(episodes);
            Arc::new(Self {
                core,
                episodic,
                started: AtomicU64::new(0),
                finished: AtomicU64::new(0),
                learning_left: AtomicU64::new(0),
                testing_left: AtomicU64::new(0),
            })
        }
    }

    impl Configurable for EpisodeApp {
        fn tree(&self) -> &PropertyTree {
            self.core.tree()
        }
    }

    impl EpisodicTrainAndTestApp for EpisodeApp {
        fn core(&self) -> &ApplicationCore {
            &self.core
        }

        fn episodic(&self) -> &EpisodicCore {
            &self.episodic
        }

        fn perform_learning_step(&self) -> Result<bool> {
            Ok(self.learning_left.fetch_sub(1, Ordering::SeqCst) > 1)
        }

        fn perform_testing_step(&self) -> Result<bool> {
            Ok(self.testing_left.fetch_sub(1, Ordering::SeqCst) > 1)
        }

        fn start_new_episode(&self) -> Result<()> {
            self.started.fetch_add(1, Ordering::SeqCst);
            self.learning_left.store(3, Ordering::SeqCst);
            self.testing_left.store(2, Ordering::SeqCst);
            Ok(())
        }

        fn finish_current_episode(&self) -> Result<()> {
            self.finished.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn episodes_cycle_until_the_configured_limit() {
        let app = EpisodeApp::new(3);
        app.run().unwrap();

        assert_eq!(app.episodic.episode(), 3);
        assert_eq!(app.started.load(Ordering::SeqCst), 3);
        assert_eq!(app.finished.load(Ordering::SeqCst), 3);
        // Every episode re-enters learning mode except after the last one.
        assert!(!app.core.state().is_learning_mode_on());
    }

    #[test]
    fn each_episode_learns_then_tests() {
        let app = EpisodeApp::new(1);
        app.core.state().set_learning_mode_on();
        app.start_new_episode().unwrap();

        // Three learning steps, the third switches the phase.
        assert!(app.perform_single_step().unwrap());
        assert!(app.core.state().is_learning_mode_on());
        assert!(app.perform_single_step().unwrap());
        assert!(app.perform_single_step().unwrap());
        assert!(!app.core.state().is_learning_mode_on());

        // Two testing steps, the second finishes the single episode.
        assert!(app.perform_single_step().unwrap());
        assert!(!app.perform_single_step().unwrap());
        assert_eq!(app.finished.load(Ordering::SeqCst), 1);
    }
}
