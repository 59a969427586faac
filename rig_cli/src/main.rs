//! Reference experiment binary: estimates a noisy signal level with a
//! running average, interleaving testing steps that report the estimation
//! error. Demonstrates the full scaffolding: configuration binding,
//! leveled logging, keyboard control, and the continuous-learning loop.

use std::{
    io::{self, BufRead},
    sync::Arc,
    thread,
};

use anyhow::Result;
use kestrel_application::{
    run_application, ApplicationCore, ApplicationState, ContinuousLearningApp,
    ContinuousLearningCore, KeyHandlerRegistry,
};
use kestrel_configuration::{Configurable, ParameterServer, Property, PropertyTree, Startup};
use kestrel_logging::{klog, ConsoleOutput, JsonFileOutput, Logger, Severity};
use parking_lot::Mutex;
use rand::{rngs::SmallRng, Rng, SeedableRng};

/// Node name of the experiment in the configuration file.
const NODE_NAME: &str = "signal_rig";

struct SignalRig {
    core: ApplicationCore,
    learning: ContinuousLearningCore,
    /// True level of the synthetic signal.
    signal_level: Arc<Property<f64>>,
    /// Amplitude of the uniform noise added to every sample.
    noise_amplitude: Arc<Property<f64>>,
    /// Smoothing factor of the running average.
    smoothing: Arc<Property<f64>>,
    estimate: Mutex<f64>,
    residuals: Mutex<Vec<f64>>,
    rng: Mutex<SmallRng>,
}

impl SignalRig {
    fn new(state: Arc<ApplicationState>, logger: Arc<Logger>) -> Result<Arc<Self>> {
        let core = ApplicationCore::new(NODE_NAME, state, logger)?;
        let learning = ContinuousLearningCore::new(core.tree())?;
        let signal_level = Property::new("signal_level", 5.0)?;
        let noise_amplitude = Property::new("noise_amplitude", 0.5)?;
        let smoothing = Property::new("smoothing", 0.05)?;
        core.tree().register_property(signal_level.clone())?;
        core.tree().register_property(noise_amplitude.clone())?;
        core.tree().register_property(smoothing.clone())?;
        Ok(Arc::new(Self {
            core,
            learning,
            signal_level,
            noise_amplitude,
            smoothing,
            estimate: Mutex::new(0.0),
            residuals: Mutex::new(Vec::new()),
            rng: Mutex::new(SmallRng::from_entropy()),
        }))
    }

    fn sample(&self) -> f64 {
        let noise: f64 = self.rng.lock().gen_range(-1.0..1.0);
        self.signal_level.get() + noise * self.noise_amplitude.get()
    }

    fn reset_estimate(&self) {
        *self.estimate.lock() = 0.0;
        self.residuals.lock().clear();
        klog!(self.core.logger(), Severity::Status, "estimate reset");
    }
}

impl Configurable for SignalRig {
    fn tree(&self) -> &PropertyTree {
        self.core.tree()
    }

    fn initialize_property_dependent_variables(&self) {
        let capacity = usize::try_from(self.learning.averaged_measures()).unwrap_or(1);
        let mut residuals = self.residuals.lock();
        residuals.clear();
        residuals.reserve(capacity);
        *self.estimate.lock() = self.signal_level.get();
    }
}

impl ContinuousLearningApp for SignalRig {
    fn core(&self) -> &ApplicationCore {
        &self.core
    }

    fn learning(&self) -> &ContinuousLearningCore {
        &self.learning
    }

    fn perform_learning_step(&self) -> Result<bool> {
        let sample = self.sample();
        let smoothing = self.smoothing.get().clamp(0.001, 1.0);
        let mut estimate = self.estimate.lock();
        *estimate += smoothing * (sample - *estimate);
        Ok(true)
    }

    fn collect_test_statistics(&self) {
        let residual = (*self.estimate.lock() - self.signal_level.get()).abs();
        self.residuals.lock().push(residual);
    }

    fn populate_test_statistics(&self) {
        let mut residuals = self.residuals.lock();
        if residuals.is_empty() {
            return;
        }
        let mean = residuals.iter().sum::<f64>() / residuals.len() as f64;
        klog!(
            self.core.logger(),
            Severity::Status,
            "iteration {}: mean estimation error {mean:.4} over {} measures",
            self.core.iteration(),
            residuals.len()
        );
        residuals.clear();
    }
}

/// Feeds keys typed on stdin to the dispatch registry.
fn spawn_key_thread(keys: Arc<KeyHandlerRegistry>) {
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            for key in line.chars() {
                keys.handle_key(key);
            }
        }
    });
}

fn main() {
    let logger = Arc::new(Logger::new());
    logger.add_output(Arc::new(ConsoleOutput::default()));
    if let Ok(file_output) = JsonFileOutput::new("logs/rig.jsonl", Severity::Debug) {
        logger.add_output(Arc::new(file_output));
    }

    if let Err(err) = launch(&logger) {
        klog!(logger, Severity::Fatal, "{err:#}");
    }
    // Early exits and startup failures both terminate with status 0.
}

fn launch(logger: &Arc<Logger>) -> Result<()> {
    klog!(
        logger,
        Severity::Status,
        "starting on {} at {}",
        kestrel_system::cpu_info(),
        kestrel_system::current_time_info()
    );

    let state = ApplicationState::new(logger.clone())?;
    let server = ParameterServer::new(logger.clone());
    let app = SignalRig::new(state.clone(), logger.clone())?;

    let keys = KeyHandlerRegistry::new(state.clone(), logger.clone());
    {
        let app = app.clone();
        keys.register_key_handler('r', "r - resets the estimate", move || {
            app.reset_estimate();
        })?;
    }
    spawn_key_thread(keys);

    let startup = run_application(&server, &state, &app, std::env::args(), || app.run())?;
    if startup == Startup::Continue {
        state.display_status();
        klog!(
            logger,
            Severity::Status,
            "finished at {}",
            kestrel_system::current_time_info()
        );
    }
    Ok(())
}
