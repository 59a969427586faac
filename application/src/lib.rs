#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Application scaffolding: shared run state, run-loop variants for
//! learning experiments, keyboard dispatch, and startup wiring.

mod app;
mod bootstrap;
mod continuous;
mod episodic;
mod keys;
mod state;
mod train_then_test;

pub use app::{Application, ApplicationCore};
pub use bootstrap::run_application;
pub use continuous::{ContinuousLearningApp, ContinuousLearningCore};
pub use episodic::{EpisodicCore, EpisodicTrainAndTestApp};
pub use keys::{KeyError, KeyHandlerRegistry, KEY_ESC};
pub use state::ApplicationState;
pub use train_then_test::TrainThenTestApp;
