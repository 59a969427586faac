#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Configuration subsystem: typed properties, per-object property trees, and
//! the parameter server binding a JSON document to registered trees.

mod error;
mod property;
mod server;
mod tree;

pub use error::ConfigError;
pub use property::{DynProperty, Property, PropertyError};
pub use server::{BindingSummary, CliOptions, ParameterServer, Startup};
pub use tree::{Configurable, NodeBindingReport, PropertyTree};
