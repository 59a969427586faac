//! Configuration-level errors.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while registering trees and loading configuration files.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A property with this name is already registered in the node.
    #[error("property \"{name}\" is already registered in node \"{node}\"")]
    DuplicateProperty {
        /// Node the registration was attempted on.
        node: String,
        /// Offending property name.
        name: String,
    },
    /// A property tree with this node name is already registered.
    #[error("property tree \"{name}\" is already registered")]
    DuplicateTree {
        /// Offending node name.
        name: String,
    },
    /// The configuration file could not be read.
    #[error("configuration file {path:?} could not be read")]
    ConfigRead {
        /// File that was attempted.
        path: PathBuf,
        /// Underlying I/O failure.
        source: std::io::Error,
    },
    /// The configuration file is not valid JSON.
    #[error("configuration file {path:?} is not valid JSON")]
    ConfigParse {
        /// File that was attempted.
        path: PathBuf,
        /// Underlying parser failure.
        source: serde_json::Error,
    },
    /// The configuration template could not be written.
    #[error("configuration file {path:?} could not be written")]
    ConfigWrite {
        /// File that was attempted.
        path: PathBuf,
        /// Underlying I/O failure.
        source: std::io::Error,
    },
    /// The document root must be a JSON object keyed by node names.
    #[error("configuration file {path:?} does not contain a JSON object")]
    NotAnObject {
        /// File that was attempted.
        path: PathBuf,
    },
}
