//! Per-object property registries and the configuration-facing trait.

use std::sync::Arc;

use indexmap::IndexMap;
use kestrel_logging::{klog, Logger, Severity};
use parking_lot::Mutex;
use serde_json::Value;

use crate::{error::ConfigError, property::DynProperty, PropertyError};

/// Insertion-ordered registry of the properties one object exposes to the
/// configuration file, keyed by property name under the object's node name.
pub struct PropertyTree {
    node_name: String,
    properties: Mutex<IndexMap<String, Arc<dyn DynProperty>>>,
}

/// Outcome of binding one document node to a [`PropertyTree`]. Binding never
/// aborts; everything that did not apply is recorded here and logged.
#[derive(Debug, Default)]
#[must_use]
pub struct NodeBindingReport {
    /// Node the report describes.
    pub node: String,
    /// Properties whose values were replaced.
    pub applied: Vec<String>,
    /// Document keys with no matching property.
    pub unknown_properties: Vec<String>,
    /// Document keys whose value is not a scalar (nested objects, arrays,
    /// null). Only the top level of a node is consulted.
    pub non_scalar: Vec<String>,
    /// Values that failed to parse; the affected properties keep their
    /// previous value.
    pub failed: Vec<PropertyError>,
}

impl PropertyTree {
    /// Creates an empty registry for the given node name.
    #[must_use]
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
            properties: Mutex::new(IndexMap::new()),
        }
    }

    /// Node name this registry binds to in the configuration document.
    #[must_use]
    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    /// Registers a property so its value can be overridden from the
    /// configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DuplicateProperty`] when a property with the
    /// same name is already registered; the first registration stays.
    pub fn register_property(&self, property: Arc<dyn DynProperty>) -> Result<(), ConfigError> {
        let mut properties = self.properties.lock();
        let name = property.name().to_string();
        if properties.contains_key(&name) {
            return Err(ConfigError::DuplicateProperty {
                node: self.node_name.clone(),
                name,
            });
        }
        properties.insert(name, property);
        Ok(())
    }

    /// Looks up a registered property by name.
    #[must_use]
    pub fn get_property(&self, name: &str) -> Option<Arc<dyn DynProperty>> {
        self.properties.lock().get(name).cloned()
    }

    /// Applies the key/value pairs at the top level of `node` to matching
    /// properties. Unknown keys, non-scalar values, and parse failures are
    /// logged and recorded; the remaining keys are still applied.
    pub fn load_from_config_node(&self, node: &Value, logger: &Logger) -> NodeBindingReport {
        klog!(
            logger,
            Severity::Trace,
            "loading properties of node \"{}\"",
            self.node_name
        );
        let mut report = NodeBindingReport {
            node: self.node_name.clone(),
            ..NodeBindingReport::default()
        };

        let Some(entries) = node.as_object() else {
            klog!(
                logger,
                Severity::Warning,
                "node \"{}\" is not a JSON object, nothing to load",
                self.node_name
            );
            return report;
        };

        for (name, value) in entries {
            let raw = match value {
                Value::String(text) => text.clone(),
                Value::Number(number) => number.to_string(),
                Value::Bool(flag) => flag.to_string(),
                Value::Null | Value::Array(_) | Value::Object(_) => {
                    klog!(
                        logger,
                        Severity::Warning,
                        "object \"{}\": value of \"{name}\" is not a scalar, skipping",
                        self.node_name
                    );
                    report.non_scalar.push(name.clone());
                    continue;
                }
            };

            let Some(property) = self.get_property(name) else {
                klog!(
                    logger,
                    Severity::Warning,
                    "object \"{}\" has no property named \"{name}\", which is defined in the configuration file",
                    self.node_name
                );
                report.unknown_properties.push(name.clone());
                continue;
            };

            match property.set_from_string(&raw) {
                Ok(()) => {
                    klog!(
                        logger,
                        Severity::Info,
                        "object \"{}\": property \"{}\" value set to {}",
                        self.node_name,
                        property.name(),
                        property.value_string()
                    );
                    report.applied.push(name.clone());
                }
                Err(err) => {
                    klog!(logger, Severity::Error, "object \"{}\": {err}", self.node_name);
                    report.failed.push(err);
                }
            }
        }
        report
    }

    /// Logs the names of all registered properties.
    pub fn print_properties(&self, logger: &Logger) {
        let properties = self.properties.lock();
        if properties.is_empty() {
            klog!(
                logger,
                Severity::Debug,
                "registered properties in object \"{}\": empty",
                self.node_name
            );
            return;
        }
        klog!(
            logger,
            Severity::Debug,
            "registered properties in object \"{}\":",
            self.node_name
        );
        for name in properties.keys() {
            klog!(logger, Severity::Debug, "\t{name}");
        }
    }

    /// Logs all registered properties along with their current values.
    pub fn print_properties_with_values(&self, logger: &Logger) {
        let properties = self.properties.lock();
        if properties.is_empty() {
            klog!(
                logger,
                Severity::Info,
                "object \"{}\": no properties",
                self.node_name
            );
            return;
        }
        klog!(logger, Severity::Info, "object \"{}\":", self.node_name);
        for (name, property) in properties.iter() {
            klog!(
                logger,
                Severity::Info,
                "\t  \"{name}\" = {}",
                property.value_string()
            );
        }
    }

    /// Dumps the registry as a configuration-file node: every property
    /// serialized to its textual form.
    #[must_use]
    pub fn to_config_node(&self) -> serde_json::Map<String, Value> {
        self.properties
            .lock()
            .iter()
            .map(|(name, property)| (name.clone(), Value::String(property.value_string())))
            .collect()
    }
}

impl std::fmt::Debug for PropertyTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyTree")
            .field("node_name", &self.node_name)
            .field("properties", &self.properties.lock().len())
            .finish()
    }
}

/// Implemented by every object that exposes a [`PropertyTree`]. The server
/// keeps registered objects alive through `Arc<dyn Configurable>`, so a
/// destroyed owner can never leave a dangling registry entry.
pub trait Configurable: Send + Sync {
    /// The property tree describing this object in the configuration file.
    fn tree(&self) -> &PropertyTree;

    /// Called once per run after binding, when all property values are
    /// final; the place to size buffers that depend on configuration.
    fn initialize_property_dependent_variables(&self) {}
}
