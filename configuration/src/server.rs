//! The parameter server: command-line parsing, configuration-file loading,
//! and the binding of document nodes to registered property trees.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use clap::Parser;
use indexmap::IndexMap;
use kestrel_logging::{klog, Logger, Severity};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;

use crate::{
    error::ConfigError,
    tree::{Configurable, NodeBindingReport},
};

/// Command-line options recognized by every experiment binary.
#[derive(Parser, Debug, Clone)]
#[command(about = "Experiment runner", disable_version_flag = true)]
pub struct CliOptions {
    /// (L)oad configuration from given JSON file
    #[arg(short = 'l', long = "load-config")]
    pub load_config: Option<PathBuf>,

    /// (C)reate default configuration JSON file
    #[arg(short = 'c', long = "create-config")]
    pub create_config: bool,

    /// (S)et logger severity level
    #[arg(short = 's', long = "set-logger-level", default_value_t = 3)]
    pub set_logger_level: u8,
}

/// What the binary should do after command-line parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Startup {
    /// Configuration is loaded; proceed with binding and the run loop.
    Continue,
    /// An early-exit action ran (help, template creation, usage error);
    /// terminate with status 0.
    Exit,
}

/// Outcome of binding the whole document to the registered trees. Binding
/// is partial-failure tolerant; nothing here is a hard error.
#[derive(Debug, Default)]
#[must_use]
pub struct BindingSummary {
    /// Per-node reports, in document order.
    pub nodes: Vec<NodeBindingReport>,
    /// Document keys with no registered property tree.
    pub unknown_nodes: Vec<String>,
}

/// Process-wide binder of a parsed configuration document to registered
/// property trees. Constructed explicitly in `main` and passed to whoever
/// needs it.
pub struct ParameterServer {
    logger: Arc<Logger>,
    registry: Mutex<IndexMap<String, Arc<dyn Configurable>>>,
    document: RwLock<serde_json::Map<String, Value>>,
    options: RwLock<Option<CliOptions>>,
    args: RwLock<Vec<String>>,
    app_name: RwLock<String>,
}

impl ParameterServer {
    /// Creates a server with an empty registry and document.
    #[must_use]
    pub fn new(logger: Arc<Logger>) -> Self {
        Self {
            logger,
            registry: Mutex::new(IndexMap::new()),
            document: RwLock::new(serde_json::Map::new()),
            options: RwLock::new(None),
            args: RwLock::new(Vec::new()),
            app_name: RwLock::new(String::from("kestrel")),
        }
    }

    /// Registers a configurable object under its tree's node name. Must be
    /// called before [`Self::load_properties_from_configuration`]; the
    /// server does not enforce the ordering.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DuplicateTree`] when the node name is taken;
    /// the first registration stays.
    pub fn register_property_tree(
        &self,
        configurable: Arc<dyn Configurable>,
    ) -> Result<(), ConfigError> {
        let name = configurable.tree().node_name().to_string();
        klog!(
            self.logger,
            Severity::Debug,
            "registering property tree \"{name}\""
        );
        let mut registry = self.registry.lock();
        if registry.contains_key(&name) {
            return Err(ConfigError::DuplicateTree { name });
        }
        registry.insert(name, configurable);
        Ok(())
    }

    /// Parses the command line and, on the normal path, loads the
    /// configuration document.
    ///
    /// `--help`, `--create-config`, and usage errors perform their action
    /// and return [`Startup::Exit`]: the binary terminates with status 0.
    /// `--set-logger-level` adjusts the injected logger as a side effect.
    ///
    /// # Errors
    ///
    /// Configuration-file problems are fatal: remediation hints are logged
    /// and the error is returned so the binary can exit instead of running
    /// with an empty document.
    pub fn parse_application_parameters<I, S>(&self, args: I) -> Result<Startup, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let args: Vec<String> = args.into_iter().map(Into::into).collect();
        let app_name = args
            .first()
            .map(|argv0| binary_name(argv0))
            .unwrap_or_else(|| String::from("kestrel"));
        *self.app_name.write() = app_name.clone();
        *self.args.write() = args.clone();

        let options = match CliOptions::try_parse_from(args.iter().map(String::as_str)) {
            Ok(options) => options,
            Err(err) => {
                // Covers --help as well as usage errors; both exit 0.
                let _ = err.print();
                return Ok(Startup::Exit);
            }
        };

        self.logger
            .set_severity_level(Severity::from_level(options.set_logger_level));

        let config_path = options
            .load_config
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("{app_name}.json")));
        let create_config = options.create_config;
        *self.options.write() = Some(options);

        if create_config {
            self.create_default_config(&config_path)?;
            klog!(
                self.logger,
                Severity::Status,
                "default configuration written to {}",
                config_path.display()
            );
            return Ok(Startup::Exit);
        }

        self.load_configuration_from(&config_path)?;
        Ok(Startup::Continue)
    }

    /// Reads and parses the configuration document at `path`.
    ///
    /// # Errors
    ///
    /// Missing, unreadable, or malformed files are fatal; remediation
    /// hints are logged before the error is returned.
    pub fn load_configuration_from(&self, path: &Path) -> Result<(), ConfigError> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(source) => {
                self.log_config_file_hints(path);
                return Err(ConfigError::ConfigRead {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        let value: Value = match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(source) => {
                self.log_config_file_hints(path);
                return Err(ConfigError::ConfigParse {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        let Value::Object(map) = value else {
            self.log_config_file_hints(path);
            return Err(ConfigError::NotAnObject {
                path: path.to_path_buf(),
            });
        };
        *self.document.write() = map;
        klog!(
            self.logger,
            Severity::Status,
            "configuration file \"{}\" was loaded properly",
            path.display()
        );
        self.print_document();
        Ok(())
    }

    fn log_config_file_hints(&self, path: &Path) {
        klog!(
            self.logger,
            Severity::Error,
            "configuration file \"{}\" was not found or invalid",
            path.display()
        );
        klog!(self.logger, Severity::Info, "quick fixes:");
        klog!(
            self.logger,
            Severity::Info,
            "   specify config file name with -l switch"
        );
        klog!(
            self.logger,
            Severity::Info,
            "   create default configuration using -c switch"
        );
    }

    /// Logs the raw document tree at Debug severity.
    pub fn print_document(&self) {
        klog!(
            self.logger,
            Severity::Debug,
            "properties loaded from config file (raw):"
        );
        for (key, value) in self.document.read().iter() {
            self.print_value(key, value, 1);
        }
    }

    fn print_value(&self, key: &str, value: &Value, depth: usize) {
        let indent = "  ".repeat(depth);
        match value {
            Value::Object(entries) => {
                klog!(self.logger, Severity::Debug, "{indent}{key}:");
                for (child_key, child) in entries {
                    self.print_value(child_key, child, depth + 1);
                }
            }
            scalar => klog!(self.logger, Severity::Debug, "{indent}{key}: {scalar}"),
        }
    }

    /// Binds every top-level document node to the registered tree of the
    /// same name. Nodes with no registered tree are logged and recorded;
    /// the remaining nodes still bind.
    pub fn load_properties_from_configuration(&self) -> BindingSummary {
        let document = self.document.read().clone();
        let registry = self.registry.lock().clone();
        let mut summary = BindingSummary::default();

        for (node_name, subtree) in &document {
            if let Some(configurable) = registry.get(node_name) {
                summary
                    .nodes
                    .push(configurable.tree().load_from_config_node(subtree, &self.logger));
            } else {
                klog!(
                    self.logger,
                    Severity::Error,
                    "object \"{node_name}\" appearing in the loaded config file was not found in the registry"
                );
                summary.unknown_nodes.push(node_name.clone());
            }
        }

        klog!(self.logger, Severity::Info, "configuration completed");
        klog!(
            self.logger,
            Severity::Status,
            "list of application properties:"
        );
        for configurable in registry.values() {
            configurable
                .tree()
                .print_properties_with_values(&self.logger);
        }
        summary
    }

    /// Invokes the post-binding hook on every registered object, in
    /// registration order. Property values must be final by this point.
    pub fn initialize_property_dependent_variables(&self) {
        klog!(
            self.logger,
            Severity::Status,
            "initializing property-dependent variables"
        );
        let registry = self.registry.lock().clone();
        for configurable in registry.values() {
            configurable.initialize_property_dependent_variables();
        }
        klog!(
            self.logger,
            Severity::Info,
            "property-dependent variables initialized"
        );
    }

    /// Returns a clone of the document subtree stored under `name`, or an
    /// empty JSON object (never null) when the node is absent.
    #[must_use]
    pub fn return_node(&self, name: &str) -> Value {
        self.document.read().get(name).map_or_else(
            || {
                klog!(
                    self.logger,
                    Severity::Warning,
                    "node \"{name}\" not found in config file"
                );
                Value::Object(serde_json::Map::new())
            },
            |node| {
                klog!(
                    self.logger,
                    Severity::Info,
                    "node \"{name}\" has been found in config file"
                );
                node.clone()
            },
        )
    }

    /// Writes a configuration template to `path`: every registered tree
    /// dumped with its current (default) values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ConfigWrite`] when the file cannot be
    /// written.
    pub fn create_default_config(&self, path: &Path) -> Result<(), ConfigError> {
        let registry = self.registry.lock();
        let mut root = serde_json::Map::new();
        for (name, configurable) in registry.iter() {
            root.insert(name.clone(), Value::Object(configurable.tree().to_config_node()));
        }
        let mut rendered = serde_json::to_string_pretty(&Value::Object(root))
            .unwrap_or_else(|_| String::from("{}"));
        rendered.push('\n');
        fs::write(path, rendered).map_err(|source| ConfigError::ConfigWrite {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Name of the executed binary, derived from the first argument.
    #[must_use]
    pub fn app_name(&self) -> String {
        self.app_name.read().clone()
    }

    /// Raw command-line arguments as received.
    #[must_use]
    pub fn args(&self) -> Vec<String> {
        self.args.read().clone()
    }

    /// Parsed command-line options, once parsing has happened.
    #[must_use]
    pub fn options(&self) -> Option<CliOptions> {
        self.options.read().clone()
    }

    /// Clone of the loaded document (top-level node map).
    #[must_use]
    pub fn document(&self) -> serde_json::Map<String, Value> {
        self.document.read().clone()
    }
}

impl std::fmt::Debug for ParameterServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParameterServer")
            .field("app_name", &*self.app_name.read())
            .field("registered_trees", &self.registry.lock().len())
            .field("document_nodes", &self.document.read().len())
            .finish()
    }
}

fn binary_name(argv0: &str) -> String {
    Path::new(argv0)
        .file_name()
        .map_or_else(|| argv0.to_string(), |name| name.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::Property;
    use crate::tree::PropertyTree;
    use kestrel_logging::{LogOutput, MemoryOutput};
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::tempdir;

    struct TestRig {
        tree: PropertyTree,
        count: Arc<Property<i64>>,
        initialized: AtomicBool,
    }

    impl TestRig {
        fn new(node_name: &str) -> Arc<Self> {
            let tree = PropertyTree::new(node_name);
            let count = Property::new("count", 0_i64).unwrap();
            tree.register_property(count.clone()).unwrap();
            Arc::new(Self {
                tree,
                count,
                initialized: AtomicBool::new(false),
            })
        }
    }

    impl Configurable for TestRig {
        fn tree(&self) -> &PropertyTree {
            &self.tree
        }

        fn initialize_property_dependent_variables(&self) {
            self.initialized.store(true, Ordering::SeqCst);
        }
    }

    fn server() -> (ParameterServer, Arc<MemoryOutput>) {
        let logger = Arc::new(Logger::new());
        let output = Arc::new(MemoryOutput::new(Severity::Trace));
        logger.add_output(output.clone());
        (ParameterServer::new(logger), output)
    }

    #[test]
    fn duplicate_tree_registration_errs_and_first_wins() {
        let (server, _) = server();
        let first = TestRig::new("node1");
        let second = TestRig::new("node1");

        server.register_property_tree(first.clone()).unwrap();
        let err = server.register_property_tree(second).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateTree { .. }));

        first.count.set(9);
        let document = server.return_node("node1");
        assert!(document.is_object());
    }

    #[test]
    fn binding_updates_registered_nodes_and_records_missing_ones() {
        let (server, _) = server();
        let rig = TestRig::new("node1");
        server.register_property_tree(rig.clone()).unwrap();

        let dir = tempdir().unwrap();
        let config = dir.path().join("rig.json");
        fs::write(
            &config,
            json!({"node1": {"count": "42"}, "missing_node": {"count": "1"}}).to_string(),
        )
        .unwrap();

        server.load_configuration_from(&config).unwrap();
        let summary = server.load_properties_from_configuration();

        assert_eq!(rig.count.get(), 42);
        assert_eq!(summary.unknown_nodes, vec!["missing_node"]);
        assert_eq!(summary.nodes.len(), 1);
        assert_eq!(summary.nodes[0].applied, vec!["count"]);
    }

    #[test]
    fn hooks_run_after_binding_for_every_registered_tree() {
        let (server, _) = server();
        let first = TestRig::new("a");
        let second = TestRig::new("b");
        server.register_property_tree(first.clone()).unwrap();
        server.register_property_tree(second.clone()).unwrap();

        server.initialize_property_dependent_variables();
        assert!(first.initialized.load(Ordering::SeqCst));
        assert!(second.initialized.load(Ordering::SeqCst));
    }

    #[test]
    fn set_logger_level_flag_adjusts_the_injected_logger() {
        let (server, output) = server();
        let dir = tempdir().unwrap();
        let config = dir.path().join("rig.json");
        fs::write(&config, "{}").unwrap();

        let startup = server
            .parse_application_parameters([
                "prog".to_string(),
                "--set-logger-level".to_string(),
                "5".to_string(),
                "--load-config".to_string(),
                config.display().to_string(),
            ])
            .unwrap();

        assert_eq!(startup, Startup::Continue);
        assert_eq!(output.level(), Severity::Warning);
        let options = server.options().unwrap();
        assert!(!options.create_config);
        assert_eq!(server.app_name(), "prog");
    }

    #[test]
    fn missing_config_file_is_fatal_with_hints() {
        let (server, output) = server();
        let err = server
            .parse_application_parameters(["prog".to_string()])
            .unwrap_err();
        assert!(matches!(err, ConfigError::ConfigRead { .. }));

        let records = output.snapshot();
        assert!(records
            .iter()
            .any(|r| r.severity == Severity::Error && r.message.contains("prog.json")));
        assert!(records.iter().any(|r| r.message.contains("-c switch")));
    }

    #[test]
    fn malformed_config_file_is_fatal() {
        let (server, _) = server();
        let dir = tempdir().unwrap();
        let config = dir.path().join("broken.json");
        fs::write(&config, "{ not json").unwrap();

        let err = server.load_configuration_from(&config).unwrap_err();
        assert!(matches!(err, ConfigError::ConfigParse { .. }));

        let config = dir.path().join("array.json");
        fs::write(&config, "[1, 2]").unwrap();
        let err = server.load_configuration_from(&config).unwrap_err();
        assert!(matches!(err, ConfigError::NotAnObject { .. }));
    }

    #[test]
    fn unknown_cli_flag_exits_cleanly() {
        let (server, _) = server();
        let startup = server
            .parse_application_parameters(["prog".to_string(), "--no-such-flag".to_string()])
            .unwrap();
        assert_eq!(startup, Startup::Exit);
    }

    #[test]
    fn create_config_writes_template_and_exits() {
        let (server, _) = server();
        let rig = TestRig::new("app_state");
        rig.count.set(1000);
        server.register_property_tree(rig).unwrap();

        let dir = tempdir().unwrap();
        let target = dir.path().join("rig.json");
        let startup = server
            .parse_application_parameters([
                "rig".to_string(),
                "--create-config".to_string(),
                "--load-config".to_string(),
                target.display().to_string(),
            ])
            .unwrap();

        assert_eq!(startup, Startup::Exit);
        let written: Value = serde_json::from_str(&fs::read_to_string(&target).unwrap()).unwrap();
        assert_eq!(written["app_state"]["count"], "1000");
        // Creating the template must not load any document.
        assert!(server.document().is_empty());
    }

    #[test]
    fn return_node_yields_empty_object_sentinel_when_absent() {
        let (server, output) = server();
        let dir = tempdir().unwrap();
        let config = dir.path().join("rig.json");
        fs::write(&config, json!({"known": {"a": "1"}}).to_string()).unwrap();
        server.load_configuration_from(&config).unwrap();

        let known = server.return_node("known");
        assert_eq!(known, json!({"a": "1"}));

        let absent = server.return_node("absent");
        assert_eq!(absent, json!({}));
        assert!(output
            .snapshot()
            .iter()
            .any(|r| r.severity == Severity::Warning && r.message.contains("absent")));
    }
}
