//! Keyboard-shortcut dispatch for interactive experiment runs.

use std::{
    collections::BTreeMap,
    sync::{Arc, Weak},
};

use kestrel_logging::{klog, Logger, Severity};
use parking_lot::Mutex;
use thiserror::Error;

use crate::state::ApplicationState;

/// The escape key, bound to quit by default.
pub const KEY_ESC: char = '\u{1b}';

/// Errors raised by key-handler registration.
#[derive(Debug, Error)]
pub enum KeyError {
    /// Every key dispatches to exactly one handler; the first stays.
    #[error("key {key:?} already has a registered handler")]
    DuplicateKey {
        /// Offending key.
        key: char,
    },
}

struct KeyHandler {
    description: String,
    action: Box<dyn Fn() + Send + Sync>,
}

/// Maps pressed keys to handlers. Default handlers covering quit, help,
/// status, logger level, processing speed, and the application modes are
/// registered at construction; applications add their own on top.
pub struct KeyHandlerRegistry {
    state: Arc<ApplicationState>,
    logger: Arc<Logger>,
    handlers: Mutex<BTreeMap<char, Arc<KeyHandler>>>,
}

impl KeyHandlerRegistry {
    /// Creates a registry with the default handlers installed.
    #[must_use]
    pub fn new(state: Arc<ApplicationState>, logger: Arc<Logger>) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let mut handlers = BTreeMap::new();
            let mut install = |key: char, description: &str, action: Box<dyn Fn() + Send + Sync>| {
                handlers.insert(
                    key,
                    Arc::new(KeyHandler {
                        description: description.to_string(),
                        action,
                    }),
                );
            };

            {
                let state = state.clone();
                install(
                    KEY_ESC,
                    "ESC - exits the program",
                    Box::new(move || state.request_quit()),
                );
            }
            {
                let weak = weak.clone();
                install(
                    'h',
                    "h - displays this list of registered key handlers",
                    Box::new(move || {
                        if let Some(registry) = weak.upgrade() {
                            registry.display_options();
                        }
                    }),
                );
            }
            {
                let state = state.clone();
                install(
                    's',
                    "s - display application status",
                    Box::new(move || state.display_status()),
                );
            }
            {
                let logger = logger.clone();
                install(
                    ';',
                    "; - increments the logger severity level",
                    Box::new(move || logger.increment_severity_level()),
                );
            }
            {
                let logger = logger.clone();
                install(
                    '\'',
                    "' - decrements the logger severity level",
                    Box::new(move || logger.decrement_severity_level()),
                );
            }
            {
                let state = state.clone();
                install(
                    '-',
                    "- - slows down the processing (multiplies the sleep interval by 1.5)",
                    Box::new(move || state.multiply_sleep_interval(1.5)),
                );
            }
            {
                let state = state.clone();
                install(
                    '+',
                    "+ - fastens up the processing (divides the sleep interval by 1.5)",
                    Box::new(move || state.divide_sleep_interval(1.5)),
                );
            }
            {
                let state = state.clone();
                install(
                    '=',
                    "= - resets the processing time (sets the sleep interval to 1s)",
                    Box::new(move || state.set_sleep_interval_s(1.0)),
                );
            }
            {
                let state = state.clone();
                install(
                    'l',
                    "l - toggles learning mode on/off",
                    Box::new(move || state.press_learning()),
                );
            }
            {
                let state = state.clone();
                install(
                    ' ',
                    "PAUSE - stops/starts the continuous execution of the program",
                    Box::new(move || state.press_pause()),
                );
            }
            {
                let state = state.clone();
                install(
                    '\\',
                    "\\ - performs a single step",
                    Box::new(move || state.press_single_step()),
                );
            }

            Self {
                state,
                logger,
                handlers: Mutex::new(handlers),
            }
        })
    }

    /// Registers a user-defined handler.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::DuplicateKey`] when the key is taken (including
    /// by a default handler); the first registration stays.
    pub fn register_key_handler(
        &self,
        key: char,
        description: impl Into<String>,
        action: impl Fn() + Send + Sync + 'static,
    ) -> Result<(), KeyError> {
        let mut handlers = self.handlers.lock();
        if handlers.contains_key(&key) {
            return Err(KeyError::DuplicateKey { key });
        }
        handlers.insert(
            key,
            Arc::new(KeyHandler {
                description: description.into(),
                action: Box::new(action),
            }),
        );
        Ok(())
    }

    /// Dispatches a pressed key to its handler, or logs a pointer to the
    /// help key.
    pub fn handle_key(&self, key: char) {
        klog!(self.logger, Severity::Trace, "handling key {key:?}");
        // The map lock is released before the handler runs; handlers may
        // consult the registry themselves.
        let handler = self.handlers.lock().get(&key).cloned();
        if let Some(handler) = handler {
            (handler.action)();
        } else {
            klog!(
                self.logger,
                Severity::Warning,
                "handler for given key not found, please press h for help"
            );
        }
    }

    /// Logs the descriptions of all registered handlers.
    pub fn display_options(&self) {
        let descriptions: Vec<String> = self
            .handlers
            .lock()
            .values()
            .map(|handler| handler.description.clone())
            .collect();
        let line = "----------------------------------------------------------------";
        klog!(self.logger, Severity::Status, "{line}");
        klog!(self.logger, Severity::Status, "list of registered key handlers:");
        klog!(self.logger, Severity::Status, "{line}");
        for description in descriptions {
            klog!(self.logger, Severity::Status, "{description}");
        }
        klog!(self.logger, Severity::Status, "{line}");
    }

    /// Shared run state the default handlers act on.
    #[must_use]
    pub fn state(&self) -> &Arc<ApplicationState> {
        &self.state
    }
}

impl std::fmt::Debug for KeyHandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyHandlerRegistry")
            .field("handlers", &self.handlers.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_logging::{LogOutput, MemoryOutput};
    use std::sync::atomic::{AtomicU64, Ordering};

    fn registry() -> (Arc<KeyHandlerRegistry>, Arc<MemoryOutput>) {
        let logger = Arc::new(Logger::new());
        let output = Arc::new(MemoryOutput::new(Severity::Trace));
        logger.add_output(output.clone());
        let state = ApplicationState::new(logger.clone()).unwrap();
        (KeyHandlerRegistry::new(state, logger), output)
    }

    #[test]
    fn escape_requests_quit() {
        let (registry, _) = registry();
        assert!(!registry.state().quit_requested());
        registry.handle_key(KEY_ESC);
        assert!(registry.state().quit_requested());
    }

    #[test]
    fn mode_keys_toggle_state_flags() {
        let (registry, _) = registry();
        registry.handle_key('l');
        assert!(registry.state().is_learning_mode_on());
        registry.handle_key(' ');
        assert!(registry.state().is_paused());
        registry.handle_key('\\');
        assert!(registry.state().is_single_step_mode_on());
    }

    #[test]
    fn speed_keys_adjust_the_sleep_interval() {
        let (registry, _) = registry();
        registry.state().set_sleep_interval_us(1000.0);
        registry.handle_key('-');
        assert!((registry.state().sleep_interval_us() - 1500.0).abs() < f64::EPSILON);
        registry.handle_key('=');
        assert!((registry.state().sleep_interval_us() - 1_000_000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn logger_level_keys_step_the_threshold() {
        let (registry, output) = registry();
        output.set_level(Severity::Info);
        registry.handle_key(';');
        assert_eq!(output.level(), Severity::Status);
        registry.handle_key('\'');
        assert_eq!(output.level(), Severity::Info);
    }

    #[test]
    fn unknown_keys_point_at_help() {
        let (registry, output) = registry();
        registry.handle_key('?');
        assert!(output
            .snapshot()
            .iter()
            .any(|r| r.severity == Severity::Warning && r.message.contains("press h for help")));
    }

    #[test]
    fn custom_handlers_run_and_duplicates_err() {
        let (registry, _) = registry();
        let hits = Arc::new(AtomicU64::new(0));
        {
            let hits = hits.clone();
            registry
                .register_key_handler('r', "r - resets the estimate", move || {
                    hits.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }
        registry.handle_key('r');
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        let err = registry
            .register_key_handler('l', "l - already taken", || {})
            .unwrap_err();
        assert!(matches!(err, KeyError::DuplicateKey { key: 'l' }));
    }

    #[test]
    fn help_lists_every_registered_handler() {
        let (registry, output) = registry();
        registry.handle_key('h');
        let messages: Vec<String> = output
            .snapshot()
            .into_iter()
            .map(|r| r.message)
            .collect();
        assert!(messages.iter().any(|m| m.contains("exits the program")));
        assert!(messages.iter().any(|m| m.contains("single step")));
    }
}
