//! Named, typed configuration value cells.

use std::{any::type_name, fmt, str::FromStr, sync::Arc};

use parking_lot::RwLock;
use thiserror::Error;

/// Errors raised by property construction and string conversion.
#[derive(Debug, Error)]
pub enum PropertyError {
    /// Property names key registries and must not be empty.
    #[error("property name must not be empty")]
    EmptyName,
    /// The raw string does not parse as the property's type. The stored
    /// value is left untouched.
    #[error("property \"{property}\": cannot parse {raw:?} as {type_label}")]
    Parse {
        /// Property the value was destined for.
        property: String,
        /// Diagnostic type label of the property.
        type_label: &'static str,
        /// Raw string that failed to parse.
        raw: String,
    },
}

/// Type-erased face of a property, used by registries and the binding step.
pub trait DynProperty: Send + Sync {
    /// Property name, stable for the property's lifetime.
    fn name(&self) -> &str;

    /// Diagnostic type label.
    fn type_label(&self) -> &'static str;

    /// Serializes the current value to its textual form.
    fn value_string(&self) -> String;

    /// Parses `raw` and replaces the current value. A failed parse leaves
    /// the value untouched.
    fn set_from_string(&self, raw: &str) -> Result<(), PropertyError>;
}

/// A named, shared, mutable value cell. The owning object keeps a typed
/// handle; registries hold the same cell through [`DynProperty`].
///
/// The textual form round-trips: `set_from_string(value_string())` restores
/// the value exactly for every supported scalar type.
pub struct Property<T> {
    name: String,
    type_label: &'static str,
    value: RwLock<T>,
}

impl<T> Property<T>
where
    T: Clone + fmt::Display + FromStr + Send + Sync + 'static,
{
    /// Creates a shared property handle with the given default value.
    ///
    /// # Errors
    ///
    /// Returns [`PropertyError::EmptyName`] when `name` is empty.
    pub fn new(name: impl Into<String>, initial: T) -> Result<Arc<Self>, PropertyError> {
        let name = name.into();
        if name.is_empty() {
            return Err(PropertyError::EmptyName);
        }
        Ok(Arc::new(Self {
            name,
            type_label: type_name::<T>(),
            value: RwLock::new(initial),
        }))
    }

    /// Returns a clone of the current value.
    #[must_use]
    pub fn get(&self) -> T {
        self.value.read().clone()
    }

    /// Replaces the current value.
    pub fn set(&self, value: T) {
        *self.value.write() = value;
    }

    /// Atomic read-modify-write under the cell's lock.
    pub fn update(&self, op: impl FnOnce(&mut T)) {
        op(&mut self.value.write());
    }
}

impl<T> DynProperty for Property<T>
where
    T: Clone + fmt::Display + FromStr + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn type_label(&self) -> &'static str {
        self.type_label
    }

    fn value_string(&self) -> String {
        self.value.read().to_string()
    }

    fn set_from_string(&self, raw: &str) -> Result<(), PropertyError> {
        let parsed = raw.parse::<T>().map_err(|_| PropertyError::Parse {
            property: self.name.clone(),
            type_label: self.type_label,
            raw: raw.to_string(),
        })?;
        *self.value.write() = parsed;
        Ok(())
    }
}

impl<T: fmt::Debug> fmt::Debug for Property<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("name", &self.name)
            .field("value", &*self.value.read())
            .finish()
    }
}
