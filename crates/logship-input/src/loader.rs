//! Input loaders: resolving configuration to runnable inputs.
//!
//! A [`Loader`] reads the input type from a configuration blob and delegates
//! to the matching plugin's manager. A [`ComposedLoader`] chains two loaders
//! so hosts can migrate between plugin generations: the fallback is consulted
//! only when the primary does not know the requested type at all. Any other
//! primary failure means the configuration was recognized but rejected, and
//! that diagnostic must reach the user unmasked.

use serde_json::Value;
use tracing::warn;

use crate::error::{is_unknown_input, InputError, LoaderError, Result};
use crate::input::Input;
use crate::registry::Registry;

/// Anything that can validate and construct inputs from configuration.
pub trait InputLoader: Send + Sync {
    /// Validate the configuration without constructing the input.
    fn check_config(&self, config: &Value) -> Result<()>;

    /// Construct a runnable input from the configuration.
    fn create(&self, config: &Value) -> Result<Box<dyn Input>>;
}

/// Loader resolving the input type through a plugin registry.
pub struct Loader {
    registry: Registry,
    type_field: String,
    default_type: Option<String>,
}

impl Loader {
    pub fn new(
        registry: Registry,
        type_field: impl Into<String>,
        default_type: Option<String>,
    ) -> Self {
        Self {
            registry,
            type_field: type_field.into(),
            default_type,
        }
    }

    fn config_type(&self, config: &Value) -> Result<String> {
        if let Some(name) = config.get(&self.type_field).and_then(Value::as_str) {
            if !name.is_empty() {
                return Ok(name.to_string());
            }
        }
        if let Some(default) = &self.default_type {
            return Ok(default.clone());
        }
        Err(InputError::Config(format!(
            "missing input type in field '{}'",
            self.type_field
        )))
    }
}

impl InputLoader for Loader {
    fn check_config(&self, config: &Value) -> Result<()> {
        let name = self.config_type(config)?;
        self.registry.find(&name)?;
        Ok(())
    }

    fn create(&self, config: &Value) -> Result<Box<dyn Input>> {
        let name = self.config_type(config)?;
        let plugin = self.registry.find(&name)?;
        if plugin.deprecated {
            warn!(input = %name, "input type is deprecated and will be removed");
        }
        plugin.manager.create(config).map_err(|err| {
            InputError::Loader(LoaderError::with_reason(name, err))
        })
    }
}

/// Loader combining a primary and a fallback loader.
///
/// The fallback is used only when the primary fails with an unknown input
/// type; every other primary error is returned as-is, regardless of what the
/// fallback would have said.
pub struct ComposedLoader {
    primary: Box<dyn InputLoader>,
    fallback: Box<dyn InputLoader>,
}

impl ComposedLoader {
    pub fn new(primary: Box<dyn InputLoader>, fallback: Box<dyn InputLoader>) -> Self {
        Self { primary, fallback }
    }
}

impl InputLoader for ComposedLoader {
    fn check_config(&self, config: &Value) -> Result<()> {
        match self.primary.check_config(config) {
            Ok(()) => Ok(()),
            Err(err) if is_unknown_input(&err) => self.fallback.check_config(config),
            Err(err) => Err(err),
        }
    }

    fn create(&self, config: &Value) -> Result<Box<dyn Input>> {
        match self.primary.create(config) {
            Ok(input) => Ok(input),
            Err(err) if is_unknown_input(&err) => self.fallback.create(config),
            Err(err) => Err(err),
        }
    }
}
