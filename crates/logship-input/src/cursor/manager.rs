//! Input manager for cursor-based inputs.
//!
//! One `CursorInputManager` backs all inputs of one type. `init` opens the
//! resource store (scanning the persistent registry into memory) and starts
//! the background cleaner; `create` turns a configuration blob into a managed
//! input bound to its sources.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::clean::cleanup_loop;
use super::managed::ManagedInput;
use super::store::{Store, KEY_SEPARATOR};
use super::{Input as CursorInput, Source, StateStore};
use crate::error::{InputError, Result};
use crate::plugin::{InputManager, Mode};

/// Callback turning a configuration blob into the sources to collect from and
/// the input implementation that collects them.
pub type ConfigureFn =
    Arc<dyn Fn(&Value) -> Result<(Vec<Arc<dyn Source>>, Arc<dyn CursorInput>)> + Send + Sync>;

/// Common settings every cursor input configuration understands.
#[derive(Debug, Default, Deserialize)]
struct Settings {
    /// Optional user-chosen identifier, part of each resource key. Lets two
    /// configurations of the same type track the same source independently.
    #[serde(default)]
    id: Option<String>,

    /// Retention for this input's resources, in milliseconds. Falls back to
    /// the manager's default.
    #[serde(default)]
    clean_timeout: Option<u64>,
}

/// Plugin manager wiring a cursor [`CursorInput`] into the host.
pub struct CursorInputManager {
    inner: Arc<ManagerInner>,
}

pub(crate) struct ManagerInner {
    pub(crate) input_type: String,
    state_store: Arc<dyn StateStore>,
    default_clean_timeout: Duration,
    configure: ConfigureFn,
    store: Mutex<Option<Arc<Store>>>,
}

impl ManagerInner {
    /// The opened store; fails when `init` has not run in `Run` mode.
    pub(crate) fn store(&self) -> Result<Arc<Store>> {
        self.store.lock().clone().ok_or_else(|| {
            InputError::Runtime("cursor input manager has not been initialized".to_string())
        })
    }
}

impl CursorInputManager {
    pub fn new(
        input_type: impl Into<String>,
        state_store: Arc<dyn StateStore>,
        default_clean_timeout: Duration,
        configure: ConfigureFn,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                input_type: input_type.into(),
                state_store,
                default_clean_timeout,
                configure,
                store: Mutex::new(None),
            }),
        }
    }
}

#[async_trait]
impl InputManager for CursorInputManager {
    async fn init(&self, cancel: &CancellationToken, mode: Mode) -> Result<()> {
        if mode != Mode::Run {
            return Ok(());
        }

        let store = {
            let mut slot = self.inner.store.lock();
            if slot.is_some() {
                return Err(InputError::Runtime(format!(
                    "cursor input manager for '{}' is already initialized",
                    self.inner.input_type
                )));
            }
            let store = Store::open(self.inner.state_store.as_ref(), &self.inner.input_type)?;
            *slot = Some(store.clone());
            store
        };

        let interval = self.inner.state_store.cleanup_interval();
        tokio::spawn(cleanup_loop(store, interval, cancel.clone()));
        Ok(())
    }

    fn create(&self, config: &Value) -> Result<Box<dyn crate::input::Input>> {
        let settings: Settings = if config.is_null() {
            Settings::default()
        } else {
            serde_json::from_value(config.clone())
                .map_err(|e| InputError::Config(format!("invalid input settings: {e}")))?
        };

        let (sources, input) = (self.inner.configure)(config)?;
        for source in &sources {
            let name = source.name();
            if name.is_empty() {
                return Err(InputError::Config("source name must not be empty".to_string()));
            }
            if name.contains(KEY_SEPARATOR) {
                return Err(InputError::Config(format!(
                    "source name '{name}' must not contain '{KEY_SEPARATOR}'"
                )));
            }
        }

        Ok(Box::new(ManagedInput {
            manager: self.inner.clone(),
            user_id: settings.id,
            sources,
            input,
            clean_timeout: settings
                .clean_timeout
                .map(Duration::from_millis)
                .unwrap_or(self.inner.default_clean_timeout),
        }))
    }
}
